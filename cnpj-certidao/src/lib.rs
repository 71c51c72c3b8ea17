//! Certificate (certidão) HTML pipeline.
//!
//! - [`extract`]: clean the backend's captured portal page into an embeddable
//!   fragment and pull out the coat-of-arms URL
//! - [`render`]: split a cleaned fragment into header, title lines and body
//! - [`handoff`]: session-scoped store carrying extractions to the display step
//! - [`page`]: standalone printable page for a [`DisplayModel`]
//!
//! Parsing is lenient (html5ever via `scraper`); removals and attribute
//! edits happen while re-serializing the tree, so inputs are never mutated.

pub mod extract;
pub mod handoff;
pub mod page;
pub mod render;
mod serialize;

pub use extract::{ExtractError, Extraction, HtmlFragmentExtractor};
pub use handoff::{HandoffEntry, HandoffSource, SessionHandoff};
pub use page::render_page;
pub use render::{CertificateRenderer, DisplayModel, DisplayState, ExtractedTitle};

/// Full display path for one record: session store, then navigation state,
/// then the "not found" page.
///
/// ```
/// use cnpj_certidao::{display_certificate, DisplayState, HandoffEntry, SessionHandoff};
///
/// let store = SessionHandoff::new();
/// let (_, state) = display_certificate(&store, 1, None);
/// assert_eq!(state, DisplayState::NotFound);
///
/// store.put(1, HandoffEntry {
///     cleaned_html: "<h3>CERTIDÃO<br>Nº 1</h3><p>ok</p>".into(),
///     image_url: String::new(),
/// });
/// let (page, state) = display_certificate(&store, 1, None);
/// assert_eq!(state, DisplayState::Ready);
/// assert!(page.contains("<p>ok</p>"));
/// ```
pub fn display_certificate(
    store: &SessionHandoff,
    id: i64,
    navigation_state: Option<HandoffEntry>,
) -> (String, DisplayState) {
    match store.resolve(id, navigation_state) {
        Some((entry, source)) => {
            let model = CertificateRenderer::new()
                .split(&entry.cleaned_html)
                .with_image_url(entry.image_url);
            let state = model.state();
            tracing::info!(target: "certidao", id, ?source, ?state, "certidao.display");
            (render_page(&model, state), state)
        }
        None => {
            tracing::warn!(target: "certidao", id, "certidao.display.not_found");
            (
                render_page(&DisplayModel::not_found(), DisplayState::NotFound),
                DisplayState::NotFound,
            )
        }
    }
}
