//! Splitting a cleaned certificate fragment into display regions.

use ego_tree::NodeId;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::extract::selector;
use crate::serialize::FilteredHtml;

/// Class added to the "Emitido em:" paragraph so the page can right-align it.
pub const EMITTED_AT_CLASS: &str = "emitido-direita";
const EMITTED_AT_PREFIX: &str = "Emitido em:";

static HEADER: LazyLock<Selector> = LazyLock::new(|| selector("header"));
static TITLE_HEADING: LazyLock<Selector> = LazyLock::new(|| selector("h3"));
static ANY_HEADING: LazyLock<Selector> = LazyLock::new(|| selector("h1, h2, h3, h4, h5, h6"));
static PARAGRAPH: LazyLock<Selector> = LazyLock::new(|| selector("p"));

/// Title and certificate-number lines pulled from the heading.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedTitle {
    pub title_line: Option<String>,
    pub certificate_number_line: Option<String>,
}

impl ExtractedTitle {
    /// Pick the first `CERTIDÃO` line and the first `Nº`/`N°` line.
    pub fn from_lines<'l>(lines: impl IntoIterator<Item = &'l str>) -> Self {
        let mut title = Self::default();
        for line in lines {
            let upper = line.to_uppercase();
            if title.title_line.is_none() && upper.contains("CERTIDÃO") {
                title.title_line = Some(line.to_string());
            }
            if title.certificate_number_line.is_none()
                && (upper.contains("Nº") || upper.contains("N°"))
            {
                title.certificate_number_line = Some(line.to_string());
            }
        }
        title
    }

    pub fn is_empty(&self) -> bool {
        self.title_line.is_none() && self.certificate_number_line.is_none()
    }

    pub fn is_complete(&self) -> bool {
        self.title_line.is_some() && self.certificate_number_line.is_some()
    }
}

/// Which page variant the host should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    /// Title and body are present.
    Ready,
    /// Content could not be structured; show the "content unavailable" notice.
    Unavailable,
    /// No handoff data reached the display step.
    NotFound,
}

/// Everything the certificate page needs, built once per display request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayModel {
    pub header_html: String,
    pub title_line: Option<String>,
    pub certificate_number_line: Option<String>,
    pub body_html: String,
    pub image_url: String,
    /// `body_html` is the unparsed input, not a cleaned fragment.
    pub raw_body: bool,
}

impl DisplayModel {
    /// Model for a record whose data never reached the display step.
    pub fn not_found() -> Self {
        Self::default()
    }

    pub fn with_image_url(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = image_url.into();
        self
    }

    /// Untitled or empty content is never shown as a blank certificate.
    pub fn state(&self) -> DisplayState {
        if self.body_html.trim().is_empty()
            || (self.title_line.is_none() && self.certificate_number_line.is_none())
        {
            DisplayState::Unavailable
        } else {
            DisplayState::Ready
        }
    }
}

/// Stateless splitter; see [`CertificateRenderer::split`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CertificateRenderer;

impl CertificateRenderer {
    pub fn new() -> Self {
        Self
    }

    /// Split a cleaned fragment into header, title lines and body.
    ///
    /// ```
    /// use cnpj_certidao::CertificateRenderer;
    ///
    /// let model = CertificateRenderer::new().split(
    ///     "<header><div>PREFEITURA</div><h3>CERTIDÃO NEGATIVA<br>Nº 77</h3></header><p>corpo</p>",
    /// );
    /// assert_eq!(model.header_html, "<div>PREFEITURA</div>");
    /// assert_eq!(model.title_line.as_deref(), Some("CERTIDÃO NEGATIVA"));
    /// assert_eq!(model.certificate_number_line.as_deref(), Some("Nº 77"));
    /// assert_eq!(model.body_html, "<p>corpo</p>");
    /// ```
    pub fn split(&self, cleaned_html: &str) -> DisplayModel {
        if cleaned_html.trim().is_empty() || cleaned_html.contains('\0') {
            tracing::warn!(
                target: "certidao",
                input_len = cleaned_html.len(),
                "certidao.render.parse_fallback"
            );
            return DisplayModel {
                body_html: cleaned_html.to_string(),
                raw_body: true,
                ..DisplayModel::default()
            };
        }

        let fragment = Html::parse_fragment(cleaned_html);
        let root = fragment.root_element();
        let mut out = FilteredHtml::new();

        let header = root.select(&HEADER).next();
        let mut heading = None;
        let mut title = ExtractedTitle::default();
        let mut header_html = String::new();

        if let Some(header) = header {
            heading = find_heading(header);
            if let Some(h) = heading {
                out.remove(h);
                let lines = heading_lines(h);
                title = ExtractedTitle::from_lines(lines.iter().map(String::as_str));
                if !title.is_complete() {
                    let (extra, nodes) = trailing_lines(h);
                    let merged =
                        ExtractedTitle::from_lines(lines.iter().chain(&extra).map(String::as_str));
                    if merged != title {
                        nodes.into_iter().for_each(|id| out.remove_node(id));
                        title = merged;
                    }
                }
            }
            header_html = out.inner_html(header).trim().to_string();
            out.remove(header);
        }

        if heading.is_none() {
            heading = find_heading(root).filter(|h| !out.is_dropped(h));
            if let Some(h) = heading {
                out.remove(h);
                title = ExtractedTitle::from_lines(heading_lines(h).iter().map(String::as_str));
            }
        }

        for p in root.select(&PARAGRAPH) {
            let text: String = p.text().collect();
            if is_emitted_at(&text) {
                out.add_class(p, EMITTED_AT_CLASS);
            }
        }

        let body_html = out.inner_html(root).trim().to_string();

        tracing::debug!(
            target: "certidao",
            has_header = !header_html.is_empty(),
            has_title = title.title_line.is_some(),
            has_number = title.certificate_number_line.is_some(),
            body_len = body_html.len(),
            "certidao.render.split"
        );

        DisplayModel {
            header_html,
            title_line: title.title_line,
            certificate_number_line: title.certificate_number_line,
            body_html,
            image_url: String::new(),
            raw_body: false,
        }
    }
}

/// The backend's title is an `h3`; other heading levels are a fallback.
fn find_heading(scope: ElementRef<'_>) -> Option<ElementRef<'_>> {
    scope
        .select(&TITLE_HEADING)
        .next()
        .or_else(|| scope.select(&ANY_HEADING).next())
}

fn is_emitted_at(text: &str) -> bool {
    text.trim_start()
        .get(..EMITTED_AT_PREFIX.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(EMITTED_AT_PREFIX))
}

/// Heading text with `<br>` as line breaks, trimmed, without empty lines.
pub(crate) fn heading_lines(heading: ElementRef<'_>) -> Vec<String> {
    let mut raw = String::new();
    collect_text(heading, &mut raw);
    split_lines(&raw)
}

/// Text and `<br>` siblings right after a heading, up to the next element.
///
/// Portals emit `<h3>TITLE</h3><br>Nº 1</h3>`; the parser closes the heading
/// at the first `</h3>` and leaves the number line outside it.
fn trailing_lines(heading: ElementRef<'_>) -> (Vec<String>, Vec<NodeId>) {
    let mut raw = String::new();
    let mut nodes = Vec::new();
    for sibling in heading.next_siblings() {
        match sibling.value() {
            Node::Text(text) => raw.push_str(text),
            Node::Element(e) if e.name() == "br" => raw.push('\n'),
            _ => break,
        }
        nodes.push(sibling.id());
    }
    (split_lines(&raw), nodes)
}

fn split_lines(raw: &str) -> Vec<String> {
    raw.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(e) if e.name() == "br" => out.push('\n'),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
            }
            _ => {}
        }
    }
}
