//! Extraction of the printable certificate fragment from backend HTML.
//!
//! The backend stores, per processed record, the full HTML page captured from
//! the municipal portal. [`HtmlFragmentExtractor::extract`] turns that page
//! into a fragment that is safe to embed: no scripts or stylesheets, no
//! presentation attributes, no layout artifacts and no letterhead images,
//! plus the URL of the coat of arms found in the page header.

use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

use crate::serialize::FilteredHtml;

/// Images whose `src` contains one of these are letterhead/coat-of-arms assets.
pub const DEFAULT_DECORATIVE_PATTERNS: &[&str] = &["uploadGgImagem", "brasao", "nova_friburgo"];

/// Presentation attributes removed from every element of the fragment.
pub const STRIPPED_ATTRIBUTES: &[&str] = &["style", "class", "align", "width", "height"];

static HEADER_IMAGE: LazyLock<Selector> = LazyLock::new(|| selector("#interface header img"));
static INTERFACE: LazyLock<Selector> = LazyLock::new(|| selector("#interface"));
static BODY: LazyLock<Selector> = LazyLock::new(|| selector("body"));
/// Scripts, styles and head-only elements; the last would be hoisted into
/// `<head>` when the fragment is parsed again.
static NON_CONTENT: LazyLock<Selector> =
    LazyLock::new(|| selector("style, script, link, meta, title, base"));
static IMG: LazyLock<Selector> = LazyLock::new(|| selector("img"));
static DIV: LazyLock<Selector> = LazyLock::new(|| selector("div"));

pub(crate) fn selector(css: &str) -> Selector {
    // Only called with the literals above; a failure is a programming error.
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css:?}: {e}"))
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("input is empty")]
    Blank,
    #[error("input contains NUL bytes and is not an HTML document")]
    Binary,
    #[error("document has no body")]
    MissingRoot,
}

/// Result of a successful (or degraded) extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extraction {
    pub cleaned_html: String,
    pub image_url: String,
}

/// Configured extractor; cheap to clone and reuse across records.
#[derive(Debug, Clone)]
pub struct HtmlFragmentExtractor {
    decorative_patterns: Vec<String>,
    base_url: Option<Url>,
}

impl Default for HtmlFragmentExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_DECORATIVE_PATTERNS.iter().map(|p| p.to_string()))
    }
}

impl HtmlFragmentExtractor {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            decorative_patterns: patterns
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
            base_url: None,
        }
    }

    /// Resolve relative image URLs against `base` (the page the HTML came from).
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base_url = Some(base);
        self
    }

    pub fn decorative_patterns(&self) -> &[String] {
        &self.decorative_patterns
    }

    fn is_decorative(&self, src: &str) -> bool {
        self.decorative_patterns.iter().any(|p| src.contains(p.as_str()))
    }

    fn resolve_url(&self, src: &str) -> String {
        let src = src.trim();
        match &self.base_url {
            Some(base) => base
                .join(src)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| src.to_string()),
            None => src.to_string(),
        }
    }

    /// Extract the cleaned fragment, degrading to the raw input on failure.
    ///
    /// ```
    /// use cnpj_certidao::HtmlFragmentExtractor;
    ///
    /// let raw = r#"<div id="interface"><header><img src="https://host/brasao.png"></header><p style="color:red">ok</p></div>"#;
    /// let out = HtmlFragmentExtractor::default().extract(raw);
    /// assert_eq!(out.image_url, "https://host/brasao.png");
    /// assert_eq!(out.cleaned_html, "<header></header><p>ok</p>");
    /// ```
    pub fn extract(&self, raw_html: &str) -> Extraction {
        match self.try_extract(raw_html) {
            Ok(extraction) => extraction,
            Err(err) => {
                tracing::warn!(
                    target: "certidao",
                    error = %err,
                    input_len = raw_html.len(),
                    "certidao.extract.parse_fallback"
                );
                Extraction {
                    cleaned_html: raw_html.to_string(),
                    image_url: String::new(),
                }
            }
        }
    }

    /// Strict variant of [`extract`](Self::extract) that reports why the input was rejected.
    pub fn try_extract(&self, raw_html: &str) -> Result<Extraction, ExtractError> {
        if raw_html.trim().is_empty() {
            return Err(ExtractError::Blank);
        }
        if raw_html.contains('\0') {
            return Err(ExtractError::Binary);
        }

        let doc = Html::parse_document(raw_html);
        if !doc.errors.is_empty() {
            tracing::debug!(
                target: "certidao",
                parse_errors = doc.errors.len(),
                "certidao.extract.lenient_parse"
            );
        }

        let image_url = doc
            .select(&HEADER_IMAGE)
            .next()
            .and_then(|img| img.value().attr("src"))
            .filter(|src| !src.trim().is_empty())
            .map(|src| self.resolve_url(src))
            .unwrap_or_default();

        let root = doc
            .select(&INTERFACE)
            .next()
            .or_else(|| doc.select(&BODY).next())
            .ok_or(ExtractError::MissingRoot)?;

        let mut out = FilteredHtml::new().strip_attrs(STRIPPED_ATTRIBUTES);
        let mut removed = 0usize;

        for el in root.select(&NON_CONTENT) {
            out.remove(el);
            removed += 1;
        }
        for img in root.select(&IMG) {
            if img.value().attr("src").is_some_and(|src| self.is_decorative(src)) {
                out.remove(img);
                removed += 1;
            }
        }
        for div in root.select(&DIV) {
            if is_absolutely_positioned(div) {
                out.remove(div);
                removed += 1;
            }
        }

        let cleaned_html = out.inner_html(root).trim().to_string();
        tracing::debug!(
            target: "certidao",
            removed,
            has_image = !image_url.is_empty(),
            cleaned_len = cleaned_html.len(),
            "certidao.extract.ok"
        );

        Ok(Extraction {
            cleaned_html,
            image_url,
        })
    }
}

/// `position: absolute` in the element's own inline style, ignoring case and spacing.
fn is_absolutely_positioned(el: ElementRef<'_>) -> bool {
    el.value().attr("style").is_some_and(|style| {
        let compact: String = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        compact.split(';').any(|decl| decl == "position:absolute")
            || compact.contains("position:absolute!important")
    })
}
