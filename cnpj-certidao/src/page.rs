//! Standalone, printable HTML page for one certificate.

use html_escape::{encode_double_quoted_attribute, encode_text};
use std::fmt::Write as _;

use crate::render::{DisplayModel, DisplayState, EMITTED_AT_CLASS};

pub const NOT_FOUND_TITLE: &str = "Dados da certidão não encontrados";
pub const UNAVAILABLE_LINES: [&str; 2] = [
    "Não foi possível carregar o conteúdo da certidão.",
    "Por favor, retorne e tente novamente.",
];
const DEFAULT_WATERMARK: &str = "NF";

const STYLE: &str = r#"
body { font-family: "Times New Roman", serif; margin: 0; background: #f4f4f4; }
.certidao-container { position: relative; max-width: 800px; margin: 24px auto; padding: 40px; background: #fff; }
.certidao-watermark { position: absolute; inset: 0; display: flex; align-items: center; justify-content: center; opacity: 0.06; pointer-events: none; }
.certidao-watermark img { max-width: 60%; }
.default-watermark { font-size: 200px; font-weight: bold; }
.certidao-header { display: flex; align-items: center; gap: 16px; }
.certidao-brasao img { width: 90px; }
.certidao-title { text-align: center; margin: 24px 0; }
.certidao-numero { font-weight: bold; }
.certidao-error { text-align: center; color: #a00; }
.certidao-raw { white-space: pre-wrap; word-break: break-all; }
.EMITTED { text-align: right; }
@media print { body { background: #fff; } .certidao-container { margin: 0; box-shadow: none; } }
"#;

/// Render the page for `model` in the given state.
///
/// `header_html` and `body_html` are inserted verbatim (they come out of the
/// extractor already sanitized); every other field is escaped. A raw body
/// that never went through the extractor is shown as preformatted text.
pub fn render_page(model: &DisplayModel, state: DisplayState) -> String {
    let mut out = String::with_capacity(model.body_html.len() + model.header_html.len() + 2048);
    let doc_title = match state {
        DisplayState::NotFound => NOT_FOUND_TITLE.to_string(),
        _ => model
            .title_line
            .clone()
            .unwrap_or_else(|| "Certidão".to_string()),
    };

    let _ = write!(
        out,
        "<!DOCTYPE html>\n<html lang=\"pt-BR\">\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n<style>{}</style>\n</head>\n<body>\n<div class=\"certidao-container\">\n",
        encode_text(&doc_title),
        STYLE.replace("EMITTED", EMITTED_AT_CLASS)
    );

    if state == DisplayState::NotFound {
        let _ = write!(
            out,
            "<div class=\"certidao-title\"><h3>{}</h3></div>\n",
            encode_text(NOT_FOUND_TITLE)
        );
        out.push_str("</div>\n</body>\n</html>\n");
        return out;
    }

    out.push_str("<div class=\"certidao-watermark\">");
    if model.image_url.is_empty() {
        let _ = write!(out, "<div class=\"default-watermark\">{DEFAULT_WATERMARK}</div>");
    } else {
        let _ = write!(
            out,
            "<img src=\"{}\" alt=\"\">",
            encode_double_quoted_attribute(&model.image_url)
        );
    }
    out.push_str("</div>\n");

    if !model.header_html.is_empty() {
        out.push_str("<div class=\"certidao-header\">");
        if !model.image_url.is_empty() {
            let _ = write!(
                out,
                "<div class=\"certidao-brasao\"><img src=\"{}\" alt=\"Brasão Prefeitura\"></div>",
                encode_double_quoted_attribute(&model.image_url)
            );
        }
        let _ = write!(
            out,
            "<div class=\"certidao-header-text\">{}</div></div>\n",
            model.header_html
        );
    }

    if model.title_line.is_some() || model.certificate_number_line.is_some() {
        out.push_str("<div class=\"certidao-title\">");
        if let Some(title) = &model.title_line {
            let _ = write!(out, "<h3>{}</h3>", encode_text(title));
        }
        if let Some(number) = &model.certificate_number_line {
            let _ = write!(out, "<div class=\"certidao-numero\">{}</div>", encode_text(number));
        }
        out.push_str("</div>\n");
    }

    if state == DisplayState::Unavailable {
        out.push_str("<div class=\"certidao-error\">");
        for line in UNAVAILABLE_LINES {
            let _ = write!(out, "<p>{}</p>", encode_text(line));
        }
        out.push_str("</div>\n");
    }

    if !model.body_html.trim().is_empty() {
        out.push_str("<div class=\"certidao-content\">");
        if model.raw_body {
            let _ = write!(
                out,
                "<pre class=\"certidao-raw\">{}</pre>",
                encode_text(&model.body_html.replace('\0', "\u{fffd}"))
            );
        } else {
            out.push_str(&model.body_html);
        }
        out.push_str("</div>\n");
    }

    out.push_str("</div>\n</body>\n</html>\n");
    out
}
