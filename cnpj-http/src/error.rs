use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

use crate::redact::clip;

const SNIPPET_MAX: usize = 500;

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("invalid URL: {0}")]
    Url(String),
    #[error("could not build request: {0}")]
    Build(String),
    #[error("network failure: {0}")]
    Network(String),
    /// Decoder message plus a snippet of the offending body.
    #[error("could not decode response: {0} (body: {1})")]
    Decode(String, String),
    #[error("unauthorized: {message}")]
    Unauthorized { message: String },
    #[error("HTTP {status}: {message} (request id {request_id})")]
    Api {
        status: StatusCode,
        message: String,
        request_id: String,
    },
}

impl HttpError {
    /// The backend's own message when it sent one, otherwise the error text.
    pub fn user_message(&self) -> String {
        match self {
            HttpError::Api { message, .. } | HttpError::Unauthorized { message } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

/// Best human-readable message from an error body.
///
/// Understands `{"detail": "..."}`, FastAPI validation lists
/// (`{"detail": [{"msg": "..."}]}`), `{"message": "..."}`, `{"error": "..."}`
/// and `{"error": {"message": "..."}}`. Anything else falls back to a
/// snippet of the raw body.
pub(crate) fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|value| envelope_message(&value))
        .unwrap_or_else(|| body_snippet(body))
}

fn envelope_message(value: &Value) -> Option<String> {
    if let Some(Value::Array(items)) = value.get("detail") {
        let joined = items
            .iter()
            .filter_map(|item| text_of(item.get("msg")))
            .collect::<Vec<_>>()
            .join("; ");
        if !joined.is_empty() {
            return Some(joined);
        }
    }
    let nested = value.get("error").and_then(|e| e.get("message"));
    [
        value.get("detail"),
        value.get("message"),
        value.get("error"),
        nested,
    ]
    .into_iter()
    .find_map(text_of)
}

fn text_of(value: Option<&Value>) -> Option<String> {
    value?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

pub(crate) fn body_snippet(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let cut = clip(&text, SNIPPET_MAX);
    if cut.len() < text.len() {
        format!("{cut}...")
    } else {
        cut.to_owned()
    }
}
