//! Log-safe views of requests and responses.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue, SET_COOKIE};
use reqwest::{Method, Url};
use std::borrow::Cow;

use crate::HttpError;

pub(crate) const RAW_ENV: &str = "CNPJ_HTTP_RAW";
pub(crate) const RAW_MAX_BODY: usize = 64 * 1024;

const REDACTED: &str = "<redacted>";
const SECRET_PARAMS: &[&str] = &[
    "access_token",
    "api_key",
    "auth",
    "authorization",
    "bearer",
    "client_secret",
    "key",
    "password",
    "secret",
    "token",
];

pub(crate) fn raw_enabled() -> bool {
    std::env::var(RAW_ENV)
        .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

fn is_secret_param(name: &str) -> bool {
    SECRET_PARAMS
        .iter()
        .any(|secret| secret.eq_ignore_ascii_case(name))
}

/// Longest prefix of `s` that fits in `max` bytes without splitting a char.
pub(crate) fn clip(s: &str, max: usize) -> &str {
    let mut end = max.min(s.len());
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

pub(crate) fn redacted_pairs(query: &[(&str, Cow<'_, str>)]) -> Vec<(String, String)> {
    query
        .iter()
        .map(|(name, value)| {
            let shown = if is_secret_param(name) {
                REDACTED.to_owned()
            } else {
                value.to_string()
            };
            ((*name).to_owned(), shown)
        })
        .collect()
}

pub(crate) fn redacted_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if *name == AUTHORIZATION || *name == SET_COOKIE {
                REDACTED.to_owned()
            } else {
                value.to_str().unwrap_or("").to_owned()
            };
            (name.as_str().to_owned(), shown)
        })
        .collect()
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// A curl command line that reproduces the request, minus any secrets.
pub(crate) fn curl_line(method: &Method, url: &Url, bearer: bool, body: Option<&[u8]>) -> String {
    let mut line = format!("curl -X{method}");
    if bearer {
        line.push_str(" -H 'Authorization: Bearer <redacted>'");
    }
    if let Some(bytes) = body {
        match std::str::from_utf8(bytes) {
            Ok(text) => {
                let cut = clip(text, RAW_MAX_BODY);
                let shown = if cut.len() < text.len() {
                    format!("{cut}…")
                } else {
                    cut.to_owned()
                };
                line.push_str(" -H 'Content-Type: application/json' -d ");
                line.push_str(&shell_quote(&shown));
            }
            Err(_) => line.push_str(&format!(" --data-binary @- # ({} bytes)", bytes.len())),
        }
    }

    let mut shown = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if is_secret_param(&k) {
                REDACTED.to_owned()
            } else {
                v.into_owned()
            };
            (k.into_owned(), v)
        })
        .collect();
    if !pairs.is_empty() {
        shown.query_pairs_mut().clear().extend_pairs(pairs);
    }
    line.push(' ');
    line.push_str(&shell_quote(shown.as_str()));
    line
}

/// Normalise a stored token into something that is safe to put in a header.
///
/// Surrounding quotes and any whitespace (including pasted newlines) are
/// dropped. Empty, non-ASCII or control-character tokens are rejected.
pub(crate) fn clean_bearer(raw: &str) -> Result<String, HttpError> {
    let token: String = raw
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    let problem = if token.is_empty() {
        Some("bearer token is empty")
    } else if !token.is_ascii() {
        Some("bearer token contains non-ASCII bytes")
    } else if token.bytes().any(|b| b.is_ascii_control()) {
        Some("bearer token contains control characters")
    } else {
        None
    };
    if let Some(problem) = problem {
        return Err(HttpError::Build(problem.into()));
    }

    HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| HttpError::Build(format!("invalid Authorization header: {e}")))?;
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_is_cleaned() {
        assert_eq!(clean_bearer("  \"abc def\"\n").unwrap(), "abcdef");
        assert!(clean_bearer("   ").is_err());
        assert!(clean_bearer("tök").is_err());
    }

    #[test]
    fn curl_hides_token_and_secret_query() {
        let url = Url::parse("http://localhost:8000/cnpj/consultar?status=erro&token=abc").unwrap();
        let curl = curl_line(&Method::GET, &url, true, None);
        assert!(curl.contains("Bearer <redacted>"));
        assert!(!curl.contains("token=abc"));
        assert!(curl.contains("status=erro"));
    }

    #[test]
    fn secret_query_values_are_hidden() {
        let pairs = redacted_pairs(&[
            ("status", Cow::Borrowed("erro")),
            ("Password", Cow::Borrowed("hunter2")),
        ]);
        assert_eq!(pairs[0].1, "erro");
        assert_eq!(pairs[1].1, REDACTED);
    }

    #[test]
    fn clip_respects_char_boundaries() {
        assert_eq!(clip("ação", 2), "a");
        assert_eq!(clip("ação", 64), "ação");
    }
}
