//! Thin JSON-over-HTTP client for the lookup backend.
//!
//! - One [`HttpClient`] per base URL, with per-call [`RequestOpts`]
//! - JSON, multipart upload and bodiless requests
//! - 401 short-circuits into [`HttpError::Unauthorized`] and is never retried
//! - Opt-in retries for 429/5xx ([`HttpClient::with_retries`]) honouring `Retry-After`
//! - Structured `http.*` tracing events; tokens and secret query values are
//!   never logged. `CNPJ_HTTP_RAW=1` adds curl lines and raw bodies.
//!
//! ```no_run
//! # async fn demo() -> Result<(), cnpj_http::HttpError> {
//! let client = cnpj_http::HttpClient::new("http://localhost:8000")?;
//! let got: serde_json::Value = client
//!     .get_json("cnpj/consultar", cnpj_http::RequestOpts::default())
//!     .await?;
//! # Ok(()) }
//! ```

mod error;
mod redact;

pub use error::HttpError;

use error::{body_snippet, error_message};
use reqwest::header::{CONTENT_TYPE, HeaderMap, RETRY_AFTER};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::time::sleep;

static REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
const BASE_BACKOFF_MS: u64 = 200;
const MIN_RATE_LIMIT_DELAY: Duration = Duration::from_millis(1100);

/// How a request authenticates.
///
/// ```
/// use cnpj_http::Auth;
///
/// let bearer = Auth::Bearer("token");
/// assert!(matches!(bearer, Auth::Bearer("token")));
/// ```
#[derive(Clone, Copy, Debug)]
pub enum Auth<'a> {
    /// `Authorization: Bearer <token>`
    Bearer(&'a str),
    None,
}

/// Per-request overrides.
///
/// ```
/// use cnpj_http::{Auth, RequestOpts};
/// use std::borrow::Cow;
/// use std::time::Duration;
///
/// let opts = RequestOpts {
///     timeout: Some(Duration::from_secs(30)),
///     auth: Some(Auth::Bearer("abc")),
///     query: Some(vec![("status", Cow::Borrowed("erro"))]),
///     ..Default::default()
/// };
///
/// assert_eq!(opts.timeout.unwrap().as_secs(), 30);
/// assert!(opts.retries.is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct RequestOpts<'a> {
    pub timeout: Option<Duration>,
    pub retries: Option<usize>,
    pub auth: Option<Auth<'a>>,
    pub query: Option<Vec<(&'a str, Cow<'a, str>)>>,
}

impl RequestOpts<'_> {
    fn bearer(&self) -> Option<&str> {
        match self.auth {
            Some(Auth::Bearer(token)) => Some(token),
            _ => None,
        }
    }
}

/// A file sent as one multipart form field.
#[derive(Clone, Debug)]
pub struct UploadFile<'a> {
    pub field: &'a str,
    pub file_name: &'a str,
    pub mime: &'a str,
    pub bytes: &'a [u8],
}

impl UploadFile<'_> {
    fn form(&self) -> Result<reqwest::multipart::Form, HttpError> {
        let part = reqwest::multipart::Part::bytes(self.bytes.to_vec())
            .file_name(self.file_name.to_owned())
            .mime_str(self.mime)
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(reqwest::multipart::Form::new().part(self.field.to_owned(), part))
    }
}

enum Payload<'p> {
    Empty,
    Json(Vec<u8>),
    Multipart(UploadFile<'p>),
}

impl Payload<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Payload::Empty => "none",
            Payload::Json(_) => "json",
            Payload::Multipart(_) => "multipart",
        }
    }
}

/// What came back from one attempt.
struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    elapsed: Duration,
}

impl Reply {
    fn request_id(&self) -> &str {
        self.headers
            .get("x-request-id")
            .or_else(|| self.headers.get("x-correlation-id"))
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
    }
}

#[derive(Clone, Debug)]
pub struct HttpClient {
    base: Url,
    inner: Client,
    pub default_timeout: Duration,
    pub max_retries: usize,
}

impl HttpClient {
    /// Client anchored at `base`; the path always ends in `/` so joins keep it.
    ///
    /// ```no_run
    /// use cnpj_http::{HttpClient, HttpError};
    /// use std::time::Duration;
    ///
    /// let client = HttpClient::new("http://localhost:8000/api")?;
    /// assert_eq!(client.base().as_str(), "http://localhost:8000/api/");
    /// assert_eq!(client.default_timeout, Duration::from_secs(15));
    /// assert_eq!(client.max_retries, 0);
    /// # Ok::<(), HttpError>(())
    /// ```
    pub fn new(base: &str) -> Result<Self, HttpError> {
        let mut base = Url::parse(base).map_err(|e| HttpError::Url(e.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let inner = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| HttpError::Build(e.to_string()))?;
        Ok(Self {
            base,
            inner,
            default_timeout: DEFAULT_TIMEOUT,
            max_retries: 0,
        })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn with_timeout(mut self, dur: Duration) -> Self {
        self.default_timeout = dur;
        self
    }

    /// Retry budget for network failures, 429 and 5xx. Zero by default.
    pub fn with_retries(mut self, n: usize) -> Self {
        self.max_retries = n;
        self
    }

    pub async fn get_json<T>(&self, path: &str, opts: RequestOpts<'_>) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        self.execute(Method::GET, path, Payload::Empty, opts).await
    }

    pub async fn post_json_opts<B, T>(
        &self,
        path: &str,
        body: &B,
        opts: RequestOpts<'_>,
    ) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let bytes = serde_json::to_vec(body).map_err(|e| HttpError::Build(e.to_string()))?;
        self.execute(Method::POST, path, Payload::Json(bytes), opts)
            .await
    }

    /// DELETE; an empty response body decodes as JSON `null`.
    pub async fn delete_json<T>(&self, path: &str, opts: RequestOpts<'_>) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        self.execute(Method::DELETE, path, Payload::Empty, opts)
            .await
    }

    /// POST one file as `multipart/form-data`.
    pub async fn post_multipart<T>(
        &self,
        path: &str,
        file: UploadFile<'_>,
        opts: RequestOpts<'_>,
    ) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        self.execute(Method::POST, path, Payload::Multipart(file), opts)
            .await
    }

    fn resolve(&self, path: &str) -> Result<Url, HttpError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| HttpError::Url(e.to_string()))
    }

    fn build(
        &self,
        method: &Method,
        url: &Url,
        payload: &Payload<'_>,
        opts: &RequestOpts<'_>,
        timeout: Duration,
    ) -> Result<RequestBuilder, HttpError> {
        let mut rb = self.inner.request(method.clone(), url.clone()).timeout(timeout);
        if let Some(query) = &opts.query {
            let pairs: Vec<(&str, &str)> = query.iter().map(|(k, v)| (*k, v.as_ref())).collect();
            rb = rb.query(&pairs);
        }
        if let Some(token) = opts.bearer() {
            rb = rb.bearer_auth(redact::clean_bearer(token)?);
        }
        Ok(match payload {
            Payload::Empty => rb,
            Payload::Json(bytes) => rb
                .header(CONTENT_TYPE, "application/json")
                .body(bytes.clone()),
            Payload::Multipart(file) => rb.multipart(file.form()?),
        })
    }

    /// Send once and read the whole body. Errors carry the failing stage.
    async fn exchange(rb: RequestBuilder) -> Result<Reply, (&'static str, String)> {
        let started = Instant::now();
        let resp = rb.send().await.map_err(|e| ("send", e.to_string()))?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp
            .bytes()
            .await
            .map_err(|e| ("body", e.to_string()))?
            .to_vec();
        Ok(Reply {
            status,
            headers,
            body,
            elapsed: started.elapsed(),
        })
    }

    async fn execute<T>(
        &self,
        method: Method,
        path: &str,
        payload: Payload<'_>,
        opts: RequestOpts<'_>,
    ) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        let url = self.resolve(path)?;
        let budget = opts.retries.unwrap_or(self.max_retries);
        let timeout = opts.timeout.unwrap_or(self.default_timeout);
        let shown_query = opts
            .query
            .as_deref()
            .map(redact::redacted_pairs)
            .unwrap_or_default();
        let auth_kind = if opts.bearer().is_some() { "bearer" } else { "none" };
        let raw = redact::raw_enabled();

        let mut attempt = 1usize;
        loop {
            let rb = self.build(&method, &url, &payload, &opts, timeout)?;
            let req_id = format!("req-{:05}", REQUEST_SEQ.fetch_add(1, Ordering::Relaxed));

            tracing::debug!(
                %req_id,
                attempt,
                budget,
                %method,
                target_url = %format!("{}{}", url.host_str().unwrap_or("-"), url.path()),
                query = ?shown_query,
                timeout_ms = timeout.as_millis() as u64,
                auth_kind,
                body = payload.kind(),
                "http.request.start"
            );
            if raw {
                let mut shown = url.clone();
                if !shown_query.is_empty() {
                    shown.query_pairs_mut().extend_pairs(shown_query.iter());
                }
                let body = match &payload {
                    Payload::Json(bytes) => Some(bytes.as_slice()),
                    _ => None,
                };
                let curl = redact::curl_line(&method, &shown, opts.bearer().is_some(), body);
                tracing::debug!(target: "http.raw", %req_id, %curl, "request");
            }

            let delay = match Self::exchange(rb).await {
                Err((stage, message)) => {
                    if attempt > budget {
                        tracing::warn!(%req_id, attempt, stage, %message, "http.network_error");
                        return Err(HttpError::Network(message));
                    }
                    tracing::debug!(%req_id, stage, %message, "http.network_error.retryable");
                    backoff(attempt)
                }
                Ok(reply) => {
                    let request_id = reply.request_id().to_owned();
                    tracing::debug!(
                        %req_id,
                        status = %reply.status,
                        duration_ms = reply.elapsed.as_millis() as u64,
                        body_len = reply.body.len(),
                        x_request_id = %request_id,
                        "http.response"
                    );
                    if raw {
                        let text = String::from_utf8_lossy(&reply.body);
                        tracing::info!(
                            target: "http.raw",
                            %req_id,
                            status = %reply.status,
                            headers = ?redact::redacted_headers(&reply.headers),
                            body = %redact::clip(&text, redact::RAW_MAX_BODY),
                            truncated = reply.body.len() > redact::RAW_MAX_BODY,
                            "response"
                        );
                    }

                    if reply.status.is_success() {
                        return decode(&req_id, &reply.body);
                    }

                    let message = error_message(&reply.body);
                    if reply.status == StatusCode::UNAUTHORIZED {
                        tracing::warn!(%req_id, status = %reply.status, "http.unauthorized");
                        return Err(HttpError::Unauthorized { message });
                    }
                    if !retryable(reply.status) || attempt > budget {
                        tracing::warn!(
                            %req_id,
                            status = %reply.status,
                            %message,
                            x_request_id = %request_id,
                            "http.error"
                        );
                        return Err(HttpError::Api {
                            status: reply.status,
                            message,
                            request_id,
                        });
                    }
                    retry_delay(reply.status, &reply.headers, attempt)
                }
            };

            tracing::warn!(
                attempt,
                budget,
                backoff_ms = delay.as_millis() as u64,
                %method,
                path,
                "http.retrying"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

fn decode<T: DeserializeOwned>(req_id: &str, body: &[u8]) -> Result<T, HttpError> {
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| {
        let snippet = body_snippet(body);
        tracing::warn!(
            %req_id,
            line = e.line(),
            column = e.column(),
            error = %e,
            body_snippet = %snippet,
            "http.response.decode_error"
        );
        HttpError::Decode(e.to_string(), snippet)
    })
}

fn retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Exponential: 200ms, 400ms, 800ms, ...
fn backoff(attempt: usize) -> Duration {
    let shift = attempt.saturating_sub(1).min(16) as u32;
    Duration::from_millis(BASE_BACKOFF_MS.saturating_mul(1u64 << shift))
}

fn retry_delay(status: StatusCode, headers: &HeaderMap, attempt: usize) -> Duration {
    let advertised = headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    match advertised {
        Some(secs) => Duration::from_secs(secs),
        None if status == StatusCode::TOO_MANY_REQUESTS => {
            backoff(attempt).max(MIN_RATE_LIMIT_DELAY)
        }
        None => backoff(attempt),
    }
}
