use cnpj_http::{Auth, HttpClient, HttpError, RequestOpts, UploadFile};
use serde_json::Value;
use std::borrow::Cow;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{CredentialProvider, Credentials, StoredUser};
use crate::filter::ListFilter;
use crate::models::{DeleteBatchRequest, ListSnapshot, LoginRequest, ProcessResult, TokenResponse};
use crate::{ApiError, NO_FILE_MESSAGE, NOT_EXCEL_MESSAGE, Result};

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const XLS_MIME: &str = "application/vnd.ms-excel";

#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    pub base_url: String,
    pub auth_base_url: String,
    pub timeout: Duration,
    pub max_upload_bytes: u64,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".into(),
            auth_base_url: "http://localhost:8000".into(),
            timeout: Duration::from_secs(15),
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Backend client. Every call except [`login`](Self::login) needs a stored
/// token; a 401 clears it and surfaces as [`ApiError::Unauthorized`].
#[derive(Clone)]
pub struct ApiClient {
    http: HttpClient,
    auth_http: HttpClient,
    credentials: Arc<dyn CredentialProvider>,
    max_upload_bytes: u64,
}

impl ApiClient {
    pub fn new(config: ApiClientConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let http = HttpClient::new(&config.base_url)?.with_timeout(config.timeout);
        let auth_http = HttpClient::new(&config.auth_base_url)?.with_timeout(config.timeout);
        Ok(Self {
            http,
            auth_http,
            credentials,
            max_upload_bytes: config.max_upload_bytes,
        })
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialProvider> {
        &self.credentials
    }

    pub fn current_user(&self) -> Option<StoredUser> {
        self.credentials.current_user()
    }

    pub fn is_logged_in(&self) -> bool {
        self.credentials.token().is_some()
    }

    /// Exchange username/password for a token and store it.
    /// `Ok(false)` means the backend rejected the credentials.
    pub async fn login(&self, username: &str, password: &str) -> Result<bool> {
        let body = LoginRequest { username, password };
        let resp: TokenResponse = match self
            .auth_http
            .post_json_opts("auth/token", &body, RequestOpts::default())
            .await
        {
            Ok(resp) => resp,
            Err(HttpError::Unauthorized { .. }) => {
                tracing::info!(target: "api", username, "api.login.rejected");
                return Ok(false);
            }
            Err(e) => {
                tracing::warn!(target: "api", error = %e, "api.login.error");
                return Err(e.into());
            }
        };

        self.credentials.save(&Credentials {
            token: resp.access_token,
            user: Some(StoredUser {
                id: resp.user_id,
                username: resp.username,
            }),
        })?;
        tracing::info!(target: "api", username, user_id = resp.user_id, "api.login.ok");
        Ok(true)
    }

    pub fn logout(&self) -> Result<()> {
        self.credentials.clear()?;
        Ok(())
    }

    /// Reject anything that is not an Excel file within the size limit.
    pub fn validate_upload(&self, file_name: &str, len: u64) -> Result<()> {
        if file_name.trim().is_empty() {
            return Err(ApiError::Validation(NO_FILE_MESSAGE.into()));
        }
        if excel_mime(file_name).is_none() {
            return Err(ApiError::Validation(NOT_EXCEL_MESSAGE.into()));
        }
        if len > self.max_upload_bytes {
            return Err(ApiError::Validation(format!(
                "O arquivo excede o tamanho máximo permitido ({} MB)",
                self.max_upload_bytes / (1024 * 1024)
            )));
        }
        Ok(())
    }

    pub async fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<ProcessResult> {
        self.validate_upload(file_name, bytes.len() as u64)?;
        let mime = excel_mime(file_name).unwrap_or(XLSX_MIME);
        let token = self.token()?;
        let file = UploadFile {
            field: "file",
            file_name,
            mime,
            bytes,
        };
        let result: ProcessResult = self
            .http
            .post_multipart("cnpj/process", file, bearer(&token, None))
            .await
            .map_err(|e| self.fail("upload", e))?;
        tracing::info!(target: "api", file_name, total = result.total_processed, "api.upload.ok");
        Ok(result)
    }

    /// Validate, read and upload a spreadsheet from disk.
    pub async fn upload_path(&self, path: &Path) -> Result<ProcessResult> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(cnpj_common::ConsoleError::from)?;
        self.validate_upload(&file_name, meta.len())?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(cnpj_common::ConsoleError::from)?;
        self.upload(&file_name, &bytes).await
    }

    /// Server-side filters only; apply [`ListFilter::apply`] for the local search.
    pub async fn list(&self, filter: &ListFilter) -> Result<ListSnapshot> {
        let token = self.token()?;
        let snapshot: ListSnapshot = self
            .http
            .get_json("cnpj/consultar", bearer(&token, Some(filter.query_params())))
            .await
            .map_err(|e| self.fail("list", e))?;
        tracing::debug!(
            target: "api",
            records = snapshot.records.len(),
            total = snapshot.stats.total,
            erros = snapshot.stats.erros,
            "api.list.ok"
        );
        Ok(snapshot)
    }

    /// Requeue failed records, newest first, up to `limite`.
    pub async fn reprocess_all(
        &self,
        texto_erro: Option<&str>,
        dias: Option<u32>,
        limite: u32,
    ) -> Result<ProcessResult> {
        let token = self.token()?;
        let mut query: Vec<(&str, Cow<'_, str>)> = Vec::new();
        if let Some(t) = texto_erro.map(str::trim).filter(|t| !t.is_empty()) {
            query.push(("texto_erro", Cow::Borrowed(t)));
        }
        if let Some(d) = dias {
            query.push(("dias", Cow::Owned(d.to_string())));
        }
        query.push(("limite", Cow::Owned(limite.to_string())));

        let result: ProcessResult = self
            .http
            .get_json("cnpj/reprocessar-erros-recriando", bearer(&token, Some(query)))
            .await
            .map_err(|e| self.fail("reprocess_all", e))?;
        tracing::info!(target: "api", total = result.total_processed, limite, "api.reprocess_all.ok");
        Ok(result)
    }

    /// Requeue one record, keeping its row.
    pub async fn reprocess_one(&self, id: i64) -> Result<ProcessResult> {
        let token = self.token()?;
        let query = vec![
            ("cnpj_id", Cow::Owned(id.to_string())),
            ("deletar_registro", Cow::Borrowed("false")),
        ];
        let result: ProcessResult = self
            .http
            .get_json("cnpj/reprocessar-cnpj-individual", bearer(&token, Some(query)))
            .await
            .map_err(|e| self.fail("reprocess_one", e))?;
        tracing::info!(target: "api", id, "api.reprocess_one.ok");
        Ok(result)
    }

    pub async fn delete_one(&self, id: i64) -> Result<Value> {
        let token = self.token()?;
        let resp: Value = self
            .http
            .delete_json(&format!("cnpj/{id}"), bearer(&token, None))
            .await
            .map_err(|e| self.fail("delete_one", e))?;
        tracing::info!(target: "api", id, "api.delete_one.ok");
        Ok(resp)
    }

    pub async fn delete_batch(&self, ids: &[i64]) -> Result<Value> {
        if ids.is_empty() {
            return Err(ApiError::Validation("Nenhum CNPJ selecionado".into()));
        }
        let token = self.token()?;
        let resp: Value = self
            .http
            .post_json_opts("cnpj/delete-batch", &DeleteBatchRequest { ids }, bearer(&token, None))
            .await
            .map_err(|e| self.fail("delete_batch", e))?;
        tracing::info!(target: "api", count = ids.len(), "api.delete_batch.ok");
        Ok(resp)
    }

    /// One id goes through the single-delete endpoint, several through the batch one.
    pub async fn delete(&self, ids: &[i64]) -> Result<Value> {
        match ids {
            [id] => self.delete_one(*id).await,
            _ => self.delete_batch(ids).await,
        }
    }

    fn token(&self) -> Result<String> {
        self.credentials.token().ok_or_else(|| {
            tracing::debug!(target: "api", "api.no_token");
            ApiError::Unauthorized
        })
    }

    fn fail(&self, op: &'static str, e: HttpError) -> ApiError {
        if let HttpError::Unauthorized { .. } = e {
            tracing::warn!(target: "api", op, "api.unauthorized");
            if let Err(clear_err) = self.credentials.clear() {
                tracing::error!(target: "api", error = %clear_err, "api.credentials.clear_failed");
            }
        } else {
            tracing::warn!(target: "api", op, error = %e, "api.request.error");
        }
        e.into()
    }
}

fn bearer<'a>(token: &'a str, query: Option<Vec<(&'a str, Cow<'a, str>)>>) -> RequestOpts<'a> {
    RequestOpts {
        auth: Some(Auth::Bearer(token)),
        query,
        ..RequestOpts::default()
    }
}

fn excel_mime(file_name: &str) -> Option<&'static str> {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".xlsx") {
        Some(XLSX_MIME)
    } else if lower.ends_with(".xls") {
        Some(XLS_MIME)
    } else {
        None
    }
}
