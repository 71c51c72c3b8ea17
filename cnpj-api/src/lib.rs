//! Typed client for the CNPJ lookup backend.
//!
//! - [`ApiClient`]: login, upload, list, reprocess and delete calls
//! - [`auth`]: the [`CredentialProvider`] seam and its file/memory stores
//! - [`filter`]: local search, paging and cell formatting for list views
//! - [`models`]: wire types

pub mod auth;
pub mod client;
pub mod filter;
pub mod models;

pub use auth::{CredentialProvider, CredentialStore, Credentials, MemoryCredentials, StoredUser};
pub use client::{ApiClient, ApiClientConfig};
pub use filter::{ListFilter, Page, RecordAction};
pub use models::{ListSnapshot, ProcessResult, Record, Stats, Status};

use cnpj_common::ConsoleError;
use cnpj_http::HttpError;
use thiserror::Error;

pub const NOT_EXCEL_MESSAGE: &str = "Por favor, selecione um arquivo Excel (.xlsx ou .xls)";
pub const NO_FILE_MESSAGE: &str = "Por favor, selecione um arquivo Excel para processar";
pub const NO_ERRORS_MESSAGE: &str = "Não há CNPJs com erro para reprocessar";
pub const SESSION_EXPIRED_MESSAGE: &str = "Sessão expirada. Faça login novamente.";

#[derive(Debug, Error)]
pub enum ApiError {
    /// Input rejected before any request was made.
    #[error("{0}")]
    Validation(String),
    /// Missing or rejected token; stored credentials have been cleared.
    #[error("Sessão expirada. Faça login novamente.")]
    Unauthorized,
    #[error("erro do servidor ({status}): {message}")]
    Backend { status: u16, message: String },
    #[error("erro de comunicação com o servidor: {0}")]
    Network(String),
    #[error("resposta inválida do servidor: {0}")]
    Decode(String),
    #[error(transparent)]
    Storage(#[from] ConsoleError),
}

impl ApiError {
    /// Backend `detail` when there is one, otherwise the error text.
    pub fn detail(&self) -> String {
        match self {
            ApiError::Backend { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized)
    }
}

impl From<HttpError> for ApiError {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Unauthorized { .. } => ApiError::Unauthorized,
            HttpError::Api {
                status, message, ..
            } => ApiError::Backend {
                status: status.as_u16(),
                message,
            },
            HttpError::Decode(msg, _) => ApiError::Decode(msg),
            HttpError::Network(msg) | HttpError::Url(msg) | HttpError::Build(msg) => {
                ApiError::Network(msg)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
