//! Pieces every console crate shares: [`ConsoleError`], the data directory
//! and [`observability`].
//!
//! ```rust
//! use cnpj_common::ConsoleError;
//!
//! let err = ConsoleError::NotFound("certidao_42".into());
//! assert_eq!(err.to_string(), "not found: certidao_42");
//! ```
use std::path::{Path, PathBuf};

pub mod observability;

pub const APP_NAME: &str = "cnpj-console";

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "CNPJ_DATA_DIR";

#[derive(thiserror::Error, Debug)]
pub enum ConsoleError {
    #[error("invalid input: {0}")]
    Validation(String),
    /// Credential file or generated page could not be read or written.
    #[error("local storage: {0}")]
    Storage(String),
    #[error("configuration: {0}")]
    Config(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<std::io::Error> for ConsoleError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for ConsoleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConsoleError>;

/// Resolve the data directory: explicit path, then `CNPJ_DATA_DIR`, then
/// `~/.local/share/cnpj-console`.
pub fn data_dir(explicit: Option<&Path>) -> PathBuf {
    match (explicit, std::env::var_os(DATA_DIR_ENV)) {
        (Some(dir), _) => expand_home(dir),
        (None, Some(env_dir)) => expand_home(Path::new(&env_dir)),
        (None, None) => default_data_dir(APP_NAME),
    }
}

fn home() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

/// `~/x` becomes `$HOME/x`; anything else is returned as is.
pub(crate) fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), home()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

pub(crate) fn default_data_dir(app_name: &str) -> PathBuf {
    home()
        .map(|h| h.join(".local/share"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(app_name)
}
