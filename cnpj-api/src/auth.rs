//! Bearer-token storage.
//!
//! [`ApiClient`](crate::ApiClient) never reads credentials from global state;
//! it is handed a [`CredentialProvider`] at construction.

use cnpj_common::{ConsoleError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub const CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUser {
    pub id: i64,
    pub username: String,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub token: String,
    #[serde(default)]
    pub user: Option<StoredUser>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("user", &self.user)
            .finish()
    }
}

pub trait CredentialProvider: Send + Sync {
    fn load(&self) -> Option<Credentials>;
    fn save(&self, credentials: &Credentials) -> Result<()>;
    fn clear(&self) -> Result<()>;

    fn token(&self) -> Option<String> {
        self.load()
            .map(|c| c.token)
            .filter(|t| !t.trim().is_empty())
    }

    fn current_user(&self) -> Option<StoredUser> {
        self.load().and_then(|c| c.user)
    }
}

/// Credentials kept in a JSON file under the data directory.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CREDENTIALS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialProvider for CredentialStore {
    fn load(&self) -> Option<Credentials> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "auth.credentials.read_failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(creds) => Some(creds),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "auth.credentials.corrupt");
                None
            }
        }
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(credentials)?)?;
        restrict_permissions(&tmp)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            ConsoleError::Storage(format!("saving {}: {e}", self.path.display()))
        })?;
        tracing::debug!(path = %self.path.display(), "auth.credentials.saved");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "auth.credentials.cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

/// Process-local credentials, for tests and one-shot tokens.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    inner: RwLock<Option<Credentials>>,
}

impl MemoryCredentials {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            inner: RwLock::new(Some(Credentials {
                token: token.into(),
                user: None,
            })),
        }
    }
}

impl CredentialProvider for MemoryCredentials {
    fn load(&self) -> Option<Credentials> {
        self.inner.read().ok().and_then(|guard| guard.clone())
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| ConsoleError::Storage("credential lock poisoned".into()))?;
        *guard = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| ConsoleError::Storage("credential lock poisoned".into()))?;
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Credentials {
        Credentials {
            token: "abc.def".into(),
            user: Some(StoredUser {
                id: 7,
                username: "ana".into(),
            }),
        }
    }

    #[test]
    fn file_store_round_trips_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(&dir.path().join("nested"));
        assert!(store.load().is_none());

        store.save(&sample()).unwrap();
        assert_eq!(store.token().as_deref(), Some("abc.def"));
        assert_eq!(store.current_user().unwrap().username, "ana");

        store.clear().unwrap();
        assert!(store.load().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn corrupt_file_reads_as_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(dir.path());
        fs::write(store.path(), "{not json").unwrap();
        assert!(store.token().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::in_dir(dir.path());
        store.save(&sample()).unwrap();
        let mode = fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn debug_hides_token() {
        assert!(!format!("{:?}", sample()).contains("abc.def"));
    }

    #[test]
    fn memory_store_blank_token_is_none() {
        let mem = MemoryCredentials::with_token("  ");
        assert!(mem.token().is_none());
        mem.save(&sample()).unwrap();
        assert_eq!(mem.token().as_deref(), Some("abc.def"));
        mem.clear().unwrap();
        assert!(mem.load().is_none());
    }
}
