//! Loader for console configuration with YAML + environment overlays.
//!
//! Sources are merged in this order, later ones winning:
//!
//! 1. built-in defaults (every field has one, so an empty config is valid)
//! 2. an optional or required YAML/TOML/JSON file
//! 3. inline YAML snippets (tests and `--set`-style overrides)
//! 4. `CNPJ__`-prefixed environment variables, `__` separating sections
//!    (`CNPJ__API__BASE_URL`, `CNPJ__POLL__INTERVAL_SECS`)
//!
//! String values may reference `${VAR}` placeholders; they are expanded
//! recursively (bounded) after merging.
use cnpj_common::observability::LogFormat;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAX_EXPANSION_PASSES: usize = 8;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_CONFIG_FILE: &str = "cnpj-console.yaml";

/// Every section falls back to its defaults, so an empty file is valid.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub api: ApiSettings,
    pub poll: PollSettings,
    pub list: ListSettings,
    pub reprocess: ReprocessSettings,
    pub upload: UploadSettings,
    pub certidao: CertidaoSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

/// Where the backend lives and how long we wait for it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    /// Auth endpoints sit behind a different prefix in some deployments.
    pub auth_base_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            auth_base_url: None,
            timeout_secs: 15,
        }
    }
}

impl ApiSettings {
    pub fn auth_base(&self) -> &str {
        self.auth_base_url.as_deref().unwrap_or(&self.base_url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 5,
        }
    }
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListSettings {
    pub page_size: usize,
}

impl Default for ListSettings {
    fn default() -> Self {
        Self { page_size: 10 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReprocessSettings {
    /// Backend `limite` when the command does not pass one.
    pub limit: u32,
}

impl Default for ReprocessSettings {
    fn default() -> Self {
        Self { limit: 100 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    pub max_bytes: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CertidaoSettings {
    /// Substrings identifying coat-of-arms / letterhead images.
    pub decorative_patterns: Vec<String>,
}

impl Default for CertidaoSettings {
    fn default() -> Self {
        Self {
            decorative_patterns: ["uploadGgImagem", "brasao", "nova_friburgo"]
                .map(String::from)
                .to_vec(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub format: LogFormat,
    pub filter: String,
    pub dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            filter: "info".to_owned(),
            dir: None,
        }
    }
}

/// Expand `$VAR` / `${VAR}` until a fixed point, giving up after a few
/// passes so self-referencing variables cannot loop forever.
fn expand_str(raw: &str) -> String {
    let mut current = raw.to_owned();
    for _ in 0..MAX_EXPANSION_PASSES {
        let next = match shellexpand::env(&current) {
            Ok(expanded) if expanded != current => expanded.into_owned(),
            _ => break,
        };
        current = next;
    }
    current
}

fn expand_placeholders(value: &mut Value) {
    match value {
        Value::String(s) if s.contains('$') => *s = expand_str(s),
        Value::Array(items) => items.iter_mut().for_each(expand_placeholders),
        Value::Object(map) => map.values_mut().for_each(expand_placeholders),
        _ => {}
    }
}

/// Builder hides the `config` crate wiring (files + inline YAML + env overrides).
pub struct ConsoleConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
    env_prefix: &'static str,
}

impl Default for ConsoleConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleConfigLoader {
    /// Start from built-in defaults; environment overrides are applied last in [`load`](Self::load).
    ///
    /// ```
    /// use cnpj_config::ConsoleConfigLoader;
    ///
    /// let config = ConsoleConfigLoader::new()
    ///     .with_yaml_str("poll:\n  interval_secs: 9")
    ///     .load()
    ///     .expect("inline yaml loads");
    ///
    /// assert_eq!(config.poll.interval_secs, 9);
    /// assert_eq!(config.list.page_size, 10);
    /// ```
    pub fn new() -> Self {
        Self {
            builder: Config::builder(),
            env_prefix: "CNPJ",
        }
    }

    /// Attach a file that must exist; the `config` crate infers format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Attach a file that is merged only when present.
    pub fn with_optional_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self
            .builder
            .add_source(File::from(path.as_ref()).required(false));
        self
    }

    /// Merge an inline YAML snippet.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Build the merged config with `CNPJ__` env overrides on top.
    pub fn load(self) -> Result<ConsoleConfig, ConfigError> {
        let cfg = self
            .builder
            .add_source(
                Environment::with_prefix(self.env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut merged: Value = cfg.try_deserialize()?;
        expand_placeholders(&mut merged);

        let typed: ConsoleConfig =
            serde_json::from_value(merged).map_err(|e| ConfigError::Message(e.to_string()))?;
        validate(&typed)?;
        Ok(typed)
    }
}

fn validate(cfg: &ConsoleConfig) -> Result<(), ConfigError> {
    let problem = if cfg.list.page_size == 0 {
        Some("list.page_size must be greater than zero")
    } else if cfg.upload.max_bytes == 0 {
        Some("upload.max_bytes must be greater than zero")
    } else if cfg.api.base_url.trim().is_empty() {
        Some("api.base_url must not be empty")
    } else {
        None
    };
    match problem {
        Some(msg) => Err(ConfigError::Message(msg.into())),
        None => Ok(()),
    }
}
