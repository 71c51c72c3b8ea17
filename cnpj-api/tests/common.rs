use std::sync::{Arc, OnceLock};

use cnpj_api::{ApiClient, ApiClientConfig, CredentialProvider, MemoryCredentials};
use cnpj_common::observability::{LogConfig, LogFormat};

static INIT_PATH: OnceLock<std::path::PathBuf> = OnceLock::new();

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let config = LogConfig {
            app_name: "cnpj-api-tests",
            log_dir: Some(std::env::temp_dir().join("cnpj-api-tests")),
            emit_stderr: true,
            format: if std::env::var("CNPJ_LOG_FORMAT")
                .map(|raw| raw.trim().eq_ignore_ascii_case("json"))
                .unwrap_or(false)
            {
                LogFormat::Json
            } else {
                LogFormat::Text
            },
            default_filter: "debug".to_string(),
        };

        cnpj_common::observability::init_logging(config).unwrap_or_default()
    });
}

pub fn client_for(uri: &str, token: Option<&str>) -> (ApiClient, Arc<MemoryCredentials>) {
    let creds = Arc::new(match token {
        Some(t) => MemoryCredentials::with_token(t),
        None => MemoryCredentials::default(),
    });
    let provider: Arc<dyn CredentialProvider> = creds.clone();
    let client = ApiClient::new(
        ApiClientConfig {
            base_url: uri.to_string(),
            auth_base_url: uri.to_string(),
            ..ApiClientConfig::default()
        },
        provider,
    )
    .expect("client builds");
    (client, creds)
}
