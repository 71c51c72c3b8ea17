use anyhow::{Context, Result};
use clap::Parser;
use cnpj_api::{ApiError, SESSION_EXPIRED_MESSAGE};
use cnpj_common::observability::{LogConfig, init_logging};
use cnpj_config::{ConsoleConfig, ConsoleConfigLoader, DEFAULT_CONFIG_FILE};
use cnpj_runtime::{ConsoleHandle, ConsoleRuntime};
use std::process::ExitCode;
use std::time::Duration;

mod cli;
mod commands;
mod view;

use cli::Cli;
use commands::Console;

const EXIT_FAILURE: u8 = 1;
const EXIT_UNAUTHORIZED: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match ConsoleRuntime::build("cnpj-console", None) {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Erro: {e:#}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    let handle = runtime.handle();
    let code = runtime.block_on(run(cli, handle));
    runtime.shutdown(Duration::from_millis(500));
    code
}

async fn run(cli: Cli, handle: ConsoleHandle) -> ExitCode {
    match execute(cli, &handle).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

async fn execute(cli: Cli, handle: &ConsoleHandle) -> Result<()> {
    // 1) Load config (env wins)
    let loader = match &cli.config {
        Some(path) => ConsoleConfigLoader::new().with_file(path),
        None => ConsoleConfigLoader::new().with_optional_file(DEFAULT_CONFIG_FILE),
    };
    let cfg: ConsoleConfig = loader.load().context("loading configuration")?;

    // 2) Logging
    let data_dir = cnpj_common::data_dir(cfg.storage.data_dir.as_deref());
    let log_path = init_logging(LogConfig {
        app_name: cnpj_common::APP_NAME,
        log_dir: cfg.logging.dir.clone(),
        emit_stderr: cli.verbose,
        format: cfg.logging.format,
        default_filter: cfg.logging.filter.clone(),
    })?;
    tracing::debug!(
        log = %log_path.display(),
        data_dir = %data_dir.display(),
        base_url = %cfg.api.base_url,
        "console.start"
    );

    let console = Console::new(cfg, data_dir, cli.json)?;
    console.run(cli.command, handle).await
}

fn report(err: &anyhow::Error) -> ExitCode {
    if let Some(ApiError::Unauthorized) = err.downcast_ref::<ApiError>() {
        tracing::warn!("console.unauthorized");
        eprintln!("{SESSION_EXPIRED_MESSAGE} Use: cnpj-console login <usuario>");
        return ExitCode::from(EXIT_UNAUTHORIZED);
    }
    tracing::error!(error = ?err, "console.failed");
    eprintln!("Erro: {err:#}");
    ExitCode::from(EXIT_FAILURE)
}
