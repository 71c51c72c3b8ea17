use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use cnpj_api::filter::paginate;
use cnpj_api::{
    ApiClient, ApiClientConfig, ApiError, CredentialProvider, CredentialStore, ListFilter,
    ListSnapshot, NO_ERRORS_MESSAGE, Record,
};
use cnpj_certidao::{DisplayState, HandoffEntry, HtmlFragmentExtractor, SessionHandoff, display_certificate};
use cnpj_config::ConsoleConfig;
use cnpj_runtime::{ConsoleHandle, PollExit, Poller, SnapshotSource};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::{Commands, FilterArgs};
use crate::view::{render_stats, render_table};

/// Everything a command needs, built once per invocation.
pub struct Console {
    api: ApiClient,
    cfg: ConsoleConfig,
    handoff: SessionHandoff,
    extractor: HtmlFragmentExtractor,
    data_dir: PathBuf,
    json: bool,
}

impl Console {
    pub fn new(cfg: ConsoleConfig, data_dir: PathBuf, json: bool) -> Result<Self> {
        let credentials: Arc<dyn CredentialProvider> = Arc::new(CredentialStore::in_dir(&data_dir));
        let api = ApiClient::new(
            ApiClientConfig {
                base_url: cfg.api.base_url.clone(),
                auth_base_url: cfg.api.auth_base().to_string(),
                timeout: cfg.api.timeout(),
                max_upload_bytes: cfg.upload.max_bytes,
            },
            credentials,
        )
        .context("invalid backend URL")?;
        let extractor = HtmlFragmentExtractor::new(cfg.certidao.decorative_patterns.iter().cloned());
        Ok(Self {
            api,
            cfg,
            handoff: SessionHandoff::new(),
            extractor,
            data_dir,
            json,
        })
    }

    pub async fn run(&self, command: Commands, handle: &ConsoleHandle) -> Result<()> {
        match command {
            Commands::Login { username, password } => self.login(&username, password).await,
            Commands::Logout => self.logout(),
            Commands::Whoami => self.whoami(),
            Commands::Upload { file } => self.upload(&file).await,
            Commands::List { filter, page } => self.list(filter, page).await,
            Commands::Watch { filter } => self.watch(filter, handle).await,
            Commands::ReprocessAll {
                texto_erro,
                limite,
                dias,
            } => self.reprocess_all(texto_erro, limite, dias).await,
            Commands::Reprocess { id } => self.reprocess(id).await,
            Commands::Delete { ids } => self.delete(&ids).await,
            Commands::Certidao { id, out, open } => self.certidao(id, out, open).await,
        }
    }

    async fn login(&self, username: &str, password: Option<String>) -> Result<()> {
        let password = match password {
            Some(p) => p,
            None => prompt("Senha: ").await?,
        };
        let ok = self
            .api
            .login(username, &password)
            .await
            .context("Erro ao fazer login")?;
        if !ok {
            return Err(anyhow!("Usuário ou senha inválidos"));
        }
        println!("Login realizado como {username}.");
        Ok(())
    }

    fn logout(&self) -> Result<()> {
        self.api.logout()?;
        println!("Sessão encerrada.");
        Ok(())
    }

    fn whoami(&self) -> Result<()> {
        match (self.api.is_logged_in(), self.api.current_user()) {
            (true, Some(user)) if self.json => {
                println!("{}", serde_json::json!({"id": user.id, "username": user.username}));
            }
            (true, Some(user)) => println!("{} (id {})", user.username, user.id),
            (true, None) => println!("Autenticado (usuário desconhecido)"),
            (false, _) => println!("Não autenticado"),
        }
        Ok(())
    }

    async fn upload(&self, file: &Path) -> Result<()> {
        let result = self
            .api
            .upload_path(file)
            .await
            .map_err(|e| user_error("Erro ao processar o arquivo", e))?;
        println!(
            "{} CNPJs foram enviados para processamento!",
            result.total_processed
        );
        Ok(())
    }

    async fn list(&self, args: FilterArgs, page: usize) -> Result<()> {
        let filter = ListFilter::from(args);
        let snapshot = self
            .api
            .list(&filter)
            .await
            .map_err(|e| user_error("Erro ao carregar CNPJs", e))?;
        self.print_snapshot(&filter, &snapshot, page)
    }

    fn print_snapshot(&self, filter: &ListFilter, snapshot: &ListSnapshot, page: usize) -> Result<()> {
        let visible = filter.apply(&snapshot.records);
        let page = paginate(&visible, page, self.cfg.list.page_size);
        if self.json {
            let body = serde_json::json!({
                "stats": snapshot.stats,
                "page": page.number,
                "total_pages": page.total_pages,
                "cnpjs": page.items,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        } else {
            println!("{}", render_stats(&snapshot.stats));
            print!("{}", render_table(&page));
        }
        Ok(())
    }

    async fn watch(&self, args: FilterArgs, handle: &ConsoleHandle) -> Result<()> {
        let filter = ListFilter::from(args);
        if !self.cfg.poll.enabled {
            tracing::info!("poll.disabled");
            return self.list_with(&filter).await;
        }

        let source = Arc::new(ListSource {
            api: self.api.clone(),
            filter: filter.clone(),
        });
        let (poller, mut rx) = Poller::new(self.cfg.poll.interval()).spawn(handle, source);
        let shutdown = handle.shutdown_requested();
        tokio::pin!(shutdown);

        let stopped_by_user = loop {
            tokio::select! {
                _ = &mut shutdown => break true,
                snapshot = rx.recv() => match snapshot {
                    Some(snapshot) => {
                        println!("--- {} ---", chrono::Local::now().format("%d/%m/%Y %H:%M:%S"));
                        self.print_snapshot(&filter, &snapshot, 1)?;
                    }
                    None => break false,
                },
            }
        };

        let exit = if stopped_by_user {
            poller.stop().await
        } else {
            poller.join().await
        };
        match exit {
            PollExit::Fatal(_) => Err(ApiError::Unauthorized.into()),
            _ => Ok(()),
        }
    }

    async fn list_with(&self, filter: &ListFilter) -> Result<()> {
        let snapshot = self
            .api
            .list(filter)
            .await
            .map_err(|e| user_error("Erro ao carregar CNPJs", e))?;
        self.print_snapshot(filter, &snapshot, 1)
    }

    async fn reprocess_all(
        &self,
        texto_erro: Option<String>,
        limite: Option<u32>,
        dias: Option<u32>,
    ) -> Result<()> {
        let filter = ListFilter {
            texto_erro: texto_erro.clone(),
            ..ListFilter::default()
        };
        let snapshot = self
            .api
            .list(&filter)
            .await
            .map_err(|e| user_error("Erro ao carregar CNPJs", e))?;
        if snapshot.stats.erros == 0 {
            return Err(anyhow!(NO_ERRORS_MESSAGE));
        }

        let limite = limite.unwrap_or(self.cfg.reprocess.limit);
        let result = self
            .api
            .reprocess_all(texto_erro.as_deref(), dias, limite)
            .await
            .map_err(|e| user_error("Erro ao reprocessar CNPJs", e))?;
        println!(
            "{} CNPJs foram enviados para reprocessamento!",
            result.total_processed
        );
        Ok(())
    }

    async fn reprocess(&self, id: i64) -> Result<()> {
        self.api
            .reprocess_one(id)
            .await
            .map_err(|e| user_error("Erro ao reprocessar CNPJ", e))?;
        println!("CNPJ {id} enviado para reprocessamento!");
        Ok(())
    }

    async fn delete(&self, ids: &[i64]) -> Result<()> {
        self.api
            .delete(ids)
            .await
            .map_err(|e| user_error("Erro ao excluir CNPJs", e))?;
        println!("{} registro(s) excluído(s).", ids.len());
        Ok(())
    }

    async fn certidao(&self, id: i64, out: Option<PathBuf>, open: bool) -> Result<()> {
        let snapshot = self
            .api
            .list(&ListFilter::default())
            .await
            .map_err(|e| user_error("Erro ao carregar CNPJs", e))?;

        match find_certificate(&snapshot.records, id) {
            Some(raw_html) => {
                let extraction = self.extractor.extract(raw_html);
                self.handoff.put(id, HandoffEntry::from(extraction));
            }
            None => tracing::warn!(id, "certidao.missing_full_result"),
        }

        let (page, state) = display_certificate(&self.handoff, id, None);
        let path = out.unwrap_or_else(|| {
            self.data_dir
                .join("certidoes")
                .join(format!("{}.html", cnpj_certidao::handoff::handoff_key(id)))
        });
        save_page(&path, &page).await?;

        match state {
            DisplayState::Ready => println!("Certidão salva em {}", path.display()),
            DisplayState::Unavailable => println!(
                "Conteúdo da certidão indisponível; página salva em {}",
                path.display()
            ),
            DisplayState::NotFound => println!(
                "Dados da certidão não encontrados; página salva em {}",
                path.display()
            ),
        }
        if open {
            open_in_browser(&path).await?;
        }
        Ok(())
    }
}

/// Raw portal HTML of a finished record, if the backend kept one.
fn find_certificate(records: &[Record], id: i64) -> Option<&str> {
    records
        .iter()
        .find(|r| r.id == id)
        .and_then(|r| r.full_result.as_deref())
        .filter(|html| !html.trim().is_empty())
}

/// Context prefix for the user, original error kept for exit-code mapping.
fn user_error(prefix: &'static str, err: ApiError) -> anyhow::Error {
    if err.is_unauthorized() {
        return err.into();
    }
    tracing::warn!(error = ?err, "{prefix}");
    anyhow::Error::new(err).context(prefix)
}

struct ListSource {
    api: ApiClient,
    filter: ListFilter,
}

#[async_trait]
impl SnapshotSource for ListSource {
    type Snapshot = ListSnapshot;
    type Error = ApiError;

    async fn fetch(&self) -> Result<ListSnapshot, ApiError> {
        self.api.list(&self.filter).await
    }

    fn is_fatal(&self, err: &ApiError) -> bool {
        err.is_unauthorized()
    }
}

async fn prompt(label: &str) -> Result<String> {
    eprint!("{label}");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("reading from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn save_page(path: &Path, page: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    tokio::fs::write(path, page)
        .await
        .with_context(|| format!("writing {}", path.display()))
}

/// Hand the page to the desktop opener and wait for it; openers return once
/// the browser has been asked to load the file.
async fn open_in_browser(path: &Path) -> Result<()> {
    let mut cmd = if cfg!(target_os = "macos") {
        tokio::process::Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut c = tokio::process::Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    } else {
        tokio::process::Command::new("xdg-open")
    };
    let status = cmd
        .arg(path)
        .status()
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    if !status.success() {
        tracing::warn!(path = %path.display(), %status, "certidao.open_failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnpj_api::Status;

    fn record(id: i64, full_result: Option<&str>) -> Record {
        Record {
            id,
            cnpj: "1".into(),
            razao_social: None,
            municipio: None,
            status: Status::Concluido,
            resultado: None,
            full_result: full_result.map(str::to_string),
            pdf_path: None,
            data_criacao: None,
            data_atualizacao: None,
            status_divida: None,
            user_id: None,
        }
    }

    #[test]
    fn certificate_lookup_skips_blank_html() {
        let records = [record(1, Some("  ")), record(2, Some("<p>x</p>")), record(3, None)];
        assert_eq!(find_certificate(&records, 1), None);
        assert_eq!(find_certificate(&records, 2), Some("<p>x</p>"));
        assert_eq!(find_certificate(&records, 3), None);
        assert_eq!(find_certificate(&records, 4), None);
    }

    #[test]
    fn unauthorized_is_not_wrapped() {
        let err = user_error("Erro ao carregar CNPJs", ApiError::Unauthorized);
        assert!(matches!(err.downcast_ref::<ApiError>(), Some(ApiError::Unauthorized)));

        let err = user_error(
            "Erro ao carregar CNPJs",
            ApiError::Backend {
                status: 500,
                message: "db down".into(),
            },
        );
        assert_eq!(
            format!("{err:#}"),
            "Erro ao carregar CNPJs: erro do servidor (500): db down"
        );
    }

    #[tokio::test]
    async fn saved_page_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("certidoes").join("2024").join("certidao_7.html");
        save_page(&path, "<p>ok</p>").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "<p>ok</p>");

        save_page(&path, "<p>novo</p>").await.unwrap();
        assert_eq!(tokio::fs::read_to_string(&path).await.unwrap(), "<p>novo</p>");
    }

    #[tokio::test]
    async fn certidao_without_session_writes_not_found_page() {
        let dir = tempfile::tempdir().unwrap();
        let console = Console::new(ConsoleConfig::default(), dir.path().to_path_buf(), false).unwrap();
        let (page, state) = display_certificate(&console.handoff, 9, None);
        assert_eq!(state, DisplayState::NotFound);
        assert!(page.contains("Dados da certidão não encontrados"));
    }

    #[tokio::test]
    async fn extracted_certificate_reaches_display_step() {
        let dir = tempfile::tempdir().unwrap();
        let console = Console::new(ConsoleConfig::default(), dir.path().to_path_buf(), false).unwrap();
        let raw = r#"<div id="interface"><header><img src="https://portal/brasao.png"><h3>CERTIDÃO NEGATIVA<br>Nº 10</h3></header><p>Emitido em: 01/01/2024</p></div>"#;
        let records = [record(10, Some(raw))];
        let html = find_certificate(&records, 10).unwrap();
        console
            .handoff
            .put(10, HandoffEntry::from(console.extractor.extract(html)));

        let (page, state) = display_certificate(&console.handoff, 10, None);
        assert_eq!(state, DisplayState::Ready);
        assert!(page.contains("<h3>CERTIDÃO NEGATIVA</h3>"));
        assert!(page.contains("Nº 10"));
        assert!(page.contains(r#"<p class="emitido-direita">Emitido em: 01/01/2024</p>"#));
        assert!(page.contains("https://portal/brasao.png"));
    }
}
