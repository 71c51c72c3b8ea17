use clap::{Args, Parser, Subcommand, ValueEnum};
use cnpj_api::{ListFilter, Status};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cnpj-console", version, about = "Console for the CNPJ bulk-lookup service")]
pub struct Cli {
    #[arg(long, global = true, help = "Configuration file (default: ./cnpj-console.yaml if present)")]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[arg(short, long, global = true, help = "Mirror logs to stderr")]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Exchange username/password for a session token.
    Login {
        username: String,
        #[arg(long, env = "CNPJ_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    Logout,
    Whoami,
    /// Send a spreadsheet of CNPJs for processing.
    Upload { file: PathBuf },
    List {
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value_t = 1)]
        page: usize,
    },
    /// Refresh the list on the configured interval until Ctrl-C.
    Watch {
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Requeue failed records.
    ReprocessAll {
        #[arg(long)]
        texto_erro: Option<String>,
        #[arg(long)]
        limite: Option<u32>,
        #[arg(long)]
        dias: Option<u32>,
    },
    /// Requeue one record.
    Reprocess { id: i64 },
    Delete {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Render a record's certificate as a standalone HTML page.
    Certidao {
        id: i64,
        #[arg(long)]
        out: Option<PathBuf>,
        #[arg(long, default_value_t = false)]
        open: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusArg {
    Pendente,
    Processando,
    Concluido,
    Erro,
}

impl From<StatusArg> for Status {
    fn from(s: StatusArg) -> Self {
        match s {
            StatusArg::Pendente => Status::Pendente,
            StatusArg::Processando => Status::Processando,
            StatusArg::Concluido => Status::Concluido,
            StatusArg::Erro => Status::Erro,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct FilterArgs {
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,
    /// Free text over CNPJ, razão social, município and resultado (accents ignored).
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long)]
    pub texto_erro: Option<String>,
    #[arg(long)]
    pub tipo_pendencia: Option<String>,
    /// YYYY-MM-DD
    #[arg(long)]
    pub data_inicio: Option<String>,
    /// YYYY-MM-DD
    #[arg(long)]
    pub data_fim: Option<String>,
}

impl From<FilterArgs> for ListFilter {
    fn from(a: FilterArgs) -> Self {
        ListFilter {
            status: a.status.map(Status::from),
            texto_erro: a.texto_erro,
            tipo_pendencia: a.tipo_pendencia,
            data_inicio: a.data_inicio,
            data_fim: a.data_fim,
            search: a.search,
        }
    }
}
