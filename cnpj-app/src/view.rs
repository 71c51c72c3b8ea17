//! Plain-text rendering of list results.

use cnpj_api::filter::{format_date, truncate_summary};
use cnpj_api::{Page, Record, RecordAction, Stats, Status};
use std::fmt::Write as _;

pub fn render_stats(stats: &Stats) -> String {
    format!(
        "Total: {}  Pendentes: {}  Processando: {}  Concluídos: {}  Erros: {}",
        stats.total, stats.pendentes, stats.processando, stats.concluidos, stats.erros
    )
}

fn action_hint(record: &Record) -> String {
    match RecordAction::for_record(record) {
        RecordAction::Reprocess => format!("reprocess {}", record.id),
        RecordAction::ViewCertificate => format!("certidao {}", record.id),
        RecordAction::None => String::new(),
    }
}

fn clip(text: &str, width: usize) -> String {
    let count = text.chars().count();
    if count <= width {
        format!("{text:<width$}")
    } else {
        let cut: String = text.chars().take(width.saturating_sub(1)).collect();
        format!("{cut}…")
    }
}

pub fn render_table(page: &Page<'_, &Record>) -> String {
    let mut out = String::new();
    if page.items.is_empty() {
        out.push_str("Nenhum CNPJ encontrado.\n");
        return out;
    }

    let _ = writeln!(
        out,
        "{:>6}  {:<14}  {:<30}  {:<18}  {:<11}  {:<16}  {}",
        "ID", "CNPJ", "Razão Social", "Município", "Status", "Data", "Ação"
    );
    for record in page.items {
        let _ = writeln!(
            out,
            "{:>6}  {:<14}  {}  {}  {:<11}  {:<16}  {}",
            record.id,
            record.cnpj,
            clip(record.razao_social.as_deref().unwrap_or("-"), 30),
            clip(record.municipio.as_deref().unwrap_or("-"), 18),
            record.status.label(),
            record.data_criacao.as_deref().map(format_date).unwrap_or_default(),
            action_hint(record),
        );
        if matches!(record.status, Status::Concluido | Status::Erro) {
            if let Some(resultado) = record.resultado.as_deref().filter(|r| !r.is_empty()) {
                let _ = writeln!(out, "{:>8}{}", "", truncate_summary(resultado));
            }
        }
    }
    let _ = writeln!(
        out,
        "Página {} de {} ({} registros)",
        page.number,
        page.total_pages.max(1),
        page.total_items
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cnpj_api::filter::paginate;

    fn record(id: i64, status: Status, resultado: Option<&str>) -> Record {
        Record {
            id,
            cnpj: "11222333000181".into(),
            razao_social: Some("Padaria São José de Nova Friburgo Comércio LTDA".into()),
            municipio: Some("Nova Friburgo".into()),
            status,
            resultado: resultado.map(str::to_string),
            full_result: None,
            pdf_path: None,
            data_criacao: Some("2024-03-05T14:07:55".into()),
            data_atualizacao: None,
            status_divida: None,
            user_id: None,
        }
    }

    #[test]
    fn table_shows_actions_and_summaries() {
        let long = "x".repeat(150);
        let records = [
            record(1, Status::Erro, Some(&long)),
            record(2, Status::Concluido, Some("Nada consta")),
            record(3, Status::Pendente, Some("ignored")),
        ];
        let refs: Vec<&Record> = records.iter().collect();
        let text = render_table(&paginate(&refs, 1, 10));
        assert!(text.contains("reprocess 1"));
        assert!(text.contains("certidao 2"));
        assert!(text.contains("Nada consta"));
        assert!(!text.contains("ignored"));
        assert!(text.contains(&format!("{}...", "x".repeat(100))));
        assert!(text.contains("05/03/2024 14:07"));
        assert!(text.contains("Página 1 de 1 (3 registros)"));
    }

    #[test]
    fn empty_page_says_so() {
        let refs: Vec<&Record> = Vec::new();
        assert_eq!(render_table(&paginate(&refs, 1, 10)), "Nenhum CNPJ encontrado.\n");
    }

    #[test]
    fn stats_line_lists_every_counter() {
        let line = render_stats(&Stats {
            total: 5,
            pendentes: 1,
            processando: 1,
            concluidos: 2,
            erros: 1,
        });
        assert_eq!(
            line,
            "Total: 5  Pendentes: 1  Processando: 1  Concluídos: 2  Erros: 1"
        );
    }
}
