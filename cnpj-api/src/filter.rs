//! Client-side view helpers: filtering, paging and cell formatting.
//!
//! The backend filters by `status`, `texto_erro`, `tipo_pendencia` and date
//! range; free-text search is always done here, over the records it returns.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use std::borrow::Cow;
use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

use crate::models::{Record, Status};

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const SUMMARY_MAX_CHARS: usize = 100;

/// Filters for one list request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub status: Option<Status>,
    pub texto_erro: Option<String>,
    pub tipo_pendencia: Option<String>,
    /// `YYYY-MM-DD`
    pub data_inicio: Option<String>,
    /// `YYYY-MM-DD`
    pub data_fim: Option<String>,
    /// Free text matched locally against cnpj, razão social, município and resultado.
    pub search: Option<String>,
}

impl ListFilter {
    /// Query parameters for the backend; empty values are left out.
    pub fn query_params(&self) -> Vec<(&'static str, Cow<'_, str>)> {
        let mut params = Vec::new();
        if let Some(status) = &self.status {
            params.push(("status", Cow::Borrowed(status.as_str())));
        }
        let text_fields = [
            ("texto_erro", &self.texto_erro),
            ("tipo_pendencia", &self.tipo_pendencia),
            ("data_inicio", &self.data_inicio),
            ("data_fim", &self.data_fim),
        ];
        for (name, value) in text_fields {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                params.push((name, Cow::Borrowed(v)));
            }
        }
        params
    }

    pub fn matches(&self, record: &Record) -> bool {
        match self.search.as_deref() {
            Some(needle) => matches_search(record, needle),
            None => true,
        }
    }

    /// Records passing the local search, in backend order.
    pub fn apply<'r>(&self, records: &'r [Record]) -> Vec<&'r Record> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

/// Lowercase and strip diacritics so `sao` finds `São`.
///
/// ```
/// assert_eq!(cnpj_api::filter::fold("Nova FRIBURGO - São João"), "nova friburgo - sao joao");
/// ```
pub fn fold(text: &str) -> String {
    text.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

/// Accent- and case-insensitive substring match over the searchable fields.
/// A blank needle matches everything.
pub fn matches_search(record: &Record, needle: &str) -> bool {
    let needle = fold(needle.trim());
    if needle.is_empty() {
        return true;
    }
    let digits: String = needle.chars().filter(char::is_ascii_digit).collect();

    let fields = [
        Some(record.cnpj.as_str()),
        record.razao_social.as_deref(),
        record.municipio.as_deref(),
        record.resultado.as_deref(),
    ];
    if fields.into_iter().flatten().any(|f| fold(f).contains(&needle)) {
        return true;
    }
    // "11.222.333/0001-81" finds "11222333000181"
    !digits.is_empty()
        && digits.len() == needle.chars().filter(|c| !"./- ".contains(*c)).count()
        && record.cnpj.chars().filter(char::is_ascii_digit).collect::<String>().contains(&digits)
}

/// One page of a list, 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    pub number: usize,
    pub total_pages: usize,
    pub total_items: usize,
}

/// Slice `items` into page `number`; pages past the end are empty.
pub fn paginate<T>(items: &[T], number: usize, page_size: usize) -> Page<'_, T> {
    let page_size = page_size.max(1);
    let total_items = items.len();
    let total_pages = total_items.div_ceil(page_size);
    let start = number.saturating_sub(1).saturating_mul(page_size);
    let slice = if number == 0 || start >= total_items {
        &items[..0]
    } else {
        &items[start..(start + page_size).min(total_items)]
    };
    Page {
        items: slice,
        number,
        total_pages,
        total_items,
    }
}

/// Shorten a result text for table cells.
pub fn truncate_summary(text: &str) -> Cow<'_, str> {
    match text.char_indices().nth(SUMMARY_MAX_CHARS) {
        Some((cut, _)) => Cow::Owned(format!("{}...", &text[..cut])),
        None => Cow::Borrowed(text),
    }
}

/// `dd/mm/yyyy hh:mm`; anything unparseable is shown as received.
pub fn format_date(raw: &str) -> String {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.naive_local().format("%d/%m/%Y %H:%M").to_string();
    }
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, pattern) {
            return dt.format("%d/%m/%Y %H:%M").to_string();
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.format("%d/%m/%Y").to_string();
    }
    raw.to_string()
}

/// What the console offers for a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordAction {
    Reprocess,
    ViewCertificate,
    None,
}

impl RecordAction {
    pub fn for_record(record: &Record) -> Self {
        match record.status {
            Status::Erro => RecordAction::Reprocess,
            Status::Concluido => RecordAction::ViewCertificate,
            _ => RecordAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: i64, cnpj: &str, razao: &str, municipio: &str, status: Status) -> Record {
        Record {
            id,
            cnpj: cnpj.into(),
            razao_social: Some(razao.into()),
            municipio: Some(municipio.into()),
            status,
            resultado: None,
            full_result: None,
            pdf_path: None,
            data_criacao: None,
            data_atualizacao: None,
            status_divida: None,
            user_id: None,
        }
    }

    #[test]
    fn search_ignores_accents_and_case() {
        let r = rec(1, "11222333000181", "Padaria São José LTDA", "Nova Friburgo", Status::Pendente);
        assert!(matches_search(&r, "sao jose"));
        assert!(matches_search(&r, "SÃO"));
        assert!(matches_search(&r, "friburgo"));
        assert!(!matches_search(&r, "petropolis"));
        assert!(matches_search(&r, "   "));
    }

    #[test]
    fn search_matches_resultado_and_formatted_cnpj() {
        let mut r = rec(1, "11222333000181", "ACME", "Teresópolis", Status::Erro);
        r.resultado = Some("PDF não encontrado".into());
        assert!(matches_search(&r, "nao encontrado"));
        assert!(matches_search(&r, "11.222.333/0001-81"));
        assert!(matches_search(&r, "2223"));
        assert!(!matches_search(&r, "99.999"));
    }

    #[test]
    fn query_params_skip_empty_values() {
        let filter = ListFilter {
            status: Some(Status::Erro),
            texto_erro: Some("  ".into()),
            tipo_pendencia: Some("iptu".into()),
            search: Some("ignored by backend".into()),
            ..ListFilter::default()
        };
        let params: Vec<(&str, String)> = filter
            .query_params()
            .into_iter()
            .map(|(k, v)| (k, v.into_owned()))
            .collect();
        assert_eq!(
            params,
            vec![("status", "erro".to_string()), ("tipo_pendencia", "iptu".to_string())]
        );
    }

    #[test]
    fn apply_keeps_order() {
        let records = vec![
            rec(1, "1", "Ótica Central", "Rio", Status::Concluido),
            rec(2, "2", "Mercado", "Rio", Status::Concluido),
            rec(3, "3", "Otica Norte", "Rio", Status::Concluido),
        ];
        let filter = ListFilter {
            search: Some("otica".into()),
            ..ListFilter::default()
        };
        let ids: Vec<i64> = filter.apply(&records).iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn pagination_uses_ceiling_and_empty_out_of_range() {
        let items: Vec<u32> = (1..=23).collect();
        let p1 = paginate(&items, 1, DEFAULT_PAGE_SIZE);
        assert_eq!(p1.items, &items[0..10]);
        assert_eq!(p1.total_pages, 3);

        let p3 = paginate(&items, 3, DEFAULT_PAGE_SIZE);
        assert_eq!(p3.items, &[21, 22, 23]);

        assert!(paginate(&items, 4, DEFAULT_PAGE_SIZE).items.is_empty());
        assert!(paginate(&items, 0, DEFAULT_PAGE_SIZE).items.is_empty());

        let none: Vec<u32> = Vec::new();
        assert_eq!(paginate(&none, 1, DEFAULT_PAGE_SIZE).total_pages, 0);
    }

    #[test]
    fn summaries_are_cut_at_one_hundred_chars() {
        let short = "Certidão emitida";
        assert_eq!(truncate_summary(short), short);

        let long = "ã".repeat(150);
        let cut = truncate_summary(&long);
        assert_eq!(cut.chars().count(), 103);
        assert!(cut.ends_with("ã..."));

        let exact = "x".repeat(100);
        assert_eq!(truncate_summary(&exact), exact);
    }

    #[test]
    fn dates_render_in_brazilian_format() {
        assert_eq!(format_date("2024-03-05T14:07:55"), "05/03/2024 14:07");
        assert_eq!(format_date("2024-03-05 14:07:55.123456"), "05/03/2024 14:07");
        assert_eq!(format_date("2024-03-05T14:07:55-03:00"), "05/03/2024 14:07");
        assert_eq!(format_date("2024-03-05"), "05/03/2024");
        assert_eq!(format_date("ontem"), "ontem");
    }

    #[test]
    fn actions_follow_status() {
        let mut r = rec(1, "1", "a", "b", Status::Erro);
        assert_eq!(RecordAction::for_record(&r), RecordAction::Reprocess);
        r.status = Status::Concluido;
        assert_eq!(RecordAction::for_record(&r), RecordAction::ViewCertificate);
        r.status = Status::Processando;
        assert_eq!(RecordAction::for_record(&r), RecordAction::None);
    }
}
