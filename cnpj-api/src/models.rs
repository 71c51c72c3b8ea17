//! Wire types of the lookup backend.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Processing state of a record. Values the console does not know are kept
/// verbatim so they can still be displayed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Status {
    Pendente,
    Processando,
    Concluido,
    Erro,
    Unknown(String),
}

impl Status {
    pub fn as_str(&self) -> &str {
        match self {
            Status::Pendente => "pendente",
            Status::Processando => "processando",
            Status::Concluido => "concluido",
            Status::Erro => "erro",
            Status::Unknown(raw) => raw,
        }
    }

    /// Human label used in tables.
    pub fn label(&self) -> &str {
        match self {
            Status::Pendente => "Pendente",
            Status::Processando => "Processando",
            Status::Concluido => "Concluído",
            Status::Erro => "Erro",
            Status::Unknown(raw) => raw,
        }
    }
}

impl From<&str> for Status {
    fn from(raw: &str) -> Self {
        match raw {
            "pendente" => Status::Pendente,
            "processando" => Status::Processando,
            "concluido" => Status::Concluido,
            "erro" => Status::Erro,
            other => Status::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Status {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Status {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        Ok(Status::from(raw.as_str()))
    }
}

/// One queued lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: i64,
    pub cnpj: String,
    #[serde(default)]
    pub razao_social: Option<String>,
    #[serde(default)]
    pub municipio: Option<String>,
    pub status: Status,
    #[serde(default)]
    pub resultado: Option<String>,
    /// Portal page captured by the backend; input to the certificate pipeline.
    #[serde(default)]
    pub full_result: Option<String>,
    #[serde(default)]
    pub pdf_path: Option<String>,
    #[serde(default)]
    pub data_criacao: Option<String>,
    #[serde(default)]
    pub data_atualizacao: Option<String>,
    #[serde(default)]
    pub status_divida: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
}

/// Per-status counters shown above the list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub total: usize,
    pub pendentes: usize,
    pub processando: usize,
    pub concluidos: usize,
    pub erros: usize,
}

impl Stats {
    pub fn from_records(records: &[Record]) -> Self {
        let mut stats = Stats {
            total: records.len(),
            ..Stats::default()
        };
        for record in records {
            match record.status {
                Status::Pendente => stats.pendentes += 1,
                Status::Processando => stats.processando += 1,
                Status::Concluido => stats.concluidos += 1,
                Status::Erro => stats.erros += 1,
                Status::Unknown(_) => {}
            }
        }
        stats
    }
}

#[derive(Debug, Deserialize)]
struct WrappedList {
    #[serde(default)]
    total: Option<usize>,
    #[serde(default)]
    pendentes: Option<usize>,
    #[serde(default)]
    processando: Option<usize>,
    #[serde(default)]
    concluidos: Option<usize>,
    #[serde(default)]
    erros: Option<usize>,
    #[serde(default)]
    cnpjs: Vec<Record>,
}

/// The list endpoint answers either `{total, ..., cnpjs: [...]}` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListPayload {
    Wrapped(WrappedList),
    Bare(Vec<Record>),
}

/// Records plus counters from one list call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ListSnapshot {
    pub stats: Stats,
    pub records: Vec<Record>,
}

impl<'de> Deserialize<'de> for ListSnapshot {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Ok(match ListPayload::deserialize(d)? {
            ListPayload::Bare(records) => ListSnapshot {
                stats: Stats::from_records(&records),
                records,
            },
            ListPayload::Wrapped(w) => {
                let computed = Stats::from_records(&w.cnpjs);
                let has_backend_stats = w.total.is_some();
                let stats = if has_backend_stats {
                    Stats {
                        total: w.total.unwrap_or(computed.total),
                        pendentes: w.pendentes.unwrap_or_default(),
                        processando: w.processando.unwrap_or_default(),
                        concluidos: w.concluidos.unwrap_or_default(),
                        erros: w.erros.unwrap_or_default(),
                    }
                } else {
                    computed
                };
                ListSnapshot {
                    stats,
                    records: w.cnpjs,
                }
            }
        })
    }
}

/// Reply of upload and reprocess calls.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResult {
    #[serde(default)]
    pub total_processed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    pub user_id: i64,
    pub username: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct DeleteBatchRequest<'a> {
    pub ids: &'a [i64],
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: i64, status: &str) -> serde_json::Value {
        json!({"id": id, "cnpj": "11222333000181", "status": status})
    }

    #[test]
    fn unknown_status_is_preserved() {
        let r: Record = serde_json::from_value(record(1, "cancelado")).unwrap();
        assert_eq!(r.status, Status::Unknown("cancelado".into()));
        assert_eq!(serde_json::to_value(&r).unwrap()["status"], "cancelado");
    }

    #[test]
    fn bare_array_computes_stats() {
        let snap: ListSnapshot = serde_json::from_value(json!([
            record(1, "erro"),
            record(2, "erro"),
            record(3, "concluido"),
            record(4, "pendente"),
        ]))
        .unwrap();
        assert_eq!(
            snap.stats,
            Stats {
                total: 4,
                pendentes: 1,
                processando: 0,
                concluidos: 1,
                erros: 2
            }
        );
    }

    #[test]
    fn wrapped_response_keeps_backend_counters() {
        let snap: ListSnapshot = serde_json::from_value(json!({
            "total": 120, "pendentes": 100, "processando": 5, "concluidos": 10, "erros": 5,
            "cnpjs": [record(1, "erro")]
        }))
        .unwrap();
        assert_eq!(snap.stats.total, 120);
        assert_eq!(snap.stats.erros, 5);
        assert_eq!(snap.records.len(), 1);
    }

    #[test]
    fn wrapped_without_counters_falls_back_to_computed() {
        let snap: ListSnapshot =
            serde_json::from_value(json!({"cnpjs": [record(1, "processando")]})).unwrap();
        assert_eq!(snap.stats.total, 1);
        assert_eq!(snap.stats.processando, 1);
    }

    #[test]
    fn optional_fields_may_be_null_or_missing() {
        let r: Record = serde_json::from_value(json!({
            "id": 9, "cnpj": "1", "status": "concluido",
            "razao_social": null, "full_result": "<html></html>", "user_id": 3
        }))
        .unwrap();
        assert!(r.razao_social.is_none());
        assert_eq!(r.full_result.as_deref(), Some("<html></html>"));
        assert_eq!(r.user_id, Some(3));
    }
}
