//! Ephemeral hand-off of extracted certificate data between two steps.
//!
//! The list step extracts a record's certificate and parks the result here,
//! keyed by record id; the display step picks it up. Entries live only as
//! long as the store (one console session) and are never a source of truth.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::extract::Extraction;

const KEY_PREFIX: &str = "certidao_";

/// Storage key for a record id.
///
/// ```
/// assert_eq!(cnpj_certidao::handoff::handoff_key(42), "certidao_42");
/// ```
pub fn handoff_key(id: i64) -> String {
    format!("{KEY_PREFIX}{id}")
}

/// What the display step needs: the cleaned fragment and the coat-of-arms URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandoffEntry {
    #[serde(rename = "htmlContent")]
    pub cleaned_html: String,
    #[serde(rename = "brasaoUrl")]
    pub image_url: String,
}

impl From<Extraction> for HandoffEntry {
    fn from(e: Extraction) -> Self {
        Self {
            cleaned_html: e.cleaned_html,
            image_url: e.image_url,
        }
    }
}

/// Where the display step found its data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandoffSource {
    Session,
    NavigationState,
}

/// Session-scoped store shared by clones.
#[derive(Debug, Clone, Default)]
pub struct SessionHandoff {
    entries: Arc<DashMap<String, HandoffEntry>>,
}

impl SessionHandoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, id: i64, entry: HandoffEntry) {
        let key = handoff_key(id);
        tracing::debug!(target: "certidao", %key, html_len = entry.cleaned_html.len(), "handoff.put");
        self.entries.insert(key, entry);
    }

    /// `None` when nothing was stored for `id`.
    pub fn get(&self, id: i64) -> Option<HandoffEntry> {
        self.entries
            .get(&handoff_key(id))
            .map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: i64) -> Option<HandoffEntry> {
        self.entries.remove(&handoff_key(id)).map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Session entry first, then the caller's navigation state; `None` means
    /// the display step must show its "data not found" state.
    pub fn resolve(
        &self,
        id: i64,
        navigation_state: Option<HandoffEntry>,
    ) -> Option<(HandoffEntry, HandoffSource)> {
        if let Some(entry) = self.get(id) {
            return Some((entry, HandoffSource::Session));
        }
        tracing::debug!(target: "certidao", id, "handoff.miss");
        navigation_state
            .filter(|entry| !entry.cleaned_html.trim().is_empty())
            .map(|entry| (entry, HandoffSource::NavigationState))
    }
}
