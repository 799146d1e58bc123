//! Backend-status catalog: resolves user-supplied backend names to a
//! canonical dispatch queue name and current service status.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    Available,
    Unavailable,
    Maintenance,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendEntry {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub status: BackendStatus,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogDocument {
    #[serde(rename = "backend", default)]
    backends: Vec<BackendEntry>,
}

#[derive(Debug, Clone)]
pub struct Resolved {
    pub canonical: String,
    pub status: BackendStatus,
    pub description: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unknown backend: {0}")]
    UnknownBackend(String),
    #[error("failed to parse backend catalog: {0}")]
    Parse(#[from] toml::de::Error),
}

struct Table {
    /// alias/name (uppercased) -> canonical name
    by_name: HashMap<String, String>,
    entries: HashMap<String, BackendEntry>,
    /// Set when `--unify-backends` collapses every known name onto one queue.
    unify_to: Option<String>,
}

impl Table {
    fn from_document(doc: CatalogDocument, unify: bool) -> Self {
        let mut by_name = HashMap::new();
        let mut entries = HashMap::new();

        for backend in doc.backends {
            by_name.insert(backend.name.to_ascii_uppercase(), backend.name.clone());
            for alias in &backend.aliases {
                by_name.insert(alias.to_ascii_uppercase(), backend.name.clone());
            }
            entries.insert(backend.name.clone(), backend);
        }

        let unify_to = if unify {
            entries.keys().next().cloned().or(Some("unified".to_string()))
        } else {
            None
        };

        Self {
            by_name,
            entries,
            unify_to,
        }
    }
}

/// Pluggable catalog of backend-status entries, re-read on demand so
/// `GetServiceStatus` reflects near-real-time catalog edits.
#[derive(Clone)]
pub struct BackendCatalog {
    table: Arc<RwLock<Table>>,
    unify: bool,
}

impl BackendCatalog {
    pub fn from_toml(source: &str, unify: bool) -> Result<Self, CatalogError> {
        let doc: CatalogDocument = toml::from_str(source)?;
        Ok(Self {
            table: Arc::new(RwLock::new(Table::from_document(doc, unify))),
            unify,
        })
    }

    /// Re-fetches the catalog document and atomically swaps the in-memory
    /// table, so concurrent resolutions observe either the old or new
    /// table, never a mix.
    pub async fn reload(&self, source: &str) -> Result<(), CatalogError> {
        let doc: CatalogDocument = toml::from_str(source)?;
        let new_table = Table::from_document(doc, self.unify);
        *self.table.write().await = new_table;
        Ok(())
    }

    pub async fn resolve(&self, requested: &str) -> Result<Resolved, CatalogError> {
        let table = self.table.read().await;
        let canonical = table
            .by_name
            .get(&requested.to_ascii_uppercase())
            .cloned()
            .ok_or_else(|| CatalogError::UnknownBackend(requested.to_string()))?;

        let entry = table
            .entries
            .get(&canonical)
            .expect("by_name always points at a present entry");

        let dispatch_name = table.unify_to.clone().unwrap_or(canonical);

        Ok(Resolved {
            canonical: dispatch_name,
            status: entry.status,
            description: entry.description.clone(),
        })
    }

    pub async fn is_dispatch_eligible(&self, canonical: &str) -> bool {
        let table = self.table.read().await;
        if let Some(unified) = &table.unify_to {
            if unified == canonical {
                return table.entries.values().any(|e| e.status == BackendStatus::Available);
            }
        }
        table
            .entries
            .get(canonical)
            .map(|e| e.status == BackendStatus::Available)
            .unwrap_or(false)
    }
}
