//! Structured registry of grant records plus the pipeline's lazy cache.
//!
//! The registry is owned by an external collaborator (the spreadsheet
//! fetch-and-cache layer). This module only reads it: a [`RegistryClient`]
//! fetches the full record list and [`RegistryCache`] holds it for the
//! duration of a run, with an explicit reset for re-fetching on demand.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{GrantRagError, Result};

/// The subset of registry fields denormalized onto chunks.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistryRecord {
    pub reference_number: String,
    pub grantee_name: String,
    pub country: String,
    pub program_officer: String,
    pub cohort: String,
    pub portfolio_type: String,
    pub intervention_areas: String,
    pub grant_amount: Option<f64>,
    pub lives_impacted: Option<f64>,
    pub income_gain: Option<f64>,
    pub active: bool,
}

#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Fetch every registry record. Must be re-fetchable on demand.
    async fn fetch_all_records(&self) -> Result<Vec<RegistryRecord>>;
}

/// Registry client reading the JSON cache file maintained by the external
/// spreadsheet sync (an array of records).
pub struct JsonFileRegistry {
    path: PathBuf,
}

impl JsonFileRegistry {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl RegistryClient for JsonFileRegistry {
    async fn fetch_all_records(&self) -> Result<Vec<RegistryRecord>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| GrantRagError::Registry(format!("read {}: {}", self.path.display(), e)))?;
        let records: Vec<RegistryRecord> = serde_json::from_str(&raw)
            .map_err(|e| GrantRagError::Registry(format!("parse {}: {}", self.path.display(), e)))?;
        log::info!("Loaded {} registry records from {}", records.len(), self.path.display());
        Ok(records)
    }
}

/// Lazy load-once cache over a [`RegistryClient`], explicitly resettable.
///
/// Owned by the orchestrator and passed by reference to the resolver; not
/// shared module-level state.
pub struct RegistryCache {
    client: Arc<dyn RegistryClient>,
    records: Mutex<Option<Arc<Vec<RegistryRecord>>>>,
}

impl RegistryCache {
    pub fn new(client: Arc<dyn RegistryClient>) -> Self {
        Self {
            client,
            records: Mutex::new(None),
        }
    }

    /// Return the cached records, fetching them on first call.
    pub async fn records(&self) -> Result<Arc<Vec<RegistryRecord>>> {
        let mut guard = self.records.lock().await;
        if let Some(records) = guard.as_ref() {
            return Ok(Arc::clone(records));
        }
        let fetched = Arc::new(self.client.fetch_all_records().await?);
        *guard = Some(Arc::clone(&fetched));
        Ok(fetched)
    }

    /// Drop the cached records so the next access re-fetches.
    pub async fn reset(&self) {
        *self.records.lock().await = None;
    }
}
