//! Durable job history.
//!
//! This module is split into submodules:
//! - `model`: row shape of the `jobs` table and its mapping to domain types.
//! - `repo`: SQLite-backed store (primary).
//! - `json`: JSON-file-backed store used when SQLite cannot be opened.
//!
//! Callers hold an `Arc<dyn JobStore>` and never learn which backend is active.

pub mod json;
pub mod model;
pub mod repo;

use crate::config::Config;
use crate::model::BatchJobResult;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub use json::JsonJobStore;
pub use repo::{init_pool, run_migrations, Pool, SqliteJobStore};

/// Retention-bounded store of job records keyed by job id.
///
/// Every write replaces a whole row and then trims the store to the most recent
/// `retention()` jobs by `started_at`.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn upsert(&self, job: &BatchJobResult) -> Result<()>;

    async fn get_by_id(&self, job_id: &str) -> Result<Option<BatchJobResult>>;

    /// Most recent first, capped at `min(limit, retention())`.
    async fn list_recent(&self, limit: usize) -> Result<Vec<BatchJobResult>>;

    fn retention(&self) -> usize;
}

/// Open the SQLite store described by `cfg`, falling back to the JSON file in
/// the data directory when SQLite is unavailable.
pub async fn open_job_store(cfg: &Config) -> Result<Arc<dyn JobStore>> {
    open_job_store_at(
        &cfg.database_url(),
        &cfg.json_fallback_path(),
        cfg.batch.job_retention,
    )
    .await
}

pub async fn open_job_store_at(
    database_url: &str,
    json_path: &Path,
    retention: usize,
) -> Result<Arc<dyn JobStore>> {
    match SqliteJobStore::connect(database_url, retention).await {
        Ok(store) => {
            info!(retention, "using sqlite job store");
            Ok(Arc::new(store))
        }
        Err(err) => {
            warn!(
                ?err,
                path = %json_path.display(),
                "sqlite job store unavailable; falling back to json file"
            );
            let store = JsonJobStore::open(json_path, retention).await?;
            Ok(Arc::new(store))
        }
    }
}
