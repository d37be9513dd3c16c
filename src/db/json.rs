//! JSON-file job store used when SQLite is unavailable.
use super::JobStore;
use crate::model::BatchJobResult;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{instrument, warn};

#[derive(Debug)]
pub struct JsonJobStore {
    path: PathBuf,
    retention: usize,
    // Serializes read-modify-write cycles on the file.
    lock: Mutex<()>,
}

impl JsonJobStore {
    pub async fn open(path: impl AsRef<Path>, retention: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        if fs::metadata(&path).await.is_err() {
            fs::write(&path, "[]")
                .await
                .with_context(|| format!("failed to initialise {}", path.display()))?;
        }
        Ok(Self {
            path,
            retention: retention.max(1),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_jobs(&self) -> Result<Vec<BatchJobResult>> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", self.path.display()))
            }
        };
        match serde_json::from_str(&raw) {
            Ok(jobs) => Ok(jobs),
            Err(err) => {
                warn!(?err, path = %self.path.display(), "job file is corrupt; starting empty");
                Ok(Vec::new())
            }
        }
    }

    /// Write through a temp file and rename, so readers never see a partial file.
    async fn write_jobs(&self, jobs: &[BatchJobResult]) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(jobs).context("failed to encode jobs")?;
        fs::write(&tmp, body)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

fn sort_recent_first(jobs: &mut [BatchJobResult]) {
    // Stable: equal start times keep their newest-inserted-first order.
    jobs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
}

#[async_trait]
impl JobStore for JsonJobStore {
    #[instrument(skip_all, fields(job_id = %job.job_id, status = job.status.as_str()))]
    async fn upsert(&self, job: &BatchJobResult) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut jobs = self.read_jobs().await?;
        match jobs.iter().position(|j| j.job_id == job.job_id) {
            Some(idx) => jobs[idx] = job.clone(),
            None => jobs.insert(0, job.clone()),
        }
        sort_recent_first(&mut jobs);
        jobs.truncate(self.retention);
        self.write_jobs(&jobs).await
    }

    #[instrument(skip_all)]
    async fn get_by_id(&self, job_id: &str) -> Result<Option<BatchJobResult>> {
        let _guard = self.lock.lock().await;
        let jobs = self.read_jobs().await?;
        Ok(jobs.into_iter().find(|j| j.job_id.to_string() == job_id))
    }

    #[instrument(skip_all)]
    async fn list_recent(&self, limit: usize) -> Result<Vec<BatchJobResult>> {
        let _guard = self.lock.lock().await;
        let mut jobs = self.read_jobs().await?;
        sort_recent_first(&mut jobs);
        jobs.truncate(limit.min(self.retention));
        Ok(jobs)
    }

    fn retention(&self) -> usize {
        self.retention
    }
}
