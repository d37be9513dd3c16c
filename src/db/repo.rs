use super::model::JobRow;
use super::JobStore;
use crate::model::BatchJobResult;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, instrument};

pub type Pool = SqlitePool;

const SELECT_JOB_COLUMNS: &str = "SELECT id, action, status, total, success_count, failed_count, \
     started_at, finished_at, results_json FROM jobs";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let in_memory = normalized.starts_with("sqlite::memory");
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid sqlite url {normalized}"))?
        .create_if_missing(true);

    // Every connection to `sqlite::memory:` opens a separate database.
    let pool = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?
    } else {
        SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?
    };
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    // Pass through non-sqlite schemes
    if !url.starts_with("sqlite:") {
        return url.to_string();
    }

    // In-memory URLs like sqlite::memory: or sqlite::memory:?cache=shared
    if url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    // Rebuild URL, prefer sqlite:// form
    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Job store on top of a SQLite pool.
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    pool: Pool,
    retention: usize,
}

impl SqliteJobStore {
    /// Open the database at `database_url` and apply migrations.
    pub async fn connect(database_url: &str, retention: usize) -> Result<Self> {
        let pool = init_pool(database_url).await?;
        run_migrations(&pool).await?;
        Ok(Self::new(pool, retention))
    }

    pub fn new(pool: Pool, retention: usize) -> Self {
        Self {
            pool,
            retention: retention.max(1),
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    #[instrument(skip_all, fields(job_id = %job.job_id, status = job.status.as_str()))]
    async fn upsert(&self, job: &BatchJobResult) -> Result<()> {
        let row = JobRow::from_job(job)?;
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO jobs (id, action, status, total, success_count, failed_count, started_at, finished_at, results_json) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET \
                action = excluded.action, \
                status = excluded.status, \
                total = excluded.total, \
                success_count = excluded.success_count, \
                failed_count = excluded.failed_count, \
                started_at = excluded.started_at, \
                finished_at = excluded.finished_at, \
                results_json = excluded.results_json",
        )
        .bind(&row.id)
        .bind(&row.action)
        .bind(&row.status)
        .bind(row.total)
        .bind(row.success_count)
        .bind(row.failed_count)
        .bind(row.started_at)
        .bind(row.finished_at)
        .bind(&row.results_json)
        .execute(&mut *tx)
        .await
        .context("failed to upsert job")?;

        let trimmed = sqlx::query(
            "DELETE FROM jobs WHERE id NOT IN \
             (SELECT id FROM jobs ORDER BY started_at DESC, rowid DESC LIMIT ?)",
        )
        .bind(self.retention as i64)
        .execute(&mut *tx)
        .await
        .context("failed to trim job history")?
        .rows_affected();
        tx.commit().await?;

        if trimmed > 0 {
            debug!(trimmed, "evicted old jobs");
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn get_by_id(&self, job_id: &str) -> Result<Option<BatchJobResult>> {
        let row = sqlx::query(&format!("{SELECT_JOB_COLUMNS} WHERE id = ? LIMIT 1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(Some(JobRow::from_row(&row)?.into_job()?)),
            None => Ok(None),
        }
    }

    #[instrument(skip_all)]
    async fn list_recent(&self, limit: usize) -> Result<Vec<BatchJobResult>> {
        let limit = limit.min(self.retention);
        let rows = sqlx::query(&format!(
            "{SELECT_JOB_COLUMNS} ORDER BY started_at DESC, rowid DESC LIMIT ?"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| JobRow::from_row(row)?.into_job())
            .collect()
    }

    fn retention(&self) -> usize {
        self.retention
    }
}
