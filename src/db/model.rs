//! Row model for the `jobs` table.
//!
//! Keep this focused on the data returned by queries; business logic lives in
//! the service layer.

use crate::model::{BatchAction, BatchJobResult, BatchResultItem, JobStatus};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// One row of `jobs`, with results still encoded as JSON.
#[derive(Debug, Clone)]
pub struct JobRow {
    pub id: String,
    pub action: String,
    pub status: String,
    pub total: i64,
    pub success_count: i64,
    pub failed_count: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub results_json: String,
}

impl JobRow {
    pub fn from_row(row: &SqliteRow) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            action: row.try_get("action")?,
            status: row.try_get("status")?,
            total: row.try_get("total")?,
            success_count: row.try_get("success_count")?,
            failed_count: row.try_get("failed_count")?,
            started_at: row.try_get("started_at")?,
            finished_at: row
                .try_get::<Option<DateTime<Utc>>, _>("finished_at")
                .context("job row has malformed finished_at")?,
            results_json: row.try_get("results_json")?,
        })
    }

    pub fn from_job(job: &BatchJobResult) -> Result<Self> {
        Ok(Self {
            id: job.job_id.to_string(),
            action: job.action.as_str().to_string(),
            status: job.status.as_str().to_string(),
            total: job.total as i64,
            success_count: job.success_count as i64,
            failed_count: job.failed_count as i64,
            started_at: job.started_at,
            finished_at: job.finished_at,
            results_json: serde_json::to_string(&job.results)
                .context("failed to encode job results")?,
        })
    }

    pub fn into_job(self) -> Result<BatchJobResult> {
        let job_id = Uuid::parse_str(&self.id)
            .with_context(|| format!("job row has malformed id {}", self.id))?;
        let action = BatchAction::parse_action(&self.action)
            .ok_or_else(|| anyhow!("job {} has unknown action {}", self.id, self.action))?;
        let status = JobStatus::parse_status(&self.status)
            .ok_or_else(|| anyhow!("job {} has unknown status {}", self.id, self.status))?;
        let results: Vec<BatchResultItem> = serde_json::from_str(&self.results_json)
            .with_context(|| format!("job {} has malformed results", self.id))?;

        Ok(BatchJobResult {
            job_id,
            action,
            status,
            total: count(&self.id, "total", self.total)?,
            success_count: count(&self.id, "success_count", self.success_count)?,
            failed_count: count(&self.id, "failed_count", self.failed_count)?,
            started_at: self.started_at,
            finished_at: self.finished_at,
            results,
        })
    }
}

fn count(job_id: &str, column: &str, value: i64) -> Result<usize> {
    usize::try_from(value).with_context(|| format!("job {job_id} has invalid {column} {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityItem, EntityType};

    #[test]
    fn row_round_trip_keeps_results() {
        let item = EntityItem::new("7", EntityType::Channel, "news");
        let job = BatchJobResult::pending(BatchAction::UnsubscribeChannels, 1).finish(
            vec![BatchResultItem::failure(
                &item,
                "CHANNEL_PRIVATE".into(),
                "gone".into(),
            )],
            false,
        );
        let row = JobRow::from_job(&job).unwrap();
        assert_eq!(row.status, "DONE");
        assert_eq!(row.into_job().unwrap(), job);
    }

    #[test]
    fn unknown_status_is_rejected() {
        let job = BatchJobResult::pending(BatchAction::LeaveGroups, 0);
        let mut row = JobRow::from_job(&job).unwrap();
        row.status = "PAUSED".into();
        assert!(row.into_job().is_err());
    }

    #[test]
    fn negative_counts_are_rejected() {
        let job = BatchJobResult::pending(BatchAction::LeaveGroups, 2);
        let mut row = JobRow::from_job(&job).unwrap();
        row.failed_count = -1;
        let err = row.into_job().unwrap_err();
        assert!(err.to_string().contains("failed_count"));
    }
}
