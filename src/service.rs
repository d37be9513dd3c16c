//! Batch orchestration: preview staging, job acceptance and sequential
//! execution of cleanup actions against the remote service.
use crate::config::Config;
use crate::db::JobStore;
use crate::error::ServiceError;
use crate::lane::ExecutionLane;
use crate::model::{
    BatchAction, BatchJobResult, BatchResultItem, EntityItem, ExecuteResponse, JobStats,
    PreviewResponse, PreviewStats,
};
use crate::preview::PreviewStore;
use crate::remote::{RemoteActionProvider, RemoteError};
use crate::retry::retry_on_flood_wait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Cheap to clone; all clones share the same stores and lane.
#[derive(Clone)]
pub struct BatchService {
    inner: Arc<Inner>,
}

struct Inner {
    remote: Arc<dyn RemoteActionProvider>,
    previews: PreviewStore,
    jobs: Arc<dyn JobStore>,
    lane: ExecutionLane,
    item_delay: Duration,
}

impl BatchService {
    /// Must be called inside a tokio runtime: it starts the execution lane.
    pub fn new(
        remote: Arc<dyn RemoteActionProvider>,
        previews: PreviewStore,
        jobs: Arc<dyn JobStore>,
        item_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                remote,
                previews,
                jobs,
                lane: ExecutionLane::start(),
                item_delay,
            }),
        }
    }

    pub fn from_config(
        cfg: &Config,
        remote: Arc<dyn RemoteActionProvider>,
        jobs: Arc<dyn JobStore>,
    ) -> Self {
        Self::new(
            remote,
            PreviewStore::new(cfg.preview_ttl()),
            jobs,
            cfg.item_delay(),
        )
    }

    pub fn previews(&self) -> &PreviewStore {
        &self.inner.previews
    }

    /// Keep the candidates that `action` can operate on and stage them.
    #[instrument(skip_all, fields(action = action.as_str()))]
    pub fn create_preview(
        &self,
        action: BatchAction,
        candidates: Vec<EntityItem>,
    ) -> Result<PreviewResponse, ServiceError> {
        if candidates.is_empty() {
            return Err(ServiceError::validation("preview targets must not be empty"));
        }

        let mut warnings = Vec::new();
        let filtered: Vec<EntityItem> = candidates
            .into_iter()
            .filter(|item| {
                let keep = action.accepts(item.entity_type);
                if !keep {
                    warnings.push(format!(
                        "ignored {}: type {} does not match action {}",
                        item.title,
                        item.entity_type.as_str(),
                        action.as_str()
                    ));
                }
                keep
            })
            .collect();

        if filtered.is_empty() {
            return Err(ServiceError::Validation {
                message: "no executable targets; check the selection".to_string(),
                warnings,
            });
        }

        Ok(self.inner.previews.create(action, filtered, warnings))
    }

    pub async fn create_deleted_contacts_preview(&self) -> Result<PreviewResponse, ServiceError> {
        let remote = &self.inner.remote;
        let items = retry_on_flood_wait(|| remote.list_deleted_contacts()).await?;
        Ok(self
            .inner
            .previews
            .create(BatchAction::CleanupDeletedContacts, items, Vec::new()))
    }

    pub async fn create_non_friend_chats_preview(&self) -> Result<PreviewResponse, ServiceError> {
        let remote = &self.inner.remote;
        let items = retry_on_flood_wait(|| remote.list_non_friend_chats()).await?;
        Ok(self
            .inner
            .previews
            .create(BatchAction::CleanupNonFriendChats, items, Vec::new()))
    }

    pub async fn create_bot_chats_preview(&self) -> Result<PreviewResponse, ServiceError> {
        let remote = &self.inner.remote;
        let items = retry_on_flood_wait(|| remote.list_bot_chats()).await?;
        Ok(self
            .inner
            .previews
            .create(BatchAction::CleanupBotChats, items, Vec::new()))
    }

    /// Redeem `preview_token`, persist a PENDING job and queue it on the lane.
    /// Returns as soon as the job is accepted.
    ///
    /// The token is spent before anything is written. If persisting or queueing
    /// fails, the caller has to stage a new preview. A job that was persisted but
    /// could not be queued is finished as FAILED with no results.
    #[instrument(skip_all, fields(action = action.as_str()))]
    pub async fn execute(
        &self,
        action: BatchAction,
        preview_token: &str,
    ) -> Result<ExecuteResponse, ServiceError> {
        let items = self.inner.previews.consume(preview_token, action)?;

        let job = BatchJobResult::pending(action, items.len());
        self.inner.jobs.upsert(&job).await?;
        let job_id = job.job_id;

        let svc = self.clone();
        let queued = job.clone();
        if let Err(err) = self
            .inner
            .lane
            .submit(async move { svc.run_guarded(queued, items).await })
        {
            error!(%job_id, "execution lane is closed; failing job");
            self.persist(&job.finish(Vec::new(), true)).await;
            return Err(ServiceError::Storage(err.into()));
        }

        info!(%job_id, "job accepted");
        Ok(ExecuteResponse { job_id })
    }

    /// String-typed entry point for transports: unknown actions are a
    /// validation failure.
    pub async fn execute_named(
        &self,
        action: &str,
        preview_token: &str,
    ) -> Result<ExecuteResponse, ServiceError> {
        let action = BatchAction::parse_action(action)
            .ok_or_else(|| ServiceError::validation(format!("unsupported action: {action}")))?;
        self.execute(action, preview_token).await
    }

    pub async fn get_job(&self, job_id: &str) -> Result<BatchJobResult, ServiceError> {
        self.inner
            .jobs
            .get_by_id(job_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("job {job_id} does not exist")))
    }

    pub async fn list_recent_jobs(&self) -> Result<Vec<BatchJobResult>, ServiceError> {
        let jobs = &self.inner.jobs;
        Ok(jobs.list_recent(jobs.retention()).await?)
    }

    pub async fn job_stats(&self) -> Result<JobStats, ServiceError> {
        let jobs = self.list_recent_jobs().await?;
        Ok(JobStats::from_jobs(&jobs))
    }

    pub fn preview_stats(&self) -> PreviewStats {
        self.inner.previews.stats()
    }

    /// Run a job body; a panic inside it still leaves a FAILED record behind.
    async fn run_guarded(&self, job: BatchJobResult, items: Vec<EntityItem>) {
        let job_id = job.job_id;
        let outcome = AssertUnwindSafe(self.run_job(job.clone(), items))
            .catch_unwind()
            .await;
        if outcome.is_err() {
            error!(%job_id, "job body panicked; marking job failed");
            let last = match self.inner.jobs.get_by_id(&job_id.to_string()).await {
                Ok(Some(last)) => last,
                Ok(None) => job.running(),
                Err(err) => {
                    error!(?err, %job_id, "failed to reload job after panic");
                    job.running()
                }
            };
            if !last.status.is_terminal() {
                let failed = last.finish(last.results.clone(), true);
                self.persist(&failed).await;
            }
        }
    }

    #[instrument(skip_all, fields(job_id = %seed.job_id, action = seed.action.as_str()))]
    async fn run_job(&self, seed: BatchJobResult, items: Vec<EntityItem>) {
        let running = seed.running();
        self.persist(&running).await;
        info!(total = items.len(), "job running");

        let mut results = Vec::with_capacity(items.len());
        let mut aborted = false;

        for (idx, item) in items.iter().enumerate() {
            match retry_on_flood_wait(|| self.dispatch(running.action, item)).await {
                Ok(()) => results.push(BatchResultItem::success(item)),
                Err(err) => {
                    let normalized = err.normalize();
                    warn!(
                        item_id = %item.id,
                        code = %normalized.code,
                        message = %normalized.message,
                        "item failed"
                    );
                    results.push(BatchResultItem::failure(
                        item,
                        normalized.code,
                        normalized.message,
                    ));
                    if err.is_session_fatal() {
                        error!(item_id = %item.id, "session is no longer valid; aborting job");
                        aborted = true;
                        break;
                    }
                }
            }

            if idx + 1 < items.len() {
                self.persist(&running.with_results(results.clone())).await;
                tokio::time::sleep(self.inner.item_delay).await;
            }
        }

        let finished = running.finish(results, aborted);
        info!(
            status = finished.status.as_str(),
            success = finished.success_count,
            failed = finished.failed_count,
            "job finished"
        );
        self.persist(&finished).await;
    }

    async fn dispatch(&self, action: BatchAction, item: &EntityItem) -> Result<(), RemoteError> {
        let remote = &self.inner.remote;
        match action {
            BatchAction::DeleteFriends | BatchAction::CleanupDeletedContacts => {
                remote.remove_contact(item).await
            }
            BatchAction::LeaveGroups => remote.leave_group(item).await,
            BatchAction::UnsubscribeChannels => remote.leave_channel(item).await,
            BatchAction::CleanupNonFriendChats | BatchAction::CleanupBotChats => {
                remote.purge_private_history(item).await
            }
        }
    }

    /// Write failures inside a job body are logged; the body keeps going so
    /// the next write can still land.
    async fn persist(&self, job: &BatchJobResult) {
        if let Err(err) = self.inner.jobs.upsert(job).await {
            error!(?err, job_id = %job.job_id, status = job.status.as_str(), "failed to persist job");
        }
    }
}
