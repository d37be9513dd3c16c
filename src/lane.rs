//! Single sequential execution lane.
//!
//! Job bodies are queued on an unbounded channel and drained by exactly one
//! worker task. Each body runs in its own spawned task that the worker awaits
//! before taking the next one, so a panic ends that body only.
use futures::future::BoxFuture;
use std::future::Future;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

type JobBody = BoxFuture<'static, ()>;

#[derive(Debug, Error)]
#[error("execution lane is closed")]
pub struct LaneClosed;

#[derive(Debug, Clone)]
pub struct ExecutionLane {
    tx: mpsc::UnboundedSender<JobBody>,
}

impl ExecutionLane {
    /// Spawn the worker on the current tokio runtime.
    pub fn start() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<JobBody>();

        tokio::spawn(async move {
            info!("execution lane started");
            while let Some(body) = rx.recv().await {
                if let Err(err) = tokio::spawn(body).await {
                    error!(?err, "job body aborted; lane continues");
                }
            }
            debug!("execution lane stopped");
        });

        Self { tx }
    }

    /// Queue a job body behind everything already submitted. Returns at once.
    pub fn submit<F>(&self, body: F) -> Result<(), LaneClosed>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tx.send(Box::pin(body)).map_err(|_| LaneClosed)
    }
}
