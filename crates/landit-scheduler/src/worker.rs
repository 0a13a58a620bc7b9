//! Worker that claims jobs from the store and drives them through the pipeline.

use crate::pipeline::PipelineEngine;
use landit_core::store::JobStore;
use landit_core::{Error, Job, JobPatch, JobStatus, Result};
use landit_executor::{Redactor, ensure_not_root, ensure_unprivileged};
use nix::unistd::Uid;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Longest error text recorded on a failed job.
pub const MAX_ERROR_LEN: usize = 2000;

const STORE_BACKOFF: Duration = Duration::from_secs(5);

/// A worker that claims and executes jobs, one at a time.
pub struct Worker {
    id: String,
    store: Arc<dyn JobStore>,
    engine: Arc<PipelineEngine>,
    redactor: Arc<Redactor>,
    poll_interval: Duration,
    shutdown: CancellationToken,
    euid: Option<Uid>,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        store: Arc<dyn JobStore>,
        engine: Arc<PipelineEngine>,
        redactor: Arc<Redactor>,
        poll_interval: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id: id.into(),
            store,
            engine,
            redactor,
            poll_interval,
            shutdown,
            euid: None,
        }
    }

    /// Check `euid` instead of the process's effective uid in the privilege guard.
    pub fn with_euid(mut self, euid: Uid) -> Self {
        self.euid = Some(euid);
        self
    }

    /// Run the worker loop until the shutdown token is cancelled.
    ///
    /// Returns an error only when the privilege guard refuses to start.
    pub async fn run(&self) -> Result<()> {
        match self.euid {
            Some(euid) => ensure_not_root(euid)?,
            None => ensure_unprivileged()?,
        }
        info!(worker_id = %self.id, "Starting worker");

        while !self.shutdown.is_cancelled() {
            match self.run_once().await {
                Ok(true) => {}
                Ok(false) => self.pause(self.poll_interval).await,
                Err(e) => {
                    warn!(worker_id = %self.id, error = %e, "Failed to process job");
                    self.pause(STORE_BACKOFF).await;
                }
            }
        }
        info!(worker_id = %self.id, "Worker stopped");
        Ok(())
    }

    /// Claim and process at most one job. Returns `false` when nothing was queued.
    ///
    /// Pipeline failures are recorded on the job; only store errors escape.
    pub async fn run_once(&self) -> Result<bool> {
        let Some(job) = self.store.claim_next().await? else {
            return Ok(false);
        };
        info!(worker_id = %self.id, job_id = %job.id, trace_id = %job.trace_id, "Claimed job");

        if self.cancel_pending(&job).await? {
            self.store
                .update(job.id, JobPatch::new().status(JobStatus::Cancelled))
                .await?;
            info!(job_id = %job.id, "Job cancelled before start");
            return Ok(true);
        }

        let id = job.id;
        match self.engine.execute(job).await {
            Ok(outcome) => {
                let current = self.store.get(id).await?;
                let patch = outcome.terminal_patch(current.status);
                let finished = match self.store.update(id, patch).await {
                    // A cancel request raced the final update.
                    Err(Error::Conflict(_)) => {
                        let current = self.store.get(id).await?;
                        self.store
                            .update(id, outcome.terminal_patch(current.status))
                            .await?
                    }
                    other => other?,
                };
                info!(job_id = %id, status = %finished.status, stage = %finished.stage, "Job finished");
            }
            Err(e) => {
                let message = self
                    .redactor
                    .redact_truncated(&e.to_string(), MAX_ERROR_LEN);
                error!(job_id = %id, error = %message, "Job failed");
                self.store
                    .update(
                        id,
                        JobPatch::new().status(JobStatus::Failed).error(message),
                    )
                    .await?;
            }
        }
        Ok(true)
    }

    async fn cancel_pending(&self, claimed: &Job) -> Result<bool> {
        if claimed.status == JobStatus::CancelRequested {
            return Ok(true);
        }
        let fresh = self.store.get(claimed.id).await?;
        Ok(fresh.status == JobStatus::CancelRequested)
    }

    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }
}
