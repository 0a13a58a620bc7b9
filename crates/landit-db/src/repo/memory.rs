//! In-memory job store.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use landit_core::store::JobStore;
use landit_core::{Error, Job, JobId, JobPatch, JobStatus, Result, Stage};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A [`JobStore`] backed by a mutex-guarded map.
///
/// Every operation runs inside one critical section, which is what makes
/// `claim_next` atomic.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Next `updated_at`, strictly after `previous` even when the clock stalls.
fn advance(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    let floor = previous + TimeDelta::microseconds(1);
    if now > floor { now } else { floor }
}

fn is_claimable(job: &Job) -> bool {
    job.stage == Stage::Queued
        && matches!(job.status, JobStatus::Queued | JobStatus::CancelRequested)
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, mut job: Job) -> Result<Job> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.id) {
            return Err(Error::AlreadyExists(format!("job {}", job.id)));
        }
        // Keep creation order total so "oldest first" is well defined.
        let created_at = match jobs.values().map(|j| j.created_at).max() {
            Some(latest) => advance(latest),
            None => Utc::now(),
        };
        job.created_at = created_at;
        job.updated_at = created_at;
        jobs.insert(job.id, job.clone());
        info!(job_id = %job.id, repo = %job.full_name(), "Job created");
        Ok(job)
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs
            .values_mut()
            .filter(|job| is_claimable(job))
            .min_by_key(|job| (job.created_at, job.id))
        else {
            return Ok(None);
        };

        job.stage = Stage::Preflight;
        if job.status == JobStatus::Queued {
            job.status = JobStatus::Running;
        }
        job.updated_at = advance(job.updated_at);
        debug!(job_id = %job.id, status = %job.status, "Job claimed");
        Ok(Some(job.clone()))
    }

    async fn update(&self, id: JobId, patch: JobPatch) -> Result<Job> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("job {id}")))?;

        // Validate against a copy so a rejected patch leaves no trace.
        let mut next = job.clone();
        next.apply(&patch)?;
        next.updated_at = advance(job.updated_at);
        *job = next;
        Ok(job.clone())
    }

    async fn get(&self, id: JobId) -> Result<Job> {
        let jobs = self.jobs.lock().await;
        jobs.get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("job {id}")))
    }

    async fn request_cancel(&self, id: JobId) -> Result<Job> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("job {id}")))?;

        if matches!(job.status, JobStatus::Queued | JobStatus::Running) {
            job.status = JobStatus::CancelRequested;
            job.updated_at = advance(job.updated_at);
            info!(job_id = %id, "Cancellation requested");
        }
        Ok(job.clone())
    }

    async fn list(&self, limit: usize) -> Result<Vec<Job>> {
        let jobs = self.jobs.lock().await;
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        all.truncate(limit);
        Ok(all)
    }
}
