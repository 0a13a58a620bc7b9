//! Job store contract.
//!
//! Every persistence backend satisfies the same guarantees:
//! - `claim_next` is atomic: concurrent callers never receive the same job
//! - `update` validates status transitions and strictly advances `updated_at`
//! - records are never deleted by the worker

use async_trait::async_trait;

use crate::{Job, JobId, JobPatch, Result};

/// Durable storage for job records.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Fails with `AlreadyExists` if the id is taken.
    async fn create(&self, job: Job) -> Result<Job>;

    /// Claim the oldest never-claimed job.
    ///
    /// A `queued` job flips to `running`; a job whose cancellation was
    /// requested before any worker saw it keeps `cancel_requested` so the
    /// caller can finish it as `cancelled`. Either way its stage becomes
    /// `preflight`.
    async fn claim_next(&self) -> Result<Option<Job>>;

    /// Merge `patch` into the job and return the new snapshot.
    async fn update(&self, id: JobId, patch: JobPatch) -> Result<Job>;

    /// Full snapshot of a job.
    async fn get(&self, id: JobId) -> Result<Job>;

    /// Request cooperative cancellation. A no-op on terminal jobs.
    async fn request_cancel(&self, id: JobId) -> Result<Job>;

    /// Most recently created jobs first.
    async fn list(&self, limit: usize) -> Result<Vec<Job>>;
}
