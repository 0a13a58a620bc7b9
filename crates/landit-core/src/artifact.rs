//! Artifact sink abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{JobId, Result};

/// A stored artifact as reported by [`ArtifactSink::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// Path relative to the job's artifact directory.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Hex SHA-256 of the stored content.
    pub checksum: String,
}

/// Durable per-job logs and reports.
///
/// Implementations redact text before it is stored.
#[async_trait]
pub trait ArtifactSink: Send + Sync {
    /// Append `text` to `path`, terminating it with a newline.
    async fn append(&self, job_id: JobId, path: &str, text: &str) -> Result<()>;

    /// Replace the contents of `path` with `text`.
    async fn write(&self, job_id: JobId, path: &str, text: &str) -> Result<()>;

    /// All artifacts stored for a job, sorted by path.
    async fn list(&self, job_id: JobId) -> Result<Vec<ArtifactEntry>>;
}
