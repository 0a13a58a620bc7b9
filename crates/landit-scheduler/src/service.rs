//! Submission side of the job store: enqueue, status and cancel.

use landit_core::artifact::{ArtifactEntry, ArtifactSink};
use landit_core::store::JobStore;
use landit_core::{Error, Job, JobId, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

pub const DEFAULT_TEMPLATE: &str = "python-fastapi";

/// A request to scaffold and land a change.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct JobRequest {
    pub owner: String,
    pub repo: String,
    pub task: String,
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub private: Option<bool>,
    #[serde(default)]
    pub create_repo: Option<bool>,
    #[serde(default)]
    pub trace_id: Option<String>,
}

impl JobRequest {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            task: task.into(),
            template: None,
            private: None,
            create_repo: None,
            trace_id: None,
        }
    }

    pub fn template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    fn into_job(self) -> Result<Job> {
        let owner = self.owner.trim();
        let repo = self.repo.trim();
        let task = self.task.trim();
        check_name("owner", owner)?;
        check_name("repo", repo)?;
        if task.is_empty() {
            return Err(Error::InvalidInput("task must not be empty".to_string()));
        }

        let template = self
            .template
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_TEMPLATE);
        if template.contains(['/', '\\']) || template == "." || template == ".." {
            return Err(Error::InvalidInput(format!(
                "template must be a plain directory name: {template}"
            )));
        }

        let mut job = Job::new(owner, repo, task, template);
        job.private = self.private.unwrap_or(true);
        job.create_repo = self.create_repo.unwrap_or(true);
        if let Some(trace_id) = self.trace_id.filter(|t| !t.trim().is_empty()) {
            job.trace_id = trace_id;
        }
        Ok(job)
    }
}

/// Owner and repository names as the hosting side accepts them.
fn check_name(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{field} must not be empty")));
    }
    let valid = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && value != "."
        && value != "..";
    if !valid {
        return Err(Error::InvalidInput(format!("invalid {field}: {value}")));
    }
    Ok(())
}

#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn JobStore>,
    sink: Arc<dyn ArtifactSink>,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>, sink: Arc<dyn ArtifactSink>) -> Self {
        Self { store, sink }
    }

    pub async fn enqueue(&self, request: JobRequest) -> Result<JobId> {
        let job = self.store.create(request.into_job()?).await?;
        info!(job_id = %job.id, repo = %job.full_name(), template = %job.template, "Job enqueued");
        Ok(job.id)
    }

    pub async fn get_status(&self, id: JobId) -> Result<Job> {
        self.store.get(id).await
    }

    pub async fn request_cancel(&self, id: JobId) -> Result<Job> {
        let job = self.store.request_cancel(id).await?;
        info!(job_id = %id, status = %job.status, "Cancel requested");
        Ok(job)
    }

    pub async fn artifacts(&self, id: JobId) -> Result<Vec<ArtifactEntry>> {
        self.store.get(id).await?;
        self.sink.list(id).await
    }

    pub async fn list(&self, limit: usize) -> Result<Vec<Job>> {
        self.store.list(limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use landit_core::{JobStatus, Stage};
    use landit_db::MemoryJobStore;
    use landit_executor::MemoryArtifactSink;

    fn service() -> JobService {
        JobService::new(
            Arc::new(MemoryJobStore::new()),
            Arc::new(MemoryArtifactSink::default()),
        )
    }

    #[tokio::test]
    async fn test_enqueue_fills_defaults() {
        let service = service();
        let id = service
            .enqueue(JobRequest::new("acme", "svc", "add health endpoint"))
            .await
            .unwrap();

        let job = service.get_status(id).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.stage, Stage::Queued);
        assert_eq!(job.template, DEFAULT_TEMPLATE);
        assert!(job.private);
        assert!(job.create_repo);
        assert_eq!(job.trace_id, id.trace_id());
    }

    #[tokio::test]
    async fn test_enqueue_from_json_request() {
        let service = service();
        let request: JobRequest = serde_json::from_str(
            r#"{"owner":"acme","repo":"svc","task":"t","template":"rust-axum","private":false,"trace_id":"req-42"}"#,
        )
        .unwrap();
        let id = service.enqueue(request).await.unwrap();

        let job = service.get_status(id).await.unwrap();
        assert_eq!(job.template, "rust-axum");
        assert!(!job.private);
        assert_eq!(job.trace_id, "req-42");
    }

    #[tokio::test]
    async fn test_enqueue_rejects_invalid_requests() {
        let service = service();
        for request in [
            JobRequest::new("", "svc", "task"),
            JobRequest::new("acme", "  ", "task"),
            JobRequest::new("acme", "svc", ""),
            JobRequest::new("ac me", "svc", "task"),
            JobRequest::new("acme", "..", "task"),
            JobRequest::new("acme", "svc", "task").template("../etc"),
        ] {
            assert!(
                matches!(service.enqueue(request.clone()).await, Err(Error::InvalidInput(_))),
                "{request:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_cancel_and_unknown_job() {
        let service = service();
        let id = service
            .enqueue(JobRequest::new("acme", "svc", "task"))
            .await
            .unwrap();

        let job = service.request_cancel(id).await.unwrap();
        assert_eq!(job.status, JobStatus::CancelRequested);

        let missing = JobId::new();
        assert!(matches!(service.get_status(missing).await, Err(Error::NotFound(_))));
        assert!(matches!(service.artifacts(missing).await, Err(Error::NotFound(_))));
        assert!(service.artifacts(id).await.unwrap().is_empty());
    }
}
