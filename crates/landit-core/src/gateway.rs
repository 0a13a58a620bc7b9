//! VCS and hosting gateway abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Error, JobId, Result};

/// Out-of-band credential handed to tooling.
///
/// Holds the location of the token file, never the token itself, so it can
/// be cloned and logged freely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub token_file: PathBuf,
}

impl Credential {
    pub fn new(token_file: impl Into<PathBuf>) -> Self {
        Self {
            token_file: token_file.into(),
        }
    }

    /// Read and trim the token. Missing or empty files are configuration errors.
    pub fn read_token(&self) -> Result<String> {
        let raw = std::fs::read_to_string(&self.token_file).map_err(|e| {
            Error::Configuration(format!(
                "github token missing at {}: {e}",
                self.token_file.display()
            ))
        })?;
        let token = raw.trim().to_string();
        if token.is_empty() {
            return Err(Error::Configuration(format!(
                "github token file {} is empty",
                self.token_file.display()
            )));
        }
        Ok(token)
    }
}

/// Commit author identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    pub email: String,
}

/// Per-job context the gateway passes to the command execution boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandScope {
    pub job_id: JobId,
    /// Log file name (without extension) under `logs/`.
    pub log_name: String,
    /// Branches protected for this job in addition to the configured ones,
    /// typically the repository's default branch.
    pub protected_branches: Vec<String>,
}

impl CommandScope {
    pub fn new(job_id: JobId, log_name: impl Into<String>) -> Self {
        Self {
            job_id,
            log_name: log_name.into(),
            protected_branches: Vec::new(),
        }
    }

    pub fn protect(mut self, branch: impl Into<String>) -> Self {
        self.protected_branches.push(branch.into());
        self
    }

    /// Same job and protections, different log file.
    pub fn with_log(&self, log_name: impl Into<String>) -> Self {
        Self {
            log_name: log_name.into(),
            ..self.clone()
        }
    }
}

/// A pull request to open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestDraft {
    pub head: String,
    pub base: String,
    pub title: String,
    pub body: String,
    pub draft: bool,
}

/// An opened pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub url: String,
    pub head_sha: String,
}

/// One check-run entry reported for a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRun {
    pub name: String,
    /// `queued`, `in_progress` or `completed`.
    pub status: String,
    /// Set once `status` is `completed`, e.g. `success` or `failure`.
    pub conclusion: Option<String>,
}

impl CheckRun {
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }

    pub fn is_success(&self) -> bool {
        self.is_completed() && self.conclusion.as_deref() == Some("success")
    }
}

/// Repository hosting plus local version-control operations.
///
/// Local operations route every subprocess through the command policy;
/// `scope` tells the policy which job and log the invocation belongs to.
#[async_trait]
pub trait VcsGateway: Send + Sync {
    async fn ensure_repo_exists(&self, owner: &str, repo: &str, private: bool) -> Result<()>;

    async fn get_default_branch(&self, owner: &str, repo: &str) -> Result<String>;

    async fn clone_repo(
        &self,
        owner: &str,
        repo: &str,
        credential: &Credential,
        dest: &Path,
        scope: &CommandScope,
    ) -> Result<()>;

    async fn create_branch(&self, path: &Path, name: &str, scope: &CommandScope) -> Result<()>;

    /// Stage everything and commit. Returns `false` when there was nothing to commit.
    async fn stage_and_commit(
        &self,
        path: &Path,
        message: &str,
        author: &Author,
        scope: &CommandScope,
    ) -> Result<bool>;

    async fn push(
        &self,
        path: &Path,
        branch: &str,
        credential: &Credential,
        scope: &CommandScope,
    ) -> Result<()>;

    async fn open_pull_request(
        &self,
        owner: &str,
        repo: &str,
        draft: &PullRequestDraft,
    ) -> Result<PullRequest>;

    /// Current head commit of a branch on the hosting side.
    async fn get_branch_head(&self, owner: &str, repo: &str, branch: &str) -> Result<String>;

    /// Check runs for a commit, in the order the host reports them.
    async fn list_check_runs(&self, owner: &str, repo: &str, sha: &str) -> Result<Vec<CheckRun>>;
}
