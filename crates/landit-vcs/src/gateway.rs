//! GitHub-backed [`VcsGateway`].

use async_trait::async_trait;
use landit_core::gateway::{
    Author, CheckRun, CommandScope, Credential, PullRequest, PullRequestDraft, VcsGateway,
};
use landit_core::{Error, Result};
use std::path::Path;
use tracing::info;

use crate::{GitCli, GitHubClient};

pub struct GitHubGateway {
    github: GitHubClient,
    git: GitCli,
    clone_host: String,
}

impl GitHubGateway {
    pub fn new(github: GitHubClient, git: GitCli, clone_host: impl Into<String>) -> Self {
        Self {
            github,
            git,
            clone_host: clone_host.into(),
        }
    }

    /// Credential-free HTTPS clone URL.
    pub fn clone_url(&self, owner: &str, repo: &str) -> String {
        format!("https://{}/{}/{}.git", self.clone_host, owner, repo)
    }
}

#[async_trait]
impl VcsGateway for GitHubGateway {
    async fn ensure_repo_exists(&self, owner: &str, repo: &str, private: bool) -> Result<()> {
        if self.github.get_repo(owner, repo).await?.is_some() {
            return Ok(());
        }
        info!(owner, repo, private, "Repository missing, creating it");
        self.github.create_repo(owner, repo, private).await?;
        Ok(())
    }

    async fn get_default_branch(&self, owner: &str, repo: &str) -> Result<String> {
        let found = self
            .github
            .get_repo(owner, repo)
            .await?
            .ok_or_else(|| Error::NotFound(format!("repository {owner}/{repo}")))?;
        Ok(found.default_branch)
    }

    async fn clone_repo(
        &self,
        owner: &str,
        repo: &str,
        credential: &Credential,
        dest: &Path,
        scope: &CommandScope,
    ) -> Result<()> {
        self.git
            .clone(&self.clone_url(owner, repo), credential, dest, scope)
            .await
    }

    async fn create_branch(&self, path: &Path, name: &str, scope: &CommandScope) -> Result<()> {
        self.git.checkout_new_branch(path, name, scope).await
    }

    async fn stage_and_commit(
        &self,
        path: &Path,
        message: &str,
        author: &Author,
        scope: &CommandScope,
    ) -> Result<bool> {
        self.git.stage_and_commit(path, message, author, scope).await
    }

    async fn push(
        &self,
        path: &Path,
        branch: &str,
        credential: &Credential,
        scope: &CommandScope,
    ) -> Result<()> {
        self.git.push(path, branch, credential, scope).await
    }

    async fn open_pull_request(
        &self,
        owner: &str,
        repo: &str,
        draft: &PullRequestDraft,
    ) -> Result<PullRequest> {
        self.github.create_pull_request(owner, repo, draft).await
    }

    async fn get_branch_head(&self, owner: &str, repo: &str, branch: &str) -> Result<String> {
        self.github.get_branch_head(owner, repo, branch).await
    }

    async fn list_check_runs(&self, owner: &str, repo: &str, sha: &str) -> Result<Vec<CheckRun>> {
        self.github.list_check_runs(owner, repo, sha).await
    }
}
