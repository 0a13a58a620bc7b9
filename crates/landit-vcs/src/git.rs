//! Local git operations.
//!
//! Every call goes through [`PolicyExecutor`]; nothing here spawns a process
//! directly.

use landit_core::command::CommandSpec;
use landit_core::gateway::{Author, CommandScope, Credential};
use landit_core::Result;
use landit_executor::PolicyExecutor;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use crate::AskPass;

pub struct GitCli {
    executor: Arc<PolicyExecutor>,
}

impl GitCli {
    pub fn new(executor: Arc<PolicyExecutor>) -> Self {
        Self { executor }
    }

    fn git(args: &[&str]) -> CommandSpec {
        CommandSpec::new("git").args(args.iter().copied())
    }

    /// Clone `url` into `dest`. The URL must not carry credentials.
    pub async fn clone(
        &self,
        url: &str,
        credential: &Credential,
        dest: &Path,
        scope: &CommandScope,
    ) -> Result<()> {
        let askpass = AskPass::create(credential)?;
        let mut spec = Self::git(&["clone", url]).arg(dest.to_string_lossy());
        for (key, value) in askpass.env() {
            spec = spec.env(key, value);
        }
        self.executor.run(scope, spec).await?;
        info!(job_id = %scope.job_id, dest = %dest.display(), "Repository cloned");
        Ok(())
    }

    pub async fn checkout_new_branch(
        &self,
        path: &Path,
        name: &str,
        scope: &CommandScope,
    ) -> Result<()> {
        let spec = Self::git(&["checkout", "-b", name]).current_dir(path);
        self.executor.run(scope, spec).await?;
        Ok(())
    }

    /// `git add -A`, then commit if the tree changed. Returns whether a
    /// commit was made.
    pub async fn stage_and_commit(
        &self,
        path: &Path,
        message: &str,
        author: &Author,
        scope: &CommandScope,
    ) -> Result<bool> {
        let run = |spec: CommandSpec| self.executor.run(scope, spec.current_dir(path));

        run(Self::git(&["config", "user.name", author.name.as_str()])).await?;
        run(Self::git(&["config", "user.email", author.email.as_str()])).await?;
        run(Self::git(&["add", "-A"])).await?;
        let status = run(Self::git(&["status", "--porcelain"])).await?;
        if status.stdout.trim().is_empty() {
            info!(job_id = %scope.job_id, "Nothing to commit");
            return Ok(false);
        }
        run(Self::git(&["commit", "-m", message])).await?;
        Ok(true)
    }

    pub async fn push(
        &self,
        path: &Path,
        branch: &str,
        credential: &Credential,
        scope: &CommandScope,
    ) -> Result<()> {
        let askpass = AskPass::create(credential)?;
        let mut spec = Self::git(&["push", "-u", "origin", branch]).current_dir(path);
        for (key, value) in askpass.env() {
            spec = spec.env(key, value);
        }
        self.executor.run(scope, spec).await?;
        info!(job_id = %scope.job_id, branch, "Branch pushed");
        Ok(())
    }
}
