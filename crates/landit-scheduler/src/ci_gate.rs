//! CI gate: open the pull request, wait on the required check, and retry a
//! bounded number of automated remediations.

use landit_config::CiSettings;
use landit_core::artifact::ArtifactSink;
use landit_core::gateway::{
    Author, CheckRun, CommandScope, Credential, PullRequestDraft, VcsGateway,
};
use landit_core::{Checkpoint, Job, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub const CHECKS_LOG: &str = "logs/ci_checks.log";
pub const RETRY_NOTE: &str = "LANDIT_CI_RETRY_NOTE.md";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CiOutcome {
    Green,
    Red,
    Timeout,
}

impl CiOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CiOutcome::Green => "green",
            CiOutcome::Red => "red",
            CiOutcome::Timeout => "timeout",
        }
    }
}

impl fmt::Display for CiOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiReport {
    pub outcome: CiOutcome,
    pub pr_url: String,
    /// Head commit of the last attempt.
    pub head_sha: Option<String>,
    pub remediations: u32,
}

/// Result of waiting on one head commit.
enum Verdict {
    Passed,
    Failed(String),
    TimedOut,
}

/// Everything the gate needs to know about the branch under test.
pub struct CiTarget<'a> {
    pub job: &'a Job,
    pub branch: &'a str,
    pub base: &'a str,
    pub workspace: &'a Path,
    pub scope: &'a CommandScope,
    pub credential: &'a Credential,
    pub author: &'a Author,
}

pub struct CiGate<'a> {
    gateway: &'a dyn VcsGateway,
    sink: &'a dyn ArtifactSink,
    settings: &'a CiSettings,
    shutdown: &'a CancellationToken,
}

impl<'a> CiGate<'a> {
    pub fn new(
        gateway: &'a dyn VcsGateway,
        sink: &'a dyn ArtifactSink,
        settings: &'a CiSettings,
        shutdown: &'a CancellationToken,
    ) -> Self {
        Self {
            gateway,
            sink,
            settings,
            shutdown,
        }
    }

    /// Open a draft pull request and gate on the required check.
    ///
    /// Each failed attempt except the last is followed by a remediation
    /// commit pushed to the same branch.
    pub async fn run(&self, target: &CiTarget<'_>) -> Result<CiReport> {
        let job = target.job;
        let draft = PullRequestDraft {
            head: target.branch.to_string(),
            base: target.base.to_string(),
            title: format!("landit: {} scaffold", job.template),
            body: format!(
                "Automated change for job `{}` (trace `{}`).\n\n## Task\n\n{}\n",
                job.id, job.trace_id, job.task
            ),
            draft: true,
        };
        let pr = self
            .gateway
            .open_pull_request(&job.owner, &job.repo, &draft)
            .await?;
        info!(job_id = %job.id, pr_url = %pr.url, "Pull request opened");

        let attempts = self.settings.attempts.max(1);
        let mut report = CiReport {
            outcome: CiOutcome::Red,
            pr_url: pr.url,
            head_sha: None,
            remediations: 0,
        };

        for attempt in 0..attempts {
            let Some(sha) = self.resolve_head(job, target.branch).await? else {
                report.outcome = CiOutcome::Timeout;
                return Ok(report);
            };
            report.head_sha = Some(sha.clone());

            match self.wait_for_required_check(job, &sha).await? {
                Verdict::Passed => {
                    info!(job_id = %job.id, attempt, "Required check passed");
                    report.outcome = CiOutcome::Green;
                    return Ok(report);
                }
                Verdict::TimedOut => {
                    warn!(job_id = %job.id, attempt, "Timed out waiting for required check");
                    report.outcome = CiOutcome::Timeout;
                    return Ok(report);
                }
                Verdict::Failed(conclusion) => {
                    warn!(job_id = %job.id, attempt, %conclusion, "Required check failed");
                    if attempt + 1 < attempts {
                        self.remediate(target, attempt + 1).await?;
                        report.remediations += 1;
                    }
                }
            }
        }

        report.outcome = CiOutcome::Red;
        Ok(report)
    }

    /// Branch head, retrying transient errors until the attempt deadline.
    /// `None` means the deadline passed or shutdown was requested.
    async fn resolve_head(&self, job: &Job, branch: &str) -> Result<Option<String>> {
        let deadline = Instant::now() + self.settings.attempt_deadline;
        loop {
            match self
                .gateway
                .get_branch_head(&job.owner, &job.repo, branch)
                .await
            {
                Ok(sha) => return Ok(Some(sha)),
                Err(e) if e.is_transient() => {
                    warn!(job_id = %job.id, error = %e, "Transient error resolving branch head");
                }
                Err(e) => return Err(e),
            }
            if !self.pause(deadline).await {
                return Ok(None);
            }
        }
    }

    async fn wait_for_required_check(&self, job: &Job, sha: &str) -> Result<Verdict> {
        let deadline = Instant::now() + self.settings.attempt_deadline;
        loop {
            match self
                .gateway
                .list_check_runs(&job.owner, &job.repo, sha)
                .await
            {
                Ok(runs) => {
                    for run in &runs {
                        self.sink
                            .append(job.id, CHECKS_LOG, &check_log_line(run)?)
                            .await?;
                    }
                    let required = runs
                        .iter()
                        .find(|run| run.name == self.settings.required_check);
                    if let Some(run) = required.filter(|run| run.is_completed()) {
                        if run.is_success() {
                            return Ok(Verdict::Passed);
                        }
                        let conclusion = run.conclusion.clone().unwrap_or_default();
                        return Ok(Verdict::Failed(conclusion));
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(job_id = %job.id, error = %e, "Transient error polling check runs");
                }
                Err(e) => return Err(e),
            }

            if !self.pause(deadline).await {
                return Ok(Verdict::TimedOut);
            }
        }
    }

    /// Sleep one poll interval, bounded by `deadline`. Returns `false` when
    /// the deadline has passed or shutdown was requested.
    async fn pause(&self, deadline: Instant) -> bool {
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        let wait = self.settings.poll_interval.min(deadline - now);
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = sleep(wait) => true,
        }
    }

    async fn remediate(&self, target: &CiTarget<'_>, attempt: u32) -> Result<()> {
        let job = target.job;
        info!(job_id = %job.id, attempt, "Starting CI remediation");

        let checkpoint = Checkpoint::new("ci_fix_loop").with("attempt", attempt);
        let json = checkpoint.to_json()?;
        self.sink
            .write(job.id, "checkpoints/ci_fix_loop.json", &json)
            .await?;
        self.sink
            .write(job.id, "checkpoints/latest.json", &json)
            .await?;

        let mut note = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(target.workspace.join(RETRY_NOTE))
            .await?;
        note.write_all(
            format!(
                "CI retry attempt {attempt} at {}\n",
                checkpoint.ts.to_rfc3339()
            )
            .as_bytes(),
        )
        .await?;
        note.flush().await?;

        let message = format!("landit: CI remediation attempt {attempt}");
        self.gateway
            .stage_and_commit(
                target.workspace,
                &message,
                target.author,
                &target.scope.with_log("ci_fix_commit"),
            )
            .await?;
        self.gateway
            .push(
                target.workspace,
                target.branch,
                target.credential,
                &target.scope.with_log("ci_fix_push"),
            )
            .await
    }
}

/// One JSON line per observed check run, keys sorted.
fn check_log_line(run: &CheckRun) -> Result<String> {
    let line: BTreeMap<&str, Value> = BTreeMap::from([
        ("conclusion", run.conclusion.clone().map_or(Value::Null, Value::String)),
        ("name", Value::String(run.name.clone())),
        ("status", Value::String(run.status.clone())),
    ]);
    Ok(serde_json::to_string(&line)?)
}
