//! The stage state machine.
//!
//! A claimed job moves through [`Stage::PIPELINE`] one [`PipelineEngine::step`]
//! at a time. Each step does the stage's work, writes its checkpoint, then
//! records the stage on the job, in that order, so the stored stage always
//! names the last fully completed stage.

use landit_config::{CiSettings, LanditConfig, ModelSettings};
use landit_core::artifact::ArtifactSink;
use landit_core::command::CommandSpec;
use landit_core::gateway::{Author, CommandScope, Credential, VcsGateway};
use landit_core::store::JobStore;
use landit_core::{Checkpoint, Error, Job, JobPatch, JobStatus, Result, Stage};
use landit_executor::PolicyExecutor;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ci_gate::{CiGate, CiOutcome, CiReport, CiTarget};
use crate::reports;
use crate::template::apply_template;

pub const VALIDATION_WARN_LOG: &str = "logs/validation_warn.log";

/// Everything the engine needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub workspaces_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub credential: Credential,
    pub author: Author,
    pub co_author: Option<Author>,
    pub protected_branches: Vec<String>,
    /// `program subcommand` pairs, listed in the bootstrap ticket.
    pub allowed_commands: Vec<String>,
    pub validation: Vec<Vec<String>>,
    pub ci: CiSettings,
    pub model: ModelSettings,
}

impl PipelineSettings {
    pub fn from_config(config: &LanditConfig) -> Self {
        Self {
            workspaces_dir: config.worker.workspaces_dir.clone(),
            templates_dir: config.worker.templates_dir.clone(),
            credential: Credential::new(config.github.token_file.clone()),
            author: config.git.author.clone(),
            co_author: config.git.co_author.clone(),
            protected_branches: config.policy.protected_branches.clone(),
            allowed_commands: config
                .policy
                .allow
                .iter()
                .map(|rule| format!("{} {}", rule.program, rule.subcommand))
                .collect(),
            validation: config.policy.validation.clone(),
            ci: config.ci.clone(),
            model: config.model.clone(),
        }
    }
}

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Required check green.
    Done,
    /// Required check red after all remediation attempts.
    CiFailed,
    /// CI wait timed out; the job parks in the `waiting` stage.
    Waiting,
    /// The template and task produced no diff.
    NoChanges,
}

impl Outcome {
    fn from_ci(outcome: CiOutcome) -> Self {
        match outcome {
            CiOutcome::Green => Outcome::Done,
            CiOutcome::Red => Outcome::CiFailed,
            CiOutcome::Timeout => Outcome::Waiting,
        }
    }

    /// Status and stage recorded for this outcome on a job currently in `current`.
    pub fn terminal_patch(&self, current: JobStatus) -> JobPatch {
        match self {
            Outcome::Done => JobPatch::new().status(JobStatus::Done),
            Outcome::CiFailed => JobPatch::new().status(JobStatus::CiFailed),
            Outcome::NoChanges => JobPatch::new().status(JobStatus::NoChanges),
            // A parked job whose cancellation was requested meanwhile ends here.
            Outcome::Waiting if current == JobStatus::CancelRequested => JobPatch::new()
                .status(JobStatus::Cancelled)
                .stage(Stage::Waiting),
            Outcome::Waiting => JobPatch::new()
                .status(JobStatus::Running)
                .stage(Stage::Waiting),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Run(Stage),
    Finished(Outcome),
}

/// Per-job state carried between steps.
pub struct PipelineRun {
    pub job: Job,
    pub workspace: PathBuf,
    scope: CommandScope,
    base_branch: Option<String>,
    validation_ok: bool,
    ci: Option<CiReport>,
}

impl PipelineRun {
    pub fn new(job: Job, settings: &PipelineSettings) -> Self {
        let workspace = settings.workspaces_dir.join(job.id.to_string());
        let scope = CommandScope::new(job.id, "exec");
        Self {
            job,
            workspace,
            scope,
            base_branch: None,
            validation_ok: true,
            ci: None,
        }
    }
}

/// What a stage hands back to [`PipelineEngine::step`].
struct StageResult {
    checkpoint: Checkpoint,
    patch: JobPatch,
    halt: Option<Outcome>,
}

impl StageResult {
    fn advance(checkpoint: Checkpoint) -> Self {
        Self {
            checkpoint,
            patch: JobPatch::new(),
            halt: None,
        }
    }
}

pub struct PipelineEngine {
    store: Arc<dyn JobStore>,
    gateway: Arc<dyn VcsGateway>,
    sink: Arc<dyn ArtifactSink>,
    executor: Arc<PolicyExecutor>,
    settings: PipelineSettings,
    shutdown: CancellationToken,
}

impl PipelineEngine {
    pub fn new(
        store: Arc<dyn JobStore>,
        gateway: Arc<dyn VcsGateway>,
        sink: Arc<dyn ArtifactSink>,
        executor: Arc<PolicyExecutor>,
        settings: PipelineSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            gateway,
            sink,
            executor,
            settings,
            shutdown,
        }
    }

    /// Run a claimed job from `preflight` to a finished state.
    pub async fn execute(&self, job: Job) -> Result<Outcome> {
        info!(job_id = %job.id, trace_id = %job.trace_id, repo = %job.full_name(), "Pipeline started");
        let mut run = PipelineRun::new(job, &self.settings);
        let mut state = PipelineState::Run(Stage::Preflight);
        loop {
            state = self.step(&mut run, state).await?;
            if let PipelineState::Finished(outcome) = state {
                info!(job_id = %run.job.id, ?outcome, "Pipeline finished");
                return Ok(outcome);
            }
        }
    }

    /// Perform one stage and return the state that follows it.
    pub async fn step(&self, run: &mut PipelineRun, state: PipelineState) -> Result<PipelineState> {
        let stage = match state {
            PipelineState::Run(stage) => stage,
            finished @ PipelineState::Finished(_) => return Ok(finished),
        };
        debug!(job_id = %run.job.id, %stage, "Stage started");
        let result = match stage {
            Stage::Preflight => self.preflight(run).await?,
            Stage::SpecFreeze => self.spec_freeze(run).await?,
            Stage::Architecture => self.architecture(run).await?,
            Stage::TicketPlanning => self.ticket_planning(run).await?,
            Stage::ImplementLoop => self.implement_loop(run).await?,
            Stage::Integration => self.integration(run).await?,
            Stage::PrCiGate => self.pr_ci_gate(run).await?,
            Stage::ReleaseArtifacts => self.release_artifacts(run).await?,
            Stage::Queued | Stage::Waiting => {
                return Err(Error::InvalidInput(format!("{stage} is not a runnable stage")));
            }
        };

        self.write_checkpoint(run, &result.checkpoint).await?;
        run.job = self
            .store
            .update(run.job.id, result.patch.stage(stage))
            .await?;
        info!(job_id = %run.job.id, %stage, "Stage completed");

        if let Some(outcome) = result.halt {
            return Ok(PipelineState::Finished(outcome));
        }
        Ok(match stage.next() {
            Some(next) => PipelineState::Run(next),
            None => PipelineState::Finished(
                run.ci
                    .as_ref()
                    .map_or(Outcome::CiFailed, |ci| Outcome::from_ci(ci.outcome)),
            ),
        })
    }

    async fn write_checkpoint(&self, run: &PipelineRun, checkpoint: &Checkpoint) -> Result<()> {
        let json = checkpoint.to_json()?;
        self.sink
            .write(
                run.job.id,
                &format!("checkpoints/{}.json", checkpoint.stage),
                &json,
            )
            .await?;
        self.sink
            .write(run.job.id, "checkpoints/latest.json", &json)
            .await
    }

    async fn preflight(&self, run: &mut PipelineRun) -> Result<StageResult> {
        let missing = self.settings.model.missing_fields();
        if !missing.is_empty() {
            return Err(Error::Configuration(format!(
                "model provider unavailable, missing: {}",
                missing.join(",")
            )));
        }
        self.settings.credential.read_token()?;

        let snapshot = self.settings.model.snapshot();
        let job = &run.job;
        self.sink
            .write(
                job.id,
                reports::PREFLIGHT_REPORT,
                &reports::preflight_report(job, &self.settings.ci.required_check, &snapshot),
            )
            .await?;

        let checkpoint = Checkpoint::new(Stage::Preflight.as_str())
            .with("repo", job.full_name())
            .with("required_check", self.settings.ci.required_check.clone());
        Ok(StageResult {
            checkpoint,
            patch: JobPatch::new().model(snapshot),
            halt: None,
        })
    }

    async fn spec_freeze(&self, run: &mut PipelineRun) -> Result<StageResult> {
        let job = &run.job;
        self.sink
            .write(job.id, reports::SPEC_MD, &reports::spec_markdown(job))
            .await?;
        let spec = serde_json::to_string_pretty(&reports::spec_json(job))?;
        self.sink.write(job.id, reports::SPEC_JSON, &spec).await?;
        Ok(StageResult::advance(Checkpoint::new(Stage::SpecFreeze.as_str())))
    }

    async fn architecture(&self, run: &mut PipelineRun) -> Result<StageResult> {
        let job = &run.job;
        self.sink
            .write(job.id, reports::ARCHITECTURE, &reports::architecture(job))
            .await?;
        Ok(StageResult::advance(Checkpoint::new(Stage::Architecture.as_str())))
    }

    async fn ticket_planning(&self, run: &mut PipelineRun) -> Result<StageResult> {
        let ticket =
            reports::bootstrap_ticket(&self.settings.allowed_commands, &self.settings.validation);
        self.sink
            .write(run.job.id, reports::BOOTSTRAP_TICKET, &ticket)
            .await?;
        Ok(StageResult::advance(Checkpoint::new(Stage::TicketPlanning.as_str())))
    }

    /// The default branch, fetched once per run. It is protected for the job.
    async fn base_branch(&self, run: &mut PipelineRun) -> Result<String> {
        if let Some(base) = &run.base_branch {
            return Ok(base.clone());
        }
        let base = self
            .gateway
            .get_default_branch(&run.job.owner, &run.job.repo)
            .await?;
        run.scope = run.scope.clone().protect(base.clone());
        run.base_branch = Some(base.clone());
        Ok(base)
    }

    async fn implement_loop(&self, run: &mut PipelineRun) -> Result<StageResult> {
        let job = run.job.clone();
        if job.create_repo {
            self.gateway
                .ensure_repo_exists(&job.owner, &job.repo, job.private)
                .await?;
        }
        let base = self.base_branch(run).await?;
        let branch = job.branch_name();
        let workspace = run.workspace.clone();

        if tokio::fs::try_exists(&workspace).await? {
            tokio::fs::remove_dir_all(&workspace).await?;
        }
        tokio::fs::create_dir_all(&workspace).await?;

        self.gateway
            .clone_repo(
                &job.owner,
                &job.repo,
                &self.settings.credential,
                &workspace,
                &run.scope.with_log("clone"),
            )
            .await?;
        self.gateway
            .create_branch(&workspace, &branch, &run.scope.with_log("branch"))
            .await?;

        let copied =
            apply_template(&self.settings.templates_dir.join(&job.template), &workspace).await?;
        debug!(job_id = %job.id, files = copied, template = %job.template, "Template applied");
        append_task_to_readme(&workspace, &job.task).await?;

        run.validation_ok = self.validate(run).await?;

        let mut message = format!("landit: apply {} template\n\nTask: {}", job.template, job.task);
        if let Some(co) = &self.settings.co_author {
            message.push_str(&format!("\n\nCo-authored-by: {} <{}>", co.name, co.email));
        }
        let changed = self
            .gateway
            .stage_and_commit(
                &workspace,
                &message,
                &self.settings.author,
                &run.scope.with_log("git_commit"),
            )
            .await?;

        let checkpoint = Checkpoint::new(Stage::ImplementLoop.as_str())
            .with("changed", changed)
            .with("branch", branch.clone())
            .with("base", base.clone());
        let summary = json!({
            "changed": changed,
            "branch": branch,
            "base": base,
            "workspace": workspace.display().to_string(),
            "validation_ok": run.validation_ok,
        });
        let patch = JobPatch::new().result(Stage::ImplementLoop.as_str(), summary);

        if !changed {
            info!(job_id = %job.id, "No changes produced");
            return Ok(StageResult {
                checkpoint,
                patch,
                halt: Some(Outcome::NoChanges),
            });
        }
        Ok(StageResult {
            checkpoint,
            patch,
            halt: None,
        })
    }

    /// Run the configured validation commands. Failures are logged, not fatal.
    async fn validate(&self, run: &PipelineRun) -> Result<bool> {
        let mut ok = true;
        for argv in &self.settings.validation {
            let Some(spec) = CommandSpec::from_argv(argv) else {
                continue;
            };
            let spec = spec.current_dir(&run.workspace);
            let shown = spec.display();
            if let Err(e) = self
                .executor
                .run(&run.scope.with_log("validation"), spec)
                .await
            {
                ok = false;
                warn!(job_id = %run.job.id, command = %shown, error = %e, "Local validation failed");
                self.sink
                    .append(run.job.id, VALIDATION_WARN_LOG, &format!("{shown}: {e}"))
                    .await?;
            }
        }
        Ok(ok)
    }

    async fn integration(&self, run: &mut PipelineRun) -> Result<StageResult> {
        let base = self.base_branch(run).await?;
        let branch = run.job.branch_name();
        self.gateway
            .push(
                &run.workspace,
                &branch,
                &self.settings.credential,
                &run.scope.with_log("git_push"),
            )
            .await?;
        self.sink
            .write(
                run.job.id,
                reports::INTEGRATION_REPORT,
                &reports::integration_report(&branch, &base, run.validation_ok),
            )
            .await?;
        Ok(StageResult::advance(
            Checkpoint::new(Stage::Integration.as_str()).with("branch", branch),
        ))
    }

    async fn pr_ci_gate(&self, run: &mut PipelineRun) -> Result<StageResult> {
        let base = self.base_branch(run).await?;
        let branch = run.job.branch_name();
        let target = CiTarget {
            job: &run.job,
            branch: &branch,
            base: &base,
            workspace: &run.workspace,
            scope: &run.scope,
            credential: &self.settings.credential,
            author: &self.settings.author,
        };
        let report = CiGate::new(
            self.gateway.as_ref(),
            self.sink.as_ref(),
            &self.settings.ci,
            &self.shutdown,
        )
        .run(&target)
        .await?;

        let checkpoint = Checkpoint::new(Stage::PrCiGate.as_str())
            .with("ci", report.outcome.as_str())
            .with("pr_url", report.pr_url.clone());
        let patch = JobPatch::new()
            .pr_url(report.pr_url.clone())
            .ci_status(report.outcome.as_str())
            .result(Stage::PrCiGate.as_str(), serde_json::to_value(&report)?);
        run.ci = Some(report);
        Ok(StageResult {
            checkpoint,
            patch,
            halt: None,
        })
    }

    async fn release_artifacts(&self, run: &mut PipelineRun) -> Result<StageResult> {
        let ci = run
            .ci
            .clone()
            .ok_or_else(|| Error::Internal("release_artifacts before pr_ci_gate".to_string()))?;
        let job = &run.job;
        let required = &self.settings.ci.required_check;

        self.sink
            .write(job.id, reports::FINAL_SUMMARY, &reports::final_summary(job, &ci))
            .await?;
        self.sink
            .write(job.id, reports::TEST_REPORT, &reports::test_report(required, &ci))
            .await?;
        self.sink
            .write(
                job.id,
                reports::SECURITY_NOTES,
                &reports::security_notes(&self.settings.protected_branches),
            )
            .await?;

        Ok(StageResult::advance(
            Checkpoint::new(Stage::ReleaseArtifacts.as_str())
                .with("ci", ci.outcome.as_str())
                .with("pr_url", ci.pr_url.clone()),
        ))
    }
}

async fn append_task_to_readme(workspace: &std::path::Path, task: &str) -> Result<()> {
    let readme = workspace.join("README.md");
    let mut content = if tokio::fs::try_exists(&readme).await? {
        tokio::fs::read_to_string(&readme).await?
    } else {
        String::new()
    };
    content.push_str(&format!("\n\nTask: {task}\n"));
    tokio::fs::write(&readme, content).await?;
    Ok(())
}
