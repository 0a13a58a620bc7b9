//! Job records, status and stage vocabulary.
//!
//! The string forms of [`JobStatus`] and [`Stage`] are an external contract:
//! status-polling clients match on them verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{Error, JobId, Result};

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    CancelRequested,
    Cancelled,
    Done,
    CiFailed,
    Failed,
    NoChanges,
}

impl JobStatus {
    pub const ALL: [JobStatus; 8] = [
        JobStatus::Queued,
        JobStatus::Running,
        JobStatus::CancelRequested,
        JobStatus::Cancelled,
        JobStatus::Done,
        JobStatus::CiFailed,
        JobStatus::Failed,
        JobStatus::NoChanges,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::CancelRequested => "cancel_requested",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Done => "done",
            JobStatus::CiFailed => "ci_failed",
            JobStatus::Failed => "failed",
            JobStatus::NoChanges => "no_changes",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Cancelled
                | JobStatus::Done
                | JobStatus::CiFailed
                | JobStatus::Failed
                | JobStatus::NoChanges
        )
    }

    /// Whether a store may move a job from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Queued, Running | CancelRequested) => true,
            (Running, Running | CancelRequested) => true,
            (CancelRequested, CancelRequested | Cancelled) => true,
            (Running | CancelRequested, Done | CiFailed | Failed | NoChanges) => true,
            _ => false,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown job status: {s}")))
    }
}

/// Pipeline stage of a job.
///
/// Variants are declared in pipeline order, so the derived `Ord` is the
/// forward ordering the engine enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Never claimed by a worker.
    Queued,
    Preflight,
    SpecFreeze,
    Architecture,
    TicketPlanning,
    ImplementLoop,
    Integration,
    PrCiGate,
    ReleaseArtifacts,
    /// Parked after a CI wait timed out; resumable.
    Waiting,
}

impl Stage {
    /// The stages a pipeline run executes, in order.
    pub const PIPELINE: [Stage; 8] = [
        Stage::Preflight,
        Stage::SpecFreeze,
        Stage::Architecture,
        Stage::TicketPlanning,
        Stage::ImplementLoop,
        Stage::Integration,
        Stage::PrCiGate,
        Stage::ReleaseArtifacts,
    ];

    const ALL: [Stage; 10] = [
        Stage::Queued,
        Stage::Preflight,
        Stage::SpecFreeze,
        Stage::Architecture,
        Stage::TicketPlanning,
        Stage::ImplementLoop,
        Stage::Integration,
        Stage::PrCiGate,
        Stage::ReleaseArtifacts,
        Stage::Waiting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Queued => "queued",
            Stage::Preflight => "preflight",
            Stage::SpecFreeze => "spec_freeze",
            Stage::Architecture => "architecture",
            Stage::TicketPlanning => "ticket_planning",
            Stage::ImplementLoop => "implement_loop",
            Stage::Integration => "integration",
            Stage::PrCiGate => "pr_ci_gate",
            Stage::ReleaseArtifacts => "release_artifacts",
            Stage::Waiting => "waiting",
        }
    }

    /// The stage that follows `self` in the pipeline, if any.
    pub fn next(&self) -> Option<Stage> {
        let pos = Stage::PIPELINE.iter().position(|s| s == self)?;
        Stage::PIPELINE.get(pos + 1).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("unknown stage: {s}")))
    }
}

/// One end-to-end scaffold-and-land request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub trace_id: String,
    pub owner: String,
    pub repo: String,
    pub task: String,
    pub template: String,
    /// Repository visibility when the repository has to be created.
    pub private: bool,
    /// Create the repository when it does not exist yet.
    pub create_repo: bool,
    pub stage: Stage,
    pub status: JobStatus,
    /// Model/config snapshot taken at preflight.
    pub model: Value,
    pub pr_url: Option<String>,
    pub ci_status: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Per-stage results keyed by stage name.
    pub result: BTreeMap<String, Value>,
}

impl Job {
    /// A fresh queued job.
    pub fn new(
        owner: impl Into<String>,
        repo: impl Into<String>,
        task: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        let id = JobId::new();
        let now = Utc::now();
        Self {
            id,
            trace_id: id.trace_id(),
            owner: owner.into(),
            repo: repo.into(),
            task: task.into(),
            template: template.into(),
            private: true,
            create_repo: true,
            stage: Stage::Queued,
            status: JobStatus::Queued,
            model: Value::Object(Default::default()),
            pr_url: None,
            ci_status: None,
            error: None,
            created_at: now,
            updated_at: now,
            result: BTreeMap::new(),
        }
    }

    /// `owner/repo`.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }

    /// Working branch pushed for this job.
    pub fn branch_name(&self) -> String {
        format!("landit/{}", self.id.short())
    }

    /// Apply a patch in place. Validates the status transition and that the
    /// stage never moves backwards, but leaves `updated_at` to the caller.
    pub fn apply(&mut self, patch: &JobPatch) -> Result<()> {
        if let Some(stage) = patch.stage.filter(|stage| *stage < self.stage) {
            return Err(Error::Conflict(format!(
                "job {}: stage cannot move back from {} to {}",
                self.id, self.stage, stage
            )));
        }
        if let Some(status) = patch.status {
            if status != self.status && !self.status.can_transition_to(status) {
                return Err(Error::Conflict(format!(
                    "job {}: invalid status transition {} -> {}",
                    self.id, self.status, status
                )));
            }
            self.status = status;
        }
        if let Some(stage) = patch.stage {
            self.stage = stage;
        }
        if let Some(model) = &patch.model {
            self.model = model.clone();
        }
        if let Some(pr_url) = &patch.pr_url {
            self.pr_url = Some(pr_url.clone());
        }
        if let Some(ci_status) = &patch.ci_status {
            self.ci_status = Some(ci_status.clone());
        }
        if let Some(error) = &patch.error {
            self.error = Some(error.clone());
        }
        for (key, value) in &patch.result {
            self.result.insert(key.clone(), value.clone());
        }
        Ok(())
    }
}

/// Partial update merged into a job by [`crate::store::JobStore::update`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub stage: Option<Stage>,
    pub model: Option<Value>,
    pub pr_url: Option<String>,
    pub ci_status: Option<String>,
    pub error: Option<String>,
    /// Entries merged into the job's result map.
    pub result: BTreeMap<String, Value>,
}

impl JobPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn model(mut self, model: Value) -> Self {
        self.model = Some(model);
        self
    }

    pub fn pr_url(mut self, pr_url: impl Into<String>) -> Self {
        self.pr_url = Some(pr_url.into());
        self
    }

    pub fn ci_status(mut self, ci_status: impl Into<String>) -> Self {
        self.ci_status = Some(ci_status.into());
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn result(mut self, key: impl Into<String>, value: Value) -> Self {
        self.result.insert(key.into(), value);
        self
    }
}

/// Immutable record marking the completion of a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub ts: DateTime<Utc>,
    pub stage: String,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Checkpoint {
    pub fn new(stage: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            stage: stage.into(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Pretty JSON with sorted keys.
    pub fn to_json(&self) -> Result<String> {
        // Collect into a BTreeMap so the flattened extras sort with the fixed fields.
        let sorted: BTreeMap<String, Value> = serde_json::from_value(serde_json::to_value(self)?)?;
        Ok(serde_json::to_string_pretty(&sorted)?)
    }
}
