//! Job execution for landit.
//!
//! - [`PipelineEngine`] walks a claimed job through the fixed stage sequence
//! - [`ci_gate`] opens the pull request and waits on the required check
//! - [`Worker`] claims jobs one at a time and records terminal statuses
//! - [`JobService`] is the submission side: enqueue, status, cancel

pub mod ci_gate;
pub mod pipeline;
pub mod reports;
pub mod service;
pub mod template;
pub mod worker;

pub use ci_gate::{CiGate, CiOutcome, CiReport};
pub use pipeline::{Outcome, PipelineEngine, PipelineRun, PipelineSettings, PipelineState};
pub use service::{JobRequest, JobService};
pub use worker::Worker;
