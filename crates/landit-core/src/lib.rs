//! Core domain types and traits for landit.
//!
//! This crate contains:
//! - Job identifiers and the job record (status, stage, checkpoints)
//! - The job store contract shared by every persistence backend
//! - Command specifications and captured invocations
//! - The VCS/hosting gateway and artifact sink traits
//! - The error taxonomy used across the workspace

pub mod artifact;
pub mod command;
pub mod error;
pub mod gateway;
pub mod id;
pub mod job;
pub mod store;

pub use error::{Error, Result};
pub use id::JobId;
pub use job::{Checkpoint, Job, JobPatch, JobStatus, Stage};
