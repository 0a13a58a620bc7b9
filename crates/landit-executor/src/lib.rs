//! Command execution boundary for landit.
//!
//! Every subprocess the worker starts goes through [`PolicyExecutor`]:
//! - the allowlist and protected-branch guard decide before anything spawns
//! - output is captured, logged to the artifact sink and redacted
//! - the privilege guard keeps the worker from running as root
//!
//! Artifact sinks live here too since they share the redaction rules.

pub mod artifacts;
pub mod local;
pub mod policy;
pub mod privilege;
pub mod process;
pub mod redact;

pub use artifacts::{FsArtifactSink, MemoryArtifactSink};
pub use local::PolicyExecutor;
pub use policy::CommandPolicy;
pub use privilege::{ensure_not_root, ensure_unprivileged};
pub use process::{ProcessOutput, ProcessRunner, TokioProcessRunner};
pub use redact::Redactor;
