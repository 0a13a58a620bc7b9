//! KDL configuration parsing for landit.
//!
//! This crate handles parsing of:
//! - Worker settings (paths, poll cadence, command timeout)
//! - Hosting credentials and git identity
//! - CI gate and model snapshot settings
//! - The command policy (allowlist, protected branches, redaction rules)

pub mod error;
mod kdl_ext;
pub mod policy;
pub mod worker;

pub use error::{ConfigError, ConfigResult};
pub use policy::{AllowRule, PolicySettings, RedactionRule};
pub use worker::{
    CiSettings, GitHubSettings, GitSettings, LanditConfig, ModelSettings, WorkerSettings,
    parse_config,
};
