//! VCS and hosting gateway for landit.
//!
//! - [`GitHubClient`]: the GitHub REST calls the pipeline needs
//! - [`GitCli`]: local git operations, routed through the command policy
//! - [`GitHubGateway`]: both combined behind [`landit_core::gateway::VcsGateway`]

pub mod askpass;
pub mod error;
pub mod gateway;
pub mod git;
pub mod github;

pub use askpass::AskPass;
pub use error::GitHubError;
pub use gateway::GitHubGateway;
pub use git::GitCli;
pub use github::GitHubClient;
