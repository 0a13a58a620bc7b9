//! GitHub API errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GitHubError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),
}

impl GitHubError {
    /// Whether retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            GitHubError::Request(_) => true,
            GitHubError::Api { status, .. } => *status == 429 || *status >= 500,
            GitHubError::Parse(_) => false,
        }
    }
}

impl From<GitHubError> for landit_core::Error {
    fn from(err: GitHubError) -> Self {
        if err.is_transient() {
            return landit_core::Error::TransientNetwork(err.to_string());
        }
        match err {
            GitHubError::Api { status, message } => landit_core::Error::ExternalToolFailure {
                program: "github".to_string(),
                code: Some(i32::from(status)),
                output: message,
            },
            other => landit_core::Error::ExternalToolFailure {
                program: "github".to_string(),
                code: None,
                output: other.to_string(),
            },
        }
    }
}
