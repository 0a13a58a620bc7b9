//! Error types for landit.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A command was blocked by the execution policy.
    #[error("policy violation: {0}")]
    PolicyViolation(String),

    /// An allowed command exited unsuccessfully.
    #[error("{program} failed (rc={}): {output}", code.map_or_else(|| "none".to_string(), |c| c.to_string()))]
    ExternalToolFailure {
        program: String,
        code: Option<i32>,
        output: String,
    },

    /// Hosting API or network failure that may succeed on a later attempt.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the CI poll loop may retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientNetwork(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(format!("io: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(format!("json: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Truncate `text` to at most `max` characters, respecting char boundaries.
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
