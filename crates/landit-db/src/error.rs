//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    /// A stored value that does not map back onto the domain vocabulary.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

impl From<DbError> for landit_core::Error {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => landit_core::Error::NotFound(what),
            DbError::Duplicate(what) => landit_core::Error::AlreadyExists(what),
            other => landit_core::Error::Internal(other.to_string()),
        }
    }
}

pub type DbResult<T> = std::result::Result<T, DbError>;
