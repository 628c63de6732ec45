//! Error types for triage-core

use std::time::Duration;

use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Other(String),
}

/// SQLite primary result codes that signal lock contention.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

impl Error {
    pub(crate) fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Error::NotFound(format!("{entity} '{id}'"))
    }

    /// Whether this error is a collision with another writer.
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Conflict(_) => true,
            Error::Database(sqlx::Error::Database(db_err)) => db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
            _ => false,
        }
    }

    /// Whether the caller may retry the failed operation unchanged.
    pub fn is_retryable(&self) -> bool {
        self.is_conflict()
            || matches!(
                self,
                Error::Timeout(_) | Error::Database(sqlx::Error::PoolTimedOut)
            )
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type alias using Error.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_formats_entity_and_id() {
        let err = Error::not_found("agent", "a-1");
        assert_eq!(err.to_string(), "Not found: agent 'a-1'");
    }

    #[test]
    fn conflict_and_timeout_are_retryable() {
        assert!(Error::Conflict("agent row".into()).is_retryable());
        assert!(Error::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(Error::Database(sqlx::Error::PoolTimedOut).is_retryable());
    }

    #[test]
    fn domain_errors_are_not_retryable() {
        assert!(!Error::NotFound("conversation 'x'".into()).is_retryable());
        assert!(!Error::InvalidInput("blank".into()).is_retryable());
        assert!(!Error::Database(sqlx::Error::RowNotFound).is_conflict());
    }
}
