//! Error types for LabStock

use thiserror::Error;

/// Result type alias using LabStock's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Postgres SQLSTATE for a unique constraint violation
const UNIQUE_VIOLATION: &str = "23505";

/// Error types for LabStock operations
#[derive(Error, Debug)]
pub enum Error {
    /// A stock adjustment would drive the quantity below zero
    #[error("Invalid adjustment: cannot apply {delta} to part {part_id} with {available} in stock")]
    InvalidAdjustment {
        part_id: String,
        delta: i32,
        available: i32,
    },

    /// Transient persistence failure, eligible for retry
    #[error("Repository unavailable: {0}")]
    RepositoryUnavailable(String),

    /// Not found error
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A uniqueness rule was violated by a concurrent writer
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create a not found error
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Create an invalid adjustment error
    pub fn invalid_adjustment(part_id: impl ToString, delta: i32, available: i32) -> Self {
        Self::InvalidAdjustment {
            part_id: part_id.to_string(),
            delta,
            available,
        }
    }

    /// Create a repository unavailable error
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::RepositoryUnavailable(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether retrying the same call later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RepositoryUnavailable(_))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::not_found("row", "unknown"),
            sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
                Self::Conflict(db.message().to_string())
            }
            _ => Self::RepositoryUnavailable(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::RepositoryUnavailable(format!("Migration failed: {err}"))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unavailable_is_retryable() {
        assert!(Error::unavailable("connection reset").is_retryable());
        assert!(!Error::not_found("Part", "42").is_retryable());
        assert!(!Error::invalid_adjustment("42", -20, 5).is_retryable());
        assert!(!Error::Conflict("dup".into()).is_retryable());
    }

    #[test]
    fn test_sqlx_pool_errors_map_to_unavailable() {
        let err: Error = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, Error::RepositoryUnavailable(_)));

        let err: Error = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_invalid_adjustment_message() {
        let err = Error::invalid_adjustment("abc", -20, 5);
        assert_eq!(
            err.to_string(),
            "Invalid adjustment: cannot apply -20 to part abc with 5 in stock"
        );
    }
}
