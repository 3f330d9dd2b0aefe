//! Error types for the PostgreSQL storage backend.

use intake_storage::StorageError;
use sqlx_core::error::Error as SqlxError;

/// PostgreSQL error code for foreign key violations (23503).
pub const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

/// PostgreSQL error code for unique violations (23505).
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// PostgreSQL error code for check constraint violations (23514).
pub const PG_CHECK_VIOLATION: &str = "23514";

/// Checks if a sqlx error has a specific PostgreSQL error code.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

/// Checks if a sqlx error is an integrity constraint violation.
pub fn is_constraint_violation(err: &SqlxError) -> bool {
    [
        PG_FOREIGN_KEY_VIOLATION,
        PG_UNIQUE_VIOLATION,
        PG_CHECK_VIOLATION,
    ]
    .iter()
    .any(|code| has_pg_error_code(err, code))
}

/// Maps a driver error onto the store contract, prefixing `context`.
pub(crate) fn map_sqlx_error(err: SqlxError, context: &str) -> StorageError {
    if is_constraint_violation(&err) {
        let message = match &err {
            SqlxError::Database(db_err) => db_err.message().to_string(),
            other => other.to_string(),
        };
        return StorageError::constraint_violation(format!("{context}: {message}"));
    }
    match err {
        SqlxError::PoolTimedOut | SqlxError::PoolClosed | SqlxError::Io(_) => {
            StorageError::connection_error(format!("{context}: {err}"))
        }
        _ => StorageError::internal(format!("{context}: {err}")),
    }
}

/// Errors specific to the PostgreSQL storage backend.
#[derive(Debug, thiserror::Error)]
pub enum PostgresError {
    /// Database connection error.
    #[error("Database connection error: {0}")]
    Connection(#[from] sqlx_core::error::Error),

    /// Schema bootstrap error.
    #[error("Schema error: {0}")]
    Schema(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PostgresError {
    /// Creates a new configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

impl From<PostgresError> for StorageError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::Connection(e) => StorageError::connection_error(e.to_string()),
            PostgresError::Schema(e) => StorageError::internal(format!("Schema error: {e}")),
            PostgresError::Config { message } => {
                StorageError::internal(format!("Configuration error: {message}"))
            }
        }
    }
}

/// Result type alias for PostgreSQL operations.
pub type Result<T> = std::result::Result<T, PostgresError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PostgresError::config("invalid URL");
        assert!(err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_conversion_to_storage_error() {
        let pg_err = PostgresError::config("test error");
        let storage_err: StorageError = pg_err.into();
        assert!(matches!(storage_err, StorageError::Internal { .. }));
    }

    #[test]
    fn test_map_sqlx_error_classifies_pool_failures() {
        let err = map_sqlx_error(SqlxError::PoolTimedOut, "Failed to begin transaction");
        assert!(matches!(err, StorageError::ConnectionError { .. }));
        assert!(err.to_string().contains("Failed to begin transaction"));

        let err = map_sqlx_error(SqlxError::RowNotFound, "Failed to read member");
        assert!(matches!(err, StorageError::Internal { .. }));
    }
}
