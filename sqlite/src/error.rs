//! Error types for SQLite synchronization operations.
//!
//! Provides a unified error type covering database access, DDL generation,
//! migration, and validation failures. At the collaborator-trait boundary
//! every [`SqliteError`] is converted into a
//! [`StorageError`](schema_sync_core::StorageError).

use schema_sync_core::StorageError;
use thiserror::Error;

/// Errors that can occur during SQLite operations.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// Stored value could not be converted back into a Rust type.
    #[error("conversion error: {0}")]
    ConversionError(String),

    /// Migration lifecycle operation failure.
    #[error("migration error: {0}")]
    MigrationError(String),

    /// Table prefix contains invalid characters.
    #[error("invalid prefix '{0}': must contain only alphanumeric characters and underscores")]
    InvalidPrefix(String),

    /// Operation targeted a table that does not exist.
    #[error("table does not exist: {0}")]
    MissingTable(String),

    /// No artifact record exists at the location.
    #[error("no artifact record at: {0}")]
    RecordNotFound(String),

    /// The change cannot be applied in place by SQLite.
    #[error("unsupported change: {0}")]
    Unsupported(String),

    /// Payload does not fit the live table.
    #[error("payload rejected: {0}")]
    PayloadRejected(String),
}

impl From<SqliteError> for StorageError {
    fn from(err: SqliteError) -> Self {
        match err {
            SqliteError::MissingTable(table) => StorageError::MissingTable(table),
            SqliteError::Unsupported(message) => StorageError::Unsupported(message),
            other @ (SqliteError::RecordNotFound(_) | SqliteError::PayloadRejected(_)) => {
                StorageError::Rejected(other.to_string())
            }
            other => StorageError::Backend(other.to_string()),
        }
    }
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;
