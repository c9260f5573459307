//! Error types for the reconciliation engine.
//!
//! Per-artifact failures never surface as errors from a pass; they become
//! [`ArtifactState`](schema_sync_core::ArtifactState) entries and problems.
//! [`SyncError`] is reserved for failures that stop the whole pass.

use schema_sync_core::{ParseError, SourceError, StorageError};
use thiserror::Error;

/// A failure that aborts a reconciliation pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The definition source could not list its content.
    #[error("definition source failed: {0}")]
    Source(#[from] SourceError),

    /// The artifact store failed outside of per-artifact handling.
    #[error("artifact store failed: {0}")]
    Storage(#[from] StorageError),
}

/// Failure applying one bulk data operation.
#[derive(Debug, Error)]
pub enum ContentError {
    /// The SQL executor rejected a statement.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The payload could not be read.
    #[error("unreadable payload: {0}")]
    Payload(#[from] ParseError),

    /// Replace and append need at least one row.
    #[error("payload for {0} is empty")]
    EmptyPayload(String),

    /// Append only applies to an empty table.
    #[error("table {table} already holds {rows} rows; append applies only to an empty table")]
    NotEmpty {
        /// Target table.
        table: String,
        /// Rows currently in the table.
        rows: u64,
    },

    /// Key-based operations need exactly one primary key column.
    #[error("table {table} has {count} primary key columns; exactly one is required")]
    KeyShape {
        /// Target table.
        table: String,
        /// Number of primary key columns found.
        count: usize,
    },

    /// A payload row is too short to contain the primary key.
    #[error("row {row} of {table} has no value for primary key {key}")]
    MissingKey {
        /// Target table.
        table: String,
        /// 1-based payload row number.
        row: usize,
        /// Primary key column.
        key: String,
    },

    /// The target table was not synchronized in this pass.
    #[error("target table {0} failed to synchronize")]
    TargetUnavailable(String),
}

impl ContentError {
    /// Short category used for problem reports.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Storage(_) => "DML",
            Self::Payload(_) => "PARSE",
            Self::TargetUnavailable(_) => "DEPENDENCY",
            Self::EmptyPayload(_)
            | Self::NotEmpty { .. }
            | Self::KeyShape { .. }
            | Self::MissingKey { .. } => "CONTENT",
        }
    }
}

/// Convenience alias for results with [`SyncError`].
pub type Result<T> = std::result::Result<T, SyncError>;
