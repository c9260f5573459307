//! Error types shared across the synchronization crates.
//!
//! - [`ParseError`]: a definition's bytes could not be turned into an
//!   [`ArtifactDefinition`](crate::ArtifactDefinition).
//! - [`StorageError`]: a collaborator (artifact store, SQL executor) failed.
//! - [`SourceError`]: a definition source could not list or load content.

use thiserror::Error;

use crate::ValidationError;

/// Failure to parse a definition.
///
/// The engine treats parse errors as per-artifact failures; the pass keeps
/// going for every other definition.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The location's extension does not map to a known artifact kind.
    #[error("unsupported definition type: {0}")]
    UnsupportedKind(String),

    /// The file is not valid UTF-8.
    #[error("definition is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    /// The JSON document is malformed or has the wrong shape.
    #[error("malformed definition: {0}")]
    Json(#[from] serde_json::Error),

    /// A schema structure has an unknown `type`.
    #[error("unknown structure type '{kind}' in schema {schema}")]
    UnknownStructure {
        /// Name of the schema.
        schema: String,
        /// The unrecognized structure type.
        kind: String,
    },

    /// A schema foreign key references a table not declared in the schema.
    #[error("foreign key {name} targets unknown table {table}")]
    DanglingForeignKey {
        /// Foreign key name.
        name: String,
        /// The owning table that could not be found.
        table: String,
    },

    /// A data operation location has no usable file stem.
    #[error("cannot derive target table from location: {0}")]
    MissingTarget(String),

    /// The parsed definition violates a structural rule.
    #[error("invalid definition: {0}")]
    Invalid(#[from] ValidationError),
}

/// Failure reported by an artifact store or SQL executor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The backend rejected the operation.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// An operation targeted a table that does not exist.
    #[error("table does not exist: {0}")]
    MissingTable(String),

    /// The requested change cannot be expressed by this backend.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// The operation is refused because of the data it would affect.
    #[error("{0}")]
    Rejected(String),
}

/// Failure reported by a definition source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The underlying content could not be read.
    #[error("I/O error at {location}: {source}")]
    Io {
        /// The location being read.
        location: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// No content exists at the location.
    #[error("definition not found: {0}")]
    NotFound(String),
}

/// Convenience alias for results with [`ParseError`].
pub type Result<T> = std::result::Result<T, ParseError>;

/// Convenience alias for results with [`StorageError`].
pub type StorageResult<T> = std::result::Result<T, StorageError>;
