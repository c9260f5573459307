//! Error types for definition sources, configuration and manifests.
//!
//! Provides a unified error type covering all failure modes: I/O,
//! serialization, configuration validation and manifest integrity.

use schema_sync_core::StorageError;
use thiserror::Error;

/// Errors that can occur while reading or writing local files.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Configuration validation failure (e.g., empty version, bad prefix).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Manifest validation failure (e.g., duplicate or inconsistent records).
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    /// Checksum mismatch between expected and actual values.
    #[error("invalid checksum: {0}")]
    InvalidChecksum(String),
}

impl From<DatabaseError> for StorageError {
    fn from(err: DatabaseError) -> Self {
        StorageError::Backend(err.to_string())
    }
}

/// Convenience alias for results with [`DatabaseError`].
pub type Result<T> = std::result::Result<T, DatabaseError>;
