//! Definition sources, pass configuration and manifest records.
//!
//! This crate provides the file-system side of schema synchronization:
//!
//! - [`DirectorySource`] / [`MemorySource`]: [`DefinitionSource`]
//!   implementations with predelivered and registry provenances.
//! - [`SyncConfig`]: YAML configuration of a synchronization setup.
//! - [`ManifestStore`]: an [`ArtifactStore`] persisted as a JSON manifest.
//!
//! # Quick start
//!
//! ```no_run
//! use schema_sync_core::{ArtifactKind, DefinitionSource};
//! use schema_sync_db::{ManifestStore, SyncConfig};
//!
//! let config = SyncConfig::load("schema-sync.yml").unwrap();
//! let source = config.source();
//! let tables = source.list_registry(ArtifactKind::Table).unwrap();
//! println!("{} registry tables", tables.len());
//!
//! if let Some(path) = &config.manifest {
//!     let store = ManifestStore::load(path).unwrap();
//!     println!("{} records", store.snapshot().records.len());
//! }
//! ```
//!
//! [`DefinitionSource`]: schema_sync_core::DefinitionSource
//! [`ArtifactStore`]: schema_sync_core::ArtifactStore

mod config;
mod error;
mod manifest;
mod source;

pub use config::{DEFAULT_PREFIX, SyncConfig};
pub use error::{DatabaseError, Result};
pub use manifest::{MANIFEST_VERSION, Manifest, ManifestStore};
pub use source::{DirectorySource, MemorySource};
