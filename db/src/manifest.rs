//! JSON manifest of synchronized artifacts.
//!
//! [`ManifestStore`] is an [`ArtifactStore`] that keeps the
//! location → name → hash records in a single pretty-printed JSON file.
//! Every mutation rewrites the file, so the manifest on disk always reflects
//! the last completed record operation. A SHA-256 checksum over the records
//! is stored alongside them and verified on load to catch manual edits.
//!
//! # Examples
//!
//! ```no_run
//! use schema_sync_core::{ArtifactKind, ArtifactRecord, ArtifactStore};
//! use schema_sync_db::ManifestStore;
//!
//! let store = ManifestStore::load("records.json").unwrap();
//! store.create(&ArtifactRecord {
//!     location: "/sales/orders.table".into(),
//!     name: "ORDERS".into(),
//!     kind: ArtifactKind::Table,
//!     hash: "ab12".into(),
//! }).unwrap();
//!
//! let reloaded = ManifestStore::load("records.json").unwrap();
//! assert!(reloaded.exists("/sales/orders.table").unwrap());
//! ```

use std::collections::BTreeMap;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{SecondsFormat, Utc};
use schema_sync_core::{ArtifactKind, ArtifactRecord, ArtifactStore, StorageError, StorageResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{DatabaseError, Result};

/// Manifest format version written by this crate.
pub const MANIFEST_VERSION: &str = "1.0";

/// On-disk manifest document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Manifest format version.
    pub version: String,
    /// RFC 3339 timestamp of the last update.
    pub updated_at: String,
    /// SHA-256 hex digest of the serialized `records`.
    pub checksum: String,
    /// Records keyed by location.
    pub records: BTreeMap<String, ArtifactRecord>,
}

impl Manifest {
    /// Creates an empty manifest.
    pub fn new() -> Self {
        let mut manifest = Self {
            version: MANIFEST_VERSION.to_string(),
            updated_at: now_rfc3339(),
            checksum: String::new(),
            records: BTreeMap::new(),
        };
        manifest.checksum = manifest.calculate_checksum();
        manifest
    }

    /// Computes the SHA-256 hex digest of the records.
    pub fn calculate_checksum(&self) -> String {
        let bytes = serde_json::to_vec(&self.records).unwrap_or_default();
        format!("{:x}", Sha256::digest(&bytes))
    }

    /// Checks the checksum and that every record is keyed by its location.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidChecksum`](DatabaseError::InvalidChecksum) or
    /// [`InvalidManifest`](DatabaseError::InvalidManifest).
    pub fn verify(&self) -> Result<()> {
        let actual = self.calculate_checksum();
        if actual != self.checksum {
            return Err(DatabaseError::InvalidChecksum(format!(
                "expected {}, found {actual}",
                self.checksum
            )));
        }
        if let Some((key, record)) = self.records.iter().find(|(k, r)| **k != r.location) {
            return Err(DatabaseError::InvalidManifest(format!(
                "record keyed {key} has location {}",
                record.location
            )));
        }
        Ok(())
    }

    fn touch(&mut self) {
        self.updated_at = now_rfc3339();
        self.checksum = self.calculate_checksum();
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new()
    }
}

/// Artifact store persisted as a JSON manifest file.
#[derive(Debug)]
pub struct ManifestStore {
    path: Option<PathBuf>,
    manifest: Mutex<Manifest>,
}

impl ManifestStore {
    /// Creates a store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            manifest: Mutex::new(Manifest::new()),
        }
    }

    /// Opens the manifest at `path`, starting empty if the file does not
    /// exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](DatabaseError::IoError) or
    /// [`JsonError`](DatabaseError::JsonError) if an existing file cannot be
    /// read, and the errors of [`Manifest::verify`] if it was tampered with.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let manifest = if path.exists() {
            let file = std::fs::File::open(path)?;
            let manifest: Manifest = serde_json::from_reader(BufReader::new(file))?;
            manifest.verify()?;
            manifest
        } else {
            Manifest::new()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            manifest: Mutex::new(manifest),
        })
    }

    /// Writes the manifest to its file, if it has one.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](DatabaseError::IoError) if the file cannot be
    /// written, or [`JsonError`](DatabaseError::JsonError) if serialization
    /// fails.
    pub fn save(&self) -> Result<()> {
        let manifest = self.lock();
        self.write(&manifest)
    }

    /// A copy of the current manifest document.
    pub fn snapshot(&self) -> Manifest {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Manifest> {
        self.manifest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, manifest: &Manifest) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, manifest)?;
        Ok(())
    }

    fn mutate(&self, change: impl FnOnce(&mut Manifest) -> StorageResult<()>) -> StorageResult<()> {
        let mut manifest = self.lock();
        change(&mut *manifest)?;
        manifest.touch();
        self.write(&*manifest)?;
        Ok(())
    }
}

impl ArtifactStore for ManifestStore {
    fn get(&self, location: &str) -> StorageResult<Option<ArtifactRecord>> {
        Ok(self.lock().records.get(location).cloned())
    }

    fn find_by_name(&self, kind: ArtifactKind, name: &str) -> StorageResult<Vec<ArtifactRecord>> {
        Ok(self
            .lock()
            .records
            .values()
            .filter(|r| r.kind == kind && r.name.eq_ignore_ascii_case(name))
            .cloned()
            .collect())
    }

    fn create(&self, record: &ArtifactRecord) -> StorageResult<()> {
        self.mutate(|manifest| {
            if manifest.records.contains_key(&record.location) {
                return Err(StorageError::Rejected(format!(
                    "record already exists: {}",
                    record.location
                )));
            }
            manifest
                .records
                .insert(record.location.clone(), record.clone());
            Ok(())
        })
    }

    fn update(&self, record: &ArtifactRecord) -> StorageResult<()> {
        self.mutate(|manifest| match manifest.records.get_mut(&record.location) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(StorageError::Rejected(format!(
                "no record at {}",
                record.location
            ))),
        })
    }

    fn remove(&self, location: &str) -> StorageResult<()> {
        self.mutate(|manifest| {
            manifest.records.remove(location);
            Ok(())
        })
    }

    fn list_all(&self, kind: ArtifactKind) -> StorageResult<Vec<ArtifactRecord>> {
        Ok(self
            .lock()
            .records
            .values()
            .filter(|r| r.kind == kind)
            .cloned()
            .collect())
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
