//! Definition sources backed by directories or memory.
//!
//! Both sources expose two provenances: predelivered (built-in, read-only)
//! and registry (user-supplied). Locations are logical, slash-separated
//! paths rooted at `/`, so the same file present in both roots has the same
//! location; [`DefinitionSource::load`] prefers the registry copy.
//!
//! # Examples
//!
//! ```no_run
//! use schema_sync_core::{ArtifactKind, DefinitionSource};
//! use schema_sync_db::DirectorySource;
//!
//! let source = DirectorySource::new()
//!     .with_predelivered("/opt/app/builtin")
//!     .with_registry("/var/lib/app/registry");
//!
//! for location in source.list_registry(ArtifactKind::Table).unwrap() {
//!     let bytes = source.load(&location).unwrap();
//!     println!("{location}: {} bytes", bytes.len());
//! }
//! ```

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use schema_sync_core::{ArtifactKind, DefinitionSource, SourceError};

/// Reads definitions from a predelivered root and a registry root.
#[derive(Debug, Clone, Default)]
pub struct DirectorySource {
    predelivered: Option<PathBuf>,
    registry: Option<PathBuf>,
}

impl DirectorySource {
    /// Creates a source with no roots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the predelivered root directory.
    pub fn with_predelivered(mut self, root: impl Into<PathBuf>) -> Self {
        self.predelivered = Some(root.into());
        self
    }

    /// Sets the registry root directory.
    pub fn with_registry(mut self, root: impl Into<PathBuf>) -> Self {
        self.registry = Some(root.into());
        self
    }

    /// The predelivered root, if configured.
    pub fn predelivered_root(&self) -> Option<&Path> {
        self.predelivered.as_deref()
    }

    /// The registry root, if configured.
    pub fn registry_root(&self) -> Option<&Path> {
        self.registry.as_deref()
    }

    fn scan(root: Option<&Path>, kind: ArtifactKind) -> Result<Vec<String>, SourceError> {
        let Some(root) = root else {
            return Ok(Vec::new());
        };
        if !root.is_dir() {
            return Ok(Vec::new());
        }
        let mut locations = Vec::new();
        walk(root, root, kind, &mut locations)?;
        locations.sort();
        Ok(locations)
    }
}

fn walk(
    root: &Path,
    dir: &Path,
    kind: ArtifactKind,
    out: &mut Vec<String>,
) -> Result<(), SourceError> {
    let io_err = |source| SourceError::Io {
        location: dir.display().to_string(),
        source,
    };
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() {
            walk(root, &path, kind, out)?;
            continue;
        }
        let Ok(relative) = path.strip_prefix(root) else {
            continue;
        };
        let location = to_location(relative);
        if location.ends_with(kind.extension()) {
            out.push(location);
        }
    }
    Ok(())
}

fn to_location(relative: &Path) -> String {
    let mut location = String::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            location.push('/');
            location.push_str(&part.to_string_lossy());
        }
    }
    location
}

/// Maps a logical location to a path under `root`, refusing anything that
/// would escape the root.
fn resolve(root: &Path, location: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    for part in location.split('/').filter(|p| !p.is_empty()) {
        if part == "." || part == ".." {
            return None;
        }
        path.push(part);
    }
    Some(path)
}

impl DefinitionSource for DirectorySource {
    fn list_predelivered(&self, kind: ArtifactKind) -> Result<Vec<String>, SourceError> {
        Self::scan(self.predelivered.as_deref(), kind)
    }

    fn list_registry(&self, kind: ArtifactKind) -> Result<Vec<String>, SourceError> {
        Self::scan(self.registry.as_deref(), kind)
    }

    fn load(&self, location: &str) -> Result<Vec<u8>, SourceError> {
        let roots = [self.registry.as_deref(), self.predelivered.as_deref()];
        for root in roots.into_iter().flatten() {
            let Some(path) = resolve(root, location) else {
                return Err(SourceError::NotFound(location.to_string()));
            };
            match std::fs::read(&path) {
                Ok(bytes) => return Ok(bytes),
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(SourceError::Io {
                        location: location.to_string(),
                        source,
                    });
                }
            }
        }
        Err(SourceError::NotFound(location.to_string()))
    }
}

/// In-memory definition source.
///
/// Content can be added and removed through `&self`, so a source shared
/// with a running synchronizer can be edited between passes.
///
/// # Examples
///
/// ```
/// use schema_sync_core::{ArtifactKind, DefinitionSource};
/// use schema_sync_db::MemorySource;
///
/// let source = MemorySource::new();
/// source.put_predelivered("/core/users.table", b"{}".to_vec());
/// source.put_registry("/core/users.table", b"{ }".to_vec());
///
/// assert_eq!(source.list_registry(ArtifactKind::Table).unwrap().len(), 1);
/// assert_eq!(source.load("/core/users.table").unwrap(), b"{ }");
/// ```
#[derive(Debug, Default)]
pub struct MemorySource {
    predelivered: RwLock<BTreeMap<String, Vec<u8>>>,
    registry: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemorySource {
    /// Creates an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces predelivered content.
    pub fn put_predelivered(&self, location: &str, bytes: impl Into<Vec<u8>>) {
        write(&self.predelivered).insert(location.to_string(), bytes.into());
    }

    /// Adds or replaces registry content.
    pub fn put_registry(&self, location: &str, bytes: impl Into<Vec<u8>>) {
        write(&self.registry).insert(location.to_string(), bytes.into());
    }

    /// Removes `location` from both provenances; returns `true` if anything
    /// was removed.
    pub fn remove(&self, location: &str) -> bool {
        let predelivered = write(&self.predelivered).remove(location).is_some();
        let registry = write(&self.registry).remove(location).is_some();
        predelivered || registry
    }

    fn list(map: &RwLock<BTreeMap<String, Vec<u8>>>, kind: ArtifactKind) -> Vec<String> {
        map.read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .filter(|location| location.ends_with(kind.extension()))
            .cloned()
            .collect()
    }
}

fn write(
    map: &RwLock<BTreeMap<String, Vec<u8>>>,
) -> std::sync::RwLockWriteGuard<'_, BTreeMap<String, Vec<u8>>> {
    map.write().unwrap_or_else(PoisonError::into_inner)
}

impl DefinitionSource for MemorySource {
    fn list_predelivered(&self, kind: ArtifactKind) -> Result<Vec<String>, SourceError> {
        Ok(Self::list(&self.predelivered, kind))
    }

    fn list_registry(&self, kind: ArtifactKind) -> Result<Vec<String>, SourceError> {
        Ok(Self::list(&self.registry, kind))
    }

    fn load(&self, location: &str) -> Result<Vec<u8>, SourceError> {
        for map in [&self.registry, &self.predelivered] {
            let map = map.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(bytes) = map.get(location) {
                return Ok(bytes.clone());
            }
        }
        Err(SourceError::NotFound(location.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_location_uses_forward_slashes() {
        let relative = Path::new("sales").join("orders.table");
        assert_eq!(to_location(&relative), "/sales/orders.table");
    }

    #[test]
    fn test_resolve_rejects_parent_components() {
        let root = Path::new("/srv/registry");
        assert!(resolve(root, "/../etc/passwd.table").is_none());
        assert_eq!(
            resolve(root, "/a/b.view"),
            Some(PathBuf::from("/srv/registry/a/b.view"))
        );
    }

    #[test]
    fn test_memory_source_lists_by_kind() {
        let source = MemorySource::new();
        source.put_registry("/b.table", "{}");
        source.put_registry("/a.table", "{}");
        source.put_registry("/a.view", "{}");

        assert_eq!(
            source.list_registry(ArtifactKind::Table).unwrap(),
            vec!["/a.table".to_string(), "/b.table".to_string()]
        );
        assert!(source.list_predelivered(ArtifactKind::Table).unwrap().is_empty());
    }

    #[test]
    fn test_memory_source_remove() {
        let source = MemorySource::new();
        source.put_predelivered("/x.append", "1|a");
        assert!(source.remove("/x.append"));
        assert!(!source.remove("/x.append"));
        assert!(matches!(
            source.load("/x.append"),
            Err(SourceError::NotFound(_))
        ));
    }

    #[test]
    fn test_unconfigured_directory_source_is_empty() {
        let source = DirectorySource::new();
        assert!(source.list_registry(ArtifactKind::View).unwrap().is_empty());
        assert!(matches!(
            source.load("/missing.view"),
            Err(SourceError::NotFound(_))
        ));
    }
}
