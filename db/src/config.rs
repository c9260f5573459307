//! Synchronization pass configuration.
//!
//! Defines the YAML-serializable configuration that tells a pass where the
//! definitions live, which database to reconcile, and whether scheduled
//! passes are allowed to run.
//!
//! # Example YAML
//!
//! ```yaml
//! version: "1.0"
//! database: app.db
//! prefix: sync_
//! predelivered: /opt/app/builtin
//! registry: /var/lib/app/registry
//! enabled: true
//! report_problems: true
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, Result};
use crate::source::DirectorySource;

/// Default prefix for bookkeeping tables.
pub const DEFAULT_PREFIX: &str = "sync_";

/// Top-level synchronization configuration.
///
/// Loaded from a YAML file (typically `schema-sync.yml`) by the CLI; every
/// field except `version` and `database` has a default.
///
/// # Examples
///
/// ```
/// use schema_sync_db::SyncConfig;
///
/// let config: SyncConfig = serde_yaml::from_str("version: '1.0'\ndatabase: app.db\n").unwrap();
/// assert_eq!(config.prefix, "sync_");
/// assert!(config.enabled);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Configuration format version (e.g., `"1.0"`).
    pub version: String,
    /// Path of the SQLite database to reconcile.
    pub database: PathBuf,
    /// Prefix for the bookkeeping tables (artifacts, identity, problems).
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Root of the built-in, read-only definitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predelivered: Option<PathBuf>,
    /// Root of the user-supplied definitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<PathBuf>,
    /// Keep artifact records in this JSON manifest instead of the database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<PathBuf>,
    /// Whether scheduled passes run; forced passes ignore this flag.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Persist problems into the database in addition to logging them.
    #[serde(default = "default_true")]
    pub report_problems: bool,
}

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

fn default_true() -> bool {
    true
}

impl SyncConfig {
    /// Creates a configuration for `database` with defaults everywhere else.
    pub fn new(database: impl Into<PathBuf>) -> Self {
        Self {
            version: "1.0".to_string(),
            database: database.into(),
            prefix: default_prefix(),
            predelivered: None,
            registry: None,
            manifest: None,
            enabled: true,
            report_problems: true,
        }
    }

    /// Loads configuration from a YAML file and validates it.
    ///
    /// Relative paths inside the file are resolved against the file's
    /// directory.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::DatabaseError::IoError) if the file cannot
    /// be read, [`YamlError`](crate::DatabaseError::YamlError) if parsing
    /// fails, or [`InvalidConfig`](crate::DatabaseError::InvalidConfig) if
    /// validation fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut config: SyncConfig = serde_yaml::from_reader(reader)?;
        config.validate()?;
        if let Some(base) = path.parent() {
            config.resolve_relative(base);
        }
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::DatabaseError::IoError) if the file cannot
    /// be written, or [`YamlError`](crate::DatabaseError::YamlError) if
    /// serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Checks the version and the bookkeeping prefix.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidConfig`](crate::DatabaseError::InvalidConfig) when
    /// the version is empty or the prefix contains characters other than
    /// alphanumerics and underscores.
    pub fn validate(&self) -> Result<()> {
        if self.version.trim().is_empty() {
            return Err(DatabaseError::InvalidConfig(
                "version cannot be empty".to_string(),
            ));
        }
        if self.prefix.is_empty() || !self.prefix.chars().all(|c| c.is_alphanumeric() || c == '_')
        {
            return Err(DatabaseError::InvalidConfig(format!(
                "invalid prefix '{}': must contain only alphanumeric characters and underscores",
                self.prefix
            )));
        }
        Ok(())
    }

    /// Builds the directory source described by this configuration.
    pub fn source(&self) -> DirectorySource {
        let mut source = DirectorySource::new();
        if let Some(root) = &self.predelivered {
            source = source.with_predelivered(root);
        }
        if let Some(root) = &self.registry {
            source = source.with_registry(root);
        }
        source
    }

    fn resolve_relative(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.database);
        for path in [&mut self.predelivered, &mut self.registry, &mut self.manifest]
            .into_iter()
            .flatten()
        {
            resolve(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
version: "1.0"
database: data/app.db
prefix: app_sync_
predelivered: builtin
registry: /var/lib/registry
manifest: records.json
enabled: false
report_problems: false
"#
    }

    #[test]
    fn test_deserialize_complete() {
        let config: SyncConfig = serde_yaml::from_str(sample_yaml()).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.prefix, "app_sync_");
        assert_eq!(config.predelivered, Some(PathBuf::from("builtin")));
        assert_eq!(config.manifest, Some(PathBuf::from("records.json")));
        assert!(!config.enabled);
        assert!(!config.report_problems);
    }

    #[test]
    fn test_deserialize_minimal_uses_defaults() {
        let config: SyncConfig =
            serde_yaml::from_str("version: \"1.0\"\ndatabase: app.db\n").unwrap();
        assert_eq!(config, SyncConfig::new("app.db"));
    }

    #[test]
    fn test_validate_rejects_bad_prefix() {
        let mut config = SyncConfig::new("app.db");
        config.prefix = "drop table;".to_string();
        assert!(matches!(
            config.validate(),
            Err(DatabaseError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schema-sync.yml");
        std::fs::write(&path, sample_yaml()).unwrap();

        let config = SyncConfig::load(&path).unwrap();
        assert_eq!(config.database, dir.path().join("data/app.db"));
        assert_eq!(config.predelivered, Some(dir.path().join("builtin")));
        assert_eq!(config.registry, Some(PathBuf::from("/var/lib/registry")));
    }

    #[test]
    fn test_load_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");

        let mut original = SyncConfig::new("/tmp/app.db");
        original.registry = Some(PathBuf::from("/srv/registry"));
        original.enabled = false;
        original.save(&path).unwrap();

        let loaded = SyncConfig::load(&path).unwrap();
        assert_eq!(loaded, original);
    }
}
