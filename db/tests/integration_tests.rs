use std::path::Path;

use schema_sync_core::{ArtifactKind, ArtifactRecord, ArtifactStore, DefinitionSource};
use schema_sync_db::{DatabaseError, DirectorySource, ManifestStore, SyncConfig};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

fn record(location: &str, name: &str, kind: ArtifactKind, hash: &str) -> ArtifactRecord {
    ArtifactRecord {
        location: location.into(),
        name: name.into(),
        kind,
        hash: hash.into(),
    }
}

// ---------------------------------------------------------------------------
// Directory source
// ---------------------------------------------------------------------------

#[test]
fn test_directory_source_lists_recursively_by_kind() {
    let dir = tempfile::tempdir().unwrap();
    let registry = dir.path().join("registry");
    write_file(&registry, "sales/orders.table", "{}");
    write_file(&registry, "sales/customers.table", "{}");
    write_file(&registry, "sales/reports/totals.view", "{}");
    write_file(&registry, "sales/ORDERS.append", "1|2");
    write_file(&registry, "README.md", "ignored");

    let source = DirectorySource::new().with_registry(&registry);

    assert_eq!(
        source.list_registry(ArtifactKind::Table).unwrap(),
        vec![
            "/sales/customers.table".to_string(),
            "/sales/orders.table".to_string()
        ]
    );
    assert_eq!(
        source.list_registry(ArtifactKind::View).unwrap(),
        vec!["/sales/reports/totals.view".to_string()]
    );
    assert_eq!(source.list_registry(ArtifactKind::Append).unwrap().len(), 1);
    assert!(source.list_predelivered(ArtifactKind::Table).unwrap().is_empty());
}

#[test]
fn test_directory_source_registry_wins_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let builtin = dir.path().join("builtin");
    let registry = dir.path().join("registry");
    write_file(&builtin, "core/users.table", "builtin");
    write_file(&builtin, "core/roles.table", "builtin roles");
    write_file(&registry, "core/users.table", "registry");

    let source = DirectorySource::new()
        .with_predelivered(&builtin)
        .with_registry(&registry);

    assert_eq!(source.load("/core/users.table").unwrap(), b"registry");
    assert_eq!(source.load("/core/roles.table").unwrap(), b"builtin roles");
    assert!(source.load("/core/missing.table").is_err());
}

#[test]
fn test_directory_source_missing_root_is_empty() {
    let source = DirectorySource::new().with_registry("/nonexistent/schema-sync/registry");
    assert!(source.list_registry(ArtifactKind::Table).unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Manifest store
// ---------------------------------------------------------------------------

#[test]
fn test_manifest_store_persists_across_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.json");

    let store = ManifestStore::load(&path).unwrap();
    store
        .create(&record("/a.table", "A", ArtifactKind::Table, "h1"))
        .unwrap();
    store
        .create(&record("/b.view", "B", ArtifactKind::View, "h2"))
        .unwrap();
    store.remove("/b.view").unwrap();

    let reloaded = ManifestStore::load(&path).unwrap();
    assert!(reloaded.exists("/a.table").unwrap());
    assert!(!reloaded.exists("/b.view").unwrap());
    assert_eq!(
        reloaded.get("/a.table").unwrap(),
        Some(record("/a.table", "A", ArtifactKind::Table, "h1"))
    );
}

#[test]
fn test_manifest_store_rejects_tampered_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.json");

    let store = ManifestStore::load(&path).unwrap();
    store
        .create(&record("/a.table", "A", ArtifactKind::Table, "h1"))
        .unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, content.replace("\"h1\"", "\"h9\"")).unwrap();

    assert!(matches!(
        ManifestStore::load(&path),
        Err(DatabaseError::InvalidChecksum(_))
    ));
}

// ---------------------------------------------------------------------------
// Config workflow
// ---------------------------------------------------------------------------

#[test]
fn test_config_builds_directory_source() {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), "registry/a.table", "{}");
    write_file(dir.path(), "builtin/b.table", "{}");
    let yaml = r#"
version: "1.0"
database: app.db
predelivered: builtin
registry: registry
"#;
    let path = dir.path().join("schema-sync.yml");
    std::fs::write(&path, yaml).unwrap();

    let config = SyncConfig::load(&path).unwrap();
    let source = config.source();
    assert_eq!(
        source.list_registry(ArtifactKind::Table).unwrap(),
        vec!["/a.table".to_string()]
    );
    assert_eq!(
        source.list_predelivered(ArtifactKind::Table).unwrap(),
        vec!["/b.table".to_string()]
    );
}

#[test]
fn test_config_rejects_empty_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("schema-sync.yml");
    std::fs::write(&path, "version: ''\ndatabase: app.db\n").unwrap();
    assert!(matches!(
        SyncConfig::load(&path),
        Err(DatabaseError::InvalidConfig(_))
    ));
}
