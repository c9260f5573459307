//! Artifact records in the `{prefix}artifacts` table.
//!
//! # Example
//!
//! ```no_run
//! use schema_sync_core::{ArtifactKind, ArtifactRecord, ArtifactStore};
//! use schema_sync_sqlite::{Migration, SqliteArtifactStore};
//! use rusqlite::Connection;
//!
//! let conn = Connection::open("app.db").unwrap();
//! Migration::new(&conn, "sync_").unwrap().up().unwrap();
//!
//! let store = SqliteArtifactStore::new(&conn, "sync_").unwrap();
//! let record = ArtifactRecord {
//!     location: "/app/orders.table".into(),
//!     name: "ORDERS".into(),
//!     kind: ArtifactKind::Table,
//!     hash: "abc".into(),
//! };
//! store.create(&record).unwrap();
//! assert!(store.exists("/app/orders.table").unwrap());
//! ```

use rusqlite::{Connection, OptionalExtension, Row, params};
use schema_sync_core::{ArtifactKind, ArtifactRecord, ArtifactStore, StorageResult};

use crate::error::{Result, SqliteError};
use crate::schema::validate_prefix;

/// [`ArtifactStore`] backed by the prefixed artifacts table.
///
/// The inherent methods return [`SqliteError`]; the trait implementation
/// maps them into storage errors.
pub struct SqliteArtifactStore<'a> {
    conn: &'a Connection,
    prefix: String,
}

impl<'a> SqliteArtifactStore<'a> {
    /// Creates a store for the given connection and table prefix.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidPrefix`] if the prefix is invalid.
    pub fn new(conn: &'a Connection, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        Ok(Self { conn, prefix })
    }

    fn table(&self) -> String {
        format!("{}artifacts", self.prefix)
    }

    /// Loads the record at `location`.
    pub fn get_record(&self, location: &str) -> Result<Option<ArtifactRecord>> {
        let sql = format!(
            "SELECT location, name, kind, hash FROM {} WHERE location = ?1",
            self.table()
        );
        let raw = self
            .conn
            .query_row(&sql, params![location], raw_record)
            .optional()?;
        raw.map(into_record).transpose()
    }

    /// Loads every record of `kind` named `name`, ignoring ASCII case.
    pub fn records_named(&self, kind: ArtifactKind, name: &str) -> Result<Vec<ArtifactRecord>> {
        let sql = format!(
            "SELECT location, name, kind, hash FROM {} WHERE kind = ?1 AND name = ?2 COLLATE NOCASE ORDER BY location",
            self.table()
        );
        self.collect(&sql, params![kind.as_str(), name])
    }

    /// Loads every record of `kind`, ordered by location.
    pub fn records_of(&self, kind: ArtifactKind) -> Result<Vec<ArtifactRecord>> {
        let sql = format!(
            "SELECT location, name, kind, hash FROM {} WHERE kind = ?1 ORDER BY location",
            self.table()
        );
        self.collect(&sql, params![kind.as_str()])
    }

    /// Inserts a new record.
    pub fn insert_record(&self, record: &ArtifactRecord) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO {} (location, name, kind, hash) VALUES (?1, ?2, ?3, ?4)",
                self.table()
            ),
            params![record.location, record.name, record.kind.as_str(), record.hash],
        )?;
        Ok(())
    }

    /// Replaces the name, kind and hash of an existing record.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::RecordNotFound`] if nothing is stored at the location.
    pub fn update_record(&self, record: &ArtifactRecord) -> Result<()> {
        let rows = self.conn.execute(
            &format!(
                "UPDATE {} SET name = ?2, kind = ?3, hash = ?4, updated_at = datetime('now') \
                 WHERE location = ?1",
                self.table()
            ),
            params![record.location, record.name, record.kind.as_str(), record.hash],
        )?;
        if rows == 0 {
            return Err(SqliteError::RecordNotFound(record.location.clone()));
        }
        Ok(())
    }

    /// Deletes the record at `location`; a missing record is not an error.
    pub fn delete_record(&self, location: &str) -> Result<()> {
        self.conn.execute(
            &format!("DELETE FROM {} WHERE location = ?1", self.table()),
            params![location],
        )?;
        Ok(())
    }

    fn collect(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<ArtifactRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let raws = stmt
            .query_map(params, raw_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        raws.into_iter().map(into_record).collect()
    }
}

type RawRecord = (String, String, String, String);

fn raw_record(row: &Row<'_>) -> rusqlite::Result<RawRecord> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_record((location, name, kind, hash): RawRecord) -> Result<ArtifactRecord> {
    let kind = ArtifactKind::from_name(&kind)
        .ok_or_else(|| SqliteError::ConversionError(format!("unknown artifact kind: {kind}")))?;
    Ok(ArtifactRecord {
        location,
        name,
        kind,
        hash,
    })
}

impl ArtifactStore for SqliteArtifactStore<'_> {
    fn get(&self, location: &str) -> StorageResult<Option<ArtifactRecord>> {
        Ok(self.get_record(location)?)
    }

    fn find_by_name(&self, kind: ArtifactKind, name: &str) -> StorageResult<Vec<ArtifactRecord>> {
        Ok(self.records_named(kind, name)?)
    }

    fn create(&self, record: &ArtifactRecord) -> StorageResult<()> {
        Ok(self.insert_record(record)?)
    }

    fn update(&self, record: &ArtifactRecord) -> StorageResult<()> {
        Ok(self.update_record(record)?)
    }

    fn remove(&self, location: &str) -> StorageResult<()> {
        Ok(self.delete_record(location)?)
    }

    fn list_all(&self, kind: ArtifactKind) -> StorageResult<Vec<ArtifactRecord>> {
        Ok(self.records_of(kind)?)
    }
}
