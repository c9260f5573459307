//! Collaborator traits.
//!
//! The reconciliation engine talks to the outside world only through these
//! traits:
//!
//! - [`DefinitionSource`]: lists and loads raw definition bytes from the
//!   predelivered and registry roots.
//! - [`ArtifactStore`]: the durable location → name → hash record of
//!   previously synchronized artifacts.
//! - [`SqlExecutor`]: dialect-specific DDL and DML.
//! - [`ProblemSink`]: fire-and-forget problem reporting.
//!
//! All methods take `&self`; implementations that need mutation use
//! interior mutability or a database connection.

use serde::{Deserialize, Serialize};

use crate::error::{SourceError, StorageResult};
use crate::{ArtifactKind, ArtifactRecord, Row, TableDefinition, ViewDefinition};

/// Supplies raw definition bytes by location.
pub trait DefinitionSource {
    /// Locations of predelivered definitions of `kind`.
    fn list_predelivered(&self, kind: ArtifactKind) -> Result<Vec<String>, SourceError>;

    /// Locations of registry definitions of `kind`.
    fn list_registry(&self, kind: ArtifactKind) -> Result<Vec<String>, SourceError>;

    /// Raw bytes of the definition at `location`.
    fn load(&self, location: &str) -> Result<Vec<u8>, SourceError>;
}

/// Durable record of previously synchronized artifacts.
pub trait ArtifactStore {
    /// Record stored at `location`, if any.
    fn get(&self, location: &str) -> StorageResult<Option<ArtifactRecord>>;

    /// Returns `true` if a record exists at `location`.
    fn exists(&self, location: &str) -> StorageResult<bool> {
        Ok(self.get(location)?.is_some())
    }

    /// Records of `kind` named `name`.
    fn find_by_name(&self, kind: ArtifactKind, name: &str) -> StorageResult<Vec<ArtifactRecord>>;

    /// Inserts a new record.
    fn create(&self, record: &ArtifactRecord) -> StorageResult<()>;

    /// Replaces the record at `record.location`.
    fn update(&self, record: &ArtifactRecord) -> StorageResult<()>;

    /// Removes the record at `location`.
    fn remove(&self, location: &str) -> StorageResult<()>;

    /// Every record of `kind`, ordered by location.
    fn list_all(&self, kind: ArtifactKind) -> StorageResult<Vec<ArtifactRecord>>;
}

/// A column as it exists in the live database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    /// Column name.
    pub name: String,
    /// Declared type, upper-cased.
    pub data_type: String,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether the column is part of the primary key.
    pub primary_key: bool,
}

/// A table as it exists in the live database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveTable {
    /// Table name.
    pub name: String,
    /// Columns in table order.
    pub columns: Vec<LiveColumn>,
}

impl LiveTable {
    /// Primary key column names, in key order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Dialect-specific DDL and DML.
///
/// Every call is its own short unit of work; no transaction spans more
/// than one call.
pub trait SqlExecutor {
    /// Returns `true` if a table named `name` exists.
    fn table_exists(&self, name: &str) -> StorageResult<bool>;

    /// Returns `true` if a view named `name` exists.
    fn view_exists(&self, name: &str) -> StorageResult<bool>;

    /// Number of rows in `table`.
    fn row_count(&self, table: &str) -> StorageResult<u64>;

    /// Live structure of `table`.
    fn describe_table(&self, table: &str) -> StorageResult<LiveTable>;

    /// Creates a table (without its foreign keys).
    fn create_table(&self, table: &TableDefinition) -> StorageResult<()>;

    /// Alters an existing table in place towards `table`.
    fn alter_table(&self, table: &TableDefinition) -> StorageResult<()>;

    /// Drops a table.
    fn drop_table(&self, name: &str) -> StorageResult<()>;

    /// Creates the foreign keys declared by `table` that do not exist yet.
    fn create_foreign_keys(&self, table: &TableDefinition) -> StorageResult<()>;

    /// Drops every foreign key owned by table `name`.
    fn drop_foreign_keys(&self, name: &str) -> StorageResult<()>;

    /// Creates a view.
    fn create_view(&self, view: &ViewDefinition) -> StorageResult<()>;

    /// Drops a view.
    fn drop_view(&self, name: &str) -> StorageResult<()>;

    /// Inserts rows in live column order; returns the number inserted.
    fn insert_rows(&self, table: &str, rows: &[Row]) -> StorageResult<usize>;

    /// Deletes every row; returns the number deleted.
    fn delete_all_rows(&self, table: &str) -> StorageResult<usize>;

    /// Deletes every row and inserts `rows` as one unit of work; returns the
    /// number inserted. On failure the previous content is kept.
    fn replace_rows(&self, table: &str, rows: &[Row]) -> StorageResult<usize>;

    /// Deletes rows whose `key_column` equals one of `keys`.
    fn delete_rows_by_key(&self, table: &str, key_column: &str, keys: &[String])
    -> StorageResult<usize>;

    /// Row whose `key_column` equals `key`, in live column order.
    fn select_row_by_key(&self, table: &str, key_column: &str, key: &str)
    -> StorageResult<Option<Row>>;

    /// Raises the identity counter of `table` to at least `at_least` and
    /// returns the stored value.
    fn advance_identity(&self, table: &str, at_least: i64) -> StorageResult<i64>;
}

/// A problem surfaced to observability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Problem {
    /// Location of the affected definition.
    pub location: String,
    /// Short error category (e.g. `PARSE`, `CONFLICT`, `DDL`).
    pub error_type: String,
    /// Human-readable description.
    pub message: String,
    /// Kind of the affected artifact, when known.
    pub kind: Option<ArtifactKind>,
}

impl Problem {
    /// Creates a problem.
    pub fn new(
        location: &str,
        error_type: &str,
        message: impl Into<String>,
        kind: Option<ArtifactKind>,
    ) -> Self {
        Self {
            location: location.to_string(),
            error_type: error_type.to_string(),
            message: message.into(),
            kind,
        }
    }
}

/// Receives problems; reporting never fails the caller.
pub trait ProblemSink {
    /// Reports one problem.
    fn report(&self, problem: &Problem);
}

/// Reports to both sinks, first `A` then `B`.
impl<A: ProblemSink, B: ProblemSink> ProblemSink for (A, B) {
    fn report(&self, problem: &Problem) {
        self.0.report(problem);
        self.1.report(problem);
    }
}

impl<T: ProblemSink + ?Sized> ProblemSink for &T {
    fn report(&self, problem: &Problem) {
        (**self).report(problem);
    }
}

impl<T: DefinitionSource + ?Sized> DefinitionSource for &T {
    fn list_predelivered(&self, kind: ArtifactKind) -> Result<Vec<String>, SourceError> {
        (**self).list_predelivered(kind)
    }

    fn list_registry(&self, kind: ArtifactKind) -> Result<Vec<String>, SourceError> {
        (**self).list_registry(kind)
    }

    fn load(&self, location: &str) -> Result<Vec<u8>, SourceError> {
        (**self).load(location)
    }
}

impl<T: ArtifactStore + ?Sized> ArtifactStore for &T {
    fn get(&self, location: &str) -> StorageResult<Option<ArtifactRecord>> {
        (**self).get(location)
    }

    fn find_by_name(&self, kind: ArtifactKind, name: &str) -> StorageResult<Vec<ArtifactRecord>> {
        (**self).find_by_name(kind, name)
    }

    fn create(&self, record: &ArtifactRecord) -> StorageResult<()> {
        (**self).create(record)
    }

    fn update(&self, record: &ArtifactRecord) -> StorageResult<()> {
        (**self).update(record)
    }

    fn remove(&self, location: &str) -> StorageResult<()> {
        (**self).remove(location)
    }

    fn list_all(&self, kind: ArtifactKind) -> StorageResult<Vec<ArtifactRecord>> {
        (**self).list_all(kind)
    }
}

impl<T: SqlExecutor + ?Sized> SqlExecutor for &T {
    fn table_exists(&self, name: &str) -> StorageResult<bool> {
        (**self).table_exists(name)
    }

    fn view_exists(&self, name: &str) -> StorageResult<bool> {
        (**self).view_exists(name)
    }

    fn row_count(&self, table: &str) -> StorageResult<u64> {
        (**self).row_count(table)
    }

    fn describe_table(&self, table: &str) -> StorageResult<LiveTable> {
        (**self).describe_table(table)
    }

    fn create_table(&self, table: &TableDefinition) -> StorageResult<()> {
        (**self).create_table(table)
    }

    fn alter_table(&self, table: &TableDefinition) -> StorageResult<()> {
        (**self).alter_table(table)
    }

    fn drop_table(&self, name: &str) -> StorageResult<()> {
        (**self).drop_table(name)
    }

    fn create_foreign_keys(&self, table: &TableDefinition) -> StorageResult<()> {
        (**self).create_foreign_keys(table)
    }

    fn drop_foreign_keys(&self, name: &str) -> StorageResult<()> {
        (**self).drop_foreign_keys(name)
    }

    fn create_view(&self, view: &ViewDefinition) -> StorageResult<()> {
        (**self).create_view(view)
    }

    fn drop_view(&self, name: &str) -> StorageResult<()> {
        (**self).drop_view(name)
    }

    fn insert_rows(&self, table: &str, rows: &[Row]) -> StorageResult<usize> {
        (**self).insert_rows(table, rows)
    }

    fn delete_all_rows(&self, table: &str) -> StorageResult<usize> {
        (**self).delete_all_rows(table)
    }

    fn replace_rows(&self, table: &str, rows: &[Row]) -> StorageResult<usize> {
        (**self).replace_rows(table, rows)
    }

    fn delete_rows_by_key(
        &self,
        table: &str,
        key_column: &str,
        keys: &[String],
    ) -> StorageResult<usize> {
        (**self).delete_rows_by_key(table, key_column, keys)
    }

    fn select_row_by_key(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
    ) -> StorageResult<Option<Row>> {
        (**self).select_row_by_key(table, key_column, key)
    }

    fn advance_identity(&self, table: &str, at_least: i64) -> StorageResult<i64> {
        (**self).advance_identity(table, at_least)
    }
}
