//! Lifecycle operations for the bookkeeping tables.
//!
//! Provides [`Migration`] for creating and dropping the prefixed
//! artifact, identity and problem tables, and for reporting their state.
//! Mutations run inside a transaction.
//!
//! # Example
//!
//! ```no_run
//! use schema_sync_sqlite::Migration;
//! use rusqlite::Connection;
//!
//! let conn = Connection::open("app.db").unwrap();
//! let migration = Migration::new(&conn, "sync_").unwrap();
//!
//! migration.up().unwrap();
//!
//! let status = migration.status().unwrap();
//! assert!(status.tables_exist);
//! ```

use rusqlite::Connection;
use tracing::debug;

use crate::error::{Result, SqliteError};
use crate::schema::{TABLES, generate_drop_sql, generate_schema_sql, validate_prefix};

/// Manages the lifecycle of the bookkeeping tables.
///
/// [`up`](Self::up) is safe to call before every pass; the tables are
/// created with `IF NOT EXISTS`.
pub struct Migration<'a> {
    conn: &'a Connection,
    prefix: String,
}

impl<'a> Migration<'a> {
    /// Creates a migration manager for the given connection and table prefix.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidPrefix`] if the prefix contains invalid characters.
    pub fn new(conn: &'a Connection, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        Ok(Self { conn, prefix })
    }

    /// The table prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Creates all bookkeeping tables and indexes.
    pub fn up(&self) -> Result<()> {
        let sql = generate_schema_sql(&self.prefix)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(&sql)
            .map_err(|e| SqliteError::MigrationError(format!("failed to create tables: {e}")))?;
        tx.commit()?;
        debug!(prefix = %self.prefix, "bookkeeping tables ready");
        Ok(())
    }

    /// Drops all bookkeeping tables.
    ///
    /// Synchronized user tables are left untouched.
    pub fn down(&self) -> Result<()> {
        let sql = generate_drop_sql(&self.prefix)?;
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(&sql)
            .map_err(|e| SqliteError::MigrationError(format!("failed to drop tables: {e}")))?;
        tx.commit()?;
        debug!(prefix = %self.prefix, "bookkeeping tables dropped");
        Ok(())
    }

    /// Returns whether the tables exist and how many rows each holds.
    pub fn status(&self) -> Result<MigrationStatus> {
        if !self.tables_exist()? {
            return Ok(MigrationStatus::default());
        }

        Ok(MigrationStatus {
            tables_exist: true,
            artifact_count: self.count_rows("artifacts")?,
            identity_count: self.count_rows("identity")?,
            problem_count: self.count_rows("problems")?,
        })
    }

    /// Checks whether every bookkeeping table exists.
    fn tables_exist(&self) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1")?;
        for table in TABLES {
            let count: i64 = stmt.query_row([format!("{}{table}", self.prefix)], |row| row.get(0))?;
            if count == 0 {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn count_rows(&self, table: &str) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}{table}", self.prefix),
            [],
            |row| row.get(0),
        )?;
        usize::try_from(count).map_err(|e| SqliteError::ConversionError(e.to_string()))
    }
}

/// Snapshot of the bookkeeping tables, returned by [`Migration::status`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Whether every bookkeeping table exists.
    pub tables_exist: bool,
    /// Number of artifact records.
    pub artifact_count: usize,
    /// Number of identity counters.
    pub identity_count: usize,
    /// Number of recorded problems.
    pub problem_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migration_new_validates_prefix() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(Migration::new(&conn, "valid_prefix_").is_ok());
        assert!(Migration::new(&conn, "").is_err());
        assert!(Migration::new(&conn, "drop;--").is_err());
    }

    #[test]
    fn test_status_on_empty_database() {
        let conn = Connection::open_in_memory().unwrap();
        let migration = Migration::new(&conn, "sync_").unwrap();
        let status = migration.status().unwrap();
        assert!(!status.tables_exist);
        assert_eq!(status.artifact_count, 0);
    }

    #[test]
    fn test_up_and_status() {
        let conn = Connection::open_in_memory().unwrap();
        let migration = Migration::new(&conn, "sync_").unwrap();
        migration.up().unwrap();
        let status = migration.status().unwrap();
        assert!(status.tables_exist);
        assert_eq!(status.artifact_count, 0);
        assert_eq!(status.problem_count, 0);
    }

    #[test]
    fn test_up_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let migration = Migration::new(&conn, "sync_").unwrap();
        migration.up().unwrap();
        migration.up().unwrap();
        assert!(migration.status().unwrap().tables_exist);
    }

    #[test]
    fn test_down_removes_tables() {
        let conn = Connection::open_in_memory().unwrap();
        let migration = Migration::new(&conn, "sync_").unwrap();
        migration.up().unwrap();
        migration.down().unwrap();
        assert!(!migration.status().unwrap().tables_exist);
    }

    #[test]
    fn test_down_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let migration = Migration::new(&conn, "sync_").unwrap();
        migration.down().unwrap();
    }

    #[test]
    fn test_prefixes_are_isolated() {
        let conn = Connection::open_in_memory().unwrap();
        Migration::new(&conn, "a_").unwrap().up().unwrap();
        assert!(!Migration::new(&conn, "b_").unwrap().status().unwrap().tables_exist);
    }
}
