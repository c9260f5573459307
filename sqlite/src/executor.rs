//! DDL and DML against the live SQLite database.
//!
//! [`SqliteExecutor`] implements [`SqlExecutor`]. Every call is a short unit
//! of work; calls that run more than one statement wrap them in their own
//! transaction. Identifiers are matched case-insensitively, the way SQLite
//! resolves them.

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use schema_sync_core::{
    LiveColumn, LiveTable, Row, SqlExecutor, StorageResult, TableDefinition, ViewDefinition,
};
use tracing::debug;

use crate::ddl::{
    add_column_sql, create_table_sql, create_view_sql, drop_column_sql, foreign_key_triggers,
    index_sql, normalize_type, quote_ident, trigger_prefix,
};
use crate::error::{Result, SqliteError};
use crate::schema::validate_prefix;

/// [`SqlExecutor`] for SQLite.
///
/// # Examples
///
/// ```no_run
/// use schema_sync_core::{ColumnDefinition, TableDefinition};
/// use schema_sync_sqlite::SqliteExecutor;
/// use rusqlite::Connection;
///
/// let conn = Connection::open("app.db").unwrap();
/// let executor = SqliteExecutor::new(&conn, "sync_").unwrap();
///
/// let table = TableDefinition::new("ORDERS")
///     .with_column(ColumnDefinition::new("ID", "INTEGER").primary_key());
/// executor.add_table(&table).unwrap();
/// assert!(executor.has_table("ORDERS").unwrap());
/// ```
pub struct SqliteExecutor<'a> {
    conn: &'a Connection,
    prefix: String,
}

impl<'a> SqliteExecutor<'a> {
    /// Creates an executor for the given connection.
    ///
    /// The prefix names the identity table and the foreign key triggers.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidPrefix`] if the prefix is invalid.
    pub fn new(conn: &'a Connection, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        Ok(Self { conn, prefix })
    }

    fn object_exists(&self, object_type: &str, name: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2 COLLATE NOCASE",
            params![object_type, name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn require_table(&self, name: &str) -> Result<()> {
        if self.object_exists("table", name)? {
            Ok(())
        } else {
            Err(SqliteError::MissingTable(name.to_string()))
        }
    }

    /// Returns `true` if table `name` exists.
    pub fn has_table(&self, name: &str) -> Result<bool> {
        self.object_exists("table", name)
    }

    /// Returns `true` if view `name` exists.
    pub fn has_view(&self, name: &str) -> Result<bool> {
        self.object_exists("view", name)
    }

    /// Number of rows in `table`.
    pub fn count(&self, table: &str) -> Result<u64> {
        self.require_table(table)?;
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )?;
        u64::try_from(count).map_err(|e| SqliteError::ConversionError(e.to_string()))
    }

    /// Reads the live columns of `table` from `pragma_table_info`.
    pub fn describe(&self, table: &str) -> Result<LiveTable> {
        self.require_table(table)?;
        let mut stmt = self
            .conn
            .prepare("SELECT name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid")?;
        let columns = stmt
            .query_map([table], |row| {
                let data_type: String = row.get(1)?;
                Ok(LiveColumn {
                    name: row.get(0)?,
                    data_type: data_type.to_ascii_uppercase(),
                    nullable: row.get::<_, i64>(2)? == 0,
                    primary_key: row.get::<_, i64>(3)? > 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(LiveTable {
            name: table.to_string(),
            columns,
        })
    }

    fn run_all(&self, statements: &[String]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        for sql in statements {
            debug!(%sql, "executing");
            tx.execute_batch(sql)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Creates `table` and its indexes, without foreign keys.
    pub fn add_table(&self, table: &TableDefinition) -> Result<()> {
        self.run_all(&create_table_sql(table))
    }

    /// Alters `table` in place: adds new columns, drops removed ones and
    /// creates missing indexes.
    ///
    /// Every change is checked before any statement runs.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::Unsupported`] for changes SQLite cannot apply in
    /// place: a new key, unique or mandatory column without a default, a
    /// removed key column, or a changed type, nullability or key membership.
    pub fn alter(&self, table: &TableDefinition) -> Result<()> {
        let live = self.describe(&table.name)?;
        let mut statements = Vec::new();

        for column in &table.columns {
            let Some(current) = live
                .columns
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(&column.name))
            else {
                if column.primary_key || column.unique {
                    return Err(unsupported(table, &column.name, "new key or unique column"));
                }
                if !column.nullable && column.default_value.is_none() {
                    return Err(unsupported(
                        table,
                        &column.name,
                        "new NOT NULL column without a default",
                    ));
                }
                statements.push(add_column_sql(&table.name, column));
                continue;
            };

            if normalize_type(&column.sql_type()) != normalize_type(&current.data_type) {
                return Err(unsupported(table, &column.name, "type change"));
            }
            let nullable = column.nullable && !column.primary_key;
            if nullable != current.nullable {
                return Err(unsupported(table, &column.name, "nullability change"));
            }
            if column.primary_key != current.primary_key {
                return Err(unsupported(table, &column.name, "primary key change"));
            }
        }

        for current in &live.columns {
            if table.column(&current.name).is_some() {
                continue;
            }
            if current.primary_key {
                return Err(unsupported(table, &current.name, "primary key column removal"));
            }
            statements.push(drop_column_sql(&table.name, &current.name));
        }

        statements.extend(table.indexes.iter().map(|i| index_sql(&table.name, i)));
        self.run_all(&statements)
    }

    /// Drops the foreign key triggers of `name`, then the table itself.
    ///
    /// Dropping an absent table is a no-op.
    pub fn remove_table(&self, name: &str) -> Result<()> {
        self.remove_foreign_keys(name)?;
        if self.has_table(name)? {
            self.run_all(&[format!("DROP TABLE {}", quote_ident(name))])?;
        }
        Ok(())
    }

    /// Creates the triggers emulating every foreign key of `table`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::MissingTable`] if a referenced table is absent.
    pub fn add_foreign_keys(&self, table: &TableDefinition) -> Result<()> {
        let mut statements = Vec::new();
        for fk in table.foreign_keys() {
            self.require_table(&fk.referenced_table)?;
            statements.extend(
                foreign_key_triggers(&self.prefix, &table.name, fk)
                    .into_iter()
                    .map(|(_, sql)| sql),
            );
        }
        if statements.is_empty() {
            return Ok(());
        }
        self.run_all(&statements)
    }

    /// Drops every foreign key trigger owned by table `name`.
    pub fn remove_foreign_keys(&self, name: &str) -> Result<()> {
        let prefix = trigger_prefix(&self.prefix, name);
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master \
             WHERE type = 'trigger' AND substr(name, 1, length(?1)) = ?1 COLLATE NOCASE",
        )?;
        let statements = stmt
            .query_map([&prefix], |row| row.get::<_, String>(0))?
            .map(|name| name.map(|n| format!("DROP TRIGGER IF EXISTS {}", quote_ident(&n))))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if statements.is_empty() {
            return Ok(());
        }
        self.run_all(&statements)
    }

    /// Creates `view`.
    pub fn add_view(&self, view: &ViewDefinition) -> Result<()> {
        self.run_all(&[create_view_sql(view)])
    }

    /// Drops view `name`; dropping an absent view is a no-op.
    pub fn remove_view(&self, name: &str) -> Result<()> {
        if self.has_view(name)? {
            self.run_all(&[format!("DROP VIEW {}", quote_ident(name))])?;
        }
        Ok(())
    }

    /// Inserts `rows`, binding each field to the live column at its position.
    ///
    /// Columns past the end of a row take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::PayloadRejected`] if a row has more fields than
    /// the table has columns.
    pub fn insert(&self, table: &str, rows: &[Row]) -> Result<usize> {
        let live = self.describe(table)?;
        let tx = self.conn.unchecked_transaction()?;
        let inserted = insert_within(&tx, &live, rows)?;
        tx.commit()?;
        debug!(table, inserted, "rows inserted");
        Ok(inserted)
    }

    /// Deletes every row of `table` and inserts `rows` in one transaction.
    ///
    /// A rejected row rolls the delete back with it.
    pub fn replace(&self, table: &str, rows: &[Row]) -> Result<usize> {
        let live = self.describe(table)?;
        let tx = self.conn.unchecked_transaction()?;
        let removed = tx.execute(&format!("DELETE FROM {}", quote_ident(table)), [])?;
        let inserted = insert_within(&tx, &live, rows)?;
        tx.commit()?;
        debug!(table, removed, inserted, "table content replaced");
        Ok(inserted)
    }

    /// Deletes every row of `table`.
    pub fn clear(&self, table: &str) -> Result<usize> {
        self.require_table(table)?;
        Ok(self
            .conn
            .execute(&format!("DELETE FROM {}", quote_ident(table)), [])?)
    }

    /// Deletes rows whose `key_column` equals one of `keys`.
    pub fn delete_keys(&self, table: &str, key_column: &str, keys: &[String]) -> Result<usize> {
        self.require_table(table)?;
        let tx = self.conn.unchecked_transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare(&format!(
                "DELETE FROM {} WHERE {} = ?1",
                quote_ident(table),
                quote_ident(key_column)
            ))?;
            for key in keys {
                deleted += stmt.execute([key])?;
            }
        }
        tx.commit()?;
        Ok(deleted)
    }

    /// Row whose `key_column` equals `key`, every value rendered as text.
    pub fn find_by_key(&self, table: &str, key_column: &str, key: &str) -> Result<Option<Row>> {
        self.require_table(table)?;
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1 LIMIT 1",
            quote_ident(table),
            quote_ident(key_column)
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let width = stmt.column_count();
        let row = stmt
            .query_row([key], |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(render_value))
                    .collect::<rusqlite::Result<Row>>()
            })
            .optional()?;
        Ok(row)
    }

    /// Raises the identity counter of `table` to at least `at_least`.
    ///
    /// The counter lives in `{prefix}identity`. When the table has an
    /// `AUTOINCREMENT` column its `sqlite_sequence` entry is raised too, so
    /// the next generated key is never below the counter.
    pub fn advance(&self, table: &str, at_least: i64) -> Result<i64> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        tx.execute(
            &format!(
                "INSERT INTO {}identity (table_name, value) VALUES (?1, ?2) \
                 ON CONFLICT(table_name) DO UPDATE SET value = max(value, excluded.value)",
                self.prefix
            ),
            params![table, at_least],
        )?;
        let value: i64 = tx.query_row(
            &format!("SELECT value FROM {}identity WHERE table_name = ?1", self.prefix),
            [table],
            |row| row.get(0),
        )?;
        let has_sequence: bool = tx.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'",
            [],
            |row| row.get(0),
        )?;
        if has_sequence {
            tx.execute(
                "UPDATE sqlite_sequence SET seq = max(seq, ?2 - 1) WHERE name = ?1 COLLATE NOCASE",
                params![table, value],
            )?;
        }
        tx.commit()?;
        debug!(table, value, "identity advanced");
        Ok(value)
    }

    /// Current identity counter of `table`, if one was ever stored.
    pub fn identity_value(&self, table: &str) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                &format!("SELECT value FROM {}identity WHERE table_name = ?1", self.prefix),
                [table],
                |row| row.get(0),
            )
            .optional()?)
    }
}

fn insert_within(tx: &Transaction<'_>, live: &LiveTable, rows: &[Row]) -> Result<usize> {
    let width = live.columns.len();
    let mut inserted = 0;
    for (index, row) in rows.iter().enumerate() {
        if row.is_empty() {
            continue;
        }
        if row.len() > width {
            return Err(SqliteError::PayloadRejected(format!(
                "row {} of {} has {} fields but the table has {width} columns",
                index + 1,
                live.name,
                row.len()
            )));
        }
        let columns = live.columns[..row.len()]
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = (1..=row.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = tx.prepare_cached(&format!(
            "INSERT INTO {} ({columns}) VALUES ({placeholders})",
            quote_ident(&live.name)
        ))?;
        inserted += stmt.execute(rusqlite::params_from_iter(row.iter()))?;
    }
    Ok(inserted)
}

fn unsupported(table: &TableDefinition, column: &str, change: &str) -> SqliteError {
    SqliteError::Unsupported(format!("{change} on {}.{column}", table.name))
}

fn render_value(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}

impl SqlExecutor for SqliteExecutor<'_> {
    fn table_exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.has_table(name)?)
    }

    fn view_exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.has_view(name)?)
    }

    fn row_count(&self, table: &str) -> StorageResult<u64> {
        Ok(self.count(table)?)
    }

    fn describe_table(&self, table: &str) -> StorageResult<LiveTable> {
        Ok(self.describe(table)?)
    }

    fn create_table(&self, table: &TableDefinition) -> StorageResult<()> {
        Ok(self.add_table(table)?)
    }

    fn alter_table(&self, table: &TableDefinition) -> StorageResult<()> {
        Ok(self.alter(table)?)
    }

    fn drop_table(&self, name: &str) -> StorageResult<()> {
        Ok(self.remove_table(name)?)
    }

    fn create_foreign_keys(&self, table: &TableDefinition) -> StorageResult<()> {
        Ok(self.add_foreign_keys(table)?)
    }

    fn drop_foreign_keys(&self, name: &str) -> StorageResult<()> {
        Ok(self.remove_foreign_keys(name)?)
    }

    fn create_view(&self, view: &ViewDefinition) -> StorageResult<()> {
        Ok(self.add_view(view)?)
    }

    fn drop_view(&self, name: &str) -> StorageResult<()> {
        Ok(self.remove_view(name)?)
    }

    fn insert_rows(&self, table: &str, rows: &[Row]) -> StorageResult<usize> {
        Ok(self.insert(table, rows)?)
    }

    fn delete_all_rows(&self, table: &str) -> StorageResult<usize> {
        Ok(self.clear(table)?)
    }

    fn replace_rows(&self, table: &str, rows: &[Row]) -> StorageResult<usize> {
        Ok(self.replace(table, rows)?)
    }

    fn delete_rows_by_key(
        &self,
        table: &str,
        key_column: &str,
        keys: &[String],
    ) -> StorageResult<usize> {
        Ok(self.delete_keys(table, key_column, keys)?)
    }

    fn select_row_by_key(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
    ) -> StorageResult<Option<Row>> {
        Ok(self.find_by_key(table, key_column, key)?)
    }

    fn advance_identity(&self, table: &str, at_least: i64) -> StorageResult<i64> {
        Ok(self.advance(table, at_least)?)
    }
}
