//! In-memory executor used by the engine's unit tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use schema_sync_core::{
    LiveColumn, LiveTable, Row, SqlExecutor, StorageError, StorageResult, TableDefinition,
    ViewDefinition,
};

struct FakeTable {
    definition: TableDefinition,
    rows: Vec<Row>,
}

/// Keeps tables, rows and views in maps and logs every write.
///
/// `Sync`, so one instance can back passes on several threads.
#[derive(Default)]
pub(crate) struct RecordingExecutor {
    tables: Mutex<BTreeMap<String, FakeTable>>,
    views: Mutex<HashSet<String>>,
    identities: Mutex<HashMap<String, i64>>,
    log: Mutex<Vec<String>>,
    fail_on: Mutex<HashSet<String>>,
}

impl RecordingExecutor {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Writes logged so far, as `"<operation> <name>"`.
    pub(crate) fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub(crate) fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    /// Makes `"<operation> <name>"` fail from now on.
    pub(crate) fn fail_on(&self, entry: &str) {
        self.fail_on.lock().unwrap().insert(entry.to_string());
    }

    pub(crate) fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .unwrap()
            .get(&table.to_ascii_lowercase())
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub(crate) fn identity(&self, table: &str) -> Option<i64> {
        self.identities
            .lock()
            .unwrap()
            .get(&table.to_ascii_lowercase())
            .copied()
    }

    fn write(&self, operation: &str, name: &str) -> StorageResult<()> {
        let entry = format!("{operation} {name}");
        if self.fail_on.lock().unwrap().contains(&entry) {
            return Err(StorageError::Backend(format!("injected failure: {entry}")));
        }
        self.log.lock().unwrap().push(entry);
        Ok(())
    }

    fn with_table<T>(&self, name: &str, f: impl FnOnce(&mut FakeTable) -> T) -> StorageResult<T> {
        let mut tables = self.tables.lock().unwrap();
        tables
            .get_mut(&name.to_ascii_lowercase())
            .map(f)
            .ok_or_else(|| StorageError::MissingTable(name.to_string()))
    }

    /// Rejects rows wider than the table, the way a real database would.
    fn check_width(&self, table: &str, rows: &[Row]) -> StorageResult<()> {
        let width = self.with_table(table, |t| t.definition.columns.len())?;
        match rows.iter().position(|row| row.len() > width) {
            Some(index) => Err(StorageError::Rejected(format!(
                "row {} of {table} has {} fields but the table has {width} columns",
                index + 1,
                rows[index].len()
            ))),
            None => Ok(()),
        }
    }

    fn key_index(&self, table: &str, key_column: &str) -> StorageResult<usize> {
        self.with_table(table, |t| {
            t.definition
                .columns
                .iter()
                .position(|c| c.name.eq_ignore_ascii_case(key_column))
        })?
        .ok_or_else(|| StorageError::Backend(format!("no column {key_column} in {table}")))
    }
}

impl SqlExecutor for RecordingExecutor {
    fn table_exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.tables.lock().unwrap().contains_key(&name.to_ascii_lowercase()))
    }

    fn view_exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.views.lock().unwrap().contains(&name.to_ascii_lowercase()))
    }

    fn row_count(&self, table: &str) -> StorageResult<u64> {
        self.with_table(table, |t| t.rows.len() as u64)
    }

    fn describe_table(&self, table: &str) -> StorageResult<LiveTable> {
        self.with_table(table, |t| LiveTable {
            name: t.definition.name.clone(),
            columns: t
                .definition
                .columns
                .iter()
                .map(|c| LiveColumn {
                    name: c.name.clone(),
                    data_type: c.data_type.to_ascii_uppercase(),
                    nullable: c.nullable,
                    primary_key: c.primary_key,
                })
                .collect(),
        })
    }

    fn create_table(&self, table: &TableDefinition) -> StorageResult<()> {
        self.write("create_table", &table.name)?;
        self.tables.lock().unwrap().insert(
            table.name.to_ascii_lowercase(),
            FakeTable {
                definition: table.clone(),
                rows: Vec::new(),
            },
        );
        Ok(())
    }

    fn alter_table(&self, table: &TableDefinition) -> StorageResult<()> {
        self.write("alter_table", &table.name)?;
        self.with_table(&table.name, |t| t.definition = table.clone())
    }

    fn drop_table(&self, name: &str) -> StorageResult<()> {
        self.write("drop_table", name)?;
        self.tables.lock().unwrap().remove(&name.to_ascii_lowercase());
        Ok(())
    }

    fn create_foreign_keys(&self, table: &TableDefinition) -> StorageResult<()> {
        for fk in table.foreign_keys() {
            if !self.table_exists(&fk.referenced_table)? {
                return Err(StorageError::MissingTable(fk.referenced_table.clone()));
            }
        }
        self.write("create_foreign_keys", &table.name)
    }

    fn drop_foreign_keys(&self, name: &str) -> StorageResult<()> {
        self.write("drop_foreign_keys", name)
    }

    fn create_view(&self, view: &ViewDefinition) -> StorageResult<()> {
        self.write("create_view", &view.name)?;
        self.views.lock().unwrap().insert(view.name.to_ascii_lowercase());
        Ok(())
    }

    fn drop_view(&self, name: &str) -> StorageResult<()> {
        self.write("drop_view", name)?;
        self.views.lock().unwrap().remove(&name.to_ascii_lowercase());
        Ok(())
    }

    fn insert_rows(&self, table: &str, rows: &[Row]) -> StorageResult<usize> {
        self.write("insert_rows", table)?;
        self.check_width(table, rows)?;
        self.with_table(table, |t| {
            t.rows.extend(rows.iter().cloned());
            rows.len()
        })
    }

    fn delete_all_rows(&self, table: &str) -> StorageResult<usize> {
        self.write("delete_all_rows", table)?;
        self.with_table(table, |t| std::mem::take(&mut t.rows).len())
    }

    fn replace_rows(&self, table: &str, rows: &[Row]) -> StorageResult<usize> {
        self.write("replace_rows", table)?;
        self.check_width(table, rows)?;
        self.with_table(table, |t| {
            t.rows = rows.to_vec();
            rows.len()
        })
    }

    fn delete_rows_by_key(
        &self,
        table: &str,
        key_column: &str,
        keys: &[String],
    ) -> StorageResult<usize> {
        self.write("delete_rows_by_key", table)?;
        let index = self.key_index(table, key_column)?;
        self.with_table(table, |t| {
            let before = t.rows.len();
            t.rows.retain(|row| {
                !row.get(index)
                    .cloned()
                    .flatten()
                    .is_some_and(|value| keys.contains(&value))
            });
            before - t.rows.len()
        })
    }

    fn select_row_by_key(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
    ) -> StorageResult<Option<Row>> {
        let index = self.key_index(table, key_column)?;
        self.with_table(table, |t| {
            t.rows
                .iter()
                .find(|row| row.get(index).cloned().flatten().as_deref() == Some(key))
                .cloned()
        })
    }

    fn advance_identity(&self, table: &str, at_least: i64) -> StorageResult<i64> {
        self.write("advance_identity", table)?;
        let mut identities = self.identities.lock().unwrap();
        let value = identities.entry(table.to_ascii_lowercase()).or_insert(at_least);
        *value = (*value).max(at_least);
        Ok(*value)
    }
}
