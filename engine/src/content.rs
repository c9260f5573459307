//! Bulk data operations against existing tables.
//!
//! | Kind    | Precondition             | Effect                                  |
//! |---------|--------------------------|-----------------------------------------|
//! | Replace | non-empty payload        | delete all and insert, advance identity |
//! | Append  | empty table and payload  | insert, advance identity                |
//! | Delete  | `*` or one primary key   | delete all / delete listed keys         |
//! | Update  | one primary key          | insert rows whose key is absent         |
//!
//! Update never overwrites an existing row. It is insert-if-missing: a
//! payload row whose key is already present is left as it is, non-key
//! columns included.

use schema_sync_core::{
    ArtifactDefinition, DataPayload, DefinitionBody, DeletePayload, LiveTable, Row, SqlExecutor,
    read_rows,
};
use tracing::{debug, info};

use crate::error::ContentError;

/// Applies data operation definitions through an executor.
pub struct ContentReconciler<'r, E: ?Sized> {
    executor: &'r E,
}

impl<'r, E: SqlExecutor + ?Sized> ContentReconciler<'r, E> {
    /// Creates a reconciler writing through `executor`.
    pub fn new(executor: &'r E) -> Self {
        Self { executor }
    }

    /// Applies `definition`; returns the number of rows written or removed.
    ///
    /// Definitions that are not data operations are a no-op.
    pub fn apply(&self, definition: &ArtifactDefinition) -> Result<usize, ContentError> {
        let affected = match &definition.body {
            DefinitionBody::Replace(data) => self.replace(data)?,
            DefinitionBody::Append(data) => self.append(data)?,
            DefinitionBody::Delete(data) => self.delete(data)?,
            DefinitionBody::Update(data) => self.update(data)?,
            _ => return Ok(0),
        };
        info!(
            location = %definition.location,
            table = %definition.name,
            kind = %definition.kind(),
            rows = affected,
            "data operation applied"
        );
        Ok(affected)
    }

    fn replace(&self, data: &DataPayload) -> Result<usize, ContentError> {
        let table = data.target_table.as_str();
        let rows = non_empty_rows(data)?;
        let inserted = self.executor.replace_rows(table, &rows)?;
        debug!(table, inserted, "table content replaced");
        self.advance(table, inserted)?;
        Ok(inserted)
    }

    fn append(&self, data: &DataPayload) -> Result<usize, ContentError> {
        let table = data.target_table.as_str();
        let existing = self.executor.row_count(table)?;
        if existing > 0 {
            return Err(ContentError::NotEmpty {
                table: table.to_string(),
                rows: existing,
            });
        }
        let rows = non_empty_rows(data)?;
        let inserted = self.executor.insert_rows(table, &rows)?;
        self.advance(table, inserted)?;
        Ok(inserted)
    }

    fn delete(&self, data: &DataPayload) -> Result<usize, ContentError> {
        let table = data.target_table.as_str();
        match DeletePayload::parse(&data.payload)? {
            DeletePayload::All => Ok(self.executor.delete_all_rows(table)?),
            DeletePayload::Keys(keys) => {
                let live = self.executor.describe_table(table)?;
                let (_, key) = single_key(&live)?;
                if keys.is_empty() {
                    return Ok(0);
                }
                Ok(self.executor.delete_rows_by_key(table, &key, &keys)?)
            }
        }
    }

    fn update(&self, data: &DataPayload) -> Result<usize, ContentError> {
        let table = data.target_table.as_str();
        let rows = read_rows(&data.payload)?;
        let live = self.executor.describe_table(table)?;
        let (position, key) = single_key(&live)?;

        let mut missing: Vec<Row> = Vec::new();
        for (n, row) in rows.into_iter().enumerate() {
            let Some(value) = row.get(position).cloned().flatten() else {
                return Err(ContentError::MissingKey {
                    table: table.to_string(),
                    row: n + 1,
                    key,
                });
            };
            if self.executor.select_row_by_key(table, &key, &value)?.is_none() {
                missing.push(row);
            }
        }
        if missing.is_empty() {
            return Ok(0);
        }
        Ok(self.executor.insert_rows(table, &missing)?)
    }

    /// Counter is kept one past the last payload-assigned key.
    fn advance(&self, table: &str, inserted: usize) -> Result<(), ContentError> {
        let rows = self.executor.row_count(table)?;
        let next = i64::try_from(rows.max(inserted as u64)).unwrap_or(i64::MAX - 1) + 1;
        self.executor.advance_identity(table, next)?;
        Ok(())
    }
}

fn non_empty_rows(data: &DataPayload) -> Result<Vec<Row>, ContentError> {
    let rows = read_rows(&data.payload)?;
    if rows.is_empty() {
        return Err(ContentError::EmptyPayload(data.target_table.clone()));
    }
    Ok(rows)
}

/// Position and name of the only primary key column.
fn single_key(live: &LiveTable) -> Result<(usize, String), ContentError> {
    let keys: Vec<(usize, &str)> = live
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.primary_key)
        .map(|(i, c)| (i, c.name.as_str()))
        .collect();
    match keys.as_slice() {
        [(position, name)] => Ok((*position, (*name).to_string())),
        _ => Err(ContentError::KeyShape {
            table: live.name.clone(),
            count: keys.len(),
        }),
    }
}
