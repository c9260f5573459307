//! Definition validation.
//!
//! Validates structural invariants of table and view definitions, catching
//! errors such as duplicate columns, foreign keys over unknown columns, and
//! empty view queries before any DDL is generated for them.
//!
//! # Examples
//!
//! ```
//! use schema_sync_core::*;
//!
//! let table = TableDefinition::new("ORDERS")
//!     .with_column(ColumnDefinition::new("ID", "INTEGER").primary_key());
//! assert!(validate_table(&table).is_empty());
//!
//! // Invalid: foreign key over a column the table does not declare
//! let bad = TableDefinition::new("ORDERS")
//!     .with_column(ColumnDefinition::new("ID", "INTEGER").primary_key())
//!     .with_foreign_key("FK_C", &["CUSTOMER_ID"], "CUSTOMERS", &["ID"]);
//! assert!(!validate_table(&bad).is_empty());
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::{TableDefinition, ViewDefinition};

/// Definition validation errors.
///
/// Each variant describes a specific structural problem found during
/// validation. The `Display` impl provides a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Table or view name is empty or whitespace-only.
    #[error("definition name cannot be empty")]
    EmptyName,
    /// Table declares no columns.
    #[error("table {0} must declare at least one column")]
    NoColumns(String),
    /// A column has an empty name or type.
    #[error("column in table {0} must have a name and a type")]
    IncompleteColumn(String),
    /// Two columns share a name (case-insensitive).
    #[error("duplicate column in table {table}: {column}")]
    DuplicateColumn {
        /// Owning table.
        table: String,
        /// Offending column.
        column: String,
    },
    /// A foreign key or index refers to a column the table does not declare.
    #[error("{owner} refers to unknown column {column}")]
    UnknownColumn {
        /// Constraint or index name.
        owner: String,
        /// Column that was not found.
        column: String,
    },
    /// Foreign key column lists are empty or of different lengths.
    #[error("foreign key {0} must pair each column with one referenced column")]
    ForeignKeyArity(String),
    /// Two foreign keys or indexes share a name.
    #[error("duplicate constraint name in table {table}: {name}")]
    DuplicateConstraint {
        /// Owning table.
        table: String,
        /// Offending name.
        name: String,
    },
    /// An identity column that is not the single integer primary key.
    #[error("identity column {0} must be the table's only INTEGER primary key")]
    InvalidIdentity(String),
    /// View query is empty.
    #[error("view {0} must have a query")]
    EmptyQuery(String),
}

/// Validates a table definition.
///
/// Checks names, column uniqueness, foreign key and index column
/// references, foreign key arity and identity columns. Stops at the first
/// problem found.
pub fn validate_table(table: &TableDefinition) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let name = table.name.trim();
    if name.is_empty() {
        errors.push(ValidationError::EmptyName);
        return errors;
    }
    if table.columns.is_empty() {
        errors.push(ValidationError::NoColumns(name.to_string()));
        return errors;
    }

    let mut columns = HashSet::new();
    for column in &table.columns {
        if column.name.trim().is_empty() || column.data_type.trim().is_empty() {
            errors.push(ValidationError::IncompleteColumn(name.to_string()));
            return errors;
        }
        if !columns.insert(column.name.to_ascii_uppercase()) {
            errors.push(ValidationError::DuplicateColumn {
                table: name.to_string(),
                column: column.name.clone(),
            });
            return errors;
        }
    }

    let mut constraint_names = HashSet::new();
    for fk in table.foreign_keys() {
        if !constraint_names.insert(fk.name.to_ascii_uppercase()) {
            errors.push(ValidationError::DuplicateConstraint {
                table: name.to_string(),
                name: fk.name.clone(),
            });
            return errors;
        }
        if fk.columns.is_empty() || fk.columns.len() != fk.referenced_columns.len() {
            errors.push(ValidationError::ForeignKeyArity(fk.name.clone()));
            return errors;
        }
        errors.extend(check_columns(&columns, &fk.name, &fk.columns));
        if !errors.is_empty() {
            return errors;
        }
    }

    for index in &table.indexes {
        if !constraint_names.insert(index.name.to_ascii_uppercase()) {
            errors.push(ValidationError::DuplicateConstraint {
                table: name.to_string(),
                name: index.name.clone(),
            });
            return errors;
        }
        errors.extend(check_columns(&columns, &index.name, &index.columns));
        if !errors.is_empty() {
            return errors;
        }
    }

    let primary_key = table.primary_key();
    for column in table.columns.iter().filter(|c| c.identity) {
        let integer = column.data_type.trim().eq_ignore_ascii_case("INTEGER");
        if !integer || !column.primary_key || primary_key.len() != 1 {
            errors.push(ValidationError::InvalidIdentity(column.name.clone()));
            return errors;
        }
    }

    errors
}

/// Validates a view definition.
///
/// # Examples
///
/// ```
/// use schema_sync_core::*;
///
/// assert!(validate_view(&ViewDefinition::new("V", "SELECT 1")).is_empty());
/// assert_eq!(
///     validate_view(&ViewDefinition::new("V", "  ")),
///     vec![ValidationError::EmptyQuery("V".to_string())]
/// );
/// ```
pub fn validate_view(view: &ViewDefinition) -> Vec<ValidationError> {
    if view.name.trim().is_empty() {
        return vec![ValidationError::EmptyName];
    }
    if view.query.trim().is_empty() {
        return vec![ValidationError::EmptyQuery(view.name.clone())];
    }
    Vec::new()
}

fn check_columns(
    declared: &HashSet<String>,
    owner: &str,
    columns: &[String],
) -> Option<ValidationError> {
    columns
        .iter()
        .find(|c| !declared.contains(&c.to_ascii_uppercase()))
        .map(|c| ValidationError::UnknownColumn {
            owner: owner.to_string(),
            column: c.clone(),
        })
}
