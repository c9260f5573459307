//! SQL generation for the bookkeeping tables.
//!
//! Three tables back a synchronization setup, each name carrying a
//! configurable prefix so several setups can share one database:
//!
//! | Table | Purpose |
//! |-------|---------|
//! | `{prefix}artifacts` | location → name → kind → hash of synchronized artifacts |
//! | `{prefix}identity` | per-table identity counters advanced by data operations |
//! | `{prefix}problems` | problems reported during passes |

use crate::error::{Result, SqliteError};

/// Validates that a table prefix contains only safe characters.
///
/// # Errors
///
/// Returns [`SqliteError::InvalidPrefix`] if the prefix is empty or contains
/// characters other than alphanumerics and underscores.
pub(crate) fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(SqliteError::InvalidPrefix(prefix.to_string()));
    }
    if !prefix.chars().all(|c| c.is_alphanumeric() || c == '_') {
        return Err(SqliteError::InvalidPrefix(prefix.to_string()));
    }
    Ok(())
}

/// Bookkeeping table suffixes, in creation order.
pub(crate) const TABLES: [&str; 3] = ["artifacts", "identity", "problems"];

/// Generates the SQL creating every bookkeeping table with the given prefix.
///
/// # Errors
///
/// Returns [`SqliteError::InvalidPrefix`] if the prefix contains characters
/// other than alphanumerics and underscores, or if it is empty.
pub fn generate_schema_sql(prefix: &str) -> Result<String> {
    validate_prefix(prefix)?;

    let sql = format!(
        r#"
CREATE TABLE IF NOT EXISTS {prefix}artifacts (
    location TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    hash TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS {prefix}identity (
    table_name TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS {prefix}problems (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    location TEXT NOT NULL,
    error_type TEXT NOT NULL,
    message TEXT NOT NULL,
    kind TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_{prefix}artifacts_kind_name ON {prefix}artifacts(kind, name);
CREATE INDEX IF NOT EXISTS idx_{prefix}problems_location ON {prefix}problems(location);
"#
    );

    Ok(sql)
}

/// Generates the SQL dropping every bookkeeping table.
///
/// # Errors
///
/// Returns [`SqliteError::InvalidPrefix`] if the prefix is invalid.
pub fn generate_drop_sql(prefix: &str) -> Result<String> {
    validate_prefix(prefix)?;

    Ok(TABLES
        .iter()
        .rev()
        .map(|table| format!("DROP TABLE IF EXISTS {prefix}{table};\n"))
        .collect())
}
