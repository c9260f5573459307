//! SQLite DDL generation for synchronized tables and views.
//!
//! Tables are created without foreign keys; foreign keys are emulated with
//! triggers so they can be dropped and recreated independently of the
//! table, which SQLite's `ALTER TABLE` cannot do for real constraints. Each
//! foreign key `FK` on child table `C` referencing parent `P` becomes three
//! triggers named `{prefix}fk{n}_C__FK__{ins,upd,del}`, where `n` is the
//! byte length of `C`, so no table's triggers share a name prefix with
//! those of another table:
//!
//! - `ins` / `upd` on `C` abort when a non-NULL key has no parent row,
//! - `del` on `P` aborts when a parent row still has children.

use schema_sync_core::{
    ColumnDefinition, ForeignKeyDefinition, IndexDefinition, TableDefinition, ViewDefinition,
};

/// Quotes an identifier for SQLite.
///
/// ```
/// # use schema_sync_sqlite::quote_ident;
/// assert_eq!(quote_ident("ORDERS"), "\"ORDERS\"");
/// assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
/// ```
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn ident_list(names: &[String]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Normalizes a declared type for comparison (upper case, no whitespace).
pub(crate) fn normalize_type(data_type: &str) -> String {
    data_type
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Whether `table` gets an inline `INTEGER PRIMARY KEY AUTOINCREMENT` column.
fn identity_column(table: &TableDefinition) -> Option<&ColumnDefinition> {
    let key = table.primary_key();
    if key.len() != 1 {
        return None;
    }
    table
        .columns
        .iter()
        .find(|c| c.primary_key && c.identity)
}

/// Column clause used by `CREATE TABLE` and `ADD COLUMN`.
pub(crate) fn column_sql(column: &ColumnDefinition, inline_identity: bool) -> String {
    let mut sql = format!("{} {}", quote_ident(&column.name), column.sql_type());
    if !column.nullable || column.primary_key {
        sql.push_str(" NOT NULL");
    }
    if inline_identity {
        sql.push_str(" PRIMARY KEY AUTOINCREMENT");
    } else if column.unique && !column.primary_key {
        sql.push_str(" UNIQUE");
    }
    if let Some(default) = column.default_value.as_deref().filter(|d| !d.is_empty()) {
        sql.push_str(" DEFAULT ");
        sql.push_str(default);
    }
    sql
}

/// `CREATE TABLE` followed by one `CREATE INDEX` per declared index.
pub(crate) fn create_table_sql(table: &TableDefinition) -> Vec<String> {
    let identity = identity_column(table).map(|c| c.name.as_str());
    let mut clauses: Vec<String> = table
        .columns
        .iter()
        .map(|c| column_sql(c, Some(c.name.as_str()) == identity))
        .collect();

    let key: Vec<String> = table.primary_key().into_iter().map(String::from).collect();
    if identity.is_none() && !key.is_empty() {
        clauses.push(format!("PRIMARY KEY ({})", ident_list(&key)));
    }

    let mut statements = vec![format!(
        "CREATE TABLE {} (\n    {}\n)",
        quote_ident(&table.name),
        clauses.join(",\n    ")
    )];
    statements.extend(table.indexes.iter().map(|i| index_sql(&table.name, i)));
    statements
}

pub(crate) fn index_sql(table: &str, index: &IndexDefinition) -> String {
    format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        quote_ident(&index.name),
        quote_ident(table),
        ident_list(&index.columns)
    )
}

pub(crate) fn add_column_sql(table: &str, column: &ColumnDefinition) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {}",
        quote_ident(table),
        column_sql(column, false)
    )
}

pub(crate) fn drop_column_sql(table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN {}",
        quote_ident(table),
        quote_ident(column)
    )
}

pub(crate) fn create_view_sql(view: &ViewDefinition) -> String {
    format!(
        "CREATE VIEW {} AS {}",
        quote_ident(&view.name),
        view.query.trim().trim_end_matches(';')
    )
}

/// Common name prefix of every trigger emulating a foreign key of `table`.
///
/// The length marker keeps `A` from matching the triggers of `A__X`.
pub(crate) fn trigger_prefix(prefix: &str, table: &str) -> String {
    format!("{prefix}fk{}_{table}__", table.len())
}

/// Triggers emulating one foreign key, as `(name, sql)` pairs.
pub(crate) fn foreign_key_triggers(
    prefix: &str,
    table: &str,
    fk: &ForeignKeyDefinition,
) -> Vec<(String, String)> {
    let base = format!("{}{}__", trigger_prefix(prefix, table), fk.name);
    let child = quote_ident(table);
    let parent = quote_ident(&fk.referenced_table);
    let message = quote_literal(&format!(
        "foreign key {} violated: {} references {}",
        fk.name, table, fk.referenced_table
    ));

    let pairs: Vec<(&String, &String)> = fk.columns.iter().zip(&fk.referenced_columns).collect();
    let all_set = pairs
        .iter()
        .map(|(c, _)| format!("NEW.{} IS NOT NULL", quote_ident(c)))
        .collect::<Vec<_>>()
        .join(" AND ");
    let parent_match = pairs
        .iter()
        .map(|(c, r)| format!("{parent}.{} = NEW.{}", quote_ident(r), quote_ident(c)))
        .collect::<Vec<_>>()
        .join(" AND ");
    let child_match = pairs
        .iter()
        .map(|(c, r)| format!("{child}.{} = OLD.{}", quote_ident(c), quote_ident(r)))
        .collect::<Vec<_>>()
        .join(" AND ");
    let missing_parent =
        format!("{all_set} AND NOT EXISTS (SELECT 1 FROM {parent} WHERE {parent_match})");

    let insert = format!("{base}ins");
    let update = format!("{base}upd");
    let delete = format!("{base}del");
    vec![
        (
            insert.clone(),
            format!(
                "CREATE TRIGGER IF NOT EXISTS {} BEFORE INSERT ON {child} FOR EACH ROW \
                 WHEN {missing_parent} BEGIN SELECT RAISE(ABORT, {message}); END",
                quote_ident(&insert)
            ),
        ),
        (
            update.clone(),
            format!(
                "CREATE TRIGGER IF NOT EXISTS {} BEFORE UPDATE OF {} ON {child} FOR EACH ROW \
                 WHEN {missing_parent} BEGIN SELECT RAISE(ABORT, {message}); END",
                quote_ident(&update),
                ident_list(&fk.columns)
            ),
        ),
        (
            delete.clone(),
            format!(
                "CREATE TRIGGER IF NOT EXISTS {} BEFORE DELETE ON {parent} FOR EACH ROW \
                 WHEN EXISTS (SELECT 1 FROM {child} WHERE {child_match}) \
                 BEGIN SELECT RAISE(ABORT, {message}); END",
                quote_ident(&delete)
            ),
        ),
    ]
}
