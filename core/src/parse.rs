//! Definition parser.
//!
//! Turns the raw bytes of a definition file into an [`ArtifactDefinition`].
//! The artifact kind is taken from the location's extension; table, view
//! and schema files are JSON documents, data operation files are
//! `|`-delimited rows whose target table is the file stem.
//!
//! Composite schemas are flattened with [`expand_schema`]: every member
//! table and view becomes its own definition located at
//! `<schema location>#<member name>`.
//!
//! # Examples
//!
//! ```
//! use schema_sync_core::*;
//!
//! let json = br#"{
//!     "name": "CUSTOMERS",
//!     "columns": [
//!         {"name": "ID", "type": "INTEGER", "primaryKey": true},
//!         {"name": "NAME", "type": "VARCHAR", "length": 100}
//!     ]
//! }"#;
//! let def = parse_definition("/app/customers.table", json).unwrap();
//! assert_eq!(def.kind(), ArtifactKind::Table);
//! assert_eq!(def.name, "CUSTOMERS");
//! assert_eq!(def.hash, content_hash(json));
//!
//! let data = parse_definition("/app/CUSTOMERS.append", b"1|Alice\n2|Bob\n").unwrap();
//! assert_eq!(data.name, "CUSTOMERS");
//! ```

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ParseError, Result};
use crate::{
    ArtifactDefinition, ArtifactKind, ColumnDefinition, DataPayload, DefinitionBody,
    ForeignKeyDefinition, SchemaDefinition, TableDefinition, ViewDefinition, content_hash,
    validate_table, validate_view,
};

/// Separator between a schema's location and a member name.
pub const MEMBER_SEPARATOR: char = '#';

/// Parses a definition found at `location`.
///
/// # Errors
///
/// Returns a [`ParseError`] when the extension is unknown, the document is
/// malformed, or the parsed table/view fails validation.
pub fn parse_definition(location: &str, bytes: &[u8]) -> Result<ArtifactDefinition> {
    let kind = ArtifactKind::from_location(location)
        .ok_or_else(|| ParseError::UnsupportedKind(location.to_string()))?;
    let hash = content_hash(bytes);

    let body = match kind {
        ArtifactKind::Table => DefinitionBody::Table(parse_table(bytes)?),
        ArtifactKind::View => DefinitionBody::View(parse_view(bytes)?),
        ArtifactKind::Schema => DefinitionBody::Schema(parse_schema(location, bytes)?),
        ArtifactKind::Replace => DefinitionBody::Replace(data_payload(location, kind, bytes)?),
        ArtifactKind::Append => DefinitionBody::Append(data_payload(location, kind, bytes)?),
        ArtifactKind::Delete => DefinitionBody::Delete(data_payload(location, kind, bytes)?),
        ArtifactKind::Update => DefinitionBody::Update(data_payload(location, kind, bytes)?),
    };

    let name = match &body {
        DefinitionBody::Table(table) => table.name.clone(),
        DefinitionBody::View(view) => view.name.clone(),
        DefinitionBody::Schema(schema) => schema.name.clone(),
        DefinitionBody::Replace(data)
        | DefinitionBody::Append(data)
        | DefinitionBody::Delete(data)
        | DefinitionBody::Update(data) => data.target_table.clone(),
    };

    Ok(ArtifactDefinition {
        location: location.to_string(),
        name,
        hash,
        body,
    })
}

/// Flattens a schema definition into independent table and view definitions.
///
/// Member hashes are computed over the member's canonical JSON so a change
/// to one member does not mark its siblings as updated. Non-schema
/// definitions yield an empty list.
///
/// # Examples
///
/// ```
/// use schema_sync_core::*;
///
/// let json = br#"{"schema": {"name": "SALES", "structures": [
///     {"type": "table", "name": "CUSTOMERS", "columns": [{"name": "ID", "type": "INTEGER", "primaryKey": true}]},
///     {"type": "view", "name": "ALL_CUSTOMERS", "query": "SELECT * FROM CUSTOMERS"}
/// ]}}"#;
/// let schema = parse_definition("/app/sales.schema", json).unwrap();
/// let members = expand_schema(&schema).unwrap();
/// assert_eq!(members.len(), 2);
/// assert_eq!(members[0].location, "/app/sales.schema#CUSTOMERS");
/// assert_eq!(members[1].kind(), ArtifactKind::View);
/// ```
pub fn expand_schema(definition: &ArtifactDefinition) -> Result<Vec<ArtifactDefinition>> {
    let DefinitionBody::Schema(schema) = &definition.body else {
        return Ok(Vec::new());
    };

    let mut members = Vec::with_capacity(schema.tables.len() + schema.views.len());
    for table in &schema.tables {
        members.push(ArtifactDefinition {
            location: member_location(&definition.location, &table.name),
            name: table.name.clone(),
            hash: content_hash(&serde_json::to_vec(table)?),
            body: DefinitionBody::Table(table.clone()),
        });
    }
    for view in &schema.views {
        members.push(ArtifactDefinition {
            location: member_location(&definition.location, &view.name),
            name: view.name.clone(),
            hash: content_hash(&serde_json::to_vec(view)?),
            body: DefinitionBody::View(view.clone()),
        });
    }
    Ok(members)
}

/// Location of a schema member.
pub fn member_location(schema_location: &str, member: &str) -> String {
    format!("{schema_location}{MEMBER_SEPARATOR}{member}")
}

/// The schema location owning a member location, if any.
///
/// ```
/// use schema_sync_core::owning_schema;
///
/// assert_eq!(owning_schema("/app/sales.schema#ORDERS"), Some("/app/sales.schema"));
/// assert_eq!(owning_schema("/app/orders.table"), None);
/// ```
pub fn owning_schema(location: &str) -> Option<&str> {
    location
        .split_once(MEMBER_SEPARATOR)
        .map(|(schema, _)| schema)
}

fn parse_table(bytes: &[u8]) -> Result<TableDefinition> {
    let table: TableDefinition = serde_json::from_slice(bytes)?;
    check(validate_table(&table))?;
    Ok(table)
}

fn parse_view(bytes: &[u8]) -> Result<ViewDefinition> {
    let view: ViewDefinition = serde_json::from_slice(bytes)?;
    check(validate_view(&view))?;
    Ok(view)
}

fn check(errors: Vec<crate::ValidationError>) -> Result<()> {
    match errors.into_iter().next() {
        Some(error) => Err(ParseError::Invalid(error)),
        None => Ok(()),
    }
}

#[derive(Deserialize)]
struct SchemaDocument {
    schema: SchemaBody,
}

#[derive(Deserialize)]
struct SchemaBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    structures: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(item) => vec![item],
            Self::Many(items) => items,
        }
    }
}

#[derive(Deserialize)]
struct SchemaTable {
    name: String,
    columns: OneOrMany<ColumnDefinition>,
}

#[derive(Deserialize)]
struct QueryHolder {
    query: String,
}

#[derive(Deserialize)]
struct SchemaView {
    name: String,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    columns: Vec<QueryHolder>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchemaForeignKey {
    name: String,
    table: String,
    columns: String,
    referenced_table: String,
    referenced_columns: String,
}

fn parse_schema(location: &str, bytes: &[u8]) -> Result<SchemaDefinition> {
    let document: SchemaDocument = serde_json::from_slice(bytes)?;
    let name = document
        .schema
        .name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| location_stem(location, ArtifactKind::Schema).map(String::from))
        .ok_or_else(|| ParseError::MissingTarget(location.to_string()))?;

    let mut tables = Vec::new();
    let mut views = Vec::new();
    let mut foreign_keys = Vec::new();

    for structure in document.schema.structures {
        let kind = structure
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match kind.to_ascii_lowercase().as_str() {
            "table" => {
                let raw: SchemaTable = serde_json::from_value(structure)?;
                let mut table = TableDefinition::new(&raw.name);
                table.columns = raw.columns.into_vec();
                tables.push(table);
            }
            "view" => {
                let raw: SchemaView = serde_json::from_value(structure)?;
                let query = raw
                    .query
                    .or_else(|| raw.columns.into_iter().next().map(|c| c.query))
                    .unwrap_or_default();
                views.push(ViewDefinition::new(&raw.name, &query));
            }
            "foreignkey" => {
                let raw: SchemaForeignKey = serde_json::from_value(structure)?;
                foreign_keys.push(raw);
            }
            _ => {
                return Err(ParseError::UnknownStructure { schema: name, kind });
            }
        }
    }

    for raw in foreign_keys {
        let table = tables
            .iter_mut()
            .find(|t| t.name == raw.table)
            .ok_or_else(|| ParseError::DanglingForeignKey {
                name: raw.name.clone(),
                table: raw.table.clone(),
            })?;
        table.constraints.foreign_keys.push(ForeignKeyDefinition {
            name: raw.name,
            columns: split_list(&raw.columns),
            referenced_table: raw.referenced_table,
            referenced_columns: split_list(&raw.referenced_columns),
        });
    }

    for table in &tables {
        check(validate_table(table))?;
    }
    for view in &views {
        check(validate_view(view))?;
    }

    Ok(SchemaDefinition {
        name,
        tables,
        views,
    })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn data_payload(location: &str, kind: ArtifactKind, bytes: &[u8]) -> Result<DataPayload> {
    let target = location_stem(location, kind)
        .ok_or_else(|| ParseError::MissingTarget(location.to_string()))?;
    Ok(DataPayload {
        target_table: target.to_string(),
        payload: bytes.to_vec(),
    })
}

/// File name of `location` without directories and without the kind's
/// extension.
fn location_stem(location: &str, kind: ArtifactKind) -> Option<&str> {
    let file = location.rsplit(['/', '\\']).next().unwrap_or(location);
    let stem = file.strip_suffix(kind.extension())?.trim();
    (!stem.is_empty()).then_some(stem)
}
