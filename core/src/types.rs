//! Artifact definition types.
//!
//! This module defines the data model shared by every crate in the
//! workspace: the artifact kinds recognized by file extension, the parsed
//! table/view/schema/data-operation definitions, the persisted artifact
//! record, and the per-artifact outcome states surfaced after a pass.
//!
//! Table, view and schema definitions deserialize from the JSON documents
//! described in [`parse`](crate::parse_definition); booleans and lengths
//! accept both native JSON values and their string spellings.

use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

/// Kind of a tracked artifact.
///
/// The kind is decided by the definition's file extension; see
/// [`ArtifactKind::from_location`].
///
/// # Examples
///
/// ```
/// use schema_sync_core::ArtifactKind;
///
/// assert_eq!(ArtifactKind::from_location("/app/orders.table"), Some(ArtifactKind::Table));
/// assert_eq!(ArtifactKind::from_location("/app/ORDERS.append"), Some(ArtifactKind::Append));
/// assert_eq!(ArtifactKind::from_location("/app/readme.md"), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ArtifactKind {
    /// Table definition (`.table`).
    Table,
    /// View definition (`.view`).
    View,
    /// Composite schema grouping tables and views (`.schema`).
    Schema,
    /// Replace-all-rows data operation (`.replace`).
    Replace,
    /// Append-to-empty-table data operation (`.append`).
    Append,
    /// Delete-by-key data operation (`.delete`).
    Delete,
    /// Insert-if-missing data operation (`.update`).
    Update,
}

impl ArtifactKind {
    /// Every kind, in discovery order.
    pub const ALL: [ArtifactKind; 7] = [
        ArtifactKind::Table,
        ArtifactKind::View,
        ArtifactKind::Schema,
        ArtifactKind::Replace,
        ArtifactKind::Append,
        ArtifactKind::Delete,
        ArtifactKind::Update,
    ];

    /// File extension (including the leading dot) for this kind.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Table => ".table",
            Self::View => ".view",
            Self::Schema => ".schema",
            Self::Replace => ".replace",
            Self::Append => ".append",
            Self::Delete => ".delete",
            Self::Update => ".update",
        }
    }

    /// Stable upper-case name used for persistence and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Table => "TABLE",
            Self::View => "VIEW",
            Self::Schema => "SCHEMA",
            Self::Replace => "REPLACE",
            Self::Append => "APPEND",
            Self::Delete => "DELETE",
            Self::Update => "UPDATE",
        }
    }

    /// Inverse of [`as_str`](Self::as_str), case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
    }

    /// Detects the kind of a definition from its location's extension.
    pub fn from_location(location: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| location.ends_with(kind.extension()))
    }

    /// Returns `true` for the four bulk data operation kinds.
    pub fn is_data_operation(self) -> bool {
        matches!(
            self,
            Self::Replace | Self::Append | Self::Delete | Self::Update
        )
    }

    /// Returns `true` for kinds that own a relation in the live database.
    ///
    /// Tables and views share the relation namespace, so name uniqueness is
    /// checked across both of them.
    pub fn is_relation(self) -> bool {
        matches!(self, Self::Table | Self::View)
    }

    /// Kinds whose names must not collide with a definition of `self`.
    pub fn namespace(self) -> &'static [ArtifactKind] {
        match self {
            Self::Table | Self::View => &[ArtifactKind::Table, ArtifactKind::View],
            Self::Schema => &[ArtifactKind::Schema],
            Self::Replace => &[ArtifactKind::Replace],
            Self::Append => &[ArtifactKind::Append],
            Self::Delete => &[ArtifactKind::Delete],
            Self::Update => &[ArtifactKind::Update],
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a definition was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Provenance {
    /// Built-in, read-only content bundled with the system.
    Predelivered,
    /// User-supplied, mutable content.
    Registry,
}

/// A table column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    /// Column name.
    pub name: String,
    /// SQL type name (e.g. `VARCHAR`, `INTEGER`).
    #[serde(rename = "type")]
    pub data_type: String,
    /// Optional length/precision, rendered as `TYPE(length)`.
    #[serde(
        default,
        deserialize_with = "flexible_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub length: Option<String>,
    /// Optional scale, rendered as `TYPE(length, scale)`.
    #[serde(
        default,
        deserialize_with = "flexible_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub scale: Option<String>,
    /// Whether NULL values are allowed (defaults to `true`).
    #[serde(default = "default_true", deserialize_with = "flexible_bool")]
    pub nullable: bool,
    /// Whether this column is part of the primary key.
    #[serde(default, deserialize_with = "flexible_bool")]
    pub primary_key: bool,
    /// Whether a UNIQUE constraint applies to this column alone.
    #[serde(default, deserialize_with = "flexible_bool")]
    pub unique: bool,
    /// Whether this column is an auto-incremented identity.
    #[serde(default, deserialize_with = "flexible_bool")]
    pub identity: bool,
    /// SQL literal used as the column default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl ColumnDefinition {
    /// Creates a nullable, non-key column.
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            length: None,
            scale: None,
            nullable: true,
            primary_key: false,
            unique: false,
            identity: false,
            default_value: None,
        }
    }

    /// Marks the column as (part of) the primary key; implies NOT NULL.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Marks the column as NOT NULL.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Sets the length of the column type.
    pub fn with_length(mut self, length: &str) -> Self {
        self.length = Some(length.to_string());
        self
    }

    /// Sets the SQL default literal.
    pub fn with_default(mut self, value: &str) -> Self {
        self.default_value = Some(value.to_string());
        self
    }

    /// Renders the declared SQL type including length and scale.
    ///
    /// ```
    /// use schema_sync_core::ColumnDefinition;
    ///
    /// let col = ColumnDefinition::new("code", "varchar").with_length("20");
    /// assert_eq!(col.sql_type(), "VARCHAR(20)");
    /// ```
    pub fn sql_type(&self) -> String {
        let base = self.data_type.trim().to_ascii_uppercase();
        match (&self.length, &self.scale) {
            (Some(length), Some(scale)) if !length.is_empty() && !scale.is_empty() => {
                format!("{base}({length}, {scale})")
            }
            (Some(length), _) if !length.is_empty() && length != "0" => format!("{base}({length})"),
            _ => base,
        }
    }
}

/// A foreign key declaration; the referenced table becomes a dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyDefinition {
    /// Constraint name, unique within the owning table.
    pub name: String,
    /// Referencing columns of the owning table.
    pub columns: Vec<String>,
    /// Name of the referenced table.
    pub referenced_table: String,
    /// Referenced columns, positionally matched with `columns`.
    pub referenced_columns: Vec<String>,
}

/// A secondary index declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    /// Index name.
    pub name: String,
    /// Indexed columns, in order.
    pub columns: Vec<String>,
    /// Whether the index enforces uniqueness.
    #[serde(default, deserialize_with = "flexible_bool")]
    pub unique: bool,
}

/// An explicitly declared dependency on another table or view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyDeclaration {
    /// Name of the table or view depended upon.
    pub name: String,
    /// Informational kind (`TABLE`, `VIEW`).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Table-level constraints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableConstraints {
    /// Foreign keys declared by the table.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKeyDefinition>,
}

/// A table definition.
///
/// # Examples
///
/// ```
/// use schema_sync_core::{ColumnDefinition, TableDefinition};
///
/// let table = TableDefinition::new("ORDERS")
///     .with_column(ColumnDefinition::new("ID", "INTEGER").primary_key())
///     .with_column(ColumnDefinition::new("CUSTOMER_ID", "INTEGER"))
///     .with_foreign_key("FK_CUSTOMER", &["CUSTOMER_ID"], "CUSTOMERS", &["ID"]);
///
/// assert_eq!(table.primary_key(), vec!["ID"]);
/// assert_eq!(table.dependency_names(), vec!["CUSTOMERS".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDefinition {
    /// Table name.
    pub name: String,
    /// Ordered column list.
    pub columns: Vec<ColumnDefinition>,
    /// Constraints (foreign keys).
    #[serde(default)]
    pub constraints: TableConstraints,
    /// Secondary indexes.
    #[serde(default)]
    pub indexes: Vec<IndexDefinition>,
    /// Extra dependencies beyond those implied by foreign keys.
    #[serde(default)]
    pub dependencies: Vec<DependencyDeclaration>,
}

impl TableDefinition {
    /// Creates an empty table definition.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            constraints: TableConstraints::default(),
            indexes: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    /// Appends a column.
    pub fn with_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    /// Appends a foreign key.
    pub fn with_foreign_key(
        mut self,
        name: &str,
        columns: &[&str],
        referenced_table: &str,
        referenced_columns: &[&str],
    ) -> Self {
        self.constraints.foreign_keys.push(ForeignKeyDefinition {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            referenced_table: referenced_table.to_string(),
            referenced_columns: referenced_columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// Appends a secondary index.
    pub fn with_index(mut self, name: &str, columns: &[&str], unique: bool) -> Self {
        self.indexes.push(IndexDefinition {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique,
        });
        self
    }

    /// Foreign keys declared by this table.
    pub fn foreign_keys(&self) -> &[ForeignKeyDefinition] {
        &self.constraints.foreign_keys
    }

    /// Primary key column names in declaration order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Finds a column by name (case-insensitive).
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Names this table depends on: referenced tables plus explicit
    /// dependencies, deduplicated, self-references removed.
    pub fn dependency_names(&self) -> Vec<String> {
        let referenced = self
            .foreign_keys()
            .iter()
            .map(|fk| fk.referenced_table.as_str());
        let declared = self.dependencies.iter().map(|d| d.name.as_str());
        dedup_names(&self.name, referenced.chain(declared))
    }
}

static RELATION_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:from|join)\s+(?:"([^"]+)"|([A-Za-z_][A-Za-z0-9_$.]*))"#)
        .expect("static regex must compile")
});

/// A view definition.
///
/// # Examples
///
/// ```
/// use schema_sync_core::ViewDefinition;
///
/// let view = ViewDefinition::new(
///     "ORDER_TOTALS",
///     "SELECT c.NAME, SUM(o.AMOUNT) FROM CUSTOMERS c JOIN ORDERS o ON o.CUSTOMER_ID = c.ID GROUP BY c.NAME",
/// );
/// assert_eq!(view.dependency_names(), vec!["CUSTOMERS".to_string(), "ORDERS".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewDefinition {
    /// View name.
    pub name: String,
    /// `SELECT` statement defining the view.
    pub query: String,
    /// Explicit dependencies; inferred from the query when empty.
    #[serde(default)]
    pub dependencies: Vec<DependencyDeclaration>,
}

impl ViewDefinition {
    /// Creates a view with inferred dependencies.
    pub fn new(name: &str, query: &str) -> Self {
        Self {
            name: name.to_string(),
            query: query.to_string(),
            dependencies: Vec::new(),
        }
    }

    /// Names this view depends on.
    ///
    /// Declared dependencies win; otherwise every identifier following
    /// `FROM` or `JOIN` is taken, keeping only the last segment of
    /// qualified names.
    pub fn dependency_names(&self) -> Vec<String> {
        if !self.dependencies.is_empty() {
            return dedup_names(&self.name, self.dependencies.iter().map(|d| d.name.as_str()));
        }
        let inferred = RELATION_REFERENCE.captures_iter(&self.query).filter_map(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().rsplit('.').next().unwrap_or(m.as_str()))
        });
        dedup_names(&self.name, inferred)
    }
}

fn dedup_names<'a>(own: &str, names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .map(str::trim)
        .filter(|n| !n.is_empty() && *n != own)
        .filter(|n| seen.insert(n.to_string()))
        .map(String::from)
        .collect()
}

/// A composite schema grouping tables and views.
///
/// Schemas are expanded on registration: every member becomes an
/// independent artifact, while the schema itself is only tracked for its own
/// change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDefinition {
    /// Schema name.
    pub name: String,
    /// Member tables, with foreign keys already attached.
    pub tables: Vec<TableDefinition>,
    /// Member views.
    pub views: Vec<ViewDefinition>,
}

/// Raw payload of a bulk data operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPayload {
    /// Name of the table the rows apply to.
    pub target_table: String,
    /// `|`-delimited rows, one per line.
    pub payload: Vec<u8>,
}

/// Parsed body of a definition, one variant per [`ArtifactKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionBody {
    /// Table definition.
    Table(TableDefinition),
    /// View definition.
    View(ViewDefinition),
    /// Composite schema.
    Schema(SchemaDefinition),
    /// Delete all rows, then insert the payload.
    Replace(DataPayload),
    /// Insert the payload into an empty table.
    Append(DataPayload),
    /// Delete rows by primary key, or all rows with `*`.
    Delete(DataPayload),
    /// Insert payload rows whose primary key is absent.
    Update(DataPayload),
}

impl DefinitionBody {
    /// The artifact kind of this body.
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Table(_) => ArtifactKind::Table,
            Self::View(_) => ArtifactKind::View,
            Self::Schema(_) => ArtifactKind::Schema,
            Self::Replace(_) => ArtifactKind::Replace,
            Self::Append(_) => ArtifactKind::Append,
            Self::Delete(_) => ArtifactKind::Delete,
            Self::Update(_) => ArtifactKind::Update,
        }
    }

    /// The data payload for data operation bodies.
    pub fn data(&self) -> Option<&DataPayload> {
        match self {
            Self::Replace(data) | Self::Append(data) | Self::Delete(data) | Self::Update(data) => {
                Some(data)
            }
            _ => None,
        }
    }
}

/// A parsed artifact definition.
///
/// Identity for persistence is `location`; `name` must be unique within the
/// kind's namespace (see [`ArtifactKind::namespace`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDefinition {
    /// Source path uniquely identifying this definition instance.
    pub location: String,
    /// Logical name (table/view/schema name, or target table).
    pub name: String,
    /// Content fingerprint used for change detection.
    pub hash: String,
    /// Parsed body.
    pub body: DefinitionBody,
}

impl ArtifactDefinition {
    /// The artifact kind.
    pub fn kind(&self) -> ArtifactKind {
        self.body.kind()
    }

    /// Builds the record persisted in the artifact store.
    pub fn record(&self) -> ArtifactRecord {
        ArtifactRecord {
            location: self.location.clone(),
            name: self.name.clone(),
            kind: self.kind(),
            hash: self.hash.clone(),
        }
    }
}

/// A persisted artifact record: location → name → hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArtifactRecord {
    /// Source location (primary identity).
    pub location: String,
    /// Logical name.
    pub name: String,
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// Content hash recorded at the last synchronization.
    pub hash: String,
}

impl ArtifactRecord {
    /// Returns `true` if `definition` is semantically equal to this record.
    pub fn matches(&self, definition: &ArtifactDefinition) -> bool {
        self.kind == definition.kind()
            && self.name == definition.name
            && self.hash == definition.hash
    }
}

/// Outcome recorded for one artifact during a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactState {
    /// The artifact was created.
    SuccessfulCreate,
    /// The artifact was updated in place.
    SuccessfulUpdate,
    /// Creating or updating the artifact failed.
    FailedCreateUpdate,
    /// Dropping the artifact failed or was refused.
    FailedDelete,
    /// The artifact was rejected outright (e.g. name conflict).
    Fatal,
}

impl ArtifactState {
    /// Returns `true` for the three failure states.
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            Self::FailedCreateUpdate | Self::FailedDelete | Self::Fatal
        )
    }
}

impl fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::SuccessfulCreate => "SUCCESSFUL_CREATE",
            Self::SuccessfulUpdate => "SUCCESSFUL_UPDATE",
            Self::FailedCreateUpdate => "FAILED_CREATE_UPDATE",
            Self::FailedDelete => "FAILED_DELETE",
            Self::Fatal => "FATAL",
        };
        f.write_str(label)
    }
}

/// Computes the content hash of raw definition bytes (SHA-256, hex).
///
/// ```
/// use schema_sync_core::content_hash;
///
/// assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
/// assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
/// assert_eq!(content_hash(b"").len(), 64);
/// ```
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flexible {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Flexible::deserialize(deserializer)? {
        Flexible::Bool(value) => Ok(value),
        Flexible::Number(n) => Ok(n.as_i64().is_some_and(|v| v != 0)),
        Flexible::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!(
                "expected a boolean, found '{other}'"
            ))),
        },
    }
}

fn flexible_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Flexible>::deserialize(deserializer)? {
        None => None,
        Some(Flexible::Bool(value)) => Some(value.to_string()),
        Some(Flexible::Number(n)) => Some(n.to_string()),
        Some(Flexible::Text(text)) if text.trim().is_empty() => None,
        Some(Flexible::Text(text)) => Some(text.trim().to_string()),
    })
}
