//! Core definition model for declarative schema synchronization.
//!
//! This crate defines everything the synchronization engine needs that does
//! not touch I/O:
//!
//! - [`ArtifactDefinition`] and its [`DefinitionBody`] variants: tables,
//!   views, composite schemas and the four bulk data operations.
//! - [`parse_definition`] / [`expand_schema`]: bytes → definitions.
//! - [`validate_table`] / [`validate_view`]: structural checks.
//! - [`DependencyGraph`]: dependency resolution and a best-effort
//!   topological sort that tolerates cycles.
//! - [`read_rows`] / [`DeletePayload`]: the `|`-delimited payload format.
//! - Collaborator traits ([`DefinitionSource`], [`ArtifactStore`],
//!   [`SqlExecutor`], [`ProblemSink`]) and their error types.
//!
//! # Example
//!
//! ```
//! use schema_sync_core::*;
//!
//! let customers = parse_definition(
//!     "/app/customers.table",
//!     br#"{"name": "CUSTOMERS", "columns": [{"name": "ID", "type": "INTEGER", "primaryKey": true}]}"#,
//! ).unwrap();
//! let orders = parse_definition(
//!     "/app/orders.table",
//!     br#"{"name": "ORDERS", "columns": [
//!         {"name": "ID", "type": "INTEGER", "primaryKey": true},
//!         {"name": "CUSTOMER_ID", "type": "INTEGER"}
//!     ], "constraints": {"foreignKeys": [
//!         {"name": "FK_CUSTOMER", "columns": ["CUSTOMER_ID"],
//!          "referencedTable": "CUSTOMERS", "referencedColumns": ["ID"]}
//!     ]}}"#,
//! ).unwrap();
//!
//! let tables: Vec<&TableDefinition> = [&orders, &customers]
//!     .iter()
//!     .filter_map(|d| match &d.body {
//!         DefinitionBody::Table(t) => Some(t),
//!         _ => None,
//!     })
//!     .collect();
//! let graph = DependencyGraph::build(tables.iter().map(|t| (t.name.as_str(), t.dependency_names())));
//! let sorted = graph.sort();
//! assert_eq!(graph.name(sorted.order[0]), "CUSTOMERS");
//! ```

mod error;
mod graph;
mod parse;
mod payload;
mod ports;
mod types;
mod validate;

pub use error::{ParseError, Result, SourceError, StorageError, StorageResult};
pub use graph::{DependencyGraph, SortedOrder, UnresolvedDependency};
pub use parse::{MEMBER_SEPARATOR, expand_schema, member_location, owning_schema, parse_definition};
pub use payload::{DELIMITER, DeletePayload, Row, read_rows};
pub use ports::{
    ArtifactStore, DefinitionSource, LiveColumn, LiveTable, Problem, ProblemSink, SqlExecutor,
};
pub use types::*;
pub use validate::{ValidationError, validate_table, validate_view};
