//! SQLite dialect for schema synchronization.
//!
//! This crate implements the collaborator traits of
//! [`schema_sync_core`] on top of a `rusqlite` connection:
//!
//! - **`schema`** / **`migration`**: the prefixed bookkeeping tables
//!   (artifact records, identity counters, problems) and their lifecycle
//! - **`store`**: [`SqliteArtifactStore`], the durable artifact record
//! - **`ddl`** / **`executor`**: [`SqliteExecutor`], DDL and DML against
//!   the live database, with foreign keys emulated by triggers
//! - **`problems`**: [`SqliteProblemSink`], persisted problem reports
//!
//! Every type borrows the connection, so one connection can back the store,
//! the executor and the sink of a pass at the same time.
//!
//! # Quick start
//!
//! ```no_run
//! use schema_sync_sqlite::{Migration, SqliteArtifactStore, SqliteExecutor};
//! use rusqlite::Connection;
//!
//! let conn = Connection::open("app.db").unwrap();
//! Migration::new(&conn, "sync_").unwrap().up().unwrap();
//!
//! let store = SqliteArtifactStore::new(&conn, "sync_").unwrap();
//! let executor = SqliteExecutor::new(&conn, "sync_").unwrap();
//! # let _ = (store, executor);
//! ```
//!
//! # Table prefix customization
//!
//! Bookkeeping tables and foreign key triggers carry a configurable prefix,
//! allowing several isolated setups within the same SQLite database.
//! Prefixes must contain only alphanumeric characters and underscores.

mod ddl;
mod error;
mod executor;
mod migration;
mod problems;
mod schema;
mod store;

pub use ddl::quote_ident;
pub use error::{Result, SqliteError};
pub use executor::SqliteExecutor;
pub use migration::{Migration, MigrationStatus};
pub use problems::{ProblemRecord, SqliteProblemSink};
pub use schema::{generate_drop_sql, generate_schema_sql};
pub use store::SqliteArtifactStore;
