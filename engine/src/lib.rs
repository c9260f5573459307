//! Reconciliation engine for declarative schema synchronization.
//!
//! One [`Synchronizer::run_pass`] brings a live database into line with the
//! definitions a [`DefinitionSource`](schema_sync_core::DefinitionSource)
//! currently supplies:
//!
//! 1. **Discovery**: list both provenances, load and parse in parallel.
//! 2. **Change detection** ([`ChangeDetector`]): created, updated or
//!    unchanged per location; duplicate names are rejected.
//! 3. **Structural phases** ([`PhaseRunner`] over a [`SyncPlan`]): drop
//!    views, drop foreign keys, drop tables, create tables, create foreign
//!    keys, create views. Drops walk the create order backwards.
//! 4. **Orphan cleanup** ([`cleanup_orphans`]): records whose definition
//!    disappeared are removed and their objects dropped.
//! 5. **Data operations** ([`ContentReconciler`]): replace, append, delete
//!    and update against tables that synchronized.
//!
//! Every artifact ends the pass with an
//! [`ArtifactState`](schema_sync_core::ArtifactState) collected by the
//! [`StateRecorder`]; one artifact failing never stops the others.
//!
//! # Example
//!
//! ```
//! use rusqlite::Connection;
//! use schema_sync_db::MemorySource;
//! use schema_sync_engine::{Synchronizer, TracingProblemSink};
//! use schema_sync_sqlite::{Migration, SqliteArtifactStore, SqliteExecutor};
//!
//! let conn = Connection::open_in_memory().unwrap();
//! Migration::new(&conn, "sync_").unwrap().up().unwrap();
//!
//! let source = MemorySource::new();
//! source.put_registry(
//!     "/app/customers.table",
//!     r#"{"name": "CUSTOMERS", "columns": [{"name": "ID", "type": "INTEGER", "primaryKey": true}]}"#,
//! );
//! source.put_registry("/app/CUSTOMERS.append", "1\n2\n");
//!
//! let synchronizer = Synchronizer::new(
//!     &source,
//!     SqliteArtifactStore::new(&conn, "sync_").unwrap(),
//!     SqliteExecutor::new(&conn, "sync_").unwrap(),
//!     TracingProblemSink,
//! );
//! let outcome = synchronizer.run_pass(true).unwrap();
//! assert_eq!(outcome.summary().unwrap().created, 2);
//! ```

mod change;
mod cleanup;
mod content;
mod context;
mod discovery;
mod error;
mod phases;
mod plan;
mod sink;
mod state;
mod synchronizer;

#[cfg(test)]
mod testing;

pub use change::{ChangeDetector, Outcome};
pub use cleanup::cleanup_orphans;
pub use content::ContentReconciler;
pub use context::PassContext;
pub use discovery::{Discovery, DiscoveryError, DiscoveryFailure, ProvenanceCount, discover};
pub use error::{ContentError, Result, SyncError};
pub use phases::{PHASES, Phase, PhaseReport, PhaseRunner, PhaseSpec};
pub use plan::{SyncNode, SyncPlan};
pub use sink::{NullProblemSink, TracingProblemSink};
pub use state::{StateEntry, StateRecorder};
pub use synchronizer::{PassOutcome, PassSummary, Synchronizer};
