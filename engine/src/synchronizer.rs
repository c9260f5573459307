//! Pass orchestration.
//!
//! A pass runs discovery, change detection, the six structural phases,
//! orphan cleanup and finally the data operations. Per-artifact failures
//! are recorded and the pass keeps going; only a failing source listing or
//! artifact store aborts it.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, PoisonError, TryLockError};

use schema_sync_core::{
    ArtifactDefinition, ArtifactKind, ArtifactState, ArtifactStore, DefinitionSource, Problem,
    ProblemSink, SqlExecutor,
};
use serde::Serialize;
use tracing::{error, info};

use crate::change::{ChangeDetector, Outcome};
use crate::cleanup::cleanup_orphans;
use crate::content::ContentReconciler;
use crate::context::PassContext;
use crate::discovery::{ProvenanceCount, discover};
use crate::error::{ContentError, Result};
use crate::phases::{PhaseReport, PhaseRunner};
use crate::plan::{SyncNode, SyncPlan};
use crate::state::StateEntry;

/// Data operation kinds in the order they are applied.
const DATA_ORDER: [ArtifactKind; 4] = [
    ArtifactKind::Replace,
    ArtifactKind::Append,
    ArtifactKind::Delete,
    ArtifactKind::Update,
];

/// Result of [`Synchronizer::run_pass`].
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum PassOutcome {
    /// The pass ran to the end.
    Completed(PassSummary),
    /// The pass did not run; carries the reason.
    Skipped(String),
}

impl PassOutcome {
    /// The summary of a completed pass.
    pub fn summary(&self) -> Option<&PassSummary> {
        match self {
            Self::Completed(summary) => Some(summary),
            Self::Skipped(_) => None,
        }
    }
}

/// What one completed pass did.
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    /// Artifacts in [`ArtifactState::SuccessfulCreate`].
    pub created: usize,
    /// Artifacts in [`ArtifactState::SuccessfulUpdate`].
    pub updated: usize,
    /// Artifacts in a failure state.
    pub failed: usize,
    /// Orphan records removed.
    pub orphans_removed: usize,
    /// Per-artifact outcomes, in first-recorded order.
    pub states: Vec<StateEntry>,
    /// Problems reported during the pass.
    pub problems: Vec<Problem>,
    /// Definitions per kind and provenance.
    pub counts: Vec<ProvenanceCount>,
    /// Per-phase depletion results.
    pub phases: Vec<PhaseReport>,
    /// Names of tables and views on dependency cycles.
    pub cycles: Vec<String>,
}

impl PassSummary {
    /// State recorded for `location`.
    pub fn state_of(&self, location: &str) -> Option<ArtifactState> {
        self.states
            .iter()
            .find(|e| e.location == location)
            .map(|e| e.state)
    }
}

/// Brings the live database in line with the definitions of a source.
///
/// One synchronizer guards its passes with a mutex: scheduled passes skip
/// while another pass runs, forced passes wait for it. The mutex is local
/// to the process; two processes reconciling the same database are not
/// excluded from each other.
pub struct Synchronizer<S, A, E, P> {
    source: S,
    store: A,
    executor: E,
    sink: P,
    enabled: bool,
    guard: Mutex<()>,
}

impl<S, A, E, P> Synchronizer<S, A, E, P>
where
    S: DefinitionSource + Sync,
    A: ArtifactStore,
    E: SqlExecutor,
    P: ProblemSink,
{
    /// Creates an enabled synchronizer.
    pub fn new(source: S, store: A, executor: E, sink: P) -> Self {
        Self {
            source,
            store,
            executor,
            sink,
            enabled: true,
            guard: Mutex::new(()),
        }
    }

    /// Enables or disables scheduled passes.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns `true` if scheduled passes run.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The artifact store.
    pub fn store(&self) -> &A {
        &self.store
    }

    /// The SQL executor.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Runs one pass.
    ///
    /// A scheduled pass (`forced == false`) is skipped when synchronization
    /// is disabled or another pass holds the lock. A forced pass always
    /// runs, after waiting for any pass in progress.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError`](crate::SyncError) when the source cannot list
    /// its content or the artifact store fails outside per-artifact
    /// handling.
    pub fn run_pass(&self, forced: bool) -> Result<PassOutcome> {
        let _guard = if forced {
            self.guard.lock().unwrap_or_else(PoisonError::into_inner)
        } else {
            if !self.enabled {
                info!("synchronization disabled, scheduled pass skipped");
                return Ok(PassOutcome::Skipped("synchronization is disabled".to_string()));
            }
            match self.guard.try_lock() {
                Ok(guard) => guard,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    info!("another pass is running, scheduled pass skipped");
                    return Ok(PassOutcome::Skipped("another pass is running".to_string()));
                }
            }
        };

        info!(forced, "synchronization pass started");
        self.execute().map(PassOutcome::Completed).inspect_err(|err| {
            error!(error = %err, "synchronization pass failed");
        })
    }

    fn execute(&self) -> Result<PassSummary> {
        let mut ctx = PassContext::new(&self.sink);
        let discovery = discover(&self.source)?;

        for failure in &discovery.failures {
            ctx.mark_unparsed(&failure.location);
            ctx.fail(
                &failure.location,
                &location_stem(&failure.location),
                failure.kind,
                ArtifactState::FailedCreateUpdate,
                "PARSE",
                failure.error.to_string(),
            );
        }

        let detector = ChangeDetector::new(&self.store);
        let mut classified: Vec<(&ArtifactDefinition, Outcome)> = Vec::new();
        for definition in &discovery.definitions {
            ctx.touch(&definition.location);
            match detector.reconcile_definition(definition) {
                Ok(Outcome::Conflict { owner }) => ctx.fail(
                    &definition.location,
                    &definition.name,
                    definition.kind(),
                    ArtifactState::Fatal,
                    "CONFLICT",
                    format!(
                        "{} {} is already defined at {owner}",
                        definition.kind(),
                        definition.name
                    ),
                ),
                Ok(outcome) => classified.push((definition, outcome)),
                Err(err) => ctx.fail(
                    &definition.location,
                    &definition.name,
                    definition.kind(),
                    ArtifactState::FailedCreateUpdate,
                    "STORAGE",
                    err.to_string(),
                ),
            }
        }

        for (definition, outcome) in &classified {
            if let Outcome::Renamed { from } = outcome {
                if definition.kind().is_relation() {
                    ctx.retire(&definition.location, from, definition.kind());
                }
            }
            if definition.kind() == ArtifactKind::Schema && outcome.is_change() {
                ctx.record(
                    &definition.location,
                    &definition.name,
                    ArtifactKind::Schema,
                    success_state(outcome),
                );
            }
        }

        let plan = SyncPlan::build(
            classified
                .iter()
                .filter_map(|(definition, outcome)| SyncNode::new(definition, outcome.clone()))
                .collect(),
        );
        let cycles = plan.cycle_names();
        for (i, node) in plan.nodes().iter().enumerate() {
            if plan.is_cyclic(i) {
                ctx.report(Problem::new(
                    node.location(),
                    "CYCLE",
                    format!("{} lies on dependency cycle: {}", node.name(), cycles.join(", ")),
                    Some(node.kind()),
                ));
            }
        }
        let phases = PhaseRunner::new(&self.executor, &plan).run_all(&mut ctx);

        let live_relations: HashSet<String> = plan
            .nodes()
            .iter()
            .map(|node| node.name().to_ascii_lowercase())
            .collect();
        let orphans_removed = cleanup_orphans(&self.store, &self.executor, &live_relations, &mut ctx)?;

        let reconciler = ContentReconciler::new(&self.executor);
        for kind in DATA_ORDER {
            for (definition, outcome) in classified.iter().filter(|(d, _)| d.kind() == kind) {
                if !outcome.is_change() {
                    continue;
                }
                let result = if ctx.recorder().has_failed(ArtifactKind::Table, &definition.name) {
                    Err(ContentError::TargetUnavailable(definition.name.clone()))
                } else {
                    reconciler.apply(definition)
                };
                match result {
                    Ok(_) => ctx.record(
                        &definition.location,
                        &definition.name,
                        kind,
                        success_state(outcome),
                    ),
                    Err(err) => ctx.fail(
                        &definition.location,
                        &definition.name,
                        kind,
                        ArtifactState::FailedCreateUpdate,
                        err.error_type(),
                        err.to_string(),
                    ),
                }
            }
        }

        let (recorder, problems) = ctx.into_parts();
        let summary = PassSummary {
            created: recorder.count(ArtifactState::SuccessfulCreate),
            updated: recorder.count(ArtifactState::SuccessfulUpdate),
            failed: recorder.failures(),
            orphans_removed,
            states: recorder.into_entries(),
            problems,
            counts: discovery.counts,
            phases,
            cycles,
        };
        for count in &summary.counts {
            if count.predelivered + count.registry > 0 {
                info!(
                    kind = %count.kind,
                    predelivered = count.predelivered,
                    registry = count.registry,
                    "definitions discovered"
                );
            }
        }
        info!(
            created = summary.created,
            updated = summary.updated,
            failed = summary.failed,
            orphans_removed = summary.orphans_removed,
            "synchronization pass finished"
        );
        Ok(summary)
    }
}

fn success_state(outcome: &Outcome) -> ArtifactState {
    match outcome {
        Outcome::Updated | Outcome::Renamed { .. } => ArtifactState::SuccessfulUpdate,
        _ => ArtifactState::SuccessfulCreate,
    }
}

/// File stem of a location, used as the name of definitions that failed to
/// parse.
fn location_stem(location: &str) -> String {
    Path::new(location)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| location.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NullProblemSink;
    use crate::testing::RecordingExecutor;
    use schema_sync_core::SourceError;
    use schema_sync_db::{ManifestStore, MemorySource};
    use std::sync::Condvar;

    type TestSync<'a> =
        Synchronizer<&'a MemorySource, &'a ManifestStore, &'a RecordingExecutor, NullProblemSink>;

    fn sync<'a>(
        source: &'a MemorySource,
        store: &'a ManifestStore,
        exec: &'a RecordingExecutor,
    ) -> TestSync<'a> {
        Synchronizer::new(source, store, exec, NullProblemSink)
    }

    fn table(name: &str, references: &[&str]) -> String {
        let columns: String = references
            .iter()
            .map(|r| format!(r#", {{"name": "{r}_ID", "type": "INTEGER"}}"#))
            .collect();
        let fks: Vec<String> = references
            .iter()
            .map(|r| {
                format!(
                    r#"{{"name": "FK_{name}_{r}", "columns": ["{r}_ID"], "referencedTable": "{r}", "referencedColumns": ["ID"]}}"#
                )
            })
            .collect();
        format!(
            r#"{{"name": "{name}", "columns": [{{"name": "ID", "type": "INTEGER", "primaryKey": true}}{columns}],
                "constraints": {{"foreignKeys": [{}]}}}}"#,
            fks.join(",")
        )
    }

    fn completed(outcome: PassOutcome) -> PassSummary {
        match outcome {
            PassOutcome::Completed(summary) => summary,
            PassOutcome::Skipped(reason) => panic!("pass skipped: {reason}"),
        }
    }

    #[test]
    fn test_parents_are_created_before_children() {
        let source = MemorySource::new();
        source.put_registry("/app/a_orders.table", table("ORDERS", &["CUSTOMERS"]));
        source.put_registry("/app/b_customers.table", table("CUSTOMERS", &[]));
        let store = ManifestStore::in_memory();
        let exec = RecordingExecutor::new();

        let summary = completed(sync(&source, &store, &exec).run_pass(true).unwrap());

        assert_eq!(
            exec.log(),
            vec![
                "create_table CUSTOMERS",
                "create_table ORDERS",
                "create_foreign_keys ORDERS"
            ]
        );
        assert_eq!(summary.created, 2);
        assert_eq!(summary.failed, 0);
    }

    #[test]
    fn test_second_pass_writes_nothing() {
        let source = MemorySource::new();
        source.put_registry("/app/customers.table", table("CUSTOMERS", &[]));
        source.put_registry("/app/orders.table", table("ORDERS", &["CUSTOMERS"]));
        source.put_registry(
            "/app/recent.view",
            r#"{"name": "RECENT", "query": "SELECT * FROM ORDERS"}"#,
        );
        source.put_registry("/app/CUSTOMERS.append", "1\n2\n");
        let store = ManifestStore::in_memory();
        let exec = RecordingExecutor::new();
        let synchronizer = sync(&source, &store, &exec);

        completed(synchronizer.run_pass(true).unwrap());
        exec.clear_log();
        let second = completed(synchronizer.run_pass(true).unwrap());

        assert!(exec.log().is_empty(), "unexpected writes: {:?}", exec.log());
        assert_eq!(second.created + second.updated + second.failed, 0);
        assert_eq!(exec.rows("CUSTOMERS").len(), 2);
    }

    #[test]
    fn test_conflicting_definition_never_reaches_executor() {
        let source = MemorySource::new();
        source.put_registry("/a/customers.table", table("CUSTOMERS", &[]));
        source.put_registry("/b/customers.table", table("CUSTOMERS", &[]));
        let store = ManifestStore::in_memory();
        let exec = RecordingExecutor::new();

        let summary = completed(sync(&source, &store, &exec).run_pass(true).unwrap());

        assert_eq!(exec.log(), vec!["create_table CUSTOMERS"]);
        assert_eq!(summary.state_of("/b/customers.table"), Some(ArtifactState::Fatal));
        assert_eq!(summary.problems[0].error_type, "CONFLICT");
    }

    #[test]
    fn test_cycle_still_makes_progress() {
        let source = MemorySource::new();
        source.put_registry("/c/a.table", table("A", &["C"]));
        source.put_registry("/c/b.table", table("B", &["A"]));
        source.put_registry("/c/c.table", table("C", &["B"]));
        let store = ManifestStore::in_memory();
        let exec = RecordingExecutor::new();

        let summary = completed(sync(&source, &store, &exec).run_pass(true).unwrap());

        assert_eq!(summary.cycles, vec!["A", "B", "C"]);
        for name in ["A", "B", "C"] {
            assert!(exec.table_exists(name).unwrap());
        }
        assert_eq!(summary.failed, 0);
        assert!(summary.problems.iter().all(|p| p.error_type == "CYCLE"));
    }

    #[test]
    fn test_failed_parent_blocks_children_and_data() {
        let source = MemorySource::new();
        source.put_registry("/app/customers.table", table("CUSTOMERS", &[]));
        source.put_registry("/app/orders.table", table("ORDERS", &["CUSTOMERS"]));
        source.put_registry("/app/other.table", table("OTHER", &[]));
        source.put_registry("/app/CUSTOMERS.append", "1\n");
        let store = ManifestStore::in_memory();
        let exec = RecordingExecutor::new();
        exec.fail_on("create_table CUSTOMERS");

        let summary = completed(sync(&source, &store, &exec).run_pass(true).unwrap());

        assert!(exec.table_exists("OTHER").unwrap());
        assert!(!exec.table_exists("ORDERS").unwrap());
        assert_eq!(
            summary.state_of("/app/orders.table"),
            Some(ArtifactState::FailedCreateUpdate)
        );
        assert_eq!(
            summary.state_of("/app/CUSTOMERS.append"),
            Some(ArtifactState::FailedCreateUpdate)
        );
        assert!(
            summary
                .problems
                .iter()
                .any(|p| p.location == "/app/CUSTOMERS.append" && p.error_type == "DEPENDENCY")
        );
    }

    #[test]
    fn test_unparseable_definition_keeps_its_table() {
        let source = MemorySource::new();
        source.put_registry("/app/customers.table", table("CUSTOMERS", &[]));
        let store = ManifestStore::in_memory();
        let exec = RecordingExecutor::new();
        let synchronizer = sync(&source, &store, &exec);
        completed(synchronizer.run_pass(true).unwrap());

        source.put_registry("/app/customers.table", "{ broken");
        exec.clear_log();
        let summary = completed(synchronizer.run_pass(true).unwrap());

        assert!(exec.log().is_empty());
        assert!(store.get("/app/customers.table").unwrap().is_some());
        assert_eq!(summary.orphans_removed, 0);
        assert_eq!(summary.problems[0].error_type, "PARSE");
    }

    #[test]
    fn test_removed_definition_is_dropped() {
        let source = MemorySource::new();
        source.put_registry("/app/customers.table", table("CUSTOMERS", &[]));
        let store = ManifestStore::in_memory();
        let exec = RecordingExecutor::new();
        let synchronizer = sync(&source, &store, &exec);
        completed(synchronizer.run_pass(true).unwrap());

        source.remove("/app/customers.table");
        let summary = completed(synchronizer.run_pass(true).unwrap());

        assert_eq!(summary.orphans_removed, 1);
        assert!(!exec.table_exists("CUSTOMERS").unwrap());
    }

    /// Holds the first listing until [`GatedSource::open`] is called.
    struct GatedSource {
        inner: MemorySource,
        state: Mutex<(bool, bool)>,
        changed: Condvar,
    }

    impl GatedSource {
        fn new(inner: MemorySource) -> Self {
            Self {
                inner,
                state: Mutex::new((false, false)),
                changed: Condvar::new(),
            }
        }

        fn wait_entered(&self) {
            let mut state = self.state.lock().unwrap();
            while !state.0 {
                state = self.changed.wait(state).unwrap();
            }
        }

        fn open(&self) {
            self.state.lock().unwrap().1 = true;
            self.changed.notify_all();
        }
    }

    impl DefinitionSource for GatedSource {
        fn list_predelivered(
            &self,
            kind: ArtifactKind,
        ) -> std::result::Result<Vec<String>, SourceError> {
            let mut state = self.state.lock().unwrap();
            state.0 = true;
            self.changed.notify_all();
            while !state.1 {
                state = self.changed.wait(state).unwrap();
            }
            drop(state);
            self.inner.list_predelivered(kind)
        }

        fn list_registry(
            &self,
            kind: ArtifactKind,
        ) -> std::result::Result<Vec<String>, SourceError> {
            self.inner.list_registry(kind)
        }

        fn load(&self, location: &str) -> std::result::Result<Vec<u8>, SourceError> {
            self.inner.load(location)
        }
    }

    #[test]
    fn test_scheduled_pass_skips_while_another_runs() {
        let inner = MemorySource::new();
        inner.put_registry("/app/customers.table", table("CUSTOMERS", &[]));
        let source = GatedSource::new(inner);
        let store = ManifestStore::in_memory();
        let exec = RecordingExecutor::new();
        let synchronizer = Synchronizer::new(&source, &store, &exec, NullProblemSink);

        std::thread::scope(|scope| {
            let first = scope.spawn(|| completed(synchronizer.run_pass(true).unwrap()).created);
            source.wait_entered();

            match synchronizer.run_pass(false).unwrap() {
                PassOutcome::Skipped(reason) => assert_eq!(reason, "another pass is running"),
                PassOutcome::Completed(_) => panic!("scheduled pass ran during another pass"),
            }

            let forced = scope.spawn(|| completed(synchronizer.run_pass(true).unwrap()).created);
            source.open();

            assert_eq!(first.join().unwrap(), 1);
            assert_eq!(forced.join().unwrap(), 0);
        });

        assert_eq!(exec.log(), vec!["create_table CUSTOMERS"]);
        assert!(synchronizer.run_pass(false).unwrap().summary().is_some());
    }

    #[test]
    fn test_disabled_skips_scheduled_but_not_forced() {
        let source = MemorySource::new();
        source.put_registry("/app/customers.table", table("CUSTOMERS", &[]));
        let store = ManifestStore::in_memory();
        let exec = RecordingExecutor::new();
        let synchronizer = sync(&source, &store, &exec).with_enabled(false);

        assert!(matches!(
            synchronizer.run_pass(false).unwrap(),
            PassOutcome::Skipped(_)
        ));
        assert!(exec.log().is_empty());
        assert!(synchronizer.run_pass(true).unwrap().summary().is_some());
        assert!(exec.table_exists("CUSTOMERS").unwrap());
    }
}
