//! The six structural phases and the depletion loop that runs them.
//!
//! Phases run strictly in [`PHASES`] order. Each phase walks the plan's
//! order (backwards for drop phases) and repeatedly scans the nodes it
//! applies to until a scan makes no progress:
//!
//! - in drop phases every node is ready immediately, since the reversed
//!   create order already puts dependents first;
//! - in create phases a node is ready once each of its dependencies has
//!   completed the same phase (dependencies of another kind only need to
//!   be healthy). Nodes outside the strictly ordered prefix ignore their
//!   dependencies on each other, so cycles still make progress.
//!
//! A failed action or a node left undepleted poisons that node for the
//! remaining phases of the pass; every other node carries on.

use schema_sync_core::{ArtifactKind, ArtifactState, SqlExecutor, StorageResult};
use serde::Serialize;
use tracing::{debug, info};

use crate::context::PassContext;
use crate::plan::SyncPlan;

/// One structural phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    /// Drop changed views.
    DropViews,
    /// Drop the foreign keys of changed tables.
    DropForeignKeys,
    /// Drop changed tables that hold no rows.
    DropTables,
    /// Create, recreate or alter tables.
    CreateTables,
    /// Create foreign keys of rebuilt tables.
    CreateForeignKeys,
    /// Create missing views.
    CreateViews,
}

/// Static description of a phase.
#[derive(Debug, Clone, Copy)]
pub struct PhaseSpec {
    /// The phase.
    pub phase: Phase,
    /// Walk the plan order backwards.
    pub reverse: bool,
    /// Node kind the phase applies to.
    pub kind: ArtifactKind,
    /// State recorded when the phase fails for a node.
    pub failure: ArtifactState,
    /// Problem category for failures.
    pub error_type: &'static str,
}

/// Phase table in execution order.
pub const PHASES: [PhaseSpec; 6] = [
    PhaseSpec {
        phase: Phase::DropViews,
        reverse: true,
        kind: ArtifactKind::View,
        failure: ArtifactState::FailedDelete,
        error_type: "DROP_VIEW",
    },
    PhaseSpec {
        phase: Phase::DropForeignKeys,
        reverse: true,
        kind: ArtifactKind::Table,
        failure: ArtifactState::FailedDelete,
        error_type: "DROP_FOREIGN_KEYS",
    },
    PhaseSpec {
        phase: Phase::DropTables,
        reverse: true,
        kind: ArtifactKind::Table,
        failure: ArtifactState::FailedDelete,
        error_type: "DROP_TABLE",
    },
    PhaseSpec {
        phase: Phase::CreateTables,
        reverse: false,
        kind: ArtifactKind::Table,
        failure: ArtifactState::FailedCreateUpdate,
        error_type: "CREATE_TABLE",
    },
    PhaseSpec {
        phase: Phase::CreateForeignKeys,
        reverse: false,
        kind: ArtifactKind::Table,
        failure: ArtifactState::FailedCreateUpdate,
        error_type: "CREATE_FOREIGN_KEYS",
    },
    PhaseSpec {
        phase: Phase::CreateViews,
        reverse: false,
        kind: ArtifactKind::View,
        failure: ArtifactState::FailedCreateUpdate,
        error_type: "CREATE_VIEW",
    },
];

/// What happened in one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    /// The phase.
    pub phase: Phase,
    /// Nodes whose action succeeded.
    pub completed: usize,
    /// Nodes whose action failed.
    pub failed: usize,
    /// Names of nodes that never became ready.
    pub undepleted: Vec<String>,
}

/// Runs the phases of one plan against an executor.
pub struct PhaseRunner<'r, 'd, E: ?Sized> {
    executor: &'r E,
    plan: &'r SyncPlan<'d>,
    poisoned: Vec<bool>,
    rebuilt: Vec<bool>,
}

impl<'r, 'd, E: SqlExecutor + ?Sized> PhaseRunner<'r, 'd, E> {
    /// Creates a runner for `plan`.
    pub fn new(executor: &'r E, plan: &'r SyncPlan<'d>) -> Self {
        let count = plan.nodes().len();
        Self {
            executor,
            plan,
            poisoned: vec![false; count],
            rebuilt: vec![false; count],
        }
    }

    /// Runs all six phases in order.
    pub fn run_all(&mut self, ctx: &mut PassContext<'_>) -> Vec<PhaseReport> {
        PHASES.iter().map(|spec| self.deplete(spec, ctx)).collect()
    }

    /// Runs one phase to depletion.
    pub fn deplete(&mut self, spec: &PhaseSpec, ctx: &mut PassContext<'_>) -> PhaseReport {
        let plan = self.plan;
        let mut pending: Vec<usize> = if spec.reverse {
            plan.order().iter().rev().copied().collect()
        } else {
            plan.order().to_vec()
        };
        pending.retain(|&i| plan.node(i).kind() == spec.kind && !self.poisoned[i]);

        let mut done = vec![false; plan.nodes().len()];
        let mut report = PhaseReport {
            phase: spec.phase,
            completed: 0,
            failed: 0,
            undepleted: Vec::new(),
        };

        loop {
            let mut progressed = false;
            let mut waiting = Vec::with_capacity(pending.len());
            for i in pending {
                if !spec.reverse && !self.is_ready(i, spec.kind, &done) {
                    waiting.push(i);
                    continue;
                }
                progressed = true;
                let node = plan.node(i);
                match self.act(spec.phase, i) {
                    Ok(state) => {
                        done[i] = true;
                        report.completed += 1;
                        if let Some(state) = state {
                            ctx.record(node.location(), node.name(), node.kind(), state);
                        }
                    }
                    Err(err) => {
                        self.poisoned[i] = true;
                        report.failed += 1;
                        ctx.fail(
                            node.location(),
                            node.name(),
                            node.kind(),
                            spec.failure,
                            spec.error_type,
                            self.attribute(i, err.to_string()),
                        );
                    }
                }
            }
            pending = waiting;
            if pending.is_empty() || !progressed {
                break;
            }
        }

        for i in pending {
            self.poisoned[i] = true;
            let node = plan.node(i);
            let blockers: Vec<&str> = plan
                .dependencies(i)
                .iter()
                .filter(|&&d| !self.dependency_done(d, spec.kind, &done))
                .map(|&d| plan.node(d).name())
                .collect();
            ctx.fail(
                node.location(),
                node.name(),
                node.kind(),
                spec.failure,
                "UNDEPLETED",
                self.attribute(
                    i,
                    format!("{:?} blocked by dependencies: {}", spec.phase, blockers.join(", ")),
                ),
            );
            report.undepleted.push(node.name().to_string());
        }

        debug!(
            phase = ?spec.phase,
            completed = report.completed,
            failed = report.failed,
            undepleted = report.undepleted.len(),
            "phase depleted"
        );
        report
    }

    /// Returns `true` if node `index` failed in an earlier phase.
    pub fn is_poisoned(&self, index: usize) -> bool {
        self.poisoned[index]
    }

    fn is_ready(&self, i: usize, kind: ArtifactKind, done: &[bool]) -> bool {
        let strict = self.plan.is_strict(i);
        self.plan.dependencies(i).iter().all(|&d| {
            (!strict && !self.plan.is_strict(d)) || self.dependency_done(d, kind, done)
        })
    }

    fn dependency_done(&self, d: usize, kind: ArtifactKind, done: &[bool]) -> bool {
        if self.plan.node(d).kind() == kind {
            done[d]
        } else {
            !self.poisoned[d]
        }
    }

    fn attribute(&self, i: usize, message: String) -> String {
        if self.plan.is_cyclic(i) {
            format!(
                "{message} (node lies on dependency cycle: {})",
                self.plan.cycle_names().join(", ")
            )
        } else {
            message
        }
    }

    /// The action of `phase` for node `i`; returns the state to record, if
    /// the node's object was built.
    fn act(&mut self, phase: Phase, i: usize) -> StorageResult<Option<ArtifactState>> {
        let plan = self.plan;
        let node = plan.node(i);
        let name = node.name();
        let exec = self.executor;

        match phase {
            Phase::DropViews => {
                if node.is_changed() && exec.view_exists(name)? {
                    exec.drop_view(name)?;
                    info!(view = %name, "view dropped");
                }
                Ok(None)
            }
            Phase::DropForeignKeys => {
                if node.is_changed() && exec.table_exists(name)? {
                    exec.drop_foreign_keys(name)?;
                }
                Ok(None)
            }
            Phase::DropTables => {
                if node.is_changed() && exec.table_exists(name)? {
                    if exec.row_count(name)? == 0 {
                        exec.drop_table(name)?;
                        info!(table = %name, "empty table dropped for recreation");
                    } else {
                        debug!(table = %name, "table holds rows, kept for alter");
                    }
                }
                Ok(None)
            }
            Phase::CreateTables => {
                let Some(table) = node.table() else {
                    return Ok(None);
                };
                if !exec.table_exists(name)? {
                    exec.create_table(table)?;
                    self.rebuilt[i] = true;
                    info!(table = %name, "table created");
                    let state = if node.is_changed() {
                        node.success_state()
                    } else {
                        ArtifactState::SuccessfulCreate
                    };
                    return Ok(Some(state));
                }
                if !node.is_changed() {
                    return Ok(None);
                }
                if exec.row_count(name)? == 0 {
                    exec.drop_table(name)?;
                    exec.create_table(table)?;
                    self.rebuilt[i] = true;
                    info!(table = %name, "table recreated");
                } else {
                    exec.alter_table(table)?;
                    info!(table = %name, "table altered");
                }
                Ok(Some(node.success_state()))
            }
            Phase::CreateForeignKeys => {
                let Some(table) = node.table() else {
                    return Ok(None);
                };
                if table.foreign_keys().is_empty() {
                    return Ok(None);
                }
                let dependency_rebuilt = plan.dependencies(i).iter().any(|&d| self.rebuilt[d]);
                if node.is_changed() || self.rebuilt[i] || dependency_rebuilt {
                    exec.create_foreign_keys(table)?;
                    debug!(table = %name, "foreign keys created");
                }
                Ok(None)
            }
            Phase::CreateViews => {
                let Some(view) = node.view() else {
                    return Ok(None);
                };
                if exec.view_exists(name)? {
                    return Ok(None);
                }
                exec.create_view(view)?;
                info!(view = %name, "view created");
                Ok(Some(if node.is_changed() {
                    node.success_state()
                } else {
                    ArtifactState::SuccessfulCreate
                }))
            }
        }
    }
}
