//! Orphan cleanup: records persisted by earlier passes whose definition is
//! gone.

use std::collections::HashSet;

use schema_sync_core::{
    ArtifactKind, ArtifactRecord, ArtifactState, ArtifactStore, Problem, SqlExecutor,
    StorageResult,
};
use tracing::info;

use crate::context::PassContext;

/// Kinds in cleanup order: views before the tables they read from.
const CLEANUP_ORDER: [ArtifactKind; 7] = [
    ArtifactKind::View,
    ArtifactKind::Table,
    ArtifactKind::Schema,
    ArtifactKind::Replace,
    ArtifactKind::Append,
    ArtifactKind::Delete,
    ArtifactKind::Update,
];

/// Removes every record not touched this pass and drops its live object.
///
/// The record goes first, then the object. Tables holding rows are kept
/// and marked [`ArtifactState::FailedDelete`]. Objects whose name is owned
/// by a definition of this pass (`live_relations`, lower-cased) are never
/// dropped. Data operation and schema records have no object of their own.
///
/// Relations left behind by a rename ([`PassContext::retire`]) are dropped
/// under the same rules. They have no record left, so a table that holds
/// rows is only reported as an `ORPHAN` problem; the renamed definition
/// keeps its own state.
///
/// Returns the number of records removed.
///
/// # Errors
///
/// Fails only if the store cannot list its records; per-orphan failures are
/// recorded in `ctx`.
pub fn cleanup_orphans<A, E>(
    store: &A,
    executor: &E,
    live_relations: &HashSet<String>,
    ctx: &mut PassContext<'_>,
) -> StorageResult<usize>
where
    A: ArtifactStore + ?Sized,
    E: SqlExecutor + ?Sized,
{
    let mut removed = 0;
    for kind in CLEANUP_ORDER {
        let orphans: Vec<ArtifactRecord> = store
            .list_all(kind)?
            .into_iter()
            .filter(|record| !ctx.is_touched(&record.location))
            .collect();

        for orphan in orphans {
            if let Err(err) = store.remove(&orphan.location) {
                ctx.fail(
                    &orphan.location,
                    &orphan.name,
                    kind,
                    ArtifactState::FailedDelete,
                    "ORPHAN",
                    format!("could not remove record: {err}"),
                );
                continue;
            }
            removed += 1;
            info!(location = %orphan.location, name = %orphan.name, kind = %kind, "orphan removed");

            if !kind.is_relation() || live_relations.contains(&orphan.name.to_ascii_lowercase()) {
                continue;
            }
            if let Err(message) = drop_orphan(executor, kind, &orphan.name) {
                ctx.fail(
                    &orphan.location,
                    &orphan.name,
                    kind,
                    ArtifactState::FailedDelete,
                    "ORPHAN",
                    message,
                );
            }
        }

        for (location, name) in ctx.retired(kind) {
            if live_relations.contains(&name.to_ascii_lowercase()) {
                continue;
            }
            match drop_orphan(executor, kind, &name) {
                Ok(()) => info!(%location, %name, kind = %kind, "renamed-away relation dropped"),
                Err(message) => ctx.report(Problem::new(&location, "ORPHAN", message, Some(kind))),
            }
        }
    }
    Ok(removed)
}

fn drop_orphan<E>(executor: &E, kind: ArtifactKind, name: &str) -> Result<(), String>
where
    E: SqlExecutor + ?Sized,
{
    let result = match kind {
        ArtifactKind::View => executor.view_exists(name).and_then(|exists| {
            if exists {
                executor.drop_view(name)?;
            }
            Ok(())
        }),
        ArtifactKind::Table => {
            if !executor.table_exists(name).map_err(|e| e.to_string())? {
                return Ok(());
            }
            let rows = executor.row_count(name).map_err(|e| e.to_string())?;
            if rows > 0 {
                return Err(format!(
                    "table {name} holds {rows} rows and was not dropped"
                ));
            }
            executor.drop_table(name)
        }
        _ => Ok(()),
    };
    result.map_err(|e| e.to_string())
}
