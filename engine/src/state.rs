//! Per-artifact outcome tracking.

use std::collections::HashMap;

use schema_sync_core::{ArtifactKind, ArtifactState};
use serde::Serialize;

/// The recorded outcome of one artifact in a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateEntry {
    /// Location of the definition.
    pub location: String,
    /// Logical name.
    pub name: String,
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// Outcome.
    pub state: ArtifactState,
    /// Failure description, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Collects one [`StateEntry`] per location, in first-recorded order.
///
/// A later success never hides an earlier failure; between two failures
/// the first one is kept.
///
/// ```
/// use schema_sync_core::{ArtifactKind, ArtifactState};
/// use schema_sync_engine::StateRecorder;
///
/// let mut recorder = StateRecorder::new();
/// recorder.record("/a.table", "A", ArtifactKind::Table, ArtifactState::FailedCreateUpdate, Some("boom".into()));
/// recorder.record("/a.table", "A", ArtifactKind::Table, ArtifactState::SuccessfulCreate, None);
/// assert_eq!(recorder.get("/a.table").unwrap().state, ArtifactState::FailedCreateUpdate);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StateRecorder {
    entries: Vec<StateEntry>,
    index: HashMap<String, usize>,
}

impl StateRecorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `state` for `location`.
    pub fn record(
        &mut self,
        location: &str,
        name: &str,
        kind: ArtifactKind,
        state: ArtifactState,
        message: Option<String>,
    ) {
        let entry = StateEntry {
            location: location.to_string(),
            name: name.to_string(),
            kind,
            state,
            message,
        };
        match self.index.get(location) {
            Some(&i) if self.entries[i].state.is_failure() => {}
            Some(&i) => self.entries[i] = entry,
            None => {
                self.index.insert(location.to_string(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    /// Entry recorded for `location`.
    pub fn get(&self, location: &str) -> Option<&StateEntry> {
        self.index.get(location).map(|&i| &self.entries[i])
    }

    /// Every entry in first-recorded order.
    pub fn entries(&self) -> &[StateEntry] {
        &self.entries
    }

    /// Number of entries in `state`.
    pub fn count(&self, state: ArtifactState) -> usize {
        self.entries.iter().filter(|e| e.state == state).count()
    }

    /// Number of failed entries.
    pub fn failures(&self) -> usize {
        self.entries.iter().filter(|e| e.state.is_failure()).count()
    }

    /// Returns `true` if an artifact of `kind` named `name` failed to
    /// build (names compared case-insensitively).
    ///
    /// [`ArtifactState::Fatal`] entries are rejected duplicates; the name
    /// belongs to another location, so they do not count.
    pub fn has_failed(&self, kind: ArtifactKind, name: &str) -> bool {
        self.entries.iter().any(|e| {
            e.kind == kind
                && e.state.is_failure()
                && e.state != ArtifactState::Fatal
                && e.name.eq_ignore_ascii_case(name)
        })
    }

    /// Consumes the recorder, returning its entries.
    pub fn into_entries(self) -> Vec<StateEntry> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_is_replaced_by_later_state() {
        let mut recorder = StateRecorder::new();
        recorder.record("/v.view", "V", ArtifactKind::View, ArtifactState::SuccessfulUpdate, None);
        recorder.record("/v.view", "V", ArtifactKind::View, ArtifactState::SuccessfulCreate, None);
        assert_eq!(recorder.entries().len(), 1);
        assert_eq!(recorder.count(ArtifactState::SuccessfulCreate), 1);
    }

    #[test]
    fn test_first_failure_wins() {
        let mut recorder = StateRecorder::new();
        recorder.record("/t.table", "T", ArtifactKind::Table, ArtifactState::Fatal, Some("first".into()));
        recorder.record(
            "/t.table",
            "T",
            ArtifactKind::Table,
            ArtifactState::FailedDelete,
            Some("second".into()),
        );
        let entry = recorder.get("/t.table").unwrap();
        assert_eq!(entry.state, ArtifactState::Fatal);
        assert_eq!(entry.message.as_deref(), Some("first"));
        assert_eq!(recorder.failures(), 1);
    }

    #[test]
    fn test_has_failed_ignores_case() {
        let mut recorder = StateRecorder::new();
        recorder.record(
            "/t.table",
            "Orders",
            ArtifactKind::Table,
            ArtifactState::FailedCreateUpdate,
            None,
        );
        assert!(recorder.has_failed(ArtifactKind::Table, "ORDERS"));
        assert!(!recorder.has_failed(ArtifactKind::View, "ORDERS"));
    }
}
