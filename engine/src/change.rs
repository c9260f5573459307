//! Change detection against the artifact store.
//!
//! Every discovered definition is classified exactly once per pass. The
//! store is updated as a side effect, so a definition created earlier in
//! the same pass already owns its name when a later duplicate arrives:
//! first registered wins.

use schema_sync_core::{ArtifactDefinition, ArtifactRecord, ArtifactStore, StorageResult};
use serde::Serialize;
use tracing::debug;

/// Result of comparing a definition against its persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Outcome {
    /// No record existed; one was created.
    Created,
    /// The record differed and was updated.
    Updated,
    /// The record was updated and the definition now carries another name.
    Renamed {
        /// Name in the previous record.
        from: String,
    },
    /// The record matches the definition.
    Unchanged,
    /// Another location already owns the name.
    Conflict {
        /// Location of the existing owner.
        owner: String,
    },
}

impl Outcome {
    /// Returns `true` for every outcome that created or updated a record.
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Updated | Self::Renamed { .. })
    }
}

/// Classifies definitions and keeps the artifact store current.
pub struct ChangeDetector<'s, A> {
    store: &'s A,
}

impl<'s, A: ArtifactStore> ChangeDetector<'s, A> {
    /// Creates a detector over `store`.
    pub fn new(store: &'s A) -> Self {
        Self { store }
    }

    /// Classifies `definition`, creating or updating its record.
    ///
    /// A conflict leaves the store untouched.
    pub fn reconcile_definition(&self, definition: &ArtifactDefinition) -> StorageResult<Outcome> {
        let Some(existing) = self.store.get(&definition.location)? else {
            if let Some(owner) = self.owner_elsewhere(definition)? {
                return Ok(Outcome::Conflict { owner });
            }
            self.store.create(&definition.record())?;
            debug!(location = %definition.location, name = %definition.name, "artifact created");
            return Ok(Outcome::Created);
        };

        if existing.matches(definition) {
            return Ok(Outcome::Unchanged);
        }

        let renamed = !existing.name.eq_ignore_ascii_case(&definition.name);
        if renamed {
            if let Some(owner) = self.owner_elsewhere(definition)? {
                return Ok(Outcome::Conflict { owner });
            }
        }
        self.store.update(&definition.record())?;
        if renamed {
            debug!(
                location = %definition.location,
                from = %existing.name,
                to = %definition.name,
                "artifact renamed"
            );
            return Ok(Outcome::Renamed {
                from: existing.name,
            });
        }
        debug!(location = %definition.location, name = %definition.name, "artifact updated");
        Ok(Outcome::Updated)
    }

    /// Location of another record owning `definition`'s name within its
    /// kind's namespace.
    fn owner_elsewhere(&self, definition: &ArtifactDefinition) -> StorageResult<Option<String>> {
        for &kind in definition.kind().namespace() {
            let owner = self
                .store
                .find_by_name(kind, &definition.name)?
                .into_iter()
                .map(|record: ArtifactRecord| record.location)
                .find(|location| location != &definition.location);
            if owner.is_some() {
                return Ok(owner);
            }
        }
        Ok(None)
    }
}
