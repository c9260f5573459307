//! Definition discovery: list both provenances, load and parse in parallel.

use std::collections::HashMap;

use rayon::prelude::*;
use schema_sync_core::{
    ArtifactDefinition, ArtifactKind, DefinitionSource, ParseError, Provenance, SourceError,
    expand_schema, parse_definition,
};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// How many definitions of one kind each provenance supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProvenanceCount {
    /// Artifact kind.
    pub kind: ArtifactKind,
    /// Definitions from the predelivered root.
    pub predelivered: usize,
    /// Definitions from the registry root.
    pub registry: usize,
}

/// A location that could not be turned into definitions.
#[derive(Debug)]
pub struct DiscoveryFailure {
    /// Location of the definition.
    pub location: String,
    /// Kind implied by the location.
    pub kind: ArtifactKind,
    /// What went wrong.
    pub error: DiscoveryError,
}

/// Why a location was skipped.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The bytes could not be loaded.
    #[error("{0}")]
    Load(SourceError),
    /// The bytes could not be parsed.
    #[error("{0}")]
    Parse(ParseError),
}

/// Everything found in the source this pass.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Parsed definitions in discovery order; schema members follow their
    /// schema.
    pub definitions: Vec<ArtifactDefinition>,
    /// Locations that failed to load or parse.
    pub failures: Vec<DiscoveryFailure>,
    /// Per-kind provenance counts.
    pub counts: Vec<ProvenanceCount>,
}

/// Lists every kind from both provenances and parses the result.
///
/// Discovery order is kind order, then predelivered locations, then
/// registry-only locations. A location present in both roots is discovered
/// once, as registry content.
///
/// # Errors
///
/// Returns the [`SourceError`] of a failed listing; load failures are
/// per-location and end up in [`Discovery::failures`].
pub fn discover<S>(source: &S) -> Result<Discovery, SourceError>
where
    S: DefinitionSource + Sync + ?Sized,
{
    let mut located: Vec<(String, ArtifactKind, Provenance)> = Vec::new();
    let mut counts = Vec::with_capacity(ArtifactKind::ALL.len());

    for kind in ArtifactKind::ALL {
        let mut seen: HashMap<String, usize> = HashMap::new();
        let start = located.len();
        for location in source.list_predelivered(kind)? {
            seen.insert(location.clone(), located.len());
            located.push((location, kind, Provenance::Predelivered));
        }
        for location in source.list_registry(kind)? {
            match seen.get(&location) {
                Some(&i) => located[i].2 = Provenance::Registry,
                None => {
                    seen.insert(location.clone(), located.len());
                    located.push((location, kind, Provenance::Registry));
                }
            }
        }
        let of_kind = &located[start..];
        counts.push(ProvenanceCount {
            kind,
            predelivered: of_kind
                .iter()
                .filter(|(_, _, p)| *p == Provenance::Predelivered)
                .count(),
            registry: of_kind
                .iter()
                .filter(|(_, _, p)| *p == Provenance::Registry)
                .count(),
        });
    }

    let parsed: Vec<(String, ArtifactKind, Result<Vec<ArtifactDefinition>, DiscoveryError>)> =
        located
            .into_par_iter()
            .map(|(location, kind, _)| {
                let result = load_and_parse(source, &location);
                (location, kind, result)
            })
            .collect();

    let mut discovery = Discovery {
        counts,
        ..Discovery::default()
    };
    for (location, kind, result) in parsed {
        match result {
            Ok(definitions) => discovery.definitions.extend(definitions),
            Err(error) => discovery.failures.push(DiscoveryFailure {
                location,
                kind,
                error,
            }),
        }
    }
    debug!(
        definitions = discovery.definitions.len(),
        failures = discovery.failures.len(),
        "discovery finished"
    );
    Ok(discovery)
}

fn load_and_parse<S>(source: &S, location: &str) -> Result<Vec<ArtifactDefinition>, DiscoveryError>
where
    S: DefinitionSource + ?Sized,
{
    let bytes = source.load(location).map_err(DiscoveryError::Load)?;
    let definition = parse_definition(location, &bytes).map_err(DiscoveryError::Parse)?;
    let members = expand_schema(&definition).map_err(DiscoveryError::Parse)?;
    let mut definitions = Vec::with_capacity(members.len() + 1);
    definitions.push(definition);
    definitions.extend(members);
    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema_sync_db::MemorySource;

    const TABLE: &str = r#"{"name": "T", "columns": [{"name": "ID", "type": "INTEGER"}]}"#;

    #[test]
    fn test_registry_copy_wins_and_is_counted_once() {
        let source = MemorySource::new();
        source.put_predelivered("/core/t.table", TABLE);
        source.put_registry(
            "/core/t.table",
            r#"{"name": "T", "columns": [{"name": "ID", "type": "TEXT"}]}"#,
        );
        source.put_predelivered("/core/u.table", TABLE.replace("\"T\"", "\"U\""));

        let discovery = discover(&source).unwrap();
        assert_eq!(discovery.definitions.len(), 2);
        let table = discovery
            .definitions
            .iter()
            .find(|d| d.location == "/core/t.table")
            .unwrap();
        assert!(matches!(
            &table.body,
            schema_sync_core::DefinitionBody::Table(t) if t.columns[0].data_type == "TEXT"
        ));
        assert_eq!(
            discovery.counts[0],
            ProvenanceCount {
                kind: ArtifactKind::Table,
                predelivered: 1,
                registry: 1
            }
        );
    }

    #[test]
    fn test_schema_members_follow_schema() {
        let source = MemorySource::new();
        source.put_registry(
            "/s/sales.schema",
            r#"{"schema": {"name": "SALES", "structures": [
                {"type": "table", "name": "A", "columns": [{"name": "ID", "type": "INTEGER"}]}
            ]}}"#,
        );
        let discovery = discover(&source).unwrap();
        let locations: Vec<&str> = discovery
            .definitions
            .iter()
            .map(|d| d.location.as_str())
            .collect();
        assert_eq!(locations, vec!["/s/sales.schema", "/s/sales.schema#A"]);
    }

    #[test]
    fn test_parse_failures_are_collected() {
        let source = MemorySource::new();
        source.put_registry("/x/bad.table", "{not json");
        source.put_registry("/x/good.table", TABLE);
        let discovery = discover(&source).unwrap();
        assert_eq!(discovery.definitions.len(), 1);
        assert_eq!(discovery.failures.len(), 1);
        assert_eq!(discovery.failures[0].location, "/x/bad.table");
        assert!(matches!(discovery.failures[0].error, DiscoveryError::Parse(_)));
    }

    #[test]
    fn test_failure_displays_underlying_error() {
        let source = MemorySource::new();
        source.put_registry("/x/bad.table", "{not json");
        let discovery = discover(&source).unwrap();

        let error: &dyn std::error::Error = &discovery.failures[0].error;
        assert!(error.to_string().starts_with("malformed definition"));
    }
}
