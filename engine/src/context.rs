//! State owned by one in-flight pass.

use std::collections::HashSet;

use schema_sync_core::{ArtifactKind, ArtifactState, Problem, ProblemSink, owning_schema};

use crate::state::StateRecorder;

/// Everything a pass accumulates while it runs: which locations were seen,
/// per-artifact outcomes and the problems reported so far.
///
/// A context is created by [`Synchronizer::run_pass`](crate::Synchronizer::run_pass),
/// threaded through every stage and dropped when the pass ends.
pub struct PassContext<'p> {
    sink: &'p dyn ProblemSink,
    recorder: StateRecorder,
    problems: Vec<Problem>,
    touched: HashSet<String>,
    unparsed: HashSet<String>,
    retired: Vec<(String, String, ArtifactKind)>,
}

impl<'p> PassContext<'p> {
    /// Creates an empty context reporting to `sink`.
    pub fn new(sink: &'p dyn ProblemSink) -> Self {
        Self {
            sink,
            recorder: StateRecorder::new(),
            problems: Vec::new(),
            touched: HashSet::new(),
            unparsed: HashSet::new(),
            retired: Vec::new(),
        }
    }

    /// Marks `location` as present in the source this pass.
    pub fn touch(&mut self, location: &str) {
        self.touched.insert(location.to_string());
    }

    /// Marks `location` as present but unparseable.
    ///
    /// Schema members whose schema failed to parse stay touched.
    pub fn mark_unparsed(&mut self, location: &str) {
        self.touch(location);
        self.unparsed.insert(location.to_string());
    }

    /// Returns `true` if `location` (or the schema owning it, when that
    /// schema failed to parse) was seen this pass.
    pub fn is_touched(&self, location: &str) -> bool {
        self.touched.contains(location)
            || owning_schema(location).is_some_and(|schema| self.unparsed.contains(schema))
    }

    /// Notes that relation `name` no longer belongs to the definition at
    /// `location`, which was renamed this pass.
    pub fn retire(&mut self, location: &str, name: &str, kind: ArtifactKind) {
        self.retired
            .push((location.to_string(), name.to_string(), kind));
    }

    /// Relations of `kind` retired this pass, as `(location, name)` pairs.
    pub fn retired(&self, kind: ArtifactKind) -> Vec<(String, String)> {
        self.retired
            .iter()
            .filter(|(_, _, k)| *k == kind)
            .map(|(location, name, _)| (location.clone(), name.clone()))
            .collect()
    }

    /// Records a state without a message.
    pub fn record(&mut self, location: &str, name: &str, kind: ArtifactKind, state: ArtifactState) {
        self.recorder.record(location, name, kind, state, None);
    }

    /// Records a failure state and reports it as a problem.
    pub fn fail(
        &mut self,
        location: &str,
        name: &str,
        kind: ArtifactKind,
        state: ArtifactState,
        error_type: &str,
        message: impl Into<String>,
    ) {
        let message = message.into();
        self.recorder
            .record(location, name, kind, state, Some(message.clone()));
        self.report(Problem::new(location, error_type, message, Some(kind)));
    }

    /// Keeps `problem` for the summary and forwards it to the sink.
    pub fn report(&mut self, problem: Problem) {
        self.sink.report(&problem);
        self.problems.push(problem);
    }

    /// Outcomes recorded so far.
    pub fn recorder(&self) -> &StateRecorder {
        &self.recorder
    }

    /// Consumes the context, returning outcomes and problems.
    pub fn into_parts(self) -> (StateRecorder, Vec<Problem>) {
        (self.recorder, self.problems)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NullProblemSink;

    #[test]
    fn test_unparsed_schema_protects_members() {
        let sink = NullProblemSink;
        let mut ctx = PassContext::new(&sink);
        ctx.mark_unparsed("/app/sales.schema");
        assert!(ctx.is_touched("/app/sales.schema"));
        assert!(ctx.is_touched("/app/sales.schema#ORDERS"));
        assert!(!ctx.is_touched("/app/other.schema#ORDERS"));
    }

    #[test]
    fn test_parsed_schema_does_not_protect_members() {
        let sink = NullProblemSink;
        let mut ctx = PassContext::new(&sink);
        ctx.touch("/app/sales.schema");
        assert!(!ctx.is_touched("/app/sales.schema#ORDERS"));
    }

    #[test]
    fn test_fail_records_and_reports() {
        let sink = NullProblemSink;
        let mut ctx = PassContext::new(&sink);
        ctx.fail(
            "/t.table",
            "T",
            ArtifactKind::Table,
            ArtifactState::FailedCreateUpdate,
            "DDL",
            "no such column",
        );
        let (recorder, problems) = ctx.into_parts();
        assert_eq!(recorder.failures(), 1);
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].error_type, "DDL");
    }
}
