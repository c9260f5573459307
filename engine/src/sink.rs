//! Problem sinks provided by the engine.

use schema_sync_core::{Problem, ProblemSink};
use tracing::{error, warn};

/// Error types that indicate a definition was rejected outright.
const SEVERE: [&str; 2] = ["CONFLICT", "CYCLE"];

/// Forwards problems to `tracing`: rejections at `error`, everything else
/// at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProblemSink;

impl ProblemSink for TracingProblemSink {
    fn report(&self, problem: &Problem) {
        let kind = problem.kind.map(|k| k.as_str()).unwrap_or("-");
        if SEVERE.contains(&problem.error_type.as_str()) {
            error!(
                location = %problem.location,
                error_type = %problem.error_type,
                kind,
                "{}", problem.message
            );
        } else {
            warn!(
                location = %problem.location,
                error_type = %problem.error_type,
                kind,
                "{}", problem.message
            );
        }
    }
}

/// Discards every problem.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullProblemSink;

impl ProblemSink for NullProblemSink {
    fn report(&self, _problem: &Problem) {}
}
