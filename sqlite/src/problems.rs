//! Problem persistence in the `{prefix}problems` table.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use schema_sync_core::{ArtifactKind, Problem, ProblemSink};
use tracing::warn;

use crate::error::{Result, SqliteError};
use crate::schema::validate_prefix;

/// A stored problem with its timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProblemRecord {
    /// Row id, increasing in insertion order.
    pub id: i64,
    /// The reported problem.
    pub problem: Problem,
    /// When the problem was recorded.
    pub created_at: DateTime<Utc>,
}

/// [`ProblemSink`] appending each problem to the prefixed problems table.
///
/// A failed insert is logged and swallowed; reporting never fails a pass.
pub struct SqliteProblemSink<'a> {
    conn: &'a Connection,
    prefix: String,
}

impl<'a> SqliteProblemSink<'a> {
    /// Creates a sink for the given connection and table prefix.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidPrefix`] if the prefix is invalid.
    pub fn new(conn: &'a Connection, prefix: impl Into<String>) -> Result<Self> {
        let prefix = prefix.into();
        validate_prefix(&prefix)?;
        Ok(Self { conn, prefix })
    }

    /// Stores one problem.
    pub fn record(&self, problem: &Problem) -> Result<()> {
        self.conn.execute(
            &format!(
                "INSERT INTO {}problems (location, error_type, message, kind, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                self.prefix
            ),
            params![
                problem.location,
                problem.error_type,
                problem.message,
                problem.kind.map(ArtifactKind::as_str),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// The `limit` most recent problems, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<ProblemRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, location, error_type, message, kind, created_at FROM {}problems \
             ORDER BY id DESC LIMIT ?1",
            self.prefix
        ))?;
        let raws = stmt
            .query_map([limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        raws.into_iter()
            .map(|(id, location, error_type, message, kind, created_at)| {
                let created_at = DateTime::parse_from_rfc3339(&created_at)
                    .map_err(|e| SqliteError::ConversionError(format!("created_at: {e}")))?
                    .with_timezone(&Utc);
                Ok(ProblemRecord {
                    id,
                    problem: Problem {
                        location,
                        error_type,
                        message,
                        kind: kind.as_deref().and_then(ArtifactKind::from_name),
                    },
                    created_at,
                })
            })
            .collect()
    }

    /// Deletes every stored problem; returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        Ok(self
            .conn
            .execute(&format!("DELETE FROM {}problems", self.prefix), [])?)
    }
}

impl ProblemSink for SqliteProblemSink<'_> {
    fn report(&self, problem: &Problem) {
        if let Err(err) = self.record(problem) {
            warn!(location = %problem.location, error = %err, "failed to persist problem");
        }
    }
}
