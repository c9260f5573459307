//! End-to-end passes against an in-memory SQLite database.

use rusqlite::Connection;
use schema_sync_core::{ArtifactState, ArtifactStore, SqlExecutor};
use schema_sync_db::MemorySource;
use schema_sync_engine::{
    NullProblemSink, PassOutcome, PassSummary, Synchronizer, TracingProblemSink,
};
use schema_sync_sqlite::{Migration, SqliteArtifactStore, SqliteExecutor, SqliteProblemSink};

const PREFIX: &str = "sync_";

const CUSTOMERS: &str = r#"{"name": "CUSTOMERS", "columns": [
    {"name": "ID", "type": "INTEGER", "primaryKey": true, "identity": true},
    {"name": "NAME", "type": "VARCHAR", "length": "64"}
]}"#;

const ORDERS: &str = r#"{"name": "ORDERS", "columns": [
    {"name": "ID", "type": "INTEGER", "primaryKey": true},
    {"name": "CUSTOMER_ID", "type": "INTEGER"}
], "constraints": {"foreignKeys": [
    {"name": "FK_CUSTOMER", "columns": ["CUSTOMER_ID"], "referencedTable": "CUSTOMERS", "referencedColumns": ["ID"]}
]}}"#;

type SqliteSync<'a> = Synchronizer<
    &'a MemorySource,
    SqliteArtifactStore<'a>,
    SqliteExecutor<'a>,
    NullProblemSink,
>;

fn open() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    Migration::new(&conn, PREFIX).unwrap().up().unwrap();
    conn
}

fn synchronizer<'a>(conn: &'a Connection, source: &'a MemorySource) -> SqliteSync<'a> {
    Synchronizer::new(
        source,
        SqliteArtifactStore::new(conn, PREFIX).unwrap(),
        SqliteExecutor::new(conn, PREFIX).unwrap(),
        NullProblemSink,
    )
}

fn pass(sync: &SqliteSync<'_>) -> PassSummary {
    match sync.run_pass(true).unwrap() {
        PassOutcome::Completed(summary) => summary,
        PassOutcome::Skipped(reason) => panic!("pass skipped: {reason}"),
    }
}

fn names(conn: &Connection, table: &str) -> Vec<String> {
    let mut stmt = conn
        .prepare(&format!("SELECT NAME FROM {table} ORDER BY ID"))
        .unwrap();
    stmt.query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

fn trigger_count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger' AND tbl_name = ?1 COLLATE NOCASE",
        [table],
        |row| row.get(0),
    )
    .unwrap()
}

// =============================================================================
// Structure
// =============================================================================

#[test]
fn test_foreign_key_is_enforced_after_first_pass() {
    let conn = open();
    let source = MemorySource::new();
    source.put_registry("/app/orders.table", ORDERS);
    source.put_registry("/app/customers.table", CUSTOMERS);
    let sync = synchronizer(&conn, &source);

    let summary = pass(&sync);
    assert_eq!(summary.created, 2);
    assert_eq!(summary.failed, 0);

    conn.execute("INSERT INTO CUSTOMERS (ID, NAME) VALUES (1, 'Alice')", [])
        .unwrap();
    conn.execute("INSERT INTO ORDERS (ID, CUSTOMER_ID) VALUES (1, 1)", [])
        .unwrap();
    assert!(
        conn.execute("INSERT INTO ORDERS (ID, CUSTOMER_ID) VALUES (2, 99)", [])
            .is_err()
    );
}

#[test]
fn test_orphan_table_is_dropped_with_its_triggers() {
    let conn = open();
    let source = MemorySource::new();
    source.put_registry("/app/customers.table", CUSTOMERS);
    source.put_registry("/app/orders.table", ORDERS);
    let sync = synchronizer(&conn, &source);
    pass(&sync);
    assert!(trigger_count(&conn, "ORDERS") > 0);

    source.remove("/app/orders.table");
    let summary = pass(&sync);

    assert_eq!(summary.orphans_removed, 1);
    assert!(!sync.executor().table_exists("ORDERS").unwrap());
    assert!(sync.executor().table_exists("CUSTOMERS").unwrap());
    assert_eq!(trigger_count(&conn, "ORDERS"), 0);
    assert!(sync.store().get("/app/orders.table").unwrap().is_none());
}

#[test]
fn test_orphan_table_with_rows_survives() {
    let conn = open();
    let source = MemorySource::new();
    source.put_registry("/app/customers.table", CUSTOMERS);
    source.put_registry("/app/CUSTOMERS.append", "1|Alice\n");
    let sync = synchronizer(&conn, &source);
    pass(&sync);

    source.remove("/app/customers.table");
    source.remove("/app/CUSTOMERS.append");
    let summary = pass(&sync);

    assert_eq!(
        summary.state_of("/app/customers.table"),
        Some(ArtifactState::FailedDelete)
    );
    assert_eq!(names(&conn, "CUSTOMERS"), vec!["Alice"]);
}

#[test]
fn test_changed_table_with_rows_is_altered() {
    let conn = open();
    let source = MemorySource::new();
    source.put_registry("/app/customers.table", CUSTOMERS);
    source.put_registry("/app/CUSTOMERS.append", "1|Alice\n");
    let sync = synchronizer(&conn, &source);
    pass(&sync);

    source.put_registry(
        "/app/customers.table",
        CUSTOMERS.replace(
            r#""length": "64"}"#,
            r#""length": "64"}, {"name": "EMAIL", "type": "TEXT"}"#,
        ),
    );
    let summary = pass(&sync);

    assert_eq!(
        summary.state_of("/app/customers.table"),
        Some(ArtifactState::SuccessfulUpdate)
    );
    let live = sync.executor().describe_table("CUSTOMERS").unwrap();
    assert_eq!(live.columns.len(), 3);
    assert_eq!(names(&conn, "CUSTOMERS"), vec!["Alice"]);
}

#[test]
fn test_renamed_table_replaces_old_one() {
    let conn = open();
    let source = MemorySource::new();
    source.put_registry("/app/customers.table", CUSTOMERS);
    let sync = synchronizer(&conn, &source);
    pass(&sync);

    source.put_registry(
        "/app/customers.table",
        CUSTOMERS.replace("\"CUSTOMERS\"", "\"CLIENTS\""),
    );
    let summary = pass(&sync);

    assert_eq!(
        summary.state_of("/app/customers.table"),
        Some(ArtifactState::SuccessfulUpdate)
    );
    assert!(sync.executor().has_table("CLIENTS").unwrap());
    assert!(!sync.executor().has_table("CUSTOMERS").unwrap());
    assert!(summary.problems.is_empty());
}

#[test]
fn test_renamed_table_with_rows_is_kept_and_reported() {
    let conn = open();
    let source = MemorySource::new();
    source.put_registry("/app/customers.table", CUSTOMERS);
    source.put_registry("/app/CUSTOMERS.append", "1|Alice\n");
    let sync = synchronizer(&conn, &source);
    pass(&sync);

    source.remove("/app/CUSTOMERS.append");
    source.put_registry(
        "/app/customers.table",
        CUSTOMERS.replace("\"CUSTOMERS\"", "\"CLIENTS\""),
    );
    let summary = pass(&sync);

    assert!(sync.executor().has_table("CLIENTS").unwrap());
    assert_eq!(names(&conn, "CUSTOMERS"), vec!["Alice"]);
    assert!(
        summary
            .problems
            .iter()
            .any(|p| p.location == "/app/customers.table" && p.error_type == "ORPHAN")
    );
}

#[test]
fn test_three_table_cycle_is_built() {
    let conn = open();
    let source = MemorySource::new();
    for (name, target) in [("A", "C"), ("B", "A"), ("C", "B")] {
        source.put_registry(
            &format!("/cycle/{name}.table"),
            format!(
                r#"{{"name": "{name}", "columns": [
                    {{"name": "ID", "type": "INTEGER", "primaryKey": true}},
                    {{"name": "REF", "type": "INTEGER"}}
                ], "constraints": {{"foreignKeys": [
                    {{"name": "FK_{name}", "columns": ["REF"], "referencedTable": "{target}", "referencedColumns": ["ID"]}}
                ]}}}}"#
            ),
        );
    }
    let sync = synchronizer(&conn, &source);

    let summary = pass(&sync);

    assert_eq!(summary.cycles.len(), 3);
    assert_eq!(summary.failed, 0);
    for name in ["A", "B", "C"] {
        assert!(sync.executor().table_exists(name).unwrap());
        assert!(trigger_count(&conn, name) > 0);
    }
}

#[test]
fn test_view_is_rebuilt_when_changed() {
    let conn = open();
    let source = MemorySource::new();
    source.put_registry("/app/customers.table", CUSTOMERS);
    source.put_registry(
        "/app/names.view",
        r#"{"name": "CUSTOMER_NAMES", "query": "SELECT NAME FROM CUSTOMERS"}"#,
    );
    source.put_registry("/app/CUSTOMERS.append", "1|Alice\n");
    let sync = synchronizer(&conn, &source);
    pass(&sync);

    source.put_registry(
        "/app/names.view",
        r#"{"name": "CUSTOMER_NAMES", "query": "SELECT UPPER(NAME) AS NAME FROM CUSTOMERS"}"#,
    );
    let summary = pass(&sync);

    assert_eq!(
        summary.state_of("/app/names.view"),
        Some(ArtifactState::SuccessfulUpdate)
    );
    let name: String = conn
        .query_row("SELECT NAME FROM CUSTOMER_NAMES", [], |row| row.get(0))
        .unwrap();
    assert_eq!(name, "ALICE");
}

// =============================================================================
// Data Operations
// =============================================================================

#[test]
fn test_append_applies_once() {
    let conn = open();
    let source = MemorySource::new();
    source.put_registry("/app/customers.table", CUSTOMERS);
    source.put_registry("/app/CUSTOMERS.append", "1|Alice\n2|Bob\n");
    let sync = synchronizer(&conn, &source);
    pass(&sync);
    let identity = sync.executor().identity_value("CUSTOMERS").unwrap();

    source.put_registry("/app/CUSTOMERS.append", "1|Alice\n2|Bob\n3|Carol\n");
    let summary = pass(&sync);

    assert_eq!(
        summary.state_of("/app/CUSTOMERS.append"),
        Some(ArtifactState::FailedCreateUpdate)
    );
    assert_eq!(names(&conn, "CUSTOMERS"), vec!["Alice", "Bob"]);
    assert_eq!(sync.executor().identity_value("CUSTOMERS").unwrap(), identity);
}

#[test]
fn test_replace_swaps_rows_and_advances_identity() {
    let conn = open();
    let source = MemorySource::new();
    source.put_registry("/app/customers.table", CUSTOMERS);
    source.put_registry("/app/CUSTOMERS.replace", "1|a\n2|b\n3|c\n4|d\n5|e\n");
    let sync = synchronizer(&conn, &source);
    pass(&sync);
    assert_eq!(names(&conn, "CUSTOMERS").len(), 5);

    source.put_registry("/app/CUSTOMERS.replace", "1|x\n2|y\n3|z\n");
    pass(&sync);

    assert_eq!(names(&conn, "CUSTOMERS"), vec!["x", "y", "z"]);
    assert!(sync.executor().identity_value("CUSTOMERS").unwrap().unwrap() >= 3);
}

#[test]
fn test_rejected_replace_keeps_previous_rows() {
    let conn = open();
    let source = MemorySource::new();
    source.put_registry("/app/customers.table", CUSTOMERS);
    source.put_registry("/app/CUSTOMERS.replace", "1|a\n2|b\n3|c\n4|d\n5|e\n");
    let sync = synchronizer(&conn, &source);
    pass(&sync);

    source.put_registry("/app/CUSTOMERS.replace", "1|x\n2|y|too|wide\n");
    let summary = pass(&sync);

    assert_eq!(
        summary.state_of("/app/CUSTOMERS.replace"),
        Some(ArtifactState::FailedCreateUpdate)
    );
    assert_eq!(names(&conn, "CUSTOMERS"), vec!["a", "b", "c", "d", "e"]);

    pass(&sync);
    assert_eq!(names(&conn, "CUSTOMERS").len(), 5);
}

#[test]
fn test_update_only_inserts_missing_rows() {
    let conn = open();
    let source = MemorySource::new();
    source.put_registry("/app/customers.table", CUSTOMERS);
    source.put_registry("/app/CUSTOMERS.append", "1|Alice\n");
    let sync = synchronizer(&conn, &source);
    pass(&sync);

    source.put_registry("/app/CUSTOMERS.update", "1|Changed\n2|Bob\n");
    let summary = pass(&sync);

    assert_eq!(
        summary.state_of("/app/CUSTOMERS.update"),
        Some(ArtifactState::SuccessfulCreate)
    );
    assert_eq!(names(&conn, "CUSTOMERS"), vec!["Alice", "Bob"]);
}

#[test]
fn test_delete_by_key() {
    let conn = open();
    let source = MemorySource::new();
    source.put_registry("/app/customers.table", CUSTOMERS);
    source.put_registry("/app/CUSTOMERS.append", "1|Alice\n2|Bob\n3|Carol\n");
    source.put_registry("/app/CUSTOMERS.delete", "2\n");
    let sync = synchronizer(&conn, &source);

    pass(&sync);

    assert_eq!(names(&conn, "CUSTOMERS"), vec!["Alice", "Carol"]);
}

#[test]
fn test_data_for_missing_table_fails_alone() {
    let conn = open();
    let source = MemorySource::new();
    source.put_registry("/app/customers.table", CUSTOMERS);
    source.put_registry("/app/GHOSTS.append", "1\n");
    source.put_registry("/app/CUSTOMERS.append", "1|Alice\n");
    let sync = synchronizer(&conn, &source);

    let summary = pass(&sync);

    assert_eq!(summary.failed, 1);
    assert_eq!(
        summary.state_of("/app/GHOSTS.append"),
        Some(ArtifactState::FailedCreateUpdate)
    );
    assert_eq!(names(&conn, "CUSTOMERS"), vec!["Alice"]);
}

// =============================================================================
// Pass Control
// =============================================================================

#[test]
fn test_second_pass_is_a_no_op() {
    let conn = open();
    let source = MemorySource::new();
    source.put_registry("/app/customers.table", CUSTOMERS);
    source.put_registry("/app/orders.table", ORDERS);
    source.put_registry("/app/CUSTOMERS.append", "1|Alice\n");
    let sync = synchronizer(&conn, &source);
    pass(&sync);

    let summary = pass(&sync);

    assert!(summary.states.is_empty());
    assert!(summary.problems.is_empty());
    assert_eq!(names(&conn, "CUSTOMERS"), vec!["Alice"]);
}

#[test]
fn test_disabled_scheduled_pass_is_skipped() {
    let conn = open();
    let source = MemorySource::new();
    source.put_registry("/app/customers.table", CUSTOMERS);
    let sync = synchronizer(&conn, &source).with_enabled(false);

    assert!(matches!(sync.run_pass(false).unwrap(), PassOutcome::Skipped(_)));
    assert!(!sync.executor().table_exists("CUSTOMERS").unwrap());
}

#[test]
fn test_problems_are_persisted() {
    let conn = open();
    let source = MemorySource::new();
    source.put_registry("/a/customers.table", CUSTOMERS);
    source.put_registry("/b/customers.table", CUSTOMERS);
    let sync = Synchronizer::new(
        &source,
        SqliteArtifactStore::new(&conn, PREFIX).unwrap(),
        SqliteExecutor::new(&conn, PREFIX).unwrap(),
        (
            TracingProblemSink,
            SqliteProblemSink::new(&conn, PREFIX).unwrap(),
        ),
    );

    sync.run_pass(true).unwrap();

    let recent = SqliteProblemSink::new(&conn, PREFIX)
        .unwrap()
        .recent(10)
        .unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].problem.error_type, "CONFLICT");
    assert_eq!(recent[0].problem.location, "/b/customers.table");
}
