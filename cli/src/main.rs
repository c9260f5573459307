use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use rusqlite::Connection;
use schema_sync_core::{
    ArtifactKind, ArtifactStore, DefinitionSource, ProblemSink, expand_schema, parse_definition,
};
use schema_sync_db::{ManifestStore, SyncConfig};
use schema_sync_engine::{PassOutcome, PassSummary, Synchronizer, TracingProblemSink};
use schema_sync_sqlite::{Migration, SqliteArtifactStore, SqliteExecutor, SqliteProblemSink};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "schema-sync")]
#[command(about = "Reconcile a SQLite database with declarative schema definitions")]
#[command(version)]
struct Cli {
    /// Emit log lines as JSON.
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one synchronization pass.
    Sync(SyncArgs),
    /// Show bookkeeping tables, records and recent problems.
    Status(StatusArgs),
    /// Parse and validate definition files without touching a database.
    Check(CheckArgs),
    /// Create or drop the bookkeeping tables.
    Store(StoreArgs),
}

#[derive(Debug, Args)]
struct SyncArgs {
    /// Path to the YAML configuration.
    #[arg(long)]
    config: PathBuf,
    /// Database file path (overrides the configuration).
    #[arg(long)]
    db: Option<PathBuf>,
    /// Registry root (overrides the configuration).
    #[arg(long)]
    registry: Option<PathBuf>,
    /// Run even if synchronization is disabled.
    #[arg(long)]
    force: bool,
    /// Print the pass outcome as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct StatusArgs {
    /// Path to the YAML configuration.
    #[arg(long)]
    config: PathBuf,
    /// Number of recent problems to show.
    #[arg(long, default_value_t = 10)]
    problems: usize,
}

#[derive(Debug, Args)]
struct CheckArgs {
    /// Definition files and/or directories containing them.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
}

#[derive(Debug, Args)]
struct StoreArgs {
    #[command(subcommand)]
    operation: StoreOperation,
}

#[derive(Debug, Subcommand)]
enum StoreOperation {
    /// Create the bookkeeping tables.
    Up(StoreTarget),
    /// Drop the bookkeeping tables.
    Down(StoreTarget),
}

#[derive(Debug, Args)]
struct StoreTarget {
    /// Database file path.
    #[arg(long)]
    db: PathBuf,
    /// Table prefix.
    #[arg(long, default_value = schema_sync_db::DEFAULT_PREFIX)]
    prefix: String,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let result = match cli.command {
        Command::Sync(args) => run_sync(args),
        Command::Status(args) => run_status(args),
        Command::Check(args) => run_check(args),
        Command::Store(args) => run_store(args),
    };

    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

/// Logs go to stderr; `RUST_LOG` overrides the default `warn` level.
fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ---------------------------------------------------------------------------
// sync
// ---------------------------------------------------------------------------

fn run_sync(args: SyncArgs) -> Result<(), String> {
    let mut config = load_config(&args.config)?;
    if let Some(db) = args.db {
        config.database = db;
    }
    if let Some(registry) = args.registry {
        config.registry = Some(registry);
    }

    let conn = open_database(&config.database)?;
    Migration::new(&conn, &config.prefix)
        .and_then(|m| m.up())
        .map_err(|e| format!("Failed to prepare bookkeeping tables: {e}"))?;
    let executor = SqliteExecutor::new(&conn, &config.prefix).map_err(|e| e.to_string())?;

    let outcome = match &config.manifest {
        Some(path) => {
            let store = ManifestStore::load(path)
                .map_err(|e| format!("Failed to load manifest '{}': {e}", path.display()))?;
            let outcome = sync_with_sink(&config, &conn, &store, executor, args.force)?;
            store
                .save()
                .map_err(|e| format!("Failed to save manifest '{}': {e}", path.display()))?;
            outcome
        }
        None => {
            let store = SqliteArtifactStore::new(&conn, &config.prefix).map_err(|e| e.to_string())?;
            sync_with_sink(&config, &conn, store, executor, args.force)?
        }
    };

    if args.json {
        let json = serde_json::to_string_pretty(&outcome)
            .map_err(|e| format!("JSON serialization failed: {e}"))?;
        println!("{json}");
    } else {
        print_outcome(&outcome);
    }

    match outcome.summary() {
        Some(summary) if summary.failed > 0 => {
            Err(format!("{} artifact(s) failed to synchronize", summary.failed))
        }
        _ => Ok(()),
    }
}

/// Picks the problem sink from the configuration and runs the pass.
fn sync_with_sink<A: ArtifactStore>(
    config: &SyncConfig,
    conn: &Connection,
    store: A,
    executor: SqliteExecutor<'_>,
    force: bool,
) -> Result<PassOutcome, String> {
    let source = config.source();
    if config.report_problems {
        let persisted = SqliteProblemSink::new(conn, &config.prefix).map_err(|e| e.to_string())?;
        run_pass(config, source, store, executor, (TracingProblemSink, persisted), force)
    } else {
        run_pass(config, source, store, executor, TracingProblemSink, force)
    }
}

fn run_pass<S, A, P>(
    config: &SyncConfig,
    source: S,
    store: A,
    executor: SqliteExecutor<'_>,
    sink: P,
    force: bool,
) -> Result<PassOutcome, String>
where
    S: DefinitionSource + Sync,
    A: ArtifactStore,
    P: ProblemSink,
{
    debug!(database = %config.database.display(), force, "starting pass");
    Synchronizer::new(source, store, executor, sink)
        .with_enabled(config.enabled)
        .run_pass(force)
        .map_err(|e| format!("Synchronization pass failed: {e}"))
}

fn print_outcome(outcome: &PassOutcome) {
    let summary: &PassSummary = match outcome {
        PassOutcome::Completed(summary) => summary,
        PassOutcome::Skipped(reason) => {
            println!("Pass skipped: {reason}");
            return;
        }
    };
    println!("Pass complete:");
    println!("  Created: {}", summary.created);
    println!("  Updated: {}", summary.updated);
    println!("  Failed: {}", summary.failed);
    println!("  Orphans removed: {}", summary.orphans_removed);
    if !summary.cycles.is_empty() {
        println!("  Dependency cycle: {}", summary.cycles.join(", "));
    }
    let failures: Vec<_> = summary
        .states
        .iter()
        .filter(|entry| entry.state.is_failure())
        .collect();
    if !failures.is_empty() {
        println!("\nFailures:");
        for entry in failures {
            println!(
                "  {} [{}] {}: {}",
                entry.location,
                entry.state,
                entry.name,
                entry.message.as_deref().unwrap_or("-")
            );
        }
    }
}

// ---------------------------------------------------------------------------
// status
// ---------------------------------------------------------------------------

fn run_status(args: StatusArgs) -> Result<(), String> {
    let config = load_config(&args.config)?;
    let conn = open_database(&config.database)?;
    let migration = Migration::new(&conn, &config.prefix).map_err(|e| e.to_string())?;
    let status = migration
        .status()
        .map_err(|e| format!("Failed to get store status: {e}"))?;

    println!("Store Status:");
    println!("  Database: {}", config.database.display());
    println!(
        "  Tables exist: {}",
        if status.tables_exist { "yes" } else { "no" }
    );
    println!(
        "  Scheduled passes: {}",
        if config.enabled { "enabled" } else { "disabled" }
    );
    if !status.tables_exist {
        return Ok(());
    }
    println!("  Identity counters: {}", status.identity_count);
    println!("  Problems: {}", status.problem_count);

    let counts = match &config.manifest {
        Some(path) if path.exists() => record_counts(
            &ManifestStore::load(path)
                .map_err(|e| format!("Failed to load manifest '{}': {e}", path.display()))?,
        )?,
        Some(_) => Vec::new(),
        None => record_counts(
            &SqliteArtifactStore::new(&conn, &config.prefix).map_err(|e| e.to_string())?,
        )?,
    };
    println!("\nRecords:");
    for (kind, count) in counts {
        println!("  {kind}: {count}");
    }

    let problems = SqliteProblemSink::new(&conn, &config.prefix)
        .and_then(|sink| sink.recent(args.problems))
        .map_err(|e| format!("Failed to read problems: {e}"))?;
    if !problems.is_empty() {
        println!("\nRecent problems:");
        for record in problems {
            println!(
                "  {} {} [{}] {}",
                record.created_at.to_rfc3339(),
                record.problem.location,
                record.problem.error_type,
                record.problem.message
            );
        }
    }
    Ok(())
}

fn record_counts<A: ArtifactStore>(store: &A) -> Result<Vec<(ArtifactKind, usize)>, String> {
    ArtifactKind::ALL
        .into_iter()
        .map(|kind| {
            store
                .list_all(kind)
                .map(|records| (kind, records.len()))
                .map_err(|e| format!("Failed to list {kind} records: {e}"))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// check
// ---------------------------------------------------------------------------

fn run_check(args: CheckArgs) -> Result<(), String> {
    let paths = collect_definition_paths(&args.inputs)?;
    if paths.is_empty() {
        return Err("No definition files found".to_string());
    }

    let mut failed = 0usize;
    for path in &paths {
        match check_file(path) {
            Ok(members) => println!("ok   {} ({members} definitions)", path.display()),
            Err(err) => {
                failed += 1;
                println!("FAIL {}: {err}", path.display());
            }
        }
    }
    println!("\nChecked {} files, {failed} failed", paths.len());
    if failed > 0 {
        return Err(format!("{failed} definition file(s) are invalid"));
    }
    Ok(())
}

fn check_file(path: &Path) -> Result<usize, String> {
    let bytes = fs::read(path).map_err(|e| e.to_string())?;
    let location = path.to_string_lossy();
    let definition = parse_definition(&location, &bytes).map_err(|e| e.to_string())?;
    let members = expand_schema(&definition).map_err(|e| e.to_string())?;
    Ok(members.len() + 1)
}

/// Files with a known definition extension, directories walked recursively.
fn collect_definition_paths(inputs: &[PathBuf]) -> Result<Vec<PathBuf>, String> {
    let mut paths = Vec::new();
    for input in inputs {
        if input.is_dir() {
            walk_dir(input, &mut paths)?;
        } else if input.is_file() {
            paths.push(input.clone());
        } else {
            return Err(format!("No such file or directory: {}", input.display()));
        }
    }
    paths.sort();
    paths.dedup();
    Ok(paths)
}

fn walk_dir(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), String> {
    let entries =
        fs::read_dir(dir).map_err(|e| format!("Failed to read '{}': {e}", dir.display()))?;
    for entry in entries {
        let path = entry.map_err(|e| e.to_string())?.path();
        if path.is_dir() {
            walk_dir(&path, out)?;
        } else if ArtifactKind::from_location(&path.to_string_lossy()).is_some() {
            out.push(path);
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// store
// ---------------------------------------------------------------------------

fn run_store(args: StoreArgs) -> Result<(), String> {
    match args.operation {
        StoreOperation::Up(target) => {
            let conn = open_database(&target.db)?;
            Migration::new(&conn, &target.prefix)
                .and_then(|m| m.up())
                .map_err(|e| format!("Store up failed: {e}"))?;
            println!(
                "Store up complete. Tables created with prefix '{}' in '{}'.",
                target.prefix,
                target.db.display()
            );
        }
        StoreOperation::Down(target) => {
            let conn = open_database(&target.db)?;
            Migration::new(&conn, &target.prefix)
                .and_then(|m| m.down())
                .map_err(|e| format!("Store down failed: {e}"))?;
            println!(
                "Store down complete. Tables with prefix '{}' dropped from '{}'.",
                target.prefix,
                target.db.display()
            );
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn load_config(path: &Path) -> Result<SyncConfig, String> {
    SyncConfig::load(path).map_err(|e| format!("Failed to load config '{}': {e}", path.display()))
}

fn open_database(path: &Path) -> Result<Connection, String> {
    Connection::open(path).map_err(|e| format!("Failed to open database '{}': {e}", path.display()))
}
