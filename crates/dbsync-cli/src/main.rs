mod registry;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand, ValueEnum};
use dbsync_core::{
    Direction, Environment, RedactedConnection, SyncError, load_settings, manifest_json_schema,
    resolve_connections,
};
use dbsync_store::ProbeOutcome;
use dbsync_sync::{
    AssumeYes, Confirm, PromptConfirm, SyncEngine, SyncOptions, check_connectivity,
    inspect_source,
};
use registry::{init_logging, write_report};
use thiserror::Error;

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Sync(err) => err.exit_code(),
            CliError::Registry(_) | CliError::Json(_) => 2,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "dbsync",
    version,
    about = "Copy schema and rows between a PostgreSQL server and a local SQLite file"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replace the target's data with the source's.
    Sync(SyncArgs),
    /// Resolve and probe both endpoints without writing anything.
    Check(CheckArgs),
    /// Print the JSON Schema of the manifest file.
    ManifestSchema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DirectionArg {
    /// Server to local file.
    ToLocal,
    /// Local file to server.
    ToServer,
}

impl From<DirectionArg> for Direction {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::ToLocal => Direction::ToLocal,
            DirectionArg::ToServer => Direction::ToServer,
        }
    }
}

#[derive(Args, Debug)]
struct SyncArgs {
    #[arg(long, value_enum)]
    direction: DirectionArg,
    /// Skip the confirmation prompt.
    #[arg(long, default_value_t = false)]
    yes: bool,
    /// Clear a file target in place instead of deleting and recreating it.
    #[arg(long, default_value_t = false)]
    no_wipe: bool,
    /// Keep the manifest file after a successful run.
    #[arg(long, default_value_t = false)]
    keep_manifest: bool,
    #[arg(long, value_name = "PATH")]
    manifest_path: Option<PathBuf>,
    /// Table to leave out; repeatable.
    #[arg(long, value_name = "TABLE")]
    exclude: Vec<String>,
    /// Also exclude the configured volatile tables (sessions, content types).
    #[arg(long, default_value_t = false)]
    exclude_volatile: bool,
    /// Rows per insert statement.
    #[arg(long, value_name = "N")]
    batch_size: Option<usize>,
    /// Migrations directory; an engine-named subdirectory wins when present.
    #[arg(long, value_name = "DIR")]
    migrations: Option<PathBuf>,
    /// Settings file (defaults to ./dbsync.toml when present).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Append JSON log lines to this file.
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
    /// Write the run report as JSON.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CheckArgs {
    #[arg(long, value_enum)]
    direction: DirectionArg,
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Sync(args) => run_sync(args).await,
        Command::Check(args) => run_check(args).await,
        Command::ManifestSchema => print_manifest_schema().map(|()| 0),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn run_sync(args: SyncArgs) -> Result<u8, CliError> {
    init_logging(args.log_file.as_deref())?;

    let direction = Direction::from(args.direction);
    let settings = load_settings(args.config.as_deref())?;
    let env = Environment::from_process();
    let connections = resolve_connections(direction, &settings, &env, !args.yes)?;

    let mut options = SyncOptions::from_settings(direction, &settings, &env);
    options.assume_yes = args.yes;
    options.wipe = !args.no_wipe;
    options.keep_manifest = args.keep_manifest;
    if let Some(path) = args.manifest_path {
        options.manifest_path = path;
    }
    options.exclusions.extend(args.exclude);
    if args.exclude_volatile {
        options.exclude_volatile(&settings);
    }
    if let Some(batch_size) = args.batch_size {
        options.batch_size = batch_size;
    }
    if args.migrations.is_some() {
        options.migrations_dir = args.migrations;
    }

    let mut confirm: Box<dyn Confirm> = if args.yes {
        Box::new(AssumeYes)
    } else {
        Box::new(PromptConfirm::new(io::stdin().lock(), io::stderr()))
    };

    let outcome = SyncEngine::new(options)
        .run(&connections, confirm.as_mut())
        .await;

    println!("{}", outcome.report.summary_line());
    for warning in &outcome.report.warnings {
        println!("  warning [{}]: {}", warning.code, warning.message);
    }
    if let Some(path) = &args.report {
        write_report(path, &outcome.report)?;
    }

    match outcome.result {
        Ok(()) => Ok(0),
        Err(err) => Err(CliError::Sync(err)),
    }
}

async fn run_check(args: CheckArgs) -> Result<u8, CliError> {
    init_logging(None)?;

    let direction = Direction::from(args.direction);
    let settings = load_settings(args.config.as_deref())?;
    let env = Environment::from_process();
    let connections = resolve_connections(direction, &settings, &env, true)?;
    let opts = dbsync_store::ConnectOptions::default();

    let probes = check_connectivity(&connections, &opts).await?;
    for (role, descriptor, outcome) in [
        ("source", &connections.source, probes.source),
        ("target", &connections.target, probes.target),
    ] {
        let redacted = RedactedConnection::from_descriptor(descriptor);
        let state = match outcome {
            ProbeOutcome::Reachable => "reachable",
            ProbeOutcome::MissingFile => "missing, will be created",
        };
        println!("{role}: {} ({state})", redacted.redacted);
    }

    let graph = inspect_source(&connections, &opts).await?;
    println!(
        "source tables: {}, foreign keys: {}",
        graph.summary.nodes, graph.summary.edges
    );
    if let Some(cycle) = &graph.cycle {
        println!("foreign key cycle: {}", cycle.join(", "));
    }
    Ok(0)
}

fn print_manifest_schema() -> Result<(), CliError> {
    let schema = manifest_json_schema();
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sync_flags() {
        let cli = Cli::try_parse_from([
            "dbsync",
            "sync",
            "--direction",
            "to-server",
            "--yes",
            "--exclude",
            "audit_log",
            "--exclude",
            "django_session",
            "--batch-size",
            "100",
        ])
        .expect("parse");
        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        assert_eq!(args.direction, DirectionArg::ToServer);
        assert!(args.yes);
        assert!(!args.no_wipe);
        assert_eq!(args.exclude, vec!["audit_log", "django_session"]);
        assert_eq!(args.batch_size, Some(100));
    }

    #[test]
    fn direction_is_required() {
        assert!(Cli::try_parse_from(["dbsync", "sync", "--yes"]).is_err());
        assert!(Cli::try_parse_from(["dbsync", "check", "--direction", "sideways"]).is_err());
    }

    #[test]
    fn exit_codes_follow_error_kind() {
        let aborted = CliError::from(SyncError::Aborted("declined".to_string()));
        assert_eq!(aborted.exit_code(), 1);
        let import = CliError::from(SyncError::Import("boom".to_string()));
        assert_eq!(import.exit_code(), 2);
        let logging = CliError::from(registry::RegistryError::Logging("x".to_string()));
        assert_eq!(logging.exit_code(), 2);
    }
}
