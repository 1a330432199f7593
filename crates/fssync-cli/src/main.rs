// crates/fssync-cli/src/main.rs
// ============================================================================
// Module: fssync CLI Entry Point
// Description: Command dispatcher for sync, inspection, audit, and replay.
// Purpose: Operate the FeatureServer-to-database reconciliation from a shell.
// Dependencies: clap, fssync-core, fssync-arcgis, fssync-config, tracing
// ============================================================================

//! ## Overview
//! `fssync` loads one validated configuration, then runs a command against the
//! configured feature service and store. Results go to stdout, one line per
//! fact; logs go to stderr through `tracing`. Every failure maps to a
//! non-zero exit code.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use fssync_arcgis::ArcgisFeatureSource;
use fssync_config::FssyncConfig;
use fssync_config::StoreConfig;
use fssync_core::CancellationFlag;
use fssync_core::EntityType;
use fssync_core::Reconciler;
use fssync_core::RunOptions;
use fssync_core::SyncFailure;
use fssync_core::SyncRunResult;
use fssync_core::SyncStore;
use fssync_core::SyncTotals;
use fssync_core::runtime::audit_store;
use fssync_core::runtime::read_artifact;
use fssync_core::runtime::reconcile_batch;
use fssync_store_postgres::PostgresSyncStore;
use fssync_store_sqlite::SqliteSyncStore;
use thiserror::Error;
use tracing::error;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "fssync", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file (overrides `FSSYNC_CONFIG`; defaults to `fssync.toml`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Log level used when `RUST_LOG` is unset (overrides the config file).
    #[arg(long, value_name = "LEVEL", global = true)]
    log_level: Option<String>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile layers into the store.
    Sync(SyncCommand),
    /// List layers and tables published by the feature service.
    Layers,
    /// Layer schema utilities.
    Schema {
        /// Selected schema subcommand.
        #[command(subcommand)]
        command: SchemaCommand,
    },
    /// Store inspection utilities.
    Store {
        /// Selected store subcommand.
        #[command(subcommand)]
        command: StoreCommand,
    },
    /// Reconcile the page saved in a recovery artifact.
    Replay(ReplayCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Arguments for `sync`.
#[derive(Args, Debug)]
struct SyncCommand {
    /// Layer to sync; repeatable. Defaults to `sync.layers`, then every layer.
    #[arg(long = "layer", value_name = "NAME")]
    layers: Vec<String>,
    /// Offset of the first page; requires exactly one layer.
    #[arg(long, default_value_t = 0)]
    offset: u64,
    /// Upper bound on the page size (overrides `sync.page_size`).
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    page_size: Option<u32>,
}

/// Schema subcommands.
#[derive(Subcommand, Debug)]
enum SchemaCommand {
    /// Save a one-record query per layer as `<dir>/<layer>.json`.
    Download {
        /// Output directory.
        #[arg(long, default_value = "schema")]
        dir: PathBuf,
    },
}

/// Store subcommands.
#[derive(Subcommand, Debug)]
enum StoreCommand {
    /// Check history contiguity and current/history agreement for a layer.
    Audit {
        /// Layer name.
        layer: String,
    },
}

/// Arguments for `replay`.
#[derive(Args, Debug)]
struct ReplayCommand {
    /// Recovery artifact written by a failed sync.
    artifact: PathBuf,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the configuration.
    Validate,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for operator-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Loads configuration, installs logging, and dispatches the command.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = FssyncConfig::load(cli.config.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))?;
    init_logging(resolve_log_level(cli.log_level.as_deref(), &config))?;

    match cli.command {
        Commands::Sync(command) => command_sync(&config, &command),
        Commands::Layers => command_layers(&config),
        Commands::Schema {
            command: SchemaCommand::Download {
                dir,
            },
        } => command_schema_download(&config, &dir),
        Commands::Store {
            command: StoreCommand::Audit {
                layer,
            },
        } => command_store_audit(&config, &layer),
        Commands::Replay(command) => command_replay(&config, &command.artifact),
        Commands::Config {
            command: ConfigCommand::Validate,
        } => {
            write_stdout_line("config valid").map_err(|err| output_error(&err))?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Executes `sync`.
fn command_sync(config: &FssyncConfig, command: &SyncCommand) -> CliResult<ExitCode> {
    let source = connect_source(config)?;
    let requested = if command.layers.is_empty() { &config.sync.layers } else { &command.layers };
    let layers = source.resolve_layers(requested).map_err(|err| CliError::new(err.to_string()))?;
    if command.offset > 0 && layers.len() != 1 {
        return Err(CliError::new("--offset requires exactly one layer"));
    }
    let store = open_store(&config.store)?;
    let mut reconciler_config = config.reconciler_config();
    if let Some(page_size) = command.page_size {
        let page_size = usize::try_from(page_size)
            .map_err(|_| CliError::new("page size exceeds platform limits"))?;
        reconciler_config.page_size = Some(page_size);
    }
    let cancel = CancellationFlag::new();
    install_interrupt_handler(cancel.clone())?;
    let options = RunOptions {
        start_offset: command.offset,
        cancel: Some(cancel),
    };

    let reconciler = Reconciler::new(&source, store.as_ref(), reconciler_config);
    let mut totals = SyncTotals::default();
    for layer in &layers {
        match reconciler.run(layer, &options) {
            Ok(result) => {
                info!(
                    layer = %layer,
                    inserts = result.inserts,
                    updates = result.updates,
                    unchanged = result.unchanged,
                    skipped = result.skipped,
                    pages = result.pages,
                    "layer synced"
                );
                write_stdout_line(&summary_line(&result)).map_err(|err| output_error(&err))?;
                totals.absorb(&result);
            }
            Err(failure) => {
                let recovery =
                    failure.recovery_path.as_ref().map(|path| path.display().to_string());
                error!(
                    layer = %layer,
                    phase = failure.phase.as_str(),
                    error = %failure.error,
                    recovery,
                    "layer sync failed"
                );
                return Err(CliError::new(failure_message(layer, &failure)));
            }
        }
    }
    info!(
        inserts = totals.inserts,
        updates = totals.updates,
        unchanged = totals.unchanged,
        skipped = totals.skipped,
        "sync finished"
    );
    write_stdout_line(&totals_line(&totals)).map_err(|err| output_error(&err))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `layers`.
fn command_layers(config: &FssyncConfig) -> CliResult<ExitCode> {
    let source = connect_source(config)?;
    for layer in source.service().all_layers() {
        write_stdout_line(&format!("{}\t{}", layer.id, layer.name))
            .map_err(|err| output_error(&err))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `schema download`.
fn command_schema_download(config: &FssyncConfig, dir: &Path) -> CliResult<ExitCode> {
    let source = connect_source(config)?;
    let written = source
        .download_schemas(dir)
        .map_err(|err| CliError::new(format!("schema download failed: {err}")))?;
    for path in written {
        write_stdout_line(&path.display().to_string()).map_err(|err| output_error(&err))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Executes `store audit`.
fn command_store_audit(config: &FssyncConfig, layer: &str) -> CliResult<ExitCode> {
    let store = open_store(&config.store)?;
    let entity = EntityType::new(layer);
    let layout = store
        .stored_layout(&entity)
        .map_err(|err| CliError::new(err.to_string()))?
        .ok_or_else(|| CliError::new(format!("layer {layer} has not been synced")))?;
    let report =
        audit_store(store.as_ref(), &layout).map_err(|err| CliError::new(err.to_string()))?;
    let text = serde_json::to_string_pretty(&report)
        .map_err(|err| CliError::new(format!("failed to encode audit report: {err}")))?;
    write_stdout_line(&text).map_err(|err| output_error(&err))?;
    if report.is_clean() {
        Ok(ExitCode::SUCCESS)
    } else {
        warn!(layer, violations = report.violations.len(), "store audit found violations");
        Ok(ExitCode::FAILURE)
    }
}

/// Executes `replay`.
fn command_replay(config: &FssyncConfig, artifact_path: &Path) -> CliResult<ExitCode> {
    let artifact = read_artifact(artifact_path)
        .map_err(|err| CliError::new(format!("failed to read recovery artifact: {err}")))?;
    let Some(batch) = &artifact.batch else {
        return Err(CliError::new(format!(
            "recovery artifact holds no page for {} at offset {}",
            artifact.entity_type, artifact.offset
        )));
    };
    let store = open_store(&config.store)?;
    let result = reconcile_batch(
        store.as_ref(),
        &config.reconciler_config(),
        &artifact.entity_type,
        batch,
        artifact.offset,
    )
    .map_err(|err| CliError::new(format!("replay failed: {err}")))?;
    info!(
        layer = %artifact.entity_type,
        offset = artifact.offset,
        records = batch.len(),
        "recovery page replayed"
    );
    write_stdout_line(&summary_line(&result)).map_err(|err| output_error(&err))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Wiring
// ============================================================================

/// Connects to the configured feature service.
fn connect_source(config: &FssyncConfig) -> CliResult<ArcgisFeatureSource> {
    ArcgisFeatureSource::connect(&config.arcgis, config.sync.global_id_field.as_str())
        .map_err(|err| CliError::new(format!("failed to reach feature service: {err}")))
}

/// Opens the configured store.
fn open_store(config: &StoreConfig) -> CliResult<Box<dyn SyncStore>> {
    match config {
        StoreConfig::Sqlite(sqlite) => SqliteSyncStore::new(sqlite)
            .map(|store| Box::new(store) as Box<dyn SyncStore>)
            .map_err(|err| CliError::new(format!("failed to open sqlite store: {err}"))),
        StoreConfig::Postgres(postgres) => PostgresSyncStore::new(postgres)
            .map(|store| Box::new(store) as Box<dyn SyncStore>)
            .map_err(|err| CliError::new(format!("failed to open postgres store: {err}"))),
    }
}

/// Picks the default log filter: `--log-level`, then the config file.
fn resolve_log_level<'a>(flag: Option<&'a str>, config: &'a FssyncConfig) -> &'a str {
    flag.unwrap_or(config.logging.level.as_str())
}

/// Installs a stderr subscriber; `RUST_LOG` takes precedence over `level`.
fn init_logging(level: &str) -> CliResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|err| CliError::new(format!("invalid log level {level}: {err}")))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| CliError::new(format!("failed to install logging: {err}")))
}

/// Cancels `flag` on Ctrl-C; the run stops before its next page.
fn install_interrupt_handler(flag: CancellationFlag) -> CliResult<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
        .map_err(|err| CliError::new(format!("failed to start signal handler: {err}")))?;
    thread::Builder::new()
        .name("fssync-signal".to_string())
        .spawn(move || {
            if runtime.block_on(tokio::signal::ctrl_c()).is_ok() {
                warn!("interrupt received; stopping before the next page");
                flag.cancel();
            }
        })
        .map(|_| ())
        .map_err(|err| CliError::new(format!("failed to start signal handler: {err}")))
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Formats the counters of one run.
fn counts(result: &SyncRunResult) -> String {
    let mut text = format!(
        "{} inserts, {} updates, {} no change",
        result.inserts, result.updates, result.unchanged
    );
    if result.skipped > 0 {
        text.push_str(", ");
        text.push_str(&result.skipped.to_string());
        text.push_str(" skipped");
    }
    text
}

/// Formats the per-layer summary line.
fn summary_line(result: &SyncRunResult) -> String {
    format!("{}: {}", result.entity_type, counts(result))
}

/// Formats the operator message for a failed layer.
fn failure_message(layer: &EntityType, failure: &SyncFailure) -> String {
    let mut message = format!(
        "{layer} failed during {}: {} (partial: {})",
        failure.phase.as_str(),
        failure.error,
        counts(&failure.partial),
    );
    if let Some(path) = &failure.recovery_path {
        message.push_str("; failed page saved to ");
        message.push_str(&path.display().to_string());
    }
    message
}

/// Formats the grand totals line.
fn totals_line(totals: &SyncTotals) -> String {
    format!(
        "total: {} inserts, {} updates, {} no change, {} skipped",
        totals.inserts, totals.updates, totals.unchanged, totals.skipped
    )
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Wraps an output failure.
fn output_error(error: &std::io::Error) -> CliError {
    CliError::new(format!("failed to write output: {error}"))
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
