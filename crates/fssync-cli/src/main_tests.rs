// crates/fssync-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for argument parsing and output formatting.
// Purpose: Keep the command surface and operator output stable.
// Dependencies: clap, fssync-config, fssync-core
// ============================================================================

//! ## Overview
//! Exercises clap parsing, summary lines, failure messages, and log level
//! precedence without touching the network or a database.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use clap::CommandFactory;
use clap::Parser;
use fssync_config::FssyncConfig;
use fssync_core::EntityType;
use fssync_core::RunPhase;
use fssync_core::SourceError;
use fssync_core::SyncError;
use fssync_core::SyncFailure;
use fssync_core::SyncRunResult;
use fssync_core::SyncTotals;

use super::Cli;
use super::Commands;
use super::SchemaCommand;
use super::StoreCommand;
use super::failure_message;
use super::resolve_log_level;
use super::summary_line;
use super::totals_line;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn result(inserts: u64, updates: u64, unchanged: u64, skipped: u64) -> SyncRunResult {
    let mut result = SyncRunResult::new(EntityType::new("PointLocation"));
    result.inserts = inserts;
    result.updates = updates;
    result.unchanged = unchanged;
    result.skipped = skipped;
    result
}

fn config(level: &str) -> FssyncConfig {
    FssyncConfig::parse(&format!(
        "[arcgis]\nservice_root = \"https://example.com\"\nservice = \"FieldSeeker\"\n\n\
         [logging]\nlevel = \"{level}\"\n"
    ))
    .unwrap()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn sync_accepts_repeated_layers_and_overrides() {
    let cli = Cli::try_parse_from([
        "fssync",
        "--config",
        "site.toml",
        "sync",
        "--layer",
        "PointLocation",
        "--layer",
        "Inspections",
        "--page-size",
        "250",
    ])
    .unwrap();
    assert_eq!(cli.config, Some(PathBuf::from("site.toml")));
    let Commands::Sync(command) = cli.command else {
        panic!("expected sync command");
    };
    assert_eq!(command.layers, vec!["PointLocation", "Inspections"]);
    assert_eq!(command.offset, 0);
    assert_eq!(command.page_size, Some(250));
}

#[test]
fn sync_rejects_zero_page_size() {
    assert!(Cli::try_parse_from(["fssync", "sync", "--page-size", "0"]).is_err());
}

#[test]
fn global_flags_follow_subcommands() {
    let args = ["fssync", "store", "audit", "PointLocation", "--log-level", "debug"];
    let cli = Cli::try_parse_from(args).unwrap();
    assert_eq!(cli.log_level.as_deref(), Some("debug"));
    let Commands::Store {
        command: StoreCommand::Audit {
            layer,
        },
    } = cli.command
    else {
        panic!("expected store audit command");
    };
    assert_eq!(layer, "PointLocation");
}

#[test]
fn schema_download_defaults_directory() {
    let cli = Cli::try_parse_from(["fssync", "schema", "download"]).unwrap();
    let Commands::Schema {
        command: SchemaCommand::Download {
            dir,
        },
    } = cli.command
    else {
        panic!("expected schema download command");
    };
    assert_eq!(dir, PathBuf::from("schema"));
}

#[test]
fn replay_requires_artifact_path() {
    assert!(Cli::try_parse_from(["fssync", "replay"]).is_err());
}

#[test]
fn summary_line_omits_zero_skips() {
    assert_eq!(
        summary_line(&result(3, 1, 2, 0)),
        "PointLocation: 3 inserts, 1 updates, 2 no change"
    );
    assert_eq!(
        summary_line(&result(0, 0, 5, 2)),
        "PointLocation: 0 inserts, 0 updates, 5 no change, 2 skipped"
    );
}

#[test]
fn totals_line_sums_layers() {
    let mut totals = SyncTotals::default();
    totals.absorb(&result(3, 0, 0, 0));
    totals.absorb(&result(1, 2, 4, 1));
    assert_eq!(totals_line(&totals), "total: 4 inserts, 2 updates, 4 no change, 1 skipped");
}

#[test]
fn failure_message_reports_partial_counts_and_artifact() {
    let failure = SyncFailure {
        error: SyncError::SourceFetch(SourceError::Transport("timed out".to_string())),
        phase: RunPhase::FetchPage,
        partial: result(2, 0, 0, 0),
        recovery_path: Some(PathBuf::from("temp/failure.json")),
    };
    let message = failure_message(&EntityType::new("PointLocation"), &failure);
    assert!(message.starts_with("PointLocation failed during fetch_page: "));
    assert!(message.contains("timed out"));
    assert!(message.contains("(partial: 2 inserts, 0 updates, 0 no change)"));
    assert!(message.ends_with("; failed page saved to temp/failure.json"));
}

#[test]
fn log_level_flag_overrides_config() {
    let config = config("warn");
    assert_eq!(resolve_log_level(None, &config), "warn");
    assert_eq!(resolve_log_level(Some("trace"), &config), "trace");
}
