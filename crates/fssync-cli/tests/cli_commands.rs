// crates/fssync-cli/tests/cli_commands.rs
// ============================================================================
// Module: CLI Command Tests
// Description: End-to-end runs of the fssync binary.
// Purpose: Cover sync, audit, layer listing, config validation, and replay.
// Dependencies: fssync-core, tiny_http, tempfile
// ============================================================================

//! ## Overview
//! Each test writes a config pointing at a local `tiny_http` FeatureServer and
//! a `SQLite` file in a temp directory, then runs the built binary.

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

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;
use std::process::Output;
use std::thread;
use std::time::Duration;

use fssync_core::AttributeValue;
use fssync_core::EntityType;
use fssync_core::FeatureBatch;
use fssync_core::FeatureRecord;
use fssync_core::FieldKind;
use fssync_core::FieldSpec;
use fssync_core::RecoveryArtifact;
use fssync_core::runtime::write_artifact;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;
use tiny_http::Response;
use tiny_http::Server;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn fssync_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_fssync"))
}

fn query_param(url: &str, key: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    query.split('&').find_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        (name == key).then(|| value.to_string())
    })
}

/// Serves one layer of three points; the page at `fail_offset` returns an
/// ArcGIS error document.
fn serve(fail_offset: Option<u64>) -> String {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr().to_ip().unwrap();
    thread::spawn(move || {
        while let Ok(Some(request)) = server.recv_timeout(Duration::from_secs(30)) {
            let body = respond(request.url(), fail_offset);
            let _ = request.respond(Response::from_string(body.to_string()));
        }
    });
    format!("http://{addr}")
}

fn respond(url: &str, fail_offset: Option<u64>) -> Value {
    let path = url.split('?').next().unwrap_or_default();
    if path.ends_with("/FeatureServer") {
        return json!({
            "maxRecordCount": 2,
            "layers": [{"id": 0, "name": "PointLocation"}],
            "tables": [],
        });
    }
    if query_param(url, "returnCountOnly").as_deref() == Some("true") {
        return json!({"count": 3});
    }
    let offset: u64 = query_param(url, "resultOffset").unwrap().parse().unwrap();
    let limit: usize = query_param(url, "resultRecordCount").unwrap().parse().unwrap();
    if fail_offset == Some(offset) {
        return json!({"error": {"code": 500, "message": "Unable to complete operation."}});
    }
    let features: Vec<Value> = (1..=3_i64)
        .skip(usize::try_from(offset).unwrap())
        .take(limit)
        .map(|object_id| {
            json!({
                "attributes": {
                    "OBJECTID": object_id,
                    "GlobalID": format!("{{G-{object_id}}}"),
                    "Comments": format!("site {object_id}"),
                },
                "geometry": {"x": -80.5, "y": 43.25},
            })
        })
        .collect();
    json!({
        "objectIdFieldName": "OBJECTID",
        "globalIdFieldName": "GlobalID",
        "fields": [
            {"name": "OBJECTID", "type": "esriFieldTypeOID"},
            {"name": "GlobalID", "type": "esriFieldTypeGlobalID"},
            {"name": "Comments", "type": "esriFieldTypeString"},
        ],
        "features": features,
    })
}

fn write_config(dir: &Path, root: &str) -> PathBuf {
    let db = dir.join("fssync.db");
    let recovery = dir.join("temp").join("failure.json");
    let content = format!(
        "[arcgis]\nservice_root = '{root}'\ntenant_id = 'tenant'\nservice = 'FieldSeeker'\n\
         timeout_ms = 5000\n\n[store]\ntype = 'sqlite'\npath = '{}'\n\n\
         [sync]\nrecovery_path = '{}'\n",
        db.display(),
        recovery.display()
    );
    let path = dir.join("fssync.toml");
    fs::write(&path, content).unwrap();
    path
}

fn run(config: &Path, args: &[&str]) -> Output {
    Command::new(fssync_bin())
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("FSSYNC_CONFIG")
        .env_remove("FSSYNC_ARCGIS_TOKEN")
        .env_remove("FSSYNC_DATABASE_URL")
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// A second sync over unchanged data is a no-op and the store audits clean.
#[test]
fn sync_twice_then_audit() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &serve(None));

    let first = run(&config, &["sync"]);
    assert!(first.status.success(), "stderr: {}", stderr(&first));
    let text = stdout(&first);
    assert!(text.contains("PointLocation: 3 inserts, 0 updates, 0 no change"), "{text}");
    assert!(text.contains("total: 3 inserts, 0 updates, 0 no change, 0 skipped"), "{text}");

    let second = run(&config, &["sync", "--layer", "pointlocation"]);
    assert!(second.status.success(), "stderr: {}", stderr(&second));
    assert!(stdout(&second).contains("PointLocation: 0 inserts, 0 updates, 3 no change"));

    let audit = run(&config, &["store", "audit", "PointLocation"]);
    assert!(audit.status.success(), "stderr: {}", stderr(&audit));
    let report: Value = serde_json::from_str(&stdout(&audit)).unwrap();
    assert_eq!(report["current_rows"], 3);
    assert_eq!(report["history_rows"], 3);
    assert_eq!(report["violations"].as_array().map(Vec::len), Some(0));
}

/// `layers` prints the id and name of every published layer.
#[test]
fn layers_lists_service_layers() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &serve(None));

    let output = run(&config, &["layers"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "0\tPointLocation\n");
}

/// Unknown layers fail before any store is opened.
#[test]
fn sync_rejects_unknown_layer() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &serve(None));

    let output = run(&config, &["sync", "--layer", "Trap"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Trap"));
    assert!(!dir.path().join("fssync.db").exists());
}

/// A failing page stops the run, reports partial counts, and saves an artifact.
#[test]
fn sync_failure_writes_recovery_artifact() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), &serve(Some(2)));

    let output = run(&config, &["sync"]);
    assert!(!output.status.success());
    let message = stderr(&output);
    assert!(message.contains("partial: 2 inserts, 0 updates, 0 no change"), "{message}");
    assert!(message.contains("failed page saved to"), "{message}");
    let artifact: Value =
        serde_json::from_slice(&fs::read(dir.path().join("temp").join("failure.json")).unwrap())
            .unwrap();
    assert_eq!(artifact["offset"], 2);
}

/// `config validate` reports success and rejects broken files.
#[test]
fn config_validate_reports_result() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "https://example.test");

    let output = run(&config, &["config", "validate"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "config valid\n");

    let broken = dir.path().join("broken.toml");
    fs::write(&broken, "[arcgis]\nservice_root = 'ftp://example.test'\nservice = 's'\n").unwrap();
    let output = run(&broken, &["config", "validate"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("config invalid"));
}

/// Replaying an artifact applies its page to the store.
#[test]
fn replay_applies_saved_page() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "https://example.test");
    let mut attributes = BTreeMap::new();
    attributes.insert("OBJECTID".to_string(), AttributeValue::Int(7));
    attributes.insert("Comments".to_string(), AttributeValue::Str("late".to_string()));
    let artifact = RecoveryArtifact {
        entity_type: EntityType::new("PointLocation"),
        offset: 0,
        page_size: 1,
        error: "snapshot read failed".to_string(),
        batch: Some(FeatureBatch {
            fields: vec![
                FieldSpec::new("OBJECTID", FieldKind::Integer),
                FieldSpec::new("Comments", FieldKind::Text),
            ],
            unique_id_field: "OBJECTID".to_string(),
            records: vec![FeatureRecord {
                object_id: 7,
                external_id: None,
                attributes,
                geometry: None,
            }],
        }),
        raw_page: None,
    };
    let path = dir.path().join("artifact.json");
    write_artifact(&path, &artifact).unwrap();

    let output = run(&config, &["replay", path.to_str().unwrap()]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(stdout(&output), "PointLocation: 1 inserts, 0 updates, 0 no change\n");

    let again = run(&config, &["replay", path.to_str().unwrap()]);
    assert!(again.status.success(), "stderr: {}", stderr(&again));
    assert_eq!(stdout(&again), "PointLocation: 0 inserts, 0 updates, 1 no change\n");
}

/// An artifact without a saved page cannot be replayed.
#[test]
fn replay_rejects_artifact_without_page() {
    let dir = TempDir::new().unwrap();
    let config = write_config(dir.path(), "https://example.test");
    let artifact = RecoveryArtifact {
        entity_type: EntityType::new("PointLocation"),
        offset: 4,
        page_size: 2,
        error: "source fetch failed".to_string(),
        batch: None,
        raw_page: None,
    };
    let path = dir.path().join("artifact.json");
    write_artifact(&path, &artifact).unwrap();

    let output = run(&config, &["replay", path.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("holds no page for PointLocation at offset 4"));
}
