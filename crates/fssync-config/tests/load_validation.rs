//! Config load validation tests for fssync-config.
// crates/fssync-config/tests/load_validation.rs
// =============================================================================
// Module: Config Load Validation Tests
// Description: Validate config loading guards and semantic checks.
// Purpose: Ensure config input handling is strict and fail-closed.
// =============================================================================

use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use fssync_config::ConfigError;
use fssync_config::FssyncConfig;
use fssync_config::StoreConfig;
use tempfile::NamedTempFile;

type TestResult = Result<(), String>;

const BASE: &str = r#"
[arcgis]
service_root = "https://services.example.test"
tenant_id = "abc123"
service = "FieldSeeker"
"#;

fn write_config(content: &str) -> Result<NamedTempFile, String> {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(content.as_bytes()).map_err(|err| err.to_string())?;
    Ok(file)
}

fn assert_invalid(result: Result<FssyncConfig, ConfigError>, needle: &str) -> TestResult {
    match result {
        Err(error) => {
            let message = error.to_string();
            if message.contains(needle) {
                Ok(())
            } else {
                Err(format!("error {message} did not contain {needle}"))
            }
        }
        Ok(_) => Err("expected invalid config load".to_string()),
    }
}

fn assert_rejected(extra: &str, needle: &str) -> TestResult {
    let file = write_config(&format!("{BASE}{extra}"))?;
    assert_invalid(FssyncConfig::load(Some(file.path())), needle)
}

#[test]
fn load_rejects_path_too_long() -> TestResult {
    let long_path = "a".repeat(5_000);
    assert_invalid(FssyncConfig::load(Some(Path::new(&long_path))), "path exceeds max length")
}

#[test]
fn load_rejects_path_component_too_long() -> TestResult {
    let long_component = "a".repeat(300);
    assert_invalid(
        FssyncConfig::load(Some(Path::new(&long_component))),
        "config path component too long",
    )
}

#[test]
fn load_rejects_missing_file() -> TestResult {
    let dir = tempfile::tempdir().map_err(|err| err.to_string())?;
    let path = dir.path().join("absent.toml");
    assert_invalid(FssyncConfig::load(Some(&path)), "config io error")
}

#[test]
fn load_rejects_oversized_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    let payload = vec![b'#'; 1_048_577];
    file.write_all(&payload).map_err(|err| err.to_string())?;
    assert_invalid(FssyncConfig::load(Some(file.path())), "config file exceeds size limit")
}

#[test]
fn load_rejects_non_utf8_file() -> TestResult {
    let mut file = NamedTempFile::new().map_err(|err| err.to_string())?;
    file.write_all(&[0xFF, 0xFE, 0xFF]).map_err(|err| err.to_string())?;
    assert_invalid(FssyncConfig::load(Some(file.path())), "config file must be utf-8")
}

#[test]
fn load_rejects_unknown_keys() -> TestResult {
    assert_rejected("[sync]\nbatch = 10\n", "config parse error")
}

#[test]
fn load_rejects_missing_arcgis_section() -> TestResult {
    let file = write_config("[sync]\nlayers = [\"PointLocation\"]\n")?;
    assert_invalid(FssyncConfig::load(Some(file.path())), "config parse error")
}

#[test]
fn load_applies_defaults() -> TestResult {
    let file = write_config(BASE)?;
    let config = FssyncConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    let StoreConfig::Sqlite(sqlite) = &config.store else {
        return Err("expected sqlite store by default".to_string());
    };
    if sqlite.path != PathBuf::from("fssync.db") {
        return Err(format!("unexpected default path {}", sqlite.path.display()));
    }
    let reconciler = config.reconciler_config();
    if reconciler.conflict_retries != 3 || reconciler.page_size.is_some() {
        return Err("unexpected reconciler defaults".to_string());
    }
    if reconciler.recovery_path != Some(PathBuf::from("temp/failure.json")) {
        return Err("unexpected recovery path default".to_string());
    }
    if reconciler.naming.current_prefix != "fs_" || reconciler.naming.history_prefix != "history_"
    {
        return Err("unexpected table prefixes".to_string());
    }
    if config.sync.global_id_field != "GlobalID" || config.logging.level != "info" {
        return Err("unexpected sync or logging defaults".to_string());
    }
    Ok(())
}

#[test]
fn load_reads_postgres_store() -> TestResult {
    let file = write_config(&format!(
        "{BASE}\n[store]\ntype = \"postgres\"\nconnection = \"postgres://u@db/fs\"\n\
         max_connections = 2\n\n[sync]\nlayers = [\"PointLocation\", \"Inspections\"]\n\
         page_size = 250\n"
    ))?;
    let config = FssyncConfig::load(Some(file.path())).map_err(|err| err.to_string())?;
    let StoreConfig::Postgres(postgres) = &config.store else {
        return Err("expected postgres store".to_string());
    };
    if postgres.max_connections != 2 || postgres.connection != "postgres://u@db/fs" {
        return Err("postgres settings not applied".to_string());
    }
    if config.sync.layers != ["PointLocation", "Inspections"] || config.sync.page_size != Some(250)
    {
        return Err("sync settings not applied".to_string());
    }
    Ok(())
}

#[test]
fn validate_rejects_bad_service_root() -> TestResult {
    let file = write_config(
        "[arcgis]\nservice_root = \"ftp://example.test\"\ntenant_id = \"a\"\nservice = \"s\"\n",
    )?;
    assert_invalid(FssyncConfig::load(Some(file.path())), "service_root")
}

#[test]
fn validate_rejects_zero_page_size() -> TestResult {
    assert_rejected("[sync]\npage_size = 0\n", "sync.page_size")
}

#[test]
fn validate_rejects_duplicate_layers() -> TestResult {
    assert_rejected("[sync]\nlayers = [\"Trap\", \"trap\"]\n", "more than once")
}

#[test]
fn validate_rejects_unsafe_table_prefix() -> TestResult {
    assert_rejected("[sync]\ncurrent_table_prefix = \"fs-\"\n", "sync.current_table_prefix")
}

#[test]
fn validate_rejects_equal_prefixes() -> TestResult {
    assert_rejected(
        "[sync]\ncurrent_table_prefix = \"t_\"\nhistory_table_prefix = \"T_\"\n",
        "prefixes must differ",
    )
}

#[test]
fn validate_rejects_unknown_log_level() -> TestResult {
    assert_rejected("[logging]\nlevel = \"loud\"\n", "logging.level")
}

#[test]
fn validate_rejects_empty_postgres_connection() -> TestResult {
    assert_rejected("[store]\ntype = \"postgres\"\nconnection = \" \"\n", "store.connection")
}
