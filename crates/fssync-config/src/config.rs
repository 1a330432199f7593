// crates/fssync-config/src/config.rs
// ============================================================================
// Module: fssync Configuration
// Description: Configuration model, loading guards, overrides, validation.
// Purpose: Provide one validated configuration for the sync binary.
// Dependencies: fssync-core, fssync-arcgis, fssync-store-*, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is read from a TOML file resolved from an explicit path, the
//! `FSSYNC_CONFIG` environment variable, or `fssync.toml`. Input handling is
//! strict: path lengths, file size, and UTF-8 encoding are checked before
//! parsing, unknown keys are rejected, and the parsed model is validated
//! before use. Secrets can be supplied through the environment instead of the
//! file.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use fssync_arcgis::ArcgisConfig;
use fssync_arcgis::DEFAULT_GLOBAL_ID_FIELD;
use fssync_core::DEFAULT_CURRENT_PREFIX;
use fssync_core::DEFAULT_HISTORY_PREFIX;
use fssync_core::ReconcilerConfig;
use fssync_core::TableNaming;
use fssync_core::runtime::DEFAULT_CONFLICT_RETRIES;
use fssync_core::runtime::DEFAULT_RECOVERY_PATH;
use fssync_core::validate_identifier;
use fssync_store_postgres::PostgresStoreConfig;
use fssync_store_sqlite::SqliteStoreConfig;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Default config filename.
pub const DEFAULT_CONFIG_NAME: &str = "fssync.toml";
/// Environment variable override for the config path.
pub const CONFIG_ENV_VAR: &str = "FSSYNC_CONFIG";
/// Environment variable carrying the ArcGIS token.
pub const TOKEN_ENV_VAR: &str = "FSSYNC_ARCGIS_TOKEN";
/// Environment variable carrying a Postgres connection string.
pub const DATABASE_URL_ENV_VAR: &str = "FSSYNC_DATABASE_URL";
/// Maximum allowed config file size in bytes.
const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum total path length for config-related paths.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Default `SQLite` database path.
const DEFAULT_SQLITE_PATH: &str = "fssync.db";
/// Accepted log levels.
const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

// ============================================================================
// SECTION: Model
// ============================================================================

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FssyncConfig {
    /// Feature service connection.
    pub arcgis: ArcgisConfig,
    /// Relational store backend.
    #[serde(default)]
    pub store: StoreConfig,
    /// Reconciliation settings.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Log output settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Store backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// File-backed `SQLite` store.
    Sqlite(SqliteStoreConfig),
    /// `PostgreSQL` store.
    Postgres(PostgresStoreConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Sqlite(SqliteStoreConfig::at(DEFAULT_SQLITE_PATH))
    }
}

/// Reconciliation settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// Layers to sync, in order; empty means every published layer.
    #[serde(default)]
    pub layers: Vec<String>,
    /// Upper bound on the page size; the service maximum applies when unset.
    #[serde(default)]
    pub page_size: Option<usize>,
    /// Where the page in flight is saved when a run aborts.
    #[serde(default = "default_recovery_path")]
    pub recovery_path: PathBuf,
    /// Attribute carried as the external identity.
    #[serde(default = "default_global_id_field")]
    pub global_id_field: String,
    /// Prefix of current-state tables.
    #[serde(default = "default_current_prefix")]
    pub current_table_prefix: String,
    /// Prefix of history tables.
    #[serde(default = "default_history_prefix")]
    pub history_table_prefix: String,
    /// Retries after a version conflict before a record fails the page.
    #[serde(default = "default_conflict_retries")]
    pub version_conflict_retries: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            layers: Vec::new(),
            page_size: None,
            recovery_path: default_recovery_path(),
            global_id_field: default_global_id_field(),
            current_table_prefix: default_current_prefix(),
            history_table_prefix: default_history_prefix(),
            version_conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }
}

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default level filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Serde default for `recovery_path`.
fn default_recovery_path() -> PathBuf {
    PathBuf::from(DEFAULT_RECOVERY_PATH)
}

/// Serde default for `global_id_field`.
fn default_global_id_field() -> String {
    DEFAULT_GLOBAL_ID_FIELD.to_string()
}

/// Serde default for `current_table_prefix`.
fn default_current_prefix() -> String {
    DEFAULT_CURRENT_PREFIX.to_string()
}

/// Serde default for `history_table_prefix`.
fn default_history_prefix() -> String {
    DEFAULT_HISTORY_PREFIX.to_string()
}

/// Serde default for `version_conflict_retries`.
const fn default_conflict_retries() -> u32 {
    DEFAULT_CONFLICT_RETRIES
}

/// Serde default for `level`.
fn default_log_level() -> String {
    "info".to_string()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// I/O error.
    #[error("config io error: {0}")]
    Io(String),
    /// Parse error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration.
    #[error("config invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl FssyncConfig {
    /// Loads, overrides, and validates configuration from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, parsing, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved, "config")?;
        let bytes = fs::read(&resolved)
            .map_err(|err| ConfigError::Io(format!("{}: {err}", resolved.display())))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::parse(content)?;
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parses TOML content without overrides or validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the content is not a valid document.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Applies environment overrides through `lookup`.
    ///
    /// The token variable replaces `arcgis.token`; a database URL switches the
    /// store to Postgres, keeping pool settings when Postgres is already set.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(TOKEN_ENV_VAR).filter(|token| !token.is_empty()) {
            self.arcgis.token = Some(token);
        }
        if let Some(url) = lookup(DATABASE_URL_ENV_VAR).filter(|url| !url.is_empty()) {
            if let StoreConfig::Postgres(postgres) = &mut self.store {
                postgres.connection = url;
            } else {
                self.store = StoreConfig::Postgres(PostgresStoreConfig {
                    connection: url,
                    ..PostgresStoreConfig::default()
                });
            }
        }
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_arcgis()?;
        self.validate_store()?;
        self.validate_sync()?;
        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(invalid(format!("logging.level must be one of {}", LOG_LEVELS.join(", "))));
        }
        Ok(())
    }

    /// Returns table naming derived from the sync settings.
    #[must_use]
    pub fn table_naming(&self) -> TableNaming {
        TableNaming {
            current_prefix: self.sync.current_table_prefix.clone(),
            history_prefix: self.sync.history_table_prefix.clone(),
        }
    }

    /// Returns the reconciler settings for this configuration.
    #[must_use]
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            naming: self.table_naming(),
            page_size: self.sync.page_size,
            conflict_retries: self.sync.version_conflict_retries,
            recovery_path: Some(self.sync.recovery_path.clone()),
        }
    }

    /// Validates the `[arcgis]` section.
    fn validate_arcgis(&self) -> Result<(), ConfigError> {
        let arcgis = &self.arcgis;
        let root = arcgis.service_root.trim();
        if !(root.starts_with("https://") || root.starts_with("http://")) {
            return Err(invalid("arcgis.service_root must be an http or https url"));
        }
        if arcgis.service.trim().is_empty() {
            return Err(invalid("arcgis.service is required"));
        }
        if arcgis.tenant_id.contains('/') || arcgis.service.contains('/') {
            return Err(invalid("arcgis.tenant_id and arcgis.service must not contain '/'"));
        }
        if arcgis.timeout_ms == 0 {
            return Err(invalid("arcgis.timeout_ms must be greater than zero"));
        }
        if arcgis.max_response_bytes == 0 {
            return Err(invalid("arcgis.max_response_bytes must be greater than zero"));
        }
        if arcgis.user_agent.trim().is_empty() {
            return Err(invalid("arcgis.user_agent must not be empty"));
        }
        Ok(())
    }

    /// Validates the `[store]` section.
    fn validate_store(&self) -> Result<(), ConfigError> {
        match &self.store {
            StoreConfig::Sqlite(sqlite) => {
                if sqlite.path.as_os_str().is_empty() {
                    return Err(invalid("store.path is required for sqlite"));
                }
                validate_path(&sqlite.path, "store")
            }
            StoreConfig::Postgres(postgres) => {
                if postgres.connection.trim().is_empty() {
                    return Err(invalid("store.connection is required for postgres"));
                }
                if postgres.max_connections == 0 {
                    return Err(invalid("store.max_connections must be greater than zero"));
                }
                Ok(())
            }
        }
    }

    /// Validates the `[sync]` section.
    fn validate_sync(&self) -> Result<(), ConfigError> {
        let sync = &self.sync;
        let mut seen = BTreeSet::new();
        for layer in &sync.layers {
            if layer.trim().is_empty() {
                return Err(invalid("sync.layers entries must not be empty"));
            }
            if !seen.insert(layer.to_ascii_lowercase()) {
                return Err(invalid(format!("sync.layers lists {layer} more than once")));
            }
        }
        if sync.page_size == Some(0) {
            return Err(invalid("sync.page_size must be greater than zero"));
        }
        if sync.global_id_field.trim().is_empty() {
            return Err(invalid("sync.global_id_field must not be empty"));
        }
        for (key, prefix) in [
            ("sync.current_table_prefix", &sync.current_table_prefix),
            ("sync.history_table_prefix", &sync.history_table_prefix),
        ] {
            validate_identifier(&format!("{prefix}x"))
                .map_err(|_| invalid(format!("{key} is not a valid table name prefix")))?;
        }
        if sync.current_table_prefix.eq_ignore_ascii_case(&sync.history_table_prefix) {
            return Err(invalid("table prefixes must differ"));
        }
        if sync.recovery_path.as_os_str().is_empty() {
            return Err(invalid("sync.recovery_path must not be empty"));
        }
        validate_path(&sync.recovery_path, "recovery")
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds an [`ConfigError::Invalid`].
fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

/// Resolves the config path from explicit input or environment.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(invalid("config path exceeds max length"));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates path length and components; `label` prefixes error messages.
fn validate_path(path: &Path, label: &str) -> Result<(), ConfigError> {
    if path.to_string_lossy().len() > MAX_TOTAL_PATH_LENGTH {
        return Err(invalid(format!("{label} path exceeds max length")));
    }
    for component in path.components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(invalid(format!("{label} path component too long")));
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic, reason = "Test-only assertions.")]

    use super::FssyncConfig;
    use super::StoreConfig;

    const MINIMAL: &str = r#"
        [arcgis]
        service_root = "https://example.test"
        tenant_id = "abc"
        service = "FieldSeeker"
    "#;

    #[test]
    fn token_override_replaces_file_value() {
        let mut config = FssyncConfig::parse(MINIMAL).unwrap();
        config.apply_overrides(|key| (key == "FSSYNC_ARCGIS_TOKEN").then(|| "t0k".to_string()));
        assert_eq!(config.arcgis.token.as_deref(), Some("t0k"));
        assert!(matches!(config.store, StoreConfig::Sqlite(_)));
    }

    #[test]
    fn database_url_selects_postgres() {
        let mut config = FssyncConfig::parse(MINIMAL).unwrap();
        config.apply_overrides(|key| {
            (key == "FSSYNC_DATABASE_URL").then(|| "postgres://u@h/db".to_string())
        });
        let StoreConfig::Postgres(postgres) = &config.store else {
            panic!("expected postgres store");
        };
        assert_eq!(postgres.connection, "postgres://u@h/db");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_overrides_are_ignored() {
        let mut config = FssyncConfig::parse(MINIMAL).unwrap();
        let before = config.clone();
        config.apply_overrides(|_| Some(String::new()));
        assert_eq!(config, before);
    }
}
