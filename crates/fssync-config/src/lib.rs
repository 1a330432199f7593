// crates/fssync-config/src/lib.rs
// ============================================================================
// Module: fssync Config
// Description: Canonical configuration for the fssync binary.
// Purpose: Load, override, and validate operator configuration.
// Dependencies: fssync-core, fssync-arcgis, fssync-store-*, toml
// ============================================================================

//! ## Overview
//! The configuration model groups the feature service connection, the store
//! backend, reconciliation settings, and logging. See [`FssyncConfig::load`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::CONFIG_ENV_VAR;
pub use config::ConfigError;
pub use config::DATABASE_URL_ENV_VAR;
pub use config::DEFAULT_CONFIG_NAME;
pub use config::FssyncConfig;
pub use config::LoggingConfig;
pub use config::StoreConfig;
pub use config::SyncConfig;
pub use config::TOKEN_ENV_VAR;
