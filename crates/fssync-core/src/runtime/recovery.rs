// crates/fssync-core/src/runtime/recovery.rs
// ============================================================================
// Module: Recovery Artifacts
// Description: Persist and reload the page in flight when a run aborts.
// Purpose: Allow offline diagnosis and replay without re-querying the source.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! When a run aborts, the engine writes a [`RecoveryArtifact`] holding the
//! normalized page (if one was fetched), the source's raw payload (if it kept
//! one), and the request coordinates. The artifact is plain JSON so operators
//! can inspect it by hand; `fssync replay` feeds the normalized page back
//! through the engine.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::EntityType;
use crate::core::FeatureBatch;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default recovery artifact location, relative to the working directory.
pub const DEFAULT_RECOVERY_PATH: &str = "temp/failure.json";

/// Maximum artifact size accepted on read.
pub const MAX_RECOVERY_BYTES: u64 = 64 * 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Recovery artifact errors.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// Filesystem error.
    #[error("recovery artifact io error: {0}")]
    Io(String),
    /// Artifact could not be encoded or decoded.
    #[error("recovery artifact format error: {0}")]
    Format(String),
    /// Artifact exceeds the size limit.
    #[error("recovery artifact exceeds {max} bytes")]
    TooLarge {
        /// Size limit in bytes.
        max: u64,
    },
}

// ============================================================================
// SECTION: Artifacts
// ============================================================================

/// Page in flight at the time a run aborted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecoveryArtifact {
    /// Entity type of the run.
    pub entity_type: EntityType,
    /// Offset of the failed page.
    pub offset: u64,
    /// Page size requested.
    pub page_size: usize,
    /// Error that aborted the run.
    pub error: String,
    /// Normalized page, when it was fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<FeatureBatch>,
    /// Raw source payload, when the source kept one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_page: Option<Value>,
}

/// Writes an artifact as pretty JSON, creating parent directories.
///
/// # Errors
///
/// Returns [`RecoveryError`] when encoding or writing fails.
pub fn write_artifact(path: &Path, artifact: &RecoveryArtifact) -> Result<(), RecoveryError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|err| RecoveryError::Io(err.to_string()))?;
    }
    let bytes = serde_json::to_vec_pretty(artifact)
        .map_err(|err| RecoveryError::Format(err.to_string()))?;
    fs::write(path, bytes).map_err(|err| RecoveryError::Io(err.to_string()))
}

/// Reads an artifact written by [`write_artifact`].
///
/// # Errors
///
/// Returns [`RecoveryError`] when the file is unreadable, too large, or not an
/// artifact.
pub fn read_artifact(path: &Path) -> Result<RecoveryArtifact, RecoveryError> {
    let file = fs::File::open(path).map_err(|err| RecoveryError::Io(err.to_string()))?;
    let mut bytes = Vec::new();
    file.take(MAX_RECOVERY_BYTES + 1)
        .read_to_end(&mut bytes)
        .map_err(|err| RecoveryError::Io(err.to_string()))?;
    if u64::try_from(bytes.len()).unwrap_or(u64::MAX) > MAX_RECOVERY_BYTES {
        return Err(RecoveryError::TooLarge {
            max: MAX_RECOVERY_BYTES,
        });
    }
    serde_json::from_slice(&bytes).map_err(|err| RecoveryError::Format(err.to_string()))
}
