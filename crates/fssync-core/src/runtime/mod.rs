// crates/fssync-core/src/runtime/mod.rs
// ============================================================================
// Module: fssync Runtime
// Description: Reconciliation engine and its supporting components.
// Purpose: Diff, build statements, write versions, and drive pagination.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! The runtime turns pages from a [`crate::FeatureSource`] into versioned
//! writes against a [`crate::SyncStore`]. Components are leaf-first: the
//! diff engine and statement builder are pure, the version writer owns the
//! retry policy, and the engine owns pagination and failure handling.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod cancel;
pub mod diff;
pub mod engine;
pub mod memory;
pub mod recovery;
pub mod statements;
pub mod writer;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditReport;
pub use audit::AuditViolation;
pub use audit::audit_entity;
pub use audit::audit_store;
pub use cancel::CancellationFlag;
pub use diff::Decision;
pub use diff::attribute_changed;
pub use diff::classify;
pub use diff::has_changed;
pub use engine::Reconciler;
pub use engine::ReconcilerConfig;
pub use engine::RunOptions;
pub use engine::RunPhase;
pub use engine::SyncError;
pub use engine::SyncFailure;
pub use engine::reconcile_batch;
pub use memory::InMemoryFeatureSource;
pub use memory::InMemorySyncStore;
pub use recovery::DEFAULT_RECOVERY_PATH;
pub use recovery::RecoveryArtifact;
pub use recovery::RecoveryError;
pub use recovery::read_artifact;
pub use recovery::write_artifact;
pub use statements::Dialect;
pub use statements::StatementCache;
pub use statements::StatementSet;
pub use writer::DEFAULT_CONFLICT_RETRIES;
pub use writer::VersionWriter;
pub use writer::WriteError;
pub use writer::WriteOutcome;
