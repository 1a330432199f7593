// crates/fssync-core/src/lib.rs
// ============================================================================
// Module: fssync Core Library
// Description: Public API surface for the fssync reconciliation core.
// Purpose: Expose core types, interfaces, and runtime components.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! fssync incrementally reconciles paginated feature-service records into a
//! relational store. Each record is classified as new, changed, or unchanged
//! against its stored snapshot; only new and changed records are written,
//! and every write appends a strictly increasing, gap-free history version
//! alongside a single current-state row. Backends plug in through the
//! [`FeatureSource`] and [`SyncStore`] traits.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::FeatureSource;
pub use interfaces::SourceError;
pub use interfaces::StoreError;
pub use interfaces::SyncStore;
pub use runtime::AuditReport;
pub use runtime::AuditViolation;
pub use runtime::CancellationFlag;
pub use runtime::Decision;
pub use runtime::Dialect;
pub use runtime::InMemoryFeatureSource;
pub use runtime::InMemorySyncStore;
pub use runtime::Reconciler;
pub use runtime::ReconcilerConfig;
pub use runtime::RecoveryArtifact;
pub use runtime::RunOptions;
pub use runtime::RunPhase;
pub use runtime::StatementCache;
pub use runtime::StatementSet;
pub use runtime::SyncError;
pub use runtime::SyncFailure;
pub use runtime::VersionWriter;
pub use runtime::WriteError;
pub use runtime::WriteOutcome;
