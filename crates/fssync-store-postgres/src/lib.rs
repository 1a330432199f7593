// crates/fssync-store-postgres/src/lib.rs
// ============================================================================
// Module: Postgres Sync Store
// Description: SyncStore backend using PostgreSQL.
// Purpose: Persist synced layers in a shared relational database.
// Dependencies: fssync-core, postgres, r2d2
// ============================================================================

//! ## Overview
//! PostgreSQL implementation of [`SyncStore`](fssync_core::SyncStore) for
//! deployments where several readers consume the synced tables directly.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::PostgresStoreConfig;
pub use store::PostgresStoreError;
pub use store::PostgresSyncStore;
