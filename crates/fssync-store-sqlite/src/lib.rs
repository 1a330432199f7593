// crates/fssync-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Sync Store
// Description: Durable SyncStore backend using SQLite WAL.
// Purpose: Persist current-state rows and version history for synced layers.
// Dependencies: fssync-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`SyncStore`](fssync_core::SyncStore)
//! implementation. Each entity gets a current-state table keyed by identity
//! and an append-only history table keyed by `(identity, version)`; every
//! write touches both inside one transaction.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
pub use store::SqliteSyncStore;
