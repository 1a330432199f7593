// crates/fssync-core/src/interfaces/mod.rs
// ============================================================================
// Module: fssync Interfaces
// Description: Backend-agnostic traits for feature sources and sync stores.
// Purpose: Define the seams between the reconciliation engine and its I/O.
// Dependencies: crate::core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! The engine consumes a [`FeatureSource`] and writes into a [`SyncStore`].
//! Both are passed in explicitly; nothing in the engine holds a global
//! connection. Implementations must be deterministic for a given input and
//! fail closed on invalid data.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use thiserror::Error;

use crate::core::CurrentRow;
use crate::core::EntityLayout;
use crate::core::EntityType;
use crate::core::HistoryRow;
use crate::core::SnapshotMap;
use crate::core::SourcePage;
use crate::core::WriteRow;

// ============================================================================
// SECTION: Feature Source
// ============================================================================

/// Feature source errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// Request could not be sent or the response could not be read.
    #[error("feature source transport error: {0}")]
    Transport(String),
    /// The service answered with an error document.
    #[error("feature source remote error: {0}")]
    Remote(String),
    /// The response could not be decoded.
    #[error("feature source decode error: {0}")]
    Decode(String),
    /// A fetched page could not be decoded; the body is kept for recovery.
    #[error("feature source decode error: {message}")]
    MalformedPage {
        /// Decode failure.
        message: String,
        /// Body as received.
        raw: Box<Value>,
    },
    /// The entity type is not served by the source.
    #[error("unknown layer: {0}")]
    UnknownLayer(String),
    /// Request parameters were invalid.
    #[error("feature source invalid request: {0}")]
    Invalid(String),
}

impl SourceError {
    /// Returns the raw page body carried by [`Self::MalformedPage`].
    #[must_use]
    pub fn raw_payload(&self) -> Option<&Value> {
        match self {
            Self::MalformedPage {
                raw, ..
            } => Some(raw.as_ref()),
            _ => None,
        }
    }
}

/// Paginated, offset-based source of feature records.
pub trait FeatureSource {
    /// Returns the total number of records for the entity type.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the count cannot be fetched.
    fn count(&self, entity: &EntityType) -> Result<u64, SourceError>;

    /// Returns the largest page the source serves for the entity type.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when service metadata cannot be fetched.
    fn max_page_size(&self, entity: &EntityType) -> Result<usize, SourceError>;

    /// Fetches up to `page_size` records starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the page cannot be fetched or decoded.
    fn page(
        &self,
        entity: &EntityType,
        offset: u64,
        page_size: usize,
    ) -> Result<SourcePage, SourceError>;
}

// ============================================================================
// SECTION: Sync Store
// ============================================================================

/// Sync store errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("sync store io error: {0}")]
    Io(String),
    /// Database reported an error.
    #[error("sync store db error: {0}")]
    Db(String),
    /// A uniqueness constraint rejected the write.
    #[error("sync store conflict: {0}")]
    Conflict(String),
    /// Input or stored data is invalid.
    #[error("sync store invalid data: {0}")]
    Invalid(String),
    /// Stored data violates an integrity invariant.
    #[error("sync store corruption: {0}")]
    Corrupt(String),
}

/// Destination store for current-state and history tables.
///
/// # Invariants
/// - `insert_new` and `append_version` are atomic: both tables change or
///   neither does.
/// - History rows are unique on `(identity, version)`; a violation surfaces as
///   [`StoreError::Conflict`].
pub trait SyncStore {
    /// Creates the entity tables if missing and adds columns new to the layout.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when DDL fails.
    fn ensure_schema(&self, layout: &EntityLayout) -> Result<(), StoreError>;

    /// Returns the recorded layout for an entity: the union of every layout
    /// passed to [`SyncStore::ensure_schema`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails or the record is corrupt.
    fn stored_layout(&self, entity: &EntityType) -> Result<Option<EntityLayout>, StoreError>;

    /// Bulk-loads current rows for the given object ids, rendered as text.
    ///
    /// Ids without a stored row are absent from the returned map.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn load_snapshots(
        &self,
        layout: &EntityLayout,
        object_ids: &[i64],
    ) -> Result<SnapshotMap, StoreError>;

    /// Inserts a new current row and its version-1 history row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when either row already exists, or
    /// another [`StoreError`] when the transaction fails.
    fn insert_new(&self, layout: &EntityLayout, row: &WriteRow) -> Result<(), StoreError>;

    /// Appends history at the next version and overwrites the current row.
    ///
    /// Returns the version written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] when the version was taken concurrently,
    /// or another [`StoreError`] when the transaction fails.
    fn append_version(&self, layout: &EntityLayout, row: &WriteRow) -> Result<i64, StoreError>;

    /// Returns every current row for the entity, ordered by object id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn current_rows(&self, layout: &EntityLayout) -> Result<Vec<CurrentRow>, StoreError>;

    /// Returns every history row for the entity, ordered by object id then version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn history_rows(&self, layout: &EntityLayout) -> Result<Vec<HistoryRow>, StoreError>;
}
