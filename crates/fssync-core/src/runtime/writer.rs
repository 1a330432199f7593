// crates/fssync-core/src/runtime/writer.rs
// ============================================================================
// Module: Version Writer
// Description: Applies new and changed records with conflict retry.
// Purpose: Keep current-state rows and version history in lockstep.
// Dependencies: crate::{core, interfaces, runtime::diff}, thiserror, tracing
// ============================================================================

//! ## Overview
//! The store performs each write in one transaction. This module adds the
//! retry policy on top: a uniqueness conflict means another writer got there
//! first, so the writer re-reads and tries again.
//!
//! - A conflicting first insert reloads the snapshot and re-diffs the record;
//!   it may turn into an update or into a no-op.
//! - A conflicting version append simply retries, since the store re-reads the
//!   max version inside its transaction.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use thiserror::Error;
use tracing::debug;

use crate::core::EntityLayout;
use crate::core::FeatureRecord;
use crate::core::UnsupportedAttributeType;
use crate::core::WriteRow;
use crate::interfaces::StoreError;
use crate::interfaces::SyncStore;
use crate::runtime::diff::Decision;
use crate::runtime::diff::classify;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default number of retries after a uniqueness conflict.
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Version writer errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WriteError {
    /// A value could not be bound into its column.
    #[error(transparent)]
    Unsupported(#[from] UnsupportedAttributeType),
    /// The store rejected the write.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Uniqueness conflicts persisted past the retry budget.
    #[error("write conflicts exhausted for object {object_id} after {attempts} attempts")]
    ConflictsExhausted {
        /// Object id of the record.
        object_id: i64,
        /// Attempts made.
        attempts: u32,
    },
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Result of applying one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Written at version 1.
    Inserted,
    /// Written at the given version.
    Updated(i64),
    /// A concurrent writer already stored identical values.
    Unchanged,
}

// ============================================================================
// SECTION: Writer
// ============================================================================

/// Applies reconciliation decisions to a store.
#[derive(Debug)]
pub struct VersionWriter<'a, S: SyncStore + ?Sized> {
    /// Destination store.
    store: &'a S,
    /// Retries allowed after a uniqueness conflict.
    conflict_retries: u32,
}

impl<'a, S: SyncStore + ?Sized> VersionWriter<'a, S> {
    /// Creates a writer over a store.
    #[must_use]
    pub const fn new(store: &'a S, conflict_retries: u32) -> Self {
        Self {
            store,
            conflict_retries,
        }
    }

    /// Applies a record the diff engine classified as new or changed.
    ///
    /// # Errors
    ///
    /// Returns [`WriteError`] when binding fails, the store fails, or conflicts
    /// outlast the retry budget.
    pub fn apply(
        &self,
        layout: &EntityLayout,
        record: &FeatureRecord,
        decision: Decision,
    ) -> Result<WriteOutcome, WriteError> {
        let row = WriteRow::bind(layout, record, unix_millis())?;
        let mut decision = decision;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let result = match decision {
                Decision::Unchanged => return Ok(WriteOutcome::Unchanged),
                Decision::New => {
                    self.store.insert_new(layout, &row).map(|()| WriteOutcome::Inserted)
                }
                Decision::Changed => {
                    self.store.append_version(layout, &row).map(WriteOutcome::Updated)
                }
            };
            match result {
                Ok(outcome) => return Ok(outcome),
                Err(StoreError::Conflict(message)) => {
                    if attempts > self.conflict_retries {
                        return Err(WriteError::ConflictsExhausted {
                            object_id: record.object_id,
                            attempts,
                        });
                    }
                    debug!(
                        object_id = record.object_id,
                        attempt = attempts,
                        %message,
                        "write conflict, re-reading"
                    );
                    if decision == Decision::New {
                        decision = self.reclassify(layout, record)?;
                    }
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Reloads one snapshot and classifies the record again.
    fn reclassify(
        &self,
        layout: &EntityLayout,
        record: &FeatureRecord,
    ) -> Result<Decision, WriteError> {
        let snapshots = self.store.load_snapshots(layout, &[record.object_id])?;
        Ok(classify(snapshots.get(&record.object_id), record)?)
    }
}

/// Returns the current unix time in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}
