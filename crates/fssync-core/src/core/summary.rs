// crates/fssync-core/src/core/summary.rs
// ============================================================================
// Module: Run Summaries
// Description: Per-run counters and per-record faults.
// Purpose: Report the outcome of one reconciliation run to its caller.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! [`SyncRunResult`] is produced once per pagination loop. It is also carried
//! inside a failure so callers can report the counts accumulated before the
//! run aborted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::attribute::UnsupportedAttributeType;
use crate::core::entity::EntityType;

// ============================================================================
// SECTION: Summaries
// ============================================================================

/// A record skipped during reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFault {
    /// Object id of the skipped record.
    pub object_id: i64,
    /// External identity of the skipped record, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Offset of the page the record arrived in.
    pub page_offset: u64,
    /// Why the record was skipped.
    pub error: UnsupportedAttributeType,
}

/// Counters of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRunResult {
    /// Entity type reconciled.
    pub entity_type: EntityType,
    /// Records written at version 1.
    pub inserts: u64,
    /// Records written at a new version.
    pub updates: u64,
    /// Records judged unchanged.
    pub unchanged: u64,
    /// Records skipped because of per-record faults.
    pub skipped: u64,
    /// Pages processed.
    pub pages: u64,
    /// Faults for skipped records.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faults: Vec<RecordFault>,
}

impl SyncRunResult {
    /// Creates an empty result for an entity type.
    #[must_use]
    pub const fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            inserts: 0,
            updates: 0,
            unchanged: 0,
            skipped: 0,
            pages: 0,
            faults: Vec::new(),
        }
    }

    /// Returns the number of records examined.
    #[must_use]
    pub const fn processed(&self) -> u64 {
        self.inserts + self.updates + self.unchanged + self.skipped
    }

    /// Returns true when the run wrote nothing.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.inserts == 0 && self.updates == 0
    }
}

/// Totals across several runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncTotals {
    /// Sum of inserts.
    pub inserts: u64,
    /// Sum of updates.
    pub updates: u64,
    /// Sum of unchanged records.
    pub unchanged: u64,
    /// Sum of skipped records.
    pub skipped: u64,
}

impl SyncTotals {
    /// Adds one run's counters.
    pub const fn absorb(&mut self, result: &SyncRunResult) {
        self.inserts += result.inserts;
        self.updates += result.updates;
        self.unchanged += result.unchanged;
        self.skipped += result.skipped;
    }
}
