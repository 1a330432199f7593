// crates/fssync-core/src/runtime/audit.rs
// ============================================================================
// Module: Store Audit
// Description: Verifies current-state and history tables against each other.
// Purpose: Detect version gaps, orphans, and current/history drift.
// Dependencies: crate::{core, interfaces}, serde
// ============================================================================

//! ## Overview
//! The audit checks, per identity:
//! - history versions are exactly `1..=N` with no gaps or duplicates
//! - exactly one current row exists for every identity with history
//! - the current row equals the highest-versioned history row
//!
//! Comparison uses the stored text rendering, so NULL and the empty string
//! compare equal.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::CurrentRow;
use crate::core::EntityLayout;
use crate::core::HistoryRow;
use crate::interfaces::StoreError;
use crate::interfaces::SyncStore;

// ============================================================================
// SECTION: Reports
// ============================================================================

/// One invariant violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditViolation {
    /// A current row has no history.
    MissingHistory {
        /// Identity value.
        object_id: i64,
    },
    /// History exists without a current row.
    OrphanHistory {
        /// Identity value.
        object_id: i64,
    },
    /// History versions are not `1..=N`.
    VersionGap {
        /// Identity value.
        object_id: i64,
        /// Versions found, in order.
        versions: Vec<i64>,
    },
    /// The current row differs from the latest history row.
    CurrentMismatch {
        /// Identity value.
        object_id: i64,
        /// Column that differs.
        column: String,
        /// Current-state value.
        current: String,
        /// Latest history value.
        latest: String,
    },
}

/// Result of auditing one entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditReport {
    /// Current rows examined.
    pub current_rows: usize,
    /// History rows examined.
    pub history_rows: usize,
    /// Violations found, ordered by identity.
    pub violations: Vec<AuditViolation>,
}

impl AuditReport {
    /// Returns true when no violation was found.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Reads both tables from a store and audits them.
///
/// # Errors
///
/// Returns [`StoreError`] when either table cannot be read.
pub fn audit_store<S: SyncStore + ?Sized>(
    store: &S,
    layout: &EntityLayout,
) -> Result<AuditReport, StoreError> {
    let current = store.current_rows(layout)?;
    let history = store.history_rows(layout)?;
    Ok(audit_entity(&current, &history))
}

/// Audits current rows against history rows.
#[must_use]
pub fn audit_entity(current: &[CurrentRow], history: &[HistoryRow]) -> AuditReport {
    let mut by_identity: BTreeMap<i64, Vec<&HistoryRow>> = BTreeMap::new();
    for row in history {
        by_identity.entry(row.object_id).or_default().push(row);
    }
    let mut violations = Vec::new();
    let mut seen_current: BTreeMap<i64, &CurrentRow> = BTreeMap::new();
    for row in current {
        seen_current.insert(row.object_id, row);
    }

    for (object_id, row) in &seen_current {
        let Some(versions) = by_identity.get_mut(object_id) else {
            violations.push(AuditViolation::MissingHistory {
                object_id: *object_id,
            });
            continue;
        };
        versions.sort_by_key(|entry| entry.version);
        let numbers: Vec<i64> = versions.iter().map(|entry| entry.version).collect();
        let contiguous = numbers.iter().zip(1_i64..).all(|(found, expected)| *found == expected);
        if !contiguous {
            violations.push(AuditViolation::VersionGap {
                object_id: *object_id,
                versions: numbers,
            });
        }
        if let Some(latest) = versions.last() {
            compare_latest(*object_id, row, latest, &mut violations);
        }
    }
    for object_id in by_identity.keys() {
        if !seen_current.contains_key(object_id) {
            violations.push(AuditViolation::OrphanHistory {
                object_id: *object_id,
            });
        }
    }

    AuditReport {
        current_rows: current.len(),
        history_rows: history.len(),
        violations,
    }
}

/// Records every column where the current row and the latest history differ.
fn compare_latest(
    object_id: i64,
    current: &CurrentRow,
    latest: &HistoryRow,
    violations: &mut Vec<AuditViolation>,
) {
    let columns = current.values.keys().chain(latest.values.keys());
    let mut checked: Vec<&String> = columns.collect();
    checked.sort();
    checked.dedup();
    for column in checked {
        let now = current.values.get(column).map_or("", String::as_str);
        let then = latest.values.get(column).map_or("", String::as_str);
        if now != then {
            violations.push(AuditViolation::CurrentMismatch {
                object_id,
                column: column.clone(),
                current: now.to_string(),
                latest: then.to_string(),
            });
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::AuditViolation;
    use super::audit_entity;
    use crate::core::CurrentRow;
    use crate::core::HistoryRow;

    fn values(name: &str) -> BTreeMap<String, String> {
        BTreeMap::from([("name".to_string(), name.to_string())])
    }

    fn history(object_id: i64, version: i64, name: &str) -> HistoryRow {
        HistoryRow {
            object_id,
            version,
            created: 0,
            values: values(name),
        }
    }

    #[test]
    fn clean_tables_produce_no_violations() {
        let current = vec![CurrentRow {
            object_id: 1,
            values: values("Foo2"),
            updated: 0,
        }];
        let report = audit_entity(&current, &[history(1, 1, "Foo"), history(1, 2, "Foo2")]);
        assert!(report.is_clean());
        assert_eq!(report.history_rows, 2);
    }

    #[test]
    fn gaps_orphans_and_drift_are_reported() {
        let current = vec![CurrentRow {
            object_id: 1,
            values: values("Foo3"),
            updated: 0,
        }];
        let report = audit_entity(
            &current,
            &[history(1, 1, "Foo"), history(1, 3, "Foo2"), history(9, 1, "Ghost")],
        );
        assert_eq!(
            report.violations,
            vec![
                AuditViolation::VersionGap {
                    object_id: 1,
                    versions: vec![1, 3],
                },
                AuditViolation::CurrentMismatch {
                    object_id: 1,
                    column: "name".to_string(),
                    current: "Foo3".to_string(),
                    latest: "Foo2".to_string(),
                },
                AuditViolation::OrphanHistory { object_id: 9 },
            ]
        );
    }
}
