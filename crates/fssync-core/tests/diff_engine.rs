// crates/fssync-core/tests/diff_engine.rs
// ============================================================================
// Module: Diff Engine Tests
// Description: Type-aware change detection against text snapshots.
// Purpose: Pin the null, string, integer, and float comparison rules.
// Dependencies: fssync-core
// ============================================================================
//! ## Overview
//! Exercises `has_changed` and `classify` over the comparison table: null
//! against empty, exact strings, numbers appearing where none existed, exact
//! numeric equality, and unparseable stored values.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;

use fssync_core::AttributeKind;
use fssync_core::AttributeValue;
use fssync_core::Decision;
use fssync_core::FeatureRecord;
use fssync_core::TextRow;
use fssync_core::runtime::attribute_changed;
use fssync_core::runtime::classify;
use fssync_core::runtime::has_changed;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn record(attributes: &[(&str, AttributeValue)]) -> FeatureRecord {
    FeatureRecord {
        object_id: 1,
        external_id: Some("a".to_string()),
        attributes: attributes
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect(),
        geometry: None,
    }
}

fn stored(columns: &[(&str, &str)]) -> TextRow {
    columns.iter().map(|(name, value)| ((*name).to_string(), (*value).to_string())).collect()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Null against a stored empty string is not a change.
#[test]
fn null_against_empty_is_unchanged() {
    let row = stored(&[("comments", "")]);
    let incoming = record(&[("comments", AttributeValue::Null)]);
    assert!(!has_changed(&row, &incoming).unwrap());
}

/// A numeric value appearing where the stored value was empty is a change.
#[test]
fn number_appearing_over_empty_is_changed() {
    let row = stored(&[("count", "")]);
    assert!(has_changed(&row, &record(&[("count", AttributeValue::Int(42))])).unwrap());
    assert!(has_changed(&row, &record(&[("count", AttributeValue::Float(4.2))])).unwrap());
}

/// Null over a non-empty stored value means the value was cleared.
#[test]
fn null_over_value_is_changed() {
    let row = stored(&[("zone", "north")]);
    assert!(has_changed(&row, &record(&[("zone", AttributeValue::Null)])).unwrap());
}

/// Strings compare exactly, including case and whitespace.
#[test]
fn strings_compare_exactly() {
    let row = stored(&[("name", "Foo")]);
    assert!(!has_changed(&row, &record(&[("name", AttributeValue::from("Foo"))])).unwrap());
    assert!(has_changed(&row, &record(&[("name", AttributeValue::from("foo"))])).unwrap());
    assert!(has_changed(&row, &record(&[("name", AttributeValue::from("Foo "))])).unwrap());
}

/// Numbers compare by parsed value, not by text.
#[test]
fn numbers_compare_by_value() {
    let row = stored(&[("count", "7"), ("depth", "2.5"), ("area", "3")]);
    let same = record(&[
        ("count", AttributeValue::Int(7)),
        ("depth", AttributeValue::Float(2.5)),
        ("area", AttributeValue::Float(3.0)),
    ]);
    assert!(!has_changed(&row, &same).unwrap());
    let moved = record(&[("depth", AttributeValue::Float(2.500_000_000_001))]);
    assert!(has_changed(&row, &moved).unwrap());
}

/// Column lookups ignore the case of incoming attribute names.
#[test]
fn attribute_names_are_case_insensitive() {
    let row = stored(&[("globalid", "{ABC}"), ("objectid", "1")]);
    let incoming = record(&[
        ("GlobalID", AttributeValue::from("{ABC}")),
        ("OBJECTID", AttributeValue::Int(1)),
    ]);
    assert!(!has_changed(&row, &incoming).unwrap());
}

/// Stored columns the record does not carry are not inspected.
#[test]
fn missing_incoming_attribute_is_not_a_change() {
    let row = stored(&[("name", "Foo"), ("retired", "yes")]);
    let incoming = record(&[("name", AttributeValue::from("Foo"))]);
    assert!(!has_changed(&row, &incoming).unwrap());
}

/// A stored value that does not parse as the incoming type is a scoped fault.
#[test]
fn unparseable_stored_value_is_a_record_fault() {
    let err = attribute_changed("count", "seven", &AttributeValue::Int(7)).unwrap_err();
    assert_eq!(err.column, "count");
    assert_eq!(err.kind, AttributeKind::Int);
    let err = attribute_changed("depth", "n/a", &AttributeValue::Float(1.0)).unwrap_err();
    assert_eq!(err.kind, AttributeKind::Float);
}

/// Classification distinguishes missing rows from changed and unchanged ones.
#[test]
fn classify_partitions_records() {
    let incoming = record(&[("name", AttributeValue::from("Foo"))]);
    let mut snapshots: BTreeMap<i64, TextRow> = BTreeMap::new();
    assert_eq!(classify(snapshots.get(&1), &incoming).unwrap(), Decision::New);
    snapshots.insert(1, stored(&[("name", "Foo")]));
    assert_eq!(classify(snapshots.get(&1), &incoming).unwrap(), Decision::Unchanged);
    snapshots.insert(1, stored(&[("name", "Bar")]));
    assert_eq!(classify(snapshots.get(&1), &incoming).unwrap(), Decision::Changed);
}
