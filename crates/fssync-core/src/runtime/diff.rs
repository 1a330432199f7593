// crates/fssync-core/src/runtime/diff.rs
// ============================================================================
// Module: Diff Engine
// Description: Type-aware comparison of incoming records against snapshots.
// Purpose: Decide whether a record is new, changed, or unchanged.
// Dependencies: crate::core
// ============================================================================

//! ## Overview
//! The stored side of every comparison is text (see [`TextRow`]); the incoming
//! side is typed. Comparison parses the stored text into the incoming type:
//!
//! - null incoming against an empty stored value is equal
//! - strings compare by exact equality
//! - integers and floats against an empty stored value are changed
//! - otherwise the stored text is parsed and compared exactly, with no epsilon
//!
//! Only attributes present in the incoming record are inspected, so an
//! attribute the source stops sending is never reported as changed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::AttributeValue;
use crate::core::FeatureRecord;
use crate::core::TextRow;
use crate::core::UnsupportedAttributeType;

// ============================================================================
// SECTION: Decisions
// ============================================================================

/// Classification of one incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No stored row exists.
    New,
    /// The stored row differs.
    Changed,
    /// The stored row matches.
    Unchanged,
}

/// Classifies a record against its snapshot, if one was loaded.
///
/// # Errors
///
/// Returns [`UnsupportedAttributeType`] when a stored value cannot be
/// interpreted as the incoming attribute's type.
pub fn classify(
    snapshot: Option<&TextRow>,
    incoming: &FeatureRecord,
) -> Result<Decision, UnsupportedAttributeType> {
    match snapshot {
        None => Ok(Decision::New),
        Some(stored) if stored.is_empty() => Ok(Decision::New),
        Some(stored) => Ok(if has_changed(stored, incoming)? {
            Decision::Changed
        } else {
            Decision::Unchanged
        }),
    }
}

/// Returns true when any incoming attribute differs from the stored row.
///
/// Column lookups are case-insensitive; a column missing from the stored row
/// compares as the empty string.
///
/// # Errors
///
/// Returns [`UnsupportedAttributeType`] when a stored value cannot be parsed
/// as the incoming numeric type.
pub fn has_changed(
    stored: &TextRow,
    incoming: &FeatureRecord,
) -> Result<bool, UnsupportedAttributeType> {
    for (name, value) in &incoming.attributes {
        let column = name.to_ascii_lowercase();
        let stored_value = stored.get(&column).map_or("", String::as_str);
        if attribute_changed(&column, stored_value, value)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Compares one incoming attribute against its stored text.
///
/// # Errors
///
/// Returns [`UnsupportedAttributeType`] when the stored text does not parse as
/// the incoming numeric type.
pub fn attribute_changed(
    column: &str,
    stored: &str,
    incoming: &AttributeValue,
) -> Result<bool, UnsupportedAttributeType> {
    match incoming {
        AttributeValue::Null => Ok(!stored.is_empty()),
        AttributeValue::Str(text) => Ok(text != stored),
        AttributeValue::Int(value) => {
            if stored.is_empty() {
                return Ok(true);
            }
            let parsed = stored.parse::<i64>().map_err(|_| {
                UnsupportedAttributeType::new(
                    column,
                    incoming,
                    format!("stored value '{stored}' is not an integer"),
                )
            })?;
            Ok(parsed != *value)
        }
        AttributeValue::Float(value) => {
            if stored.is_empty() {
                return Ok(true);
            }
            let parsed = stored.parse::<f64>().map_err(|_| {
                UnsupportedAttributeType::new(
                    column,
                    incoming,
                    format!("stored value '{stored}' is not a number"),
                )
            })?;
            #[allow(clippy::float_cmp, reason = "Stored floats round-trip exactly.")]
            let equal = parsed == *value;
            Ok(!equal)
        }
    }
}
