// crates/fssync-core/src/core/attribute.rs
// ============================================================================
// Module: Attribute Values
// Description: Typed attribute values, column kinds, and bind coercion.
// Purpose: Represent loosely typed source attributes as an exhaustive variant type.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Feature sources deliver attributes as a dynamic union. This module pins that
//! union to [`AttributeValue`] so comparisons are matched exhaustively, and
//! defines [`BoundValue`], the storage-facing form produced by coercing an
//! attribute to the kind of the column it lands in.
//!
//! Stored values are compared as text. [`BoundValue::render_text`] is the one
//! place that decides how a stored value looks as text; every store renders
//! snapshots through it so the diff engine sees the same baseline regardless
//! of backend.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Attribute Values
// ============================================================================

/// One attribute value delivered by a feature source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Absent or null value.
    Null,
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// String value.
    Str(String),
}

impl AttributeValue {
    /// Returns the variant kind of this value.
    #[must_use]
    pub const fn kind(&self) -> AttributeKind {
        match self {
            Self::Null => AttributeKind::Null,
            Self::Int(_) => AttributeKind::Int,
            Self::Float(_) => AttributeKind::Float,
            Self::Str(_) => AttributeKind::Str,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// Variant tag of an [`AttributeValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// Null value.
    Null,
    /// Integer value.
    Int,
    /// Floating-point value.
    Float,
    /// String value.
    Str,
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Null => "null",
            Self::Int => "integer",
            Self::Float => "float",
            Self::Str => "string",
        };
        f.write_str(label)
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// A value could not be compared against, or bound into, its column.
///
/// # Invariants
/// - Scoped to a single record and column; never aborts a run by itself.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("unsupported attribute type for column {column}: {kind} value ({detail})")]
pub struct UnsupportedAttributeType {
    /// Column the value belongs to.
    pub column: String,
    /// Kind of the incoming value.
    pub kind: AttributeKind,
    /// Human-readable mismatch detail.
    pub detail: String,
}

impl UnsupportedAttributeType {
    /// Builds an error for the given column, incoming value, and detail.
    #[must_use]
    pub fn new(column: &str, value: &AttributeValue, detail: impl Into<String>) -> Self {
        Self {
            column: column.to_string(),
            kind: value.kind(),
            detail: detail.into(),
        }
    }
}

// ============================================================================
// SECTION: Column Kinds
// ============================================================================

/// Storage kind of a column, derived from the source's field type hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// 64-bit integer column.
    Integer,
    /// Double-precision column.
    Float,
    /// Text column.
    Text,
}

impl FieldKind {
    /// Maps an Esri field type name (`esriFieldTypeDouble`, ...) to a column kind.
    ///
    /// Unknown field types are stored as text.
    #[must_use]
    pub fn from_esri(type_name: &str) -> Self {
        match type_name {
            "esriFieldTypeOID"
            | "esriFieldTypeInteger"
            | "esriFieldTypeSmallInteger"
            | "esriFieldTypeBigInteger"
            | "esriFieldTypeDate" => Self::Integer,
            "esriFieldTypeDouble" | "esriFieldTypeSingle" => Self::Float,
            _ => Self::Text,
        }
    }

    /// Coerces an incoming attribute into a value bindable to this column kind.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedAttributeType`] when the value cannot be represented
    /// in the column without loss.
    pub fn bind(
        self,
        column: &str,
        value: &AttributeValue,
    ) -> Result<BoundValue, UnsupportedAttributeType> {
        match (self, value) {
            (_, AttributeValue::Null) => Ok(BoundValue::Null),
            (Self::Integer, AttributeValue::Int(v)) => Ok(BoundValue::Integer(*v)),
            (Self::Integer, AttributeValue::Float(v)) => {
                real_to_int(*v).map(BoundValue::Integer).ok_or_else(|| {
                    UnsupportedAttributeType::new(
                        column,
                        value,
                        "fractional value for integer column",
                    )
                })
            }
            (Self::Integer, AttributeValue::Str(text)) => {
                text.trim().parse::<i64>().map(BoundValue::Integer).map_err(|_| {
                    UnsupportedAttributeType::new(column, value, "text is not an integer")
                })
            }
            (Self::Float, AttributeValue::Int(v)) => Ok(BoundValue::Real(int_to_real(*v))),
            (Self::Float, AttributeValue::Float(v)) => Ok(BoundValue::Real(*v)),
            (Self::Float, AttributeValue::Str(text)) => {
                text.trim().parse::<f64>().map(BoundValue::Real).map_err(|_| {
                    UnsupportedAttributeType::new(column, value, "text is not a number")
                })
            }
            (Self::Text, AttributeValue::Str(text)) => Ok(BoundValue::Text(text.clone())),
            (Self::Text, AttributeValue::Int(v)) => Ok(BoundValue::Text(v.to_string())),
            (Self::Text, AttributeValue::Float(v)) => Ok(BoundValue::Text(v.to_string())),
        }
    }
}

/// Widens an integer attribute for a floating-point column.
#[allow(
    clippy::cast_precision_loss,
    reason = "Integer attributes are widened into float columns."
)]
const fn int_to_real(value: i64) -> f64 {
    value as f64
}

/// Narrows a whole float for an integer column; `None` for fractions,
/// non-finite values, and values outside the `i64` range.
#[allow(
    clippy::cast_possible_truncation,
    reason = "The value is whole and range-checked before the cast."
)]
fn real_to_int(value: f64) -> Option<i64> {
    const LOWER: f64 = -9_223_372_036_854_775_808.0;
    const UPPER: f64 = 9_223_372_036_854_775_808.0;
    (value.is_finite() && value.fract() == 0.0 && (LOWER..UPPER).contains(&value))
        .then(|| value as i64)
}

// ============================================================================
// SECTION: Bound Values
// ============================================================================

/// A value ready to be bound into a storage statement.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    /// SQL NULL.
    Null,
    /// 64-bit integer.
    Integer(i64),
    /// Double-precision float.
    Real(f64),
    /// Text.
    Text(String),
}

impl BoundValue {
    /// Renders the stored value the way snapshots present it.
    ///
    /// NULL renders as the empty string; floats use the shortest
    /// representation that parses back to the same value.
    #[must_use]
    pub fn render_text(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Integer(v) => v.to_string(),
            Self::Real(v) => v.to_string(),
            Self::Text(text) => text.clone(),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::AttributeValue;
    use super::BoundValue;
    use super::FieldKind;

    #[test]
    fn esri_types_map_to_column_kinds() {
        assert_eq!(FieldKind::from_esri("esriFieldTypeOID"), FieldKind::Integer);
        assert_eq!(FieldKind::from_esri("esriFieldTypeDate"), FieldKind::Integer);
        assert_eq!(FieldKind::from_esri("esriFieldTypeSingle"), FieldKind::Float);
        assert_eq!(FieldKind::from_esri("esriFieldTypeGlobalID"), FieldKind::Text);
        assert_eq!(FieldKind::from_esri("esriFieldTypeGeometry"), FieldKind::Text);
    }

    #[test]
    fn bind_coerces_between_numeric_kinds() {
        let bound = FieldKind::Float.bind("depth", &AttributeValue::Int(3)).unwrap();
        assert_eq!(bound, BoundValue::Real(3.0));
        assert_eq!(bound.render_text(), "3");
        let bound = FieldKind::Integer.bind("count", &AttributeValue::from(" 12 ")).unwrap();
        assert_eq!(bound, BoundValue::Integer(12));
    }

    #[test]
    fn bind_rejects_fractional_integer() {
        let err = FieldKind::Integer.bind("count", &AttributeValue::Float(1.5)).unwrap_err();
        assert_eq!(err.column, "count");
        assert!(FieldKind::Integer.bind("count", &AttributeValue::Float(f64::NAN)).is_err());
        assert!(FieldKind::Integer.bind("count", &AttributeValue::Float(1e19)).is_err());
    }

    #[test]
    fn bind_accepts_whole_float_for_integer() {
        let bound = FieldKind::Integer.bind("visits", &AttributeValue::Float(7.0)).unwrap();
        assert_eq!(bound, BoundValue::Integer(7));
        assert_eq!(bound.render_text(), "7");
        let bound = FieldKind::Integer.bind("visits", &AttributeValue::Float(-3.0)).unwrap();
        assert_eq!(bound, BoundValue::Integer(-3));
    }

    #[test]
    fn untagged_serialization_keeps_numeric_variants() {
        let values = vec![
            AttributeValue::Null,
            AttributeValue::Int(7),
            AttributeValue::Float(7.5),
            AttributeValue::from("x"),
        ];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[null,7,7.5,"x"]"#);
        let back: Vec<AttributeValue> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }
}
