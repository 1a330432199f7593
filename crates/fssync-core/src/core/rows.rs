// crates/fssync-core/src/core/rows.rs
// ============================================================================
// Module: Stored Rows
// Description: Text snapshots, bound write rows, and stored row views.
// Purpose: Define the row shapes exchanged between the engine and stores.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Reads come back as [`TextRow`] values: lower-cased column name to stored
//! value rendered as text, with NULL rendered as the empty string. Writes go
//! out as [`WriteRow`] values whose bound values line up with
//! [`EntityLayout::columns`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::attribute::AttributeValue;
use crate::core::attribute::BoundValue;
use crate::core::attribute::UnsupportedAttributeType;
use crate::core::entity::EntityLayout;
use crate::core::entity::GEOMETRY_X_COLUMN;
use crate::core::entity::GEOMETRY_Y_COLUMN;
use crate::core::record::FeatureRecord;
use crate::core::record::Geometry;

// ============================================================================
// SECTION: Snapshots
// ============================================================================

/// Stored values of one row rendered as text, keyed by lower-cased column.
pub type TextRow = BTreeMap<String, String>;

/// Snapshot rows keyed by object identifier. Missing keys mean "no row".
pub type SnapshotMap = BTreeMap<i64, TextRow>;

/// Renders an optional coordinate pair into a text row.
pub fn render_geometry(row: &mut TextRow, geometry: Option<Geometry>) {
    let (x, y) = geometry
        .map_or((BoundValue::Null, BoundValue::Null), |point| {
            (BoundValue::Real(point.x), BoundValue::Real(point.y))
        });
    row.insert(GEOMETRY_X_COLUMN.to_string(), x.render_text());
    row.insert(GEOMETRY_Y_COLUMN.to_string(), y.render_text());
}

// ============================================================================
// SECTION: Write Rows
// ============================================================================

/// A record bound to a layout, ready for insertion.
///
/// # Invariants
/// - `values.len() == layout.columns.len()` for the layout it was bound to.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteRow {
    /// Identity value.
    pub object_id: i64,
    /// Bound attribute values in layout column order.
    pub values: Vec<BoundValue>,
    /// Feature location.
    pub geometry: Option<Geometry>,
    /// Write timestamp in unix milliseconds.
    pub timestamp: i64,
}

impl WriteRow {
    /// Binds a record to a layout.
    ///
    /// Attributes missing from the record bind as NULL. The identity column
    /// always binds the record's object id.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedAttributeType`] when a value cannot be coerced into
    /// its column.
    pub fn bind(
        layout: &EntityLayout,
        record: &FeatureRecord,
        timestamp: i64,
    ) -> Result<Self, UnsupportedAttributeType> {
        let lowered: BTreeMap<String, &AttributeValue> = record
            .attributes
            .iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        let mut values = Vec::with_capacity(layout.columns.len());
        for column in &layout.columns {
            if column.name == layout.identity_column {
                values.push(BoundValue::Integer(record.object_id));
                continue;
            }
            let bound = match lowered.get(column.name.as_str()) {
                Some(value) => column.kind.bind(&column.name, value)?,
                None => BoundValue::Null,
            };
            values.push(bound);
        }
        Ok(Self {
            object_id: record.object_id,
            values,
            geometry: record.geometry,
            timestamp,
        })
    }

    /// Returns bound values in layout order, skipping the identity column.
    pub fn non_identity_values<'a>(
        &'a self,
        layout: &'a EntityLayout,
    ) -> impl Iterator<Item = &'a BoundValue> {
        layout
            .columns
            .iter()
            .zip(&self.values)
            .filter(|(column, _)| column.name != layout.identity_column)
            .map(|(_, value)| value)
    }

    /// Returns the coordinate pair as bound values.
    #[must_use]
    pub fn geometry_values(&self) -> (BoundValue, BoundValue) {
        self.geometry.map_or((BoundValue::Null, BoundValue::Null), |point| {
            (BoundValue::Real(point.x), BoundValue::Real(point.y))
        })
    }

    /// Renders the row as a text snapshot (attributes plus geometry).
    #[must_use]
    pub fn to_text_row(&self, layout: &EntityLayout) -> TextRow {
        let mut row: TextRow = layout
            .columns
            .iter()
            .zip(&self.values)
            .map(|(column, value)| (column.name.clone(), value.render_text()))
            .collect();
        render_geometry(&mut row, self.geometry);
        row
    }
}

// ============================================================================
// SECTION: Stored Views
// ============================================================================

/// One current-state row as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentRow {
    /// Identity value.
    pub object_id: i64,
    /// Attribute and geometry columns rendered as text.
    pub values: TextRow,
    /// Last write time in unix milliseconds.
    pub updated: i64,
}

/// One history row as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRow {
    /// Identity value.
    pub object_id: i64,
    /// Version number, starting at 1.
    pub version: i64,
    /// Version creation time in unix milliseconds.
    pub created: i64,
    /// Attribute and geometry columns rendered as text.
    pub values: TextRow,
}
