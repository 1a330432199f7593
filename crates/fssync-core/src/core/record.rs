// crates/fssync-core/src/core/record.rs
// ============================================================================
// Module: Feature Records
// Description: Incoming records, field descriptors, and page containers.
// Purpose: Carry one page of source data into the reconciliation engine.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`FeatureBatch`] is one page from a feature source: the ordered field
//! descriptors, the name of the unique-id field, and the records themselves.
//! [`SourcePage`] pairs a batch with the source's raw payload so a failed page
//! can be persisted verbatim.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::attribute::AttributeValue;
use crate::core::attribute::FieldKind;

// ============================================================================
// SECTION: Records
// ============================================================================

/// Planar coordinate pair of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    /// X coordinate (longitude in EPSG:4326).
    pub x: f64,
    /// Y coordinate (latitude in EPSG:4326).
    pub y: f64,
}

/// Field descriptor reported by the source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Field name as delivered by the source.
    pub name: String,
    /// Storage kind derived from the source type hint.
    pub kind: FieldKind,
}

impl FieldSpec {
    /// Creates a field descriptor.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// One external entity instance.
///
/// # Invariants
/// - `object_id` equals the value of the batch's unique-id attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Per-layer correlation identifier used to join against snapshots.
    pub object_id: i64,
    /// Stable external identity, when the layer carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Attribute values keyed by source field name.
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Feature location, absent for non-spatial tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
}

impl FeatureRecord {
    /// Returns a label for logs: the external identity if known, else the object id.
    #[must_use]
    pub fn label(&self) -> String {
        self.external_id.clone().unwrap_or_else(|| self.object_id.to_string())
    }
}

/// One page of records for an entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureBatch {
    /// Ordered field descriptors.
    pub fields: Vec<FieldSpec>,
    /// Name of the unique-identity field.
    pub unique_id_field: String,
    /// Records in source order.
    pub records: Vec<FeatureRecord>,
}

impl FeatureBatch {
    /// Returns the object identifiers of the page in source order.
    #[must_use]
    pub fn object_ids(&self) -> Vec<i64> {
        self.records.iter().map(|record| record.object_id).collect()
    }

    /// Returns the number of records in the page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true when the page holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A fetched page together with the source's raw payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePage {
    /// Normalized page.
    pub batch: FeatureBatch,
    /// Raw payload as received, if the source keeps one.
    pub raw: Option<Value>,
}

impl SourcePage {
    /// Wraps a batch with no raw payload.
    #[must_use]
    pub const fn from_batch(batch: FeatureBatch) -> Self {
        Self { batch, raw: None }
    }
}
