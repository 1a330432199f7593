// crates/fssync-arcgis/src/decode.rs
// ============================================================================
// Module: ArcGIS Response Decoding
// Description: Wire shapes of FeatureServer responses and page normalization.
// Purpose: Turn query JSON into typed feature batches using field type hints.
// Dependencies: fssync-core, serde, serde_json
// ============================================================================

//! ## Overview
//! FeatureServer query responses describe their fields once and then list
//! features as attribute maps with an optional point geometry. Numbers are
//! decoded according to the declared field type; booleans, arrays, and nested
//! objects have no column representation and fail the page.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use fssync_core::AttributeValue;
use fssync_core::FeatureBatch;
use fssync_core::FeatureRecord;
use fssync_core::FieldKind;
use fssync_core::FieldSpec;
use fssync_core::Geometry;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;

use crate::client::ArcgisError;

// ============================================================================
// SECTION: Service Metadata
// ============================================================================

/// FeatureServer description returned by `?f=json`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInfo {
    /// Largest page the service returns, when advertised.
    #[serde(default)]
    pub max_record_count: Option<u64>,
    /// Spatial layers.
    #[serde(default)]
    pub layers: Vec<LayerInfo>,
    /// Non-spatial tables.
    #[serde(default)]
    pub tables: Vec<LayerInfo>,
}

impl ServiceInfo {
    /// Iterates layers followed by tables.
    pub fn all_layers(&self) -> impl Iterator<Item = &LayerInfo> {
        self.layers.iter().chain(&self.tables)
    }

    /// Finds a layer or table by name, ignoring ASCII case.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&LayerInfo> {
        self.all_layers().find(|layer| layer.name == name).or_else(|| {
            self.all_layers().find(|layer| layer.name.eq_ignore_ascii_case(name))
        })
    }
}

/// One published layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerInfo {
    /// Numeric layer id used in query URLs.
    pub id: u32,
    /// Layer name; doubles as the entity type.
    pub name: String,
}

/// Body of a `returnCountOnly` query.
#[derive(Debug, Deserialize)]
pub(crate) struct CountResponse {
    /// Number of matching records.
    pub(crate) count: u64,
}

// ============================================================================
// SECTION: Query Responses
// ============================================================================

/// Body of a feature query.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    /// Legacy name of the object-id field.
    #[serde(default)]
    object_id_field_name: Option<String>,
    /// Unique-id field descriptor.
    #[serde(default)]
    unique_id_field: Option<UniqueIdField>,
    /// Name of the global-id field, when the layer has one.
    #[serde(default)]
    global_id_field_name: Option<String>,
    /// Field descriptors.
    #[serde(default)]
    fields: Vec<WireField>,
    /// Features in result order.
    #[serde(default)]
    features: Vec<WireFeature>,
}

/// `uniqueIdField` object.
#[derive(Debug, Deserialize)]
struct UniqueIdField {
    /// Field name.
    name: String,
}

/// Field descriptor.
#[derive(Debug, Deserialize)]
struct WireField {
    /// Field name.
    name: String,
    /// Esri field type, e.g. `esriFieldTypeString`.
    #[serde(rename = "type")]
    field_type: String,
}

/// Feature entry.
#[derive(Debug, Deserialize)]
struct WireFeature {
    /// Attribute values keyed by field name.
    #[serde(default)]
    attributes: Map<String, Value>,
    /// Geometry; only points carry `x`/`y`.
    #[serde(default)]
    geometry: Option<Value>,
}

// ============================================================================
// SECTION: Decoding
// ============================================================================

/// Normalizes a raw query response into a feature batch.
///
/// `global_id_field` names the attribute carried as the external identity; the
/// response's `globalIdFieldName` is used when the configured field is absent.
///
/// # Errors
///
/// Returns [`ArcgisError::Decode`] when the response lacks a unique-id field, a
/// feature lacks an integer identity, or an attribute has no column mapping.
pub fn decode_page(body: &Value, global_id_field: &str) -> Result<FeatureBatch, ArcgisError> {
    let response = QueryResponse::deserialize(body)
        .map_err(|err| ArcgisError::Decode(format!("query response: {err}")))?;
    let unique_id_field = unique_field(&response)?;
    let fields: Vec<FieldSpec> = response
        .fields
        .iter()
        .map(|field| FieldSpec::new(field.name.clone(), FieldKind::from_esri(&field.field_type)))
        .collect();
    let kinds: BTreeMap<&str, FieldKind> =
        fields.iter().map(|field| (field.name.as_str(), field.kind)).collect();

    let mut records = Vec::with_capacity(response.features.len());
    for (index, feature) in response.features.iter().enumerate() {
        let mut attributes = BTreeMap::new();
        for (name, value) in &feature.attributes {
            let kind = kinds.get(name.as_str()).copied().unwrap_or(FieldKind::Text);
            let decoded = decode_attribute(value, kind).ok_or_else(|| {
                ArcgisError::Decode(format!(
                    "feature {index}: attribute {name} has unsupported json type"
                ))
            })?;
            attributes.insert(name.clone(), decoded);
        }
        let object_id = lookup(&feature.attributes, &unique_id_field)
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                ArcgisError::Decode(format!("feature {index}: missing integer {unique_id_field}"))
            })?;
        let external_id = lookup(&feature.attributes, global_id_field)
            .or_else(|| {
                response
                    .global_id_field_name
                    .as_deref()
                    .and_then(|name| lookup(&feature.attributes, name))
            })
            .and_then(Value::as_str)
            .map(str::to_string);
        records.push(FeatureRecord {
            object_id,
            external_id,
            attributes,
            geometry: feature.geometry.as_ref().and_then(point),
        });
    }

    Ok(FeatureBatch {
        fields,
        unique_id_field,
        records,
    })
}

/// Resolves the unique-id field name of a response.
fn unique_field(response: &QueryResponse) -> Result<String, ArcgisError> {
    response
        .unique_id_field
        .as_ref()
        .map(|field| field.name.clone())
        .or_else(|| response.object_id_field_name.clone())
        .or_else(|| {
            response
                .fields
                .iter()
                .find(|field| field.field_type == "esriFieldTypeOID")
                .map(|field| field.name.clone())
        })
        .ok_or_else(|| ArcgisError::Decode("response names no unique id field".to_string()))
}

/// Decodes one attribute; `None` for JSON types with no column mapping.
fn decode_attribute(value: &Value, kind: FieldKind) -> Option<AttributeValue> {
    match value {
        Value::Null => Some(AttributeValue::Null),
        Value::String(text) => Some(AttributeValue::Str(text.clone())),
        Value::Number(number) => decode_number(number, kind),
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Decodes a number using the field's type hint.
fn decode_number(number: &Number, kind: FieldKind) -> Option<AttributeValue> {
    match kind {
        FieldKind::Float => number.as_f64().map(AttributeValue::Float),
        FieldKind::Integer | FieldKind::Text => number
            .as_i64()
            .map(AttributeValue::Int)
            .or_else(|| number.as_f64().map(AttributeValue::Float)),
    }
}

/// Looks up an attribute by exact name, then ignoring ASCII case.
fn lookup<'a>(attributes: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    attributes.get(name).or_else(|| {
        attributes.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| value)
    })
}

/// Extracts a point from a geometry object.
fn point(geometry: &Value) -> Option<Geometry> {
    let x = geometry.get("x").and_then(Value::as_f64)?;
    let y = geometry.get("y").and_then(Value::as_f64)?;
    Some(Geometry { x, y })
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use fssync_core::AttributeValue;
    use fssync_core::FieldKind;
    use serde_json::json;

    use super::ServiceInfo;
    use super::decode_page;
    use crate::client::ArcgisError;

    fn page(features: &serde_json::Value) -> serde_json::Value {
        json!({
            "objectIdFieldName": "OBJECTID",
            "globalIdFieldName": "GlobalID",
            "fields": [
                {"name": "OBJECTID", "type": "esriFieldTypeOID"},
                {"name": "GlobalID", "type": "esriFieldTypeGlobalID"},
                {"name": "Depth", "type": "esriFieldTypeDouble"},
                {"name": "Visits", "type": "esriFieldTypeInteger"},
            ],
            "features": features,
        })
    }

    #[test]
    fn numbers_follow_field_hints() {
        let body = page(&json!([{
            "attributes": {"OBJECTID": 4, "GlobalID": "{A}", "Depth": 3, "Visits": 2},
            "geometry": {"x": -80.5, "y": 43.25},
        }]));
        let batch = decode_page(&body, "GlobalID").unwrap();
        assert_eq!(batch.unique_id_field, "OBJECTID");
        assert_eq!(batch.fields[2].kind, FieldKind::Float);
        let record = &batch.records[0];
        assert_eq!(record.object_id, 4);
        assert_eq!(record.external_id.as_deref(), Some("{A}"));
        assert_eq!(record.attributes["Depth"], AttributeValue::Float(3.0));
        assert_eq!(record.attributes["Visits"], AttributeValue::Int(2));
        assert_eq!(record.geometry.map(|point| point.y), Some(43.25));
    }

    #[test]
    fn booleans_fail_the_page() {
        let body = page(&json!([{"attributes": {"OBJECTID": 1, "Depth": true}}]));
        let err = decode_page(&body, "GlobalID").unwrap_err();
        assert!(matches!(err, ArcgisError::Decode(message) if message.contains("Depth")));
    }

    #[test]
    fn features_without_identity_fail_the_page() {
        let body = page(&json!([{"attributes": {"Depth": 1.5}}]));
        assert!(decode_page(&body, "GlobalID").is_err());
    }

    #[test]
    fn non_point_geometry_is_dropped() {
        let body = page(&json!([{
            "attributes": {"OBJECTID": 1},
            "geometry": {"rings": [[[0.0, 0.0], [1.0, 1.0]]]},
        }]));
        let batch = decode_page(&body, "GlobalID").unwrap();
        assert_eq!(batch.records[0].geometry, None);
        assert_eq!(batch.records[0].external_id, None);
    }

    #[test]
    fn service_lookup_falls_back_to_case_insensitive() {
        let info: ServiceInfo = serde_json::from_value(json!({
            "maxRecordCount": 2000,
            "layers": [{"id": 0, "name": "PointLocation"}],
            "tables": [{"id": 7, "name": "Inspections"}],
        }))
        .unwrap();
        assert_eq!(info.max_record_count, Some(2000));
        assert_eq!(info.find("pointlocation").map(|layer| layer.id), Some(0));
        assert_eq!(info.find("Inspections").map(|layer| layer.id), Some(7));
        assert!(info.find("Missing").is_none());
    }
}
