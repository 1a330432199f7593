// crates/fssync-core/src/core/entity.rs
// ============================================================================
// Module: Entity Layouts
// Description: Entity type identifiers, table naming, and column layouts.
// Purpose: Derive the validated destination schema for one entity type.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Every entity type `E` owns two tables: a current-state table and an
//! append-only history table, named by fixed prefixes applied to `E`.
//! [`EntityLayout`] is derived from a page's field descriptors and fixes the
//! column order used by every statement: attribute columns lower-cased and
//! sorted lexically, followed by the bookkeeping columns.
//!
//! Column names are interpolated into SQL text, so layout construction is
//! the validation boundary: only plain identifiers are accepted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::attribute::AttributeValue;
use crate::core::attribute::FieldKind;
use crate::core::record::FeatureBatch;
use crate::core::record::FieldSpec;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Column holding the X coordinate.
pub const GEOMETRY_X_COLUMN: &str = "geometry_x";
/// Column holding the Y coordinate.
pub const GEOMETRY_Y_COLUMN: &str = "geometry_y";
/// Current-state column holding the last write time (unix millis).
pub const UPDATED_COLUMN: &str = "updated";
/// History column holding the version creation time (unix millis).
pub const CREATED_COLUMN: &str = "created";
/// History column holding the version number.
pub const VERSION_COLUMN: &str = "version";

/// Bookkeeping columns that attribute names may not shadow.
pub const RESERVED_COLUMNS: [&str; 5] =
    [GEOMETRY_X_COLUMN, GEOMETRY_Y_COLUMN, UPDATED_COLUMN, CREATED_COLUMN, VERSION_COLUMN];

/// Default prefix for current-state tables.
pub const DEFAULT_CURRENT_PREFIX: &str = "fs_";
/// Default prefix for history tables.
pub const DEFAULT_HISTORY_PREFIX: &str = "history_";

/// Maximum identifier length accepted for tables and columns.
const MAX_IDENTIFIER_LENGTH: usize = 63;

// ============================================================================
// SECTION: Entity Types
// ============================================================================

/// Entity type (feature layer) name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityType(String);

impl EntityType {
    /// Creates a new entity type.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the entity type as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for EntityType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EntityType {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Table name prefixes for current-state and history tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableNaming {
    /// Prefix of the current-state table.
    pub current_prefix: String,
    /// Prefix of the history table.
    pub history_prefix: String,
}

impl Default for TableNaming {
    fn default() -> Self {
        Self {
            current_prefix: DEFAULT_CURRENT_PREFIX.to_string(),
            history_prefix: DEFAULT_HISTORY_PREFIX.to_string(),
        }
    }
}

impl TableNaming {
    /// Returns the current-state table name for an entity type.
    #[must_use]
    pub fn current_table(&self, entity: &EntityType) -> String {
        format!("{}{}", self.current_prefix, entity.as_str()).to_ascii_lowercase()
    }

    /// Returns the history table name for an entity type.
    #[must_use]
    pub fn history_table(&self, entity: &EntityType) -> String {
        format!("{}{}", self.history_prefix, entity.as_str()).to_ascii_lowercase()
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Layout derivation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LayoutError {
    /// Table or column name is not a plain identifier.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),
    /// Attribute name collides with a bookkeeping column.
    #[error("attribute shadows reserved column: {0}")]
    ReservedColumn(String),
    /// Unique-id field is missing or empty.
    #[error("missing unique id field")]
    MissingIdentity,
}

// ============================================================================
// SECTION: Layouts
// ============================================================================

/// One destination column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Lower-cased column name.
    pub name: String,
    /// Storage kind.
    pub kind: FieldKind,
}

/// Validated destination schema for one entity type.
///
/// # Invariants
/// - `columns` is sorted by name, contains no duplicates, and includes the
///   identity column.
/// - Every table and column name is a plain SQL identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLayout {
    /// Entity type this layout belongs to.
    pub entity: EntityType,
    /// Current-state table name.
    pub current_table: String,
    /// History table name.
    pub history_table: String,
    /// Lower-cased unique-identity column.
    pub identity_column: String,
    /// Attribute columns in lexical order.
    pub columns: Vec<ColumnSpec>,
}

impl EntityLayout {
    /// Derives a layout from field descriptors.
    ///
    /// Field names are lower-cased; the first descriptor wins when two names
    /// differ only in case. The identity column is always stored as an integer.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError`] when a name is not a plain identifier or shadows a
    /// bookkeeping column.
    pub fn from_fields(
        entity: &EntityType,
        naming: &TableNaming,
        unique_id_field: &str,
        fields: &[FieldSpec],
    ) -> Result<Self, LayoutError> {
        let identity_column = unique_id_field.trim().to_ascii_lowercase();
        if identity_column.is_empty() {
            return Err(LayoutError::MissingIdentity);
        }
        validate_identifier(&identity_column)?;
        let current_table = naming.current_table(entity);
        let history_table = naming.history_table(entity);
        validate_identifier(&current_table)?;
        validate_identifier(&history_table)?;

        let mut by_name: BTreeMap<String, FieldKind> = BTreeMap::new();
        for field in fields {
            let name = field.name.to_ascii_lowercase();
            validate_identifier(&name)?;
            if RESERVED_COLUMNS.contains(&name.as_str()) {
                return Err(LayoutError::ReservedColumn(name));
            }
            by_name.entry(name).or_insert(field.kind);
        }
        by_name.insert(identity_column.clone(), FieldKind::Integer);

        let columns = by_name.into_iter().map(|(name, kind)| ColumnSpec { name, kind }).collect();
        Ok(Self {
            entity: entity.clone(),
            current_table,
            history_table,
            identity_column,
            columns,
        })
    }

    /// Derives a layout from a fetched page.
    ///
    /// Attributes that appear on records but not in the field list are added
    /// with a kind inferred from their first non-null value.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError`] under the same conditions as [`Self::from_fields`].
    pub fn from_batch(
        entity: &EntityType,
        naming: &TableNaming,
        batch: &FeatureBatch,
    ) -> Result<Self, LayoutError> {
        let mut extra: BTreeMap<String, Option<FieldKind>> = BTreeMap::new();
        for record in &batch.records {
            for (name, value) in &record.attributes {
                if batch.fields.iter().any(|field| field.name.eq_ignore_ascii_case(name)) {
                    continue;
                }
                let slot = extra.entry(name.to_ascii_lowercase()).or_insert(None);
                if slot.is_none() {
                    *slot = match value {
                        AttributeValue::Int(_) => Some(FieldKind::Integer),
                        AttributeValue::Float(_) => Some(FieldKind::Float),
                        AttributeValue::Str(_) => Some(FieldKind::Text),
                        AttributeValue::Null => None,
                    };
                }
            }
        }
        let mut fields = batch.fields.clone();
        fields.extend(
            extra
                .into_iter()
                .map(|(name, kind)| FieldSpec::new(name, kind.unwrap_or(FieldKind::Text))),
        );
        Self::from_fields(entity, naming, &batch.unique_id_field, &fields)
    }

    /// Returns the attribute columns other than the identity column.
    pub fn non_identity_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|column| column.name != self.identity_column)
    }

    /// Returns this layout extended with columns only present in `other`.
    ///
    /// Existing column kinds are kept; table names and identity come from `self`.
    #[must_use]
    pub fn merged_with(&self, other: &Self) -> Self {
        let mut by_name: BTreeMap<String, FieldKind> =
            self.columns.iter().map(|column| (column.name.clone(), column.kind)).collect();
        for column in &other.columns {
            by_name.entry(column.name.clone()).or_insert(column.kind);
        }
        Self {
            columns: by_name.into_iter().map(|(name, kind)| ColumnSpec { name, kind }).collect(),
            ..self.clone()
        }
    }

    /// Returns the columns of `self` that `existing` lacks.
    #[must_use]
    pub fn missing_from<'a>(&'a self, existing: &[String]) -> Vec<&'a ColumnSpec> {
        self.columns
            .iter()
            .filter(|column| !existing.iter().any(|name| name.eq_ignore_ascii_case(&column.name)))
            .collect()
    }

    /// Looks up a column by lower-cased name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns
            .binary_search_by(|column| column.name.as_str().cmp(name))
            .ok()
            .and_then(|index| self.columns.get(index))
    }
}

/// Validates that a name is a plain SQL identifier.
///
/// # Errors
///
/// Returns [`LayoutError::InvalidIdentifier`] for anything other than
/// `[A-Za-z_][A-Za-z0-9_]*` up to 63 bytes.
pub fn validate_identifier(name: &str) -> Result<(), LayoutError> {
    let mut chars = name.chars();
    let valid_start = chars.next().is_some_and(|ch| ch.is_ascii_alphabetic() || ch == '_');
    let valid_rest = chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !valid_start || !valid_rest || name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(LayoutError::InvalidIdentifier(name.to_string()));
    }
    Ok(())
}

// ============================================================================
// SECTION: Tests
// ============================================================================
