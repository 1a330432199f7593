// crates/fssync-core/src/core/mod.rs
// ============================================================================
// Module: fssync Core Types
// Description: Data model shared by the engine, stores, and sources.
// Purpose: Provide stable, serializable types for records, layouts, and results.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! Core types describe what flows through a reconciliation run: typed
//! attribute values, incoming pages, destination layouts, stored rows, and
//! run summaries.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod attribute;
pub mod entity;
pub mod record;
pub mod rows;
pub mod summary;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use attribute::AttributeKind;
pub use attribute::AttributeValue;
pub use attribute::BoundValue;
pub use attribute::FieldKind;
pub use attribute::UnsupportedAttributeType;
pub use entity::ColumnSpec;
pub use entity::CREATED_COLUMN;
pub use entity::DEFAULT_CURRENT_PREFIX;
pub use entity::DEFAULT_HISTORY_PREFIX;
pub use entity::EntityLayout;
pub use entity::EntityType;
pub use entity::GEOMETRY_X_COLUMN;
pub use entity::GEOMETRY_Y_COLUMN;
pub use entity::LayoutError;
pub use entity::RESERVED_COLUMNS;
pub use entity::TableNaming;
pub use entity::UPDATED_COLUMN;
pub use entity::VERSION_COLUMN;
pub use entity::validate_identifier;
pub use record::FeatureBatch;
pub use record::FeatureRecord;
pub use record::FieldSpec;
pub use record::Geometry;
pub use record::SourcePage;
pub use rows::CurrentRow;
pub use rows::HistoryRow;
pub use rows::SnapshotMap;
pub use rows::TextRow;
pub use rows::WriteRow;
pub use rows::render_geometry;
pub use summary::RecordFault;
pub use summary::SyncRunResult;
pub use summary::SyncTotals;
