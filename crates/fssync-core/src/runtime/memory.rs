// crates/fssync-core/src/runtime/memory.rs
// ============================================================================
// Module: In-Memory Store and Source
// Description: Mutex-guarded implementations of SyncStore and FeatureSource.
// Purpose: Exercise the engine without a database or a network service.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! [`InMemorySyncStore`] mirrors the SQL stores' semantics: unique
//! `(identity, version)` history keys, atomic two-table writes, and text
//! rendering through [`BoundValue::render_text`]. [`InMemoryFeatureSource`]
//! serves pages from vectors the caller can replace between runs. Both are
//! intended for tests and local demos.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::BoundValue;
use crate::core::CurrentRow;
use crate::core::EntityLayout;
use crate::core::EntityType;
use crate::core::FeatureBatch;
use crate::core::FeatureRecord;
use crate::core::FieldSpec;
use crate::core::Geometry;
use crate::core::HistoryRow;
use crate::core::SnapshotMap;
use crate::core::SourcePage;
use crate::core::TextRow;
use crate::core::WriteRow;
use crate::core::render_geometry;
use crate::interfaces::FeatureSource;
use crate::interfaces::SourceError;
use crate::interfaces::StoreError;
use crate::interfaces::SyncStore;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// One stored row.
#[derive(Debug, Clone)]
struct MemoryRow {
    /// Bound values by column name.
    values: BTreeMap<String, BoundValue>,
    /// Stored coordinates.
    geometry: Option<Geometry>,
    /// `updated` or `created` timestamp.
    stamp: i64,
}

impl MemoryRow {
    /// Captures a write row under a layout.
    fn from_write(layout: &EntityLayout, row: &WriteRow) -> Self {
        let values = layout
            .columns
            .iter()
            .zip(&row.values)
            .map(|(column, value)| (column.name.clone(), value.clone()))
            .collect();
        Self {
            values,
            geometry: row.geometry,
            stamp: row.timestamp,
        }
    }

    /// Renders the row's layout columns as text.
    fn render(&self, layout: &EntityLayout) -> TextRow {
        let mut text: TextRow = layout
            .columns
            .iter()
            .map(|column| {
                let value = self.values.get(&column.name).map(BoundValue::render_text);
                (column.name.clone(), value.unwrap_or_default())
            })
            .collect();
        render_geometry(&mut text, self.geometry);
        text
    }
}

/// Tables of one entity.
#[derive(Debug, Clone)]
struct MemoryEntity {
    /// Union of provisioned layouts.
    layout: EntityLayout,
    /// Current-state rows by identity.
    current: BTreeMap<i64, MemoryRow>,
    /// History rows by `(identity, version)`.
    history: BTreeMap<(i64, i64), MemoryRow>,
}

impl MemoryEntity {
    /// Returns the highest stored version for an identity.
    fn max_version(&self, object_id: i64) -> Option<i64> {
        self.history
            .range((object_id, i64::MIN)..=(object_id, i64::MAX))
            .next_back()
            .map(|((_, version), _)| *version)
    }
}

/// In-memory sync store for tests and examples.
#[derive(Debug, Default, Clone)]
pub struct InMemorySyncStore {
    /// Entity tables keyed by current-state table name.
    tables: Arc<Mutex<BTreeMap<String, MemoryEntity>>>,
}

impl InMemorySyncStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs a closure against the provisioned tables of a layout.
    fn with_entity<T>(
        &self,
        layout: &EntityLayout,
        f: impl FnOnce(&mut MemoryEntity) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self
            .tables
            .lock()
            .map_err(|_| StoreError::Io("sync store mutex poisoned".to_string()))?;
        let entity = guard.get_mut(&layout.current_table).ok_or_else(|| {
            StoreError::Db(format!("no such table: {}", layout.current_table))
        })?;
        f(entity)
    }
}

impl SyncStore for InMemorySyncStore {
    fn ensure_schema(&self, layout: &EntityLayout) -> Result<(), StoreError> {
        let mut guard = self
            .tables
            .lock()
            .map_err(|_| StoreError::Io("sync store mutex poisoned".to_string()))?;
        guard
            .entry(layout.current_table.clone())
            .and_modify(|entity| entity.layout = entity.layout.merged_with(layout))
            .or_insert_with(|| MemoryEntity {
                layout: layout.clone(),
                current: BTreeMap::new(),
                history: BTreeMap::new(),
            });
        Ok(())
    }

    fn stored_layout(&self, entity: &EntityType) -> Result<Option<EntityLayout>, StoreError> {
        let guard = self
            .tables
            .lock()
            .map_err(|_| StoreError::Io("sync store mutex poisoned".to_string()))?;
        Ok(guard
            .values()
            .find(|tables| &tables.layout.entity == entity)
            .map(|tables| tables.layout.clone()))
    }

    fn load_snapshots(
        &self,
        layout: &EntityLayout,
        object_ids: &[i64],
    ) -> Result<SnapshotMap, StoreError> {
        self.with_entity(layout, |entity| {
            Ok(object_ids
                .iter()
                .filter_map(|id| entity.current.get(id).map(|row| (*id, row.render(layout))))
                .collect())
        })
    }

    fn insert_new(&self, layout: &EntityLayout, row: &WriteRow) -> Result<(), StoreError> {
        self.with_entity(layout, |entity| {
            if entity.current.contains_key(&row.object_id)
                || entity.history.contains_key(&(row.object_id, 1))
            {
                return Err(StoreError::Conflict(format!(
                    "object {} already exists in {}",
                    row.object_id, layout.current_table
                )));
            }
            let stored = MemoryRow::from_write(layout, row);
            entity.history.insert((row.object_id, 1), stored.clone());
            entity.current.insert(row.object_id, stored);
            Ok(())
        })
    }

    fn append_version(&self, layout: &EntityLayout, row: &WriteRow) -> Result<i64, StoreError> {
        self.with_entity(layout, |entity| {
            let Some(max) = entity.max_version(row.object_id) else {
                return Err(StoreError::Corrupt(format!(
                    "object {} has no history in {}",
                    row.object_id, layout.history_table
                )));
            };
            let next = max
                .checked_add(1)
                .ok_or_else(|| StoreError::Corrupt("version overflow".to_string()))?;
            let stored = MemoryRow::from_write(layout, row);
            let Some(current) = entity.current.get_mut(&row.object_id) else {
                return Err(StoreError::Invalid(format!(
                    "object {} has no current row in {}",
                    row.object_id, layout.current_table
                )));
            };
            for (name, value) in &stored.values {
                current.values.insert(name.clone(), value.clone());
            }
            current.geometry = stored.geometry;
            current.stamp = stored.stamp;
            entity.history.insert((row.object_id, next), stored);
            Ok(next)
        })
    }

    fn current_rows(&self, layout: &EntityLayout) -> Result<Vec<CurrentRow>, StoreError> {
        self.with_entity(layout, |entity| {
            Ok(entity
                .current
                .iter()
                .map(|(object_id, row)| CurrentRow {
                    object_id: *object_id,
                    values: row.render(layout),
                    updated: row.stamp,
                })
                .collect())
        })
    }

    fn history_rows(&self, layout: &EntityLayout) -> Result<Vec<HistoryRow>, StoreError> {
        self.with_entity(layout, |entity| {
            Ok(entity
                .history
                .iter()
                .map(|((object_id, version), row)| HistoryRow {
                    object_id: *object_id,
                    version: *version,
                    created: row.stamp,
                    values: row.render(layout),
                })
                .collect())
        })
    }
}

// ============================================================================
// SECTION: In-Memory Source
// ============================================================================

/// Records served for one layer.
#[derive(Debug, Clone)]
struct MemoryLayer {
    /// Field descriptors.
    fields: Vec<FieldSpec>,
    /// Unique-id field name.
    unique_id_field: String,
    /// Records in order.
    records: Vec<FeatureRecord>,
}

/// In-memory feature source for tests and examples.
#[derive(Debug, Clone)]
pub struct InMemoryFeatureSource {
    /// Layers keyed by entity type name.
    layers: Arc<Mutex<BTreeMap<String, MemoryLayer>>>,
    /// Maximum page size served.
    max_page_size: usize,
}

impl InMemoryFeatureSource {
    /// Creates a source serving at most `max_page_size` records per page.
    #[must_use]
    pub fn new(max_page_size: usize) -> Self {
        Self {
            layers: Arc::new(Mutex::new(BTreeMap::new())),
            max_page_size,
        }
    }

    /// Replaces the records served for a layer.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Transport`] when the source mutex is poisoned.
    pub fn set_layer(
        &self,
        entity: &EntityType,
        fields: Vec<FieldSpec>,
        unique_id_field: impl Into<String>,
        records: Vec<FeatureRecord>,
    ) -> Result<(), SourceError> {
        let mut guard = self
            .layers
            .lock()
            .map_err(|_| SourceError::Transport("feature source mutex poisoned".to_string()))?;
        guard.insert(
            entity.as_str().to_string(),
            MemoryLayer {
                fields,
                unique_id_field: unique_id_field.into(),
                records,
            },
        );
        Ok(())
    }

    /// Runs a closure against a layer.
    fn with_layer<T>(
        &self,
        entity: &EntityType,
        f: impl FnOnce(&MemoryLayer) -> T,
    ) -> Result<T, SourceError> {
        let guard = self
            .layers
            .lock()
            .map_err(|_| SourceError::Transport("feature source mutex poisoned".to_string()))?;
        guard
            .get(entity.as_str())
            .map(f)
            .ok_or_else(|| SourceError::UnknownLayer(entity.as_str().to_string()))
    }
}

impl FeatureSource for InMemoryFeatureSource {
    fn count(&self, entity: &EntityType) -> Result<u64, SourceError> {
        self.with_layer(entity, |layer| u64::try_from(layer.records.len()).unwrap_or(u64::MAX))
    }

    fn max_page_size(&self, entity: &EntityType) -> Result<usize, SourceError> {
        self.with_layer(entity, |_| self.max_page_size)
    }

    fn page(
        &self,
        entity: &EntityType,
        offset: u64,
        page_size: usize,
    ) -> Result<SourcePage, SourceError> {
        let start = usize::try_from(offset)
            .map_err(|_| SourceError::Invalid(format!("offset out of range: {offset}")))?;
        self.with_layer(entity, |layer| {
            let take = page_size.min(self.max_page_size);
            let records: Vec<FeatureRecord> =
                layer.records.iter().skip(start).take(take).cloned().collect();
            SourcePage::from_batch(FeatureBatch {
                fields: layer.fields.clone(),
                unique_id_field: layer.unique_id_field.clone(),
                records,
            })
        })
    }
}
