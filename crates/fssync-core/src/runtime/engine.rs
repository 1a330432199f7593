// crates/fssync-core/src/runtime/engine.rs
// ============================================================================
// Module: Reconciliation Engine
// Description: Pagination loop driving snapshot, diff, and write per page.
// Purpose: Reconcile one entity type from a feature source into a sync store.
// Dependencies: crate::{core, interfaces, runtime}, thiserror, tracing
// ============================================================================

//! ## Overview
//! A run moves through `Start -> FetchCount -> (FetchPage -> CompareAndWrite)*
//! -> Done`, or to `Aborted` from any state on a fatal error. The total count
//! is fetched once; the offset advances by the number of records a page
//! actually returned. Pages are processed strictly in sequence, and records
//! within a page are written one transaction at a time.
//!
//! Records the diff engine cannot compare, or whose values cannot be bound,
//! are skipped and logged; they never abort the run. Every other failure
//! aborts: the page in flight is persisted as a recovery artifact and the
//! counts accumulated so far are returned inside [`SyncFailure`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::core::EntityLayout;
use crate::core::EntityType;
use crate::core::FeatureBatch;
use crate::core::FeatureRecord;
use crate::core::LayoutError;
use crate::core::RecordFault;
use crate::core::SyncRunResult;
use crate::core::TableNaming;
use crate::core::UnsupportedAttributeType;
use crate::interfaces::FeatureSource;
use crate::interfaces::SourceError;
use crate::interfaces::StoreError;
use crate::interfaces::SyncStore;
use crate::runtime::cancel::CancellationFlag;
use crate::runtime::diff::Decision;
use crate::runtime::diff::classify;
use crate::runtime::recovery::RecoveryArtifact;
use crate::runtime::recovery::write_artifact;
use crate::runtime::writer::DEFAULT_CONFLICT_RETRIES;
use crate::runtime::writer::VersionWriter;
use crate::runtime::writer::WriteError;
use crate::runtime::writer::WriteOutcome;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Reconciler configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    /// Table naming prefixes.
    pub naming: TableNaming,
    /// Upper bound on the page size; the source maximum applies when unset.
    pub page_size: Option<usize>,
    /// Retries allowed after a uniqueness conflict.
    pub conflict_retries: u32,
    /// Where to persist the page in flight on abort; disabled when unset.
    pub recovery_path: Option<PathBuf>,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            naming: TableNaming::default(),
            page_size: None,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
            recovery_path: None,
        }
    }
}

/// Per-run options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Offset of the first page.
    pub start_offset: u64,
    /// Flag checked before each page fetch.
    pub cancel: Option<CancellationFlag>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Phase of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Not started.
    Start,
    /// Fetching the total count.
    FetchCount,
    /// Fetching a page.
    FetchPage,
    /// Comparing and writing a page.
    CompareAndWrite,
    /// Finished successfully.
    Done,
    /// Stopped by a fatal error.
    Aborted,
}

impl RunPhase {
    /// Returns a stable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::FetchCount => "fetch_count",
            Self::FetchPage => "fetch_page",
            Self::CompareAndWrite => "compare_and_write",
            Self::Done => "done",
            Self::Aborted => "aborted",
        }
    }
}

/// Fatal reconciliation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// The feature source call failed.
    #[error("source fetch failed: {0}")]
    SourceFetch(SourceError),
    /// Bulk snapshot read failed.
    #[error("snapshot read failed: {0}")]
    SnapshotRead(StoreError),
    /// Table provisioning failed.
    #[error("schema provisioning failed: {0}")]
    Schema(StoreError),
    /// The page's fields do not form a valid layout.
    #[error("invalid layout: {0}")]
    Layout(LayoutError),
    /// A record write failed.
    #[error("write failed for object {object_id}: {source}")]
    Write {
        /// Object id of the record.
        object_id: i64,
        /// Underlying writer error.
        source: WriteError,
    },
    /// The run was cancelled between pages.
    #[error("run cancelled at offset {offset}")]
    Cancelled {
        /// Offset of the next page that would have been fetched.
        offset: u64,
    },
}

/// A run that stopped before consuming the total count.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct SyncFailure {
    /// Error that stopped the run.
    pub error: SyncError,
    /// Phase the run was in when it stopped.
    pub phase: RunPhase,
    /// Counts accumulated before the failure.
    pub partial: SyncRunResult,
    /// Recovery artifact written for the failed page, if any.
    pub recovery_path: Option<PathBuf>,
}

// ============================================================================
// SECTION: Reconciler
// ============================================================================

/// Drives full reconciliation runs.
#[derive(Debug)]
pub struct Reconciler<'a, Src: FeatureSource + ?Sized, St: SyncStore + ?Sized> {
    /// Feature source.
    source: &'a Src,
    /// Destination store.
    store: &'a St,
    /// Reconciler configuration.
    config: ReconcilerConfig,
}

impl<'a, Src: FeatureSource + ?Sized, St: SyncStore + ?Sized> Reconciler<'a, Src, St> {
    /// Creates a reconciler over a source and a store.
    #[must_use]
    pub const fn new(source: &'a Src, store: &'a St, config: ReconcilerConfig) -> Self {
        Self {
            source,
            store,
            config,
        }
    }

    /// Runs one full pagination pass for an entity type.
    ///
    /// # Errors
    ///
    /// Returns [`SyncFailure`] on any fatal error or cancellation.
    pub fn run(
        &self,
        entity: &EntityType,
        options: &RunOptions,
    ) -> Result<SyncRunResult, Box<SyncFailure>> {
        let mut run = RunTracker::new(entity, options.start_offset);
        run.enter(RunPhase::FetchCount);
        let total = match self.source.count(entity) {
            Ok(total) => total,
            Err(err) => return Err(self.abort(run, SyncError::SourceFetch(err), 0, None, None)),
        };
        info!(entity = %entity, total, offset = run.offset, "starting reconciliation");
        if total == 0 {
            run.enter(RunPhase::Done);
            return Ok(run.result);
        }
        let page_size = match self.effective_page_size(entity) {
            Ok(size) => size,
            Err(err) => return Err(self.abort(run, SyncError::SourceFetch(err), 0, None, None)),
        };

        let mut applier = PageApplier::new(self.store, &self.config);
        while run.offset < total {
            if options.cancel.as_ref().is_some_and(CancellationFlag::is_cancelled) {
                let offset = run.offset;
                let error = SyncError::Cancelled { offset };
                return Err(self.abort(run, error, page_size, None, None));
            }
            run.enter(RunPhase::FetchPage);
            let page = match self.source.page(entity, run.offset, page_size) {
                Ok(page) => page,
                Err(err) => {
                    let raw = err.raw_payload().cloned();
                    let error = SyncError::SourceFetch(err);
                    return Err(self.abort(run, error, page_size, None, raw));
                }
            };
            if page.batch.is_empty() {
                warn!(
                    entity = %entity,
                    offset = run.offset,
                    total,
                    "source returned an empty page before the count was reached"
                );
                break;
            }
            run.enter(RunPhase::CompareAndWrite);
            if let Err(err) = applier.apply(entity, &page.batch, run.offset, &mut run.result) {
                return Err(self.abort(run, err, page_size, Some(page.batch), page.raw));
            }
            run.result.pages += 1;
            let returned = u64::try_from(page.batch.len()).unwrap_or(u64::MAX);
            run.offset = run.offset.saturating_add(returned);
            debug!(
                entity = %entity,
                offset = run.offset,
                total,
                inserts = run.result.inserts,
                updates = run.result.updates,
                "page reconciled"
            );
        }
        run.enter(RunPhase::Done);
        info!(
            entity = %entity,
            "{} inserts, {} updates, {} no change",
            run.result.inserts,
            run.result.updates,
            run.result.unchanged
        );
        if run.result.skipped > 0 {
            warn!(entity = %entity, skipped = run.result.skipped, "records skipped");
        }
        Ok(run.result)
    }

    /// Returns the page size to request: the source maximum, capped by config.
    fn effective_page_size(&self, entity: &EntityType) -> Result<usize, SourceError> {
        let max = self.source.max_page_size(entity)?;
        if max == 0 {
            return Err(SourceError::Invalid("source reports a zero page size".to_string()));
        }
        Ok(self.config.page_size.map_or(max, |cap| cap.clamp(1, max)))
    }

    /// Stops a run, persisting the page in flight when configured.
    fn abort(
        &self,
        mut run: RunTracker,
        error: SyncError,
        page_size: usize,
        batch: Option<FeatureBatch>,
        raw_page: Option<Value>,
    ) -> Box<SyncFailure> {
        let phase = run.phase;
        run.enter(RunPhase::Aborted);
        error!(
            entity = %run.result.entity_type,
            offset = run.offset,
            phase = phase.as_str(),
            error = %error,
            "reconciliation aborted"
        );
        let recovery_path = self.config.recovery_path.as_ref().and_then(|path| {
            let artifact = RecoveryArtifact {
                entity_type: run.result.entity_type.clone(),
                offset: run.offset,
                page_size,
                error: error.to_string(),
                batch,
                raw_page,
            };
            match write_artifact(path, &artifact) {
                Ok(()) => {
                    error!(path = %path.display(), "recovery artifact written");
                    Some(path.clone())
                }
                Err(err) => {
                    error!(path = %path.display(), error = %err, "recovery artifact not written");
                    None
                }
            }
        });
        Box::new(SyncFailure {
            error,
            phase,
            partial: run.result,
            recovery_path,
        })
    }
}

/// Reconciles a single stored page, as when replaying a recovery artifact.
///
/// # Errors
///
/// Returns [`SyncError`] on the first fatal error; counts up to that point are
/// discarded because the page is expected to be replayed again.
pub fn reconcile_batch<St: SyncStore + ?Sized>(
    store: &St,
    config: &ReconcilerConfig,
    entity: &EntityType,
    batch: &FeatureBatch,
    offset: u64,
) -> Result<SyncRunResult, SyncError> {
    let mut result = SyncRunResult::new(entity.clone());
    let mut applier = PageApplier::new(store, config);
    applier.apply(entity, batch, offset, &mut result)?;
    result.pages = 1;
    Ok(result)
}

// ============================================================================
// SECTION: Run Tracking
// ============================================================================

/// Mutable state of one run.
struct RunTracker {
    /// Current phase.
    phase: RunPhase,
    /// Offset of the next page.
    offset: u64,
    /// Counters so far.
    result: SyncRunResult,
}

impl RunTracker {
    /// Starts tracking a run.
    fn new(entity: &EntityType, offset: u64) -> Self {
        Self {
            phase: RunPhase::Start,
            offset,
            result: SyncRunResult::new(entity.clone()),
        }
    }

    /// Moves to a new phase.
    fn enter(&mut self, phase: RunPhase) {
        debug!(
            entity = %self.result.entity_type,
            from = self.phase.as_str(),
            to = phase.as_str(),
            "run phase"
        );
        self.phase = phase;
    }
}

// ============================================================================
// SECTION: Page Application
// ============================================================================

/// Applies pages against a store, provisioning schema as layouts evolve.
struct PageApplier<'a, St: SyncStore + ?Sized> {
    /// Destination store.
    store: &'a St,
    /// Reconciler configuration.
    config: &'a ReconcilerConfig,
    /// Layout last provisioned in the store.
    active: Option<EntityLayout>,
}

impl<'a, St: SyncStore + ?Sized> PageApplier<'a, St> {
    /// Creates an applier with no provisioned layout.
    const fn new(store: &'a St, config: &'a ReconcilerConfig) -> Self {
        Self {
            store,
            config,
            active: None,
        }
    }

    /// Snapshots, diffs, and writes one page.
    fn apply(
        &mut self,
        entity: &EntityType,
        batch: &FeatureBatch,
        offset: u64,
        result: &mut SyncRunResult,
    ) -> Result<(), SyncError> {
        let layout = self.resolve_layout(entity, batch)?;
        let object_ids = batch.object_ids();
        if object_ids.is_empty() {
            return Ok(());
        }
        let snapshots =
            self.store.load_snapshots(&layout, &object_ids).map_err(SyncError::SnapshotRead)?;
        let writer = VersionWriter::new(self.store, self.config.conflict_retries);
        for record in &batch.records {
            let decision = match classify(snapshots.get(&record.object_id), record) {
                Ok(decision) => decision,
                Err(fault) => {
                    skip_record(result, record, offset, fault);
                    continue;
                }
            };
            if decision == Decision::Unchanged {
                result.unchanged += 1;
                continue;
            }
            match writer.apply(&layout, record, decision) {
                Ok(WriteOutcome::Inserted) => result.inserts += 1,
                Ok(WriteOutcome::Updated(version)) => {
                    debug!(object = %record.label(), version, "record updated");
                    result.updates += 1;
                }
                Ok(WriteOutcome::Unchanged) => result.unchanged += 1,
                Err(WriteError::Unsupported(fault)) => skip_record(result, record, offset, fault),
                Err(source) => {
                    return Err(SyncError::Write {
                        object_id: record.object_id,
                        source,
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns the layout to write with, provisioning the store when it grows.
    fn resolve_layout(
        &mut self,
        entity: &EntityType,
        batch: &FeatureBatch,
    ) -> Result<EntityLayout, SyncError> {
        let incoming = EntityLayout::from_batch(entity, &self.config.naming, batch)
            .map_err(SyncError::Layout)?;
        let base = match &self.active {
            Some(active) => Some(active.clone()),
            None => self.store.stored_layout(entity).map_err(SyncError::Schema)?,
        };
        let merged = match base {
            Some(base) if same_tables(&base, &incoming) => base.merged_with(&incoming),
            _ => incoming,
        };
        if self.active.as_ref() != Some(&merged) {
            self.store.ensure_schema(&merged).map_err(SyncError::Schema)?;
            self.active = Some(merged.clone());
        }
        Ok(merged)
    }
}

/// Returns true when two layouts address the same tables and identity.
fn same_tables(left: &EntityLayout, right: &EntityLayout) -> bool {
    left.current_table == right.current_table
        && left.history_table == right.history_table
        && left.identity_column == right.identity_column
}

/// Counts and logs a skipped record.
fn skip_record(
    result: &mut SyncRunResult,
    record: &FeatureRecord,
    offset: u64,
    fault: UnsupportedAttributeType,
) {
    warn!(
        entity = %result.entity_type,
        object = %record.label(),
        column = %fault.column,
        error = %fault,
        "record skipped"
    );
    result.skipped += 1;
    result.faults.push(RecordFault {
        object_id: record.object_id,
        external_id: record.external_id.clone(),
        page_offset: offset,
        error: fault,
    });
}
