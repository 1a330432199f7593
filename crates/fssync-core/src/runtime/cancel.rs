// crates/fssync-core/src/runtime/cancel.rs
// ============================================================================
// Module: Cancellation
// Description: Shared flag checked by the engine between pages.
// Purpose: Stop a run at a page boundary without tearing a write.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Cancellation is coarse: the engine only checks the flag before fetching a
//! page, so a page is either fully reconciled or not started.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

// ============================================================================
// SECTION: Flag
// ============================================================================

/// Clonable cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    /// Shared cancellation state.
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    /// Creates a flag that is not yet cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
