// crates/fssync-arcgis/src/lib.rs
// ============================================================================
// Module: ArcGIS Feature Source
// Description: FeatureServer client and FeatureSource adapter.
// Purpose: Pull paginated layers from ArcGIS into the reconciliation engine.
// Dependencies: fssync-core, reqwest, url
// ============================================================================

//! ## Overview
//! Blocking ArcGIS REST client with bounded responses, plus the decoding that
//! turns query JSON into [`FeatureBatch`](fssync_core::FeatureBatch) pages.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod client;
pub mod decode;
pub mod source;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use client::ArcgisClient;
pub use client::ArcgisConfig;
pub use client::ArcgisError;
pub use decode::LayerInfo;
pub use decode::ServiceInfo;
pub use decode::decode_page;
pub use source::ArcgisFeatureSource;
pub use source::DEFAULT_GLOBAL_ID_FIELD;
pub use source::DEFAULT_MAX_RECORD_COUNT;
