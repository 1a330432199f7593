// crates/fssync-arcgis/src/source.rs
// ============================================================================
// Module: ArcGIS Feature Source
// Description: FeatureSource implementation over one FeatureServer.
// Purpose: Resolve layers by name and serve counts and decoded pages.
// Dependencies: fssync-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! The source fetches the service description once at connect time. Entity
//! types are layer (or table) names; each request resolves the name to the
//! layer id advertised by the service.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;

use fssync_core::EntityType;
use fssync_core::FeatureSource;
use fssync_core::SourceError;
use fssync_core::SourcePage;
use tracing::info;

use crate::client::ArcgisClient;
use crate::client::ArcgisConfig;
use crate::client::ArcgisError;
use crate::decode::LayerInfo;
use crate::decode::ServiceInfo;
use crate::decode::decode_page;

// ============================================================================
// SECTION: Source
// ============================================================================

/// Page size assumed when the service does not advertise `maxRecordCount`.
pub const DEFAULT_MAX_RECORD_COUNT: usize = 1000;
/// Attribute carried as the external identity unless configured otherwise.
pub const DEFAULT_GLOBAL_ID_FIELD: &str = "GlobalID";

/// Feature source backed by an ArcGIS FeatureServer.
#[derive(Debug, Clone)]
pub struct ArcgisFeatureSource {
    /// HTTP client bound to the service.
    client: ArcgisClient,
    /// Service description fetched at connect time.
    service: ServiceInfo,
    /// Attribute used as the external identity.
    global_id_field: String,
}

impl ArcgisFeatureSource {
    /// Connects to the service and loads its description.
    ///
    /// # Errors
    ///
    /// Returns [`ArcgisError`] when the client cannot be built or the service
    /// description cannot be fetched.
    pub fn connect(
        config: &ArcgisConfig,
        global_id_field: impl Into<String>,
    ) -> Result<Self, ArcgisError> {
        let client = ArcgisClient::new(config)?;
        let service = client.service_info()?;
        info!(
            service = %client.service_url(),
            layers = service.layers.len(),
            tables = service.tables.len(),
            "arcgis service connected"
        );
        Ok(Self::with_service(client, service, global_id_field))
    }

    /// Builds a source from an already fetched service description.
    #[must_use]
    pub fn with_service(
        client: ArcgisClient,
        service: ServiceInfo,
        global_id_field: impl Into<String>,
    ) -> Self {
        Self {
            client,
            service,
            global_id_field: global_id_field.into(),
        }
    }

    /// Returns the service description.
    #[must_use]
    pub const fn service(&self) -> &ServiceInfo {
        &self.service
    }

    /// Resolves a layer by entity type.
    ///
    /// # Errors
    ///
    /// Returns [`ArcgisError::UnknownLayer`] when the service does not publish it.
    pub fn layer(&self, entity: &EntityType) -> Result<&LayerInfo, ArcgisError> {
        self.service
            .find(entity.as_str())
            .ok_or_else(|| ArcgisError::UnknownLayer(entity.as_str().to_string()))
    }

    /// Resolves requested layer names, or every published layer when none are given.
    ///
    /// Names are returned with the service's spelling.
    ///
    /// # Errors
    ///
    /// Returns [`ArcgisError::UnknownLayer`] listing every name the service lacks.
    pub fn resolve_layers(&self, requested: &[String]) -> Result<Vec<EntityType>, ArcgisError> {
        if requested.is_empty() {
            let all = self.service.all_layers().map(|layer| EntityType::new(&*layer.name));
            return Ok(all.collect());
        }
        let mut resolved = Vec::with_capacity(requested.len());
        let mut missing = Vec::new();
        for name in requested {
            match self.service.find(name) {
                Some(layer) => resolved.push(EntityType::new(&*layer.name)),
                None => missing.push(name.as_str()),
            }
        }
        if !missing.is_empty() {
            return Err(ArcgisError::UnknownLayer(missing.join(", ")));
        }
        Ok(resolved)
    }

    /// Saves a one-record query per layer as `<dir>/<layer>.json`.
    ///
    /// Returns the written paths in service order.
    ///
    /// # Errors
    ///
    /// Returns [`ArcgisError`] when a query fails, a layer name is not a safe
    /// file name, or a file cannot be written.
    pub fn download_schemas(&self, dir: &Path) -> Result<Vec<PathBuf>, ArcgisError> {
        fs::create_dir_all(dir).map_err(|err| ArcgisError::Io(err.to_string()))?;
        let mut written = Vec::new();
        for layer in self.service.all_layers() {
            if !is_safe_file_stem(&layer.name) {
                return Err(ArcgisError::Invalid(format!(
                    "layer name is not a safe file name: {}",
                    layer.name
                )));
            }
            let body = self.client.query_page(layer.id, 0, 1)?;
            let bytes = serde_json::to_vec_pretty(&body)
                .map_err(|err| ArcgisError::Decode(err.to_string()))?;
            let path = dir.join(format!("{}.json", layer.name));
            fs::write(&path, bytes).map_err(|err| ArcgisError::Io(err.to_string()))?;
            info!(layer = %layer.name, id = layer.id, path = %path.display(), "schema saved");
            written.push(path);
        }
        Ok(written)
    }

    /// Returns the service page limit.
    fn max_record_count(&self) -> usize {
        self.service
            .max_record_count
            .and_then(|count| usize::try_from(count).ok())
            .filter(|count| *count > 0)
            .unwrap_or(DEFAULT_MAX_RECORD_COUNT)
    }
}

impl FeatureSource for ArcgisFeatureSource {
    fn count(&self, entity: &EntityType) -> Result<u64, SourceError> {
        let layer = self.layer(entity)?;
        Ok(self.client.count(layer.id)?)
    }

    fn max_page_size(&self, entity: &EntityType) -> Result<usize, SourceError> {
        self.layer(entity)?;
        Ok(self.max_record_count())
    }

    fn page(
        &self,
        entity: &EntityType,
        offset: u64,
        page_size: usize,
    ) -> Result<SourcePage, SourceError> {
        if page_size == 0 {
            return Err(SourceError::Invalid("page size must be greater than zero".to_string()));
        }
        let layer = self.layer(entity)?;
        let raw = self.client.query_page(layer.id, offset, page_size)?;
        match decode_page(&raw, &self.global_id_field) {
            Ok(batch) => Ok(SourcePage {
                batch,
                raw: Some(raw),
            }),
            Err(err) => Err(SourceError::MalformedPage {
                message: err.to_string(),
                raw: Box::new(raw),
            }),
        }
    }
}

/// Returns true when a layer name can be used verbatim as a file stem.
fn is_safe_file_stem(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.chars().any(|ch| matches!(ch, '/' | '\\' | ':' | '\0'))
}
