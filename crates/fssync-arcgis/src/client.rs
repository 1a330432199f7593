// crates/fssync-arcgis/src/client.rs
// ============================================================================
// Module: ArcGIS Client
// Description: Bounded blocking requests against one FeatureServer.
// Purpose: Fetch service metadata, record counts, and raw query pages.
// Dependencies: reqwest, url, serde_json
// ============================================================================

//! ## Overview
//! The client issues GET requests with a fixed user agent, a request timeout,
//! redirects disabled, and a hard limit on response size. Every response is
//! parsed as JSON and checked for an ArcGIS `error` document before it is
//! handed to callers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::io::Read;
use std::time::Duration;

use fssync_core::SourceError;
use reqwest::blocking::Client;
use reqwest::blocking::Response;
use reqwest::redirect::Policy;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::decode::CountResponse;
use crate::decode::ServiceInfo;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Default request timeout in milliseconds.
const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// Default response size limit in bytes.
const DEFAULT_MAX_RESPONSE_BYTES: usize = 16 * 1024 * 1024;
/// Default user agent for outbound requests.
const DEFAULT_USER_AGENT: &str = concat!("fssync/", env!("CARGO_PKG_VERSION"));

/// Connection settings for one FeatureServer.
///
/// # Invariants
/// - `service_root` is an absolute `http` or `https` URL.
/// - `max_response_bytes` is a hard upper bound on response bodies.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArcgisConfig {
    /// Root URL of the ArcGIS host, e.g. `https://services.arcgis.com`.
    pub service_root: String,
    /// Tenant (organization) identifier, inserted before `/arcgis`.
    #[serde(default)]
    pub tenant_id: String,
    /// Feature service name.
    pub service: String,
    /// Access token sent as the `token` query parameter.
    #[serde(default)]
    pub token: Option<String>,
    /// Request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Maximum response size allowed, in bytes.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
    /// User agent string for outbound requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl ArcgisConfig {
    /// Creates a configuration with default limits and no token.
    #[must_use]
    pub fn new(
        service_root: impl Into<String>,
        tenant_id: impl Into<String>,
        service: impl Into<String>,
    ) -> Self {
        Self {
            service_root: service_root.into(),
            tenant_id: tenant_id.into(),
            service: service.into(),
            token: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            user_agent: default_user_agent(),
        }
    }
}

impl fmt::Debug for ArcgisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArcgisConfig")
            .field("service_root", &self.service_root)
            .field("tenant_id", &self.tenant_id)
            .field("service", &self.service)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout_ms", &self.timeout_ms)
            .field("max_response_bytes", &self.max_response_bytes)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Serde default for `timeout_ms`.
const fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Serde default for `max_response_bytes`.
const fn default_max_response_bytes() -> usize {
    DEFAULT_MAX_RESPONSE_BYTES
}

/// Serde default for `user_agent`.
fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// ArcGIS client errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArcgisError {
    /// Request could not be sent or the body could not be read.
    #[error("arcgis transport error: {0}")]
    Transport(String),
    /// The service answered with an error status or error document.
    #[error("arcgis remote error: {0}")]
    Remote(String),
    /// The response was not the expected JSON shape.
    #[error("arcgis decode error: {0}")]
    Decode(String),
    /// The layer is not published by the service.
    #[error("arcgis layer not found: {0}")]
    UnknownLayer(String),
    /// Configuration or request parameters were invalid.
    #[error("arcgis invalid request: {0}")]
    Invalid(String),
    /// Local file I/O failed.
    #[error("arcgis io error: {0}")]
    Io(String),
}

impl From<ArcgisError> for SourceError {
    fn from(error: ArcgisError) -> Self {
        match error {
            ArcgisError::Transport(message) | ArcgisError::Io(message) => Self::Transport(message),
            ArcgisError::Remote(message) => Self::Remote(message),
            ArcgisError::Decode(message) => Self::Decode(message),
            ArcgisError::UnknownLayer(message) => Self::UnknownLayer(message),
            ArcgisError::Invalid(message) => Self::Invalid(message),
        }
    }
}

// ============================================================================
// SECTION: Client
// ============================================================================

/// Blocking client bound to one FeatureServer.
#[derive(Clone)]
pub struct ArcgisClient {
    /// `<root>/<tenant>/arcgis/rest/services/<service>/FeatureServer`.
    service_url: Url,
    /// Optional access token.
    token: Option<String>,
    /// Response size limit in bytes.
    max_response_bytes: usize,
    /// HTTP client used for outbound requests.
    http: Client,
}

impl fmt::Debug for ArcgisClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArcgisClient")
            .field("service_url", &self.service_url.as_str())
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("max_response_bytes", &self.max_response_bytes)
            .finish_non_exhaustive()
    }
}

impl ArcgisClient {
    /// Builds a client for the configured service.
    ///
    /// # Errors
    ///
    /// Returns [`ArcgisError::Invalid`] when the service URL is malformed or the
    /// HTTP client cannot be constructed.
    pub fn new(config: &ArcgisConfig) -> Result<Self, ArcgisError> {
        if config.service.trim().is_empty() {
            return Err(ArcgisError::Invalid("service name is required".to_string()));
        }
        if config.max_response_bytes == 0 {
            return Err(ArcgisError::Invalid(
                "max_response_bytes must be greater than zero".to_string(),
            ));
        }
        let service_url = service_url(config)?;
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .redirect(Policy::none())
            .build()
            .map_err(|err| ArcgisError::Invalid(format!("http client build failed: {err}")))?;
        Ok(Self {
            service_url,
            token: config.token.clone().filter(|token| !token.is_empty()),
            max_response_bytes: config.max_response_bytes,
            http,
        })
    }

    /// Returns the FeatureServer URL.
    #[must_use]
    pub const fn service_url(&self) -> &Url {
        &self.service_url
    }

    /// Fetches the service description.
    ///
    /// # Errors
    ///
    /// Returns [`ArcgisError`] when the request fails or the body is malformed.
    pub fn service_info(&self) -> Result<ServiceInfo, ArcgisError> {
        let url = self.url(&[], &[]);
        let body = self.get_json(&url)?;
        serde_json::from_value(body)
            .map_err(|err| ArcgisError::Decode(format!("service info: {err}")))
    }

    /// Counts all records in a layer.
    ///
    /// # Errors
    ///
    /// Returns [`ArcgisError`] when the request fails or the body is malformed.
    pub fn count(&self, layer_id: u32) -> Result<u64, ArcgisError> {
        let layer = layer_id.to_string();
        let url = self.url(
            &[layer.as_str(), "query"],
            &[("where", "1=1"), ("returnCountOnly", "true")],
        );
        let body = self.get_json(&url)?;
        let response: CountResponse = serde_json::from_value(body)
            .map_err(|err| ArcgisError::Decode(format!("count response: {err}")))?;
        Ok(response.count)
    }

    /// Fetches one page of a layer as raw JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ArcgisError`] when the request fails or the service reports an error.
    pub fn query_page(
        &self,
        layer_id: u32,
        offset: u64,
        record_count: usize,
    ) -> Result<Value, ArcgisError> {
        let layer = layer_id.to_string();
        let offset_text = offset.to_string();
        let count_text = record_count.to_string();
        let url = self.url(
            &[layer.as_str(), "query"],
            &[
                ("where", "1=1"),
                ("outFields", "*"),
                ("outSR", "4326"),
                ("resultOffset", offset_text.as_str()),
                ("resultRecordCount", count_text.as_str()),
            ],
        );
        debug!(layer_id, offset, record_count, "arcgis page request");
        self.get_json(&url)
    }

    /// Builds a request URL below the service with `f=json` and the token appended.
    fn url(&self, segments: &[&str], params: &[(&str, &str)]) -> Url {
        let mut url = self.service_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            query.append_pair("f", "json");
            if let Some(token) = &self.token {
                query.append_pair("token", token);
            }
        }
        url
    }

    /// Sends a GET request and returns the decoded JSON body.
    fn get_json(&self, url: &Url) -> Result<Value, ArcgisError> {
        let mut response = self
            .http
            .get(url.as_str())
            .send()
            .map_err(|err| ArcgisError::Transport(err.without_url().to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ArcgisError::Remote(format!("http status {}", status.as_u16())));
        }
        let bytes = read_response_limited(&mut response, self.max_response_bytes)?;
        let body: Value = serde_json::from_slice(&bytes)
            .map_err(|err| ArcgisError::Decode(format!("response is not json: {err}")))?;
        check_error_document(&body)?;
        Ok(body)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the FeatureServer URL from configuration.
fn service_url(config: &ArcgisConfig) -> Result<Url, ArcgisError> {
    let mut url = Url::parse(config.service_root.trim())
        .map_err(|err| ArcgisError::Invalid(format!("invalid service root: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ArcgisError::Invalid("service root must be http or https".to_string()));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(ArcgisError::Invalid("service root must not embed credentials".to_string()));
    }
    url.set_query(None);
    url.set_fragment(None);
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| ArcgisError::Invalid("service root cannot be a base url".to_string()))?;
        path.pop_if_empty();
        if !config.tenant_id.is_empty() {
            path.push(&config.tenant_id);
        }
        path.extend(["arcgis", "rest", "services"]).push(&config.service).push("FeatureServer");
    }
    Ok(url)
}

/// Maps an ArcGIS `error` document to [`ArcgisError::Remote`].
fn check_error_document(body: &Value) -> Result<(), ArcgisError> {
    let Some(error) = body.get("error") else {
        return Ok(());
    };
    let code = error.get("code").and_then(Value::as_i64);
    let message = error.get("message").and_then(Value::as_str).unwrap_or("unspecified error");
    Err(ArcgisError::Remote(code.map_or_else(
        || message.to_string(),
        |code| format!("code {code}: {message}"),
    )))
}

/// Reads the response body while enforcing a byte limit.
fn read_response_limited(
    response: &mut Response,
    max_bytes: usize,
) -> Result<Vec<u8>, ArcgisError> {
    let max_bytes_u64 = u64::try_from(max_bytes)
        .map_err(|_| ArcgisError::Invalid("response size limit exceeds u64".to_string()))?;
    if let Some(expected) = response.content_length()
        && expected > max_bytes_u64
    {
        return Err(ArcgisError::Transport("response exceeds size limit".to_string()));
    }
    let mut buf = Vec::new();
    response
        .take(max_bytes_u64.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(|err| ArcgisError::Transport(format!("failed to read response: {err}")))?;
    if buf.len() > max_bytes {
        return Err(ArcgisError::Transport("response exceeds size limit".to_string()));
    }
    Ok(buf)
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::use_debug, reason = "Test-only assertions.")]

    use serde_json::json;

    use super::ArcgisClient;
    use super::ArcgisConfig;
    use super::ArcgisError;
    use super::check_error_document;

    #[test]
    fn service_url_joins_tenant_and_service() {
        let config = ArcgisConfig::new("https://example.test/", "abc123", "FieldSeeker");
        let client = ArcgisClient::new(&config).unwrap();
        assert_eq!(
            client.service_url().as_str(),
            "https://example.test/abc123/arcgis/rest/services/FieldSeeker/FeatureServer"
        );
    }

    #[test]
    fn token_and_format_are_appended_to_queries() {
        let mut config = ArcgisConfig::new("https://example.test", "t", "svc");
        config.token = Some("s3cret".to_string());
        let client = ArcgisClient::new(&config).unwrap();
        let url = client.url(&["3", "query"], &[("where", "1=1")]);
        assert_eq!(url.path(), "/t/arcgis/rest/services/svc/FeatureServer/3/query");
        assert_eq!(url.query(), Some("where=1%3D1&f=json&token=s3cret"));
    }

    #[test]
    fn non_http_roots_are_rejected() {
        let config = ArcgisConfig::new("ftp://example.test", "t", "svc");
        let err = ArcgisClient::new(&config).unwrap_err();
        assert!(matches!(err, ArcgisError::Invalid(_)));
    }

    #[test]
    fn error_documents_become_remote_errors() {
        let body = json!({"error": {"code": 498, "message": "Invalid token."}});
        assert_eq!(
            check_error_document(&body),
            Err(ArcgisError::Remote("code 498: Invalid token.".to_string()))
        );
        assert!(check_error_document(&json!({"count": 3})).is_ok());
    }

    #[test]
    fn debug_output_hides_the_token() {
        let mut config = ArcgisConfig::new("https://example.test", "t", "svc");
        config.token = Some("s3cret".to_string());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }
}
