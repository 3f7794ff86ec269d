//! HTTP request handlers for the pixel-cache avatar API.
//!
//! This module contains the Axum handlers for serving pixelated avatars,
//! inspecting and invalidating the cache, and health checks.
//!
//! # Endpoints
//!
//! - `GET /avatars/{*source_id}` - Serve a pixelated avatar
//! - `GET /cache/stats` - Cache occupancy and counters
//! - `DELETE /cache/{*source_id}` - Invalidate one key or a whole source
//! - `DELETE /cache` - Clear the cache
//! - `GET /health` - Health check endpoint

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::cache::{CacheKey, CacheStats};
use crate::config::{
    DEFAULT_AVATAR_SIZE, DEFAULT_CACHE_MAX_AGE, DEFAULT_MAX_PIXEL_SIZE, DEFAULT_PIXEL_SIZE,
};
use crate::error::{CacheError, SourceError, TransformError};
use crate::pixelate::{Pixelator, DEFAULT_MAX_DIMENSION};
use crate::presenter::{Presenter, RenderMode};
use crate::source::ImageSource;

/// Header carrying the rendition status.
pub const STATUS_HEADER: &str = "x-pixelate-status";

/// Header carrying how the request met the cache.
pub const CACHE_HEADER: &str = "x-pixelate-cache";

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the presenter.
///
/// This is passed to all handlers via Axum's State extractor.
pub struct AppState<S, P> {
    /// The presenter wrapping the transform cache
    pub presenter: Arc<Presenter<S, P>>,

    /// Cache-Control max-age in seconds for transformed images
    pub cache_max_age: u32,

    /// Largest pixel size accepted from clients
    pub max_pixel_size: u32,

    /// Largest width or height accepted from clients
    pub max_dimension: u32,
}

impl<S: ImageSource, P: Pixelator> AppState<S, P> {
    /// Create a new application state with default limits.
    pub fn new(presenter: Presenter<S, P>) -> Self {
        Self {
            presenter: Arc::new(presenter),
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            max_pixel_size: DEFAULT_MAX_PIXEL_SIZE,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    pub fn with_cache_max_age(mut self, cache_max_age: u32) -> Self {
        self.cache_max_age = cache_max_age;
        self
    }

    pub fn with_limits(mut self, max_pixel_size: u32, max_dimension: u32) -> Self {
        self.max_pixel_size = max_pixel_size;
        self.max_dimension = max_dimension;
        self
    }

    /// Reject parameters above the configured limits.
    fn check_limits(&self, pixel_size: u32, width: u32, height: u32) -> Result<(), CacheError> {
        if pixel_size > self.max_pixel_size {
            return Err(CacheError::invalid(format!(
                "pixel_size {} exceeds maximum {}",
                pixel_size, self.max_pixel_size
            )));
        }
        if width > self.max_dimension || height > self.max_dimension {
            return Err(CacheError::invalid(format!(
                "dimensions {}x{} exceed maximum {}",
                width, height, self.max_dimension
            )));
        }
        Ok(())
    }
}

impl<S, P> Clone for AppState<S, P> {
    fn clone(&self) -> Self {
        Self {
            presenter: Arc::clone(&self.presenter),
            cache_max_age: self.cache_max_age,
            max_pixel_size: self.max_pixel_size,
            max_dimension: self.max_dimension,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for avatar requests.
#[derive(Debug, Deserialize)]
pub struct AvatarQueryParams {
    /// Edge length of one pixelation block (default: 4)
    #[serde(default = "default_pixel_size")]
    pub pixel_size: u32,

    /// Output width in pixels (default: 48)
    #[serde(default = "default_avatar_size")]
    pub width: u32,

    /// Output height in pixels (default: 48)
    #[serde(default = "default_avatar_size")]
    pub height: u32,

    /// Wait for the transform instead of serving the original while pending
    #[serde(default = "default_wait")]
    pub wait: bool,
}

impl AvatarQueryParams {
    pub fn mode(&self) -> RenderMode {
        if self.wait {
            RenderMode::Wait
        } else {
            RenderMode::NoWait
        }
    }
}

/// Query parameters for cache invalidation.
#[derive(Debug, Deserialize)]
pub struct InvalidateQueryParams {
    #[serde(default = "default_pixel_size")]
    pub pixel_size: u32,

    #[serde(default = "default_avatar_size")]
    pub width: u32,

    #[serde(default = "default_avatar_size")]
    pub height: u32,

    /// Invalidate every entry derived from the source
    #[serde(default)]
    pub all: bool,
}

fn default_pixel_size() -> u32 {
    DEFAULT_PIXEL_SIZE
}

fn default_avatar_size() -> u32 {
    DEFAULT_AVATAR_SIZE
}

fn default_wait() -> bool {
    true
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "not_found", "invalid_request")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status
    pub status: String,

    /// Service version
    pub version: String,
}

/// Response from the invalidation endpoints.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemovedResponse {
    /// Number of cache entries removed
    pub removed: usize,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert CacheError to HTTP response.
///
/// This implementation logs errors appropriately based on their severity:
/// - 4xx errors are logged at WARN level (client errors)
/// - 5xx errors are logged at ERROR level (server errors)
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            // 400 Bad Request - Invalid parameters
            CacheError::InvalidRequest { reason } => (
                StatusCode::BAD_REQUEST,
                "invalid_request",
                format!("Invalid request: {}", reason),
            ),

            CacheError::SourceUnavailable(source_err) => match source_err {
                SourceError::NotFound(id) => (
                    StatusCode::NOT_FOUND,
                    "not_found",
                    format!("Image not found: {}", id),
                ),
                SourceError::InvalidId(id) => (
                    StatusCode::BAD_REQUEST,
                    "invalid_source_id",
                    format!("Invalid source id: {}", id),
                ),
                SourceError::S3(msg) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_error",
                    format!("Storage error: {}", msg),
                ),
                SourceError::Connection(msg) => (
                    StatusCode::BAD_GATEWAY,
                    "connection_error",
                    format!("Connection error: {}", msg),
                ),
            },

            CacheError::TransformFailed(transform_err) => match transform_err {
                TransformError::Decode { .. } => (
                    StatusCode::UNSUPPORTED_MEDIA_TYPE,
                    "unsupported_format",
                    transform_err.to_string(),
                ),
                TransformError::InvalidDimensions { .. } => (
                    StatusCode::BAD_REQUEST,
                    "invalid_dimensions",
                    transform_err.to_string(),
                ),
                TransformError::Encode { .. } => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "encode_error",
                    transform_err.to_string(),
                ),
            },

            CacheError::Cancelled { source_id } => (
                StatusCode::SERVICE_UNAVAILABLE,
                "cancelled",
                format!("Transform of {} was cancelled", source_id),
            ),
        };

        // Log errors based on severity
        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Resource not found: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);

        (status, Json(error_response)).into_response()
    }
}

/// Wrapper for handler errors to implement IntoResponse.
pub struct HandlerError(pub CacheError);

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

impl From<CacheError> for HandlerError {
    fn from(err: CacheError) -> Self {
        HandlerError(err)
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle avatar requests.
///
/// # Endpoint
///
/// `GET /avatars/{*source_id}?pixel_size=4&width=48&height=48&wait=true`
///
/// # Response
///
/// `200 OK` with the image bytes. `X-Pixelate-Status` tells whether the body
/// is the pixelated image or a fallback; only pixelated bodies are publicly
/// cacheable. `X-Pixelate-Cache` reports `hit`, `joined` or `miss`.
///
/// # Errors
///
/// `400 Bad Request` for empty source IDs, zero parameters, or parameters
/// above the configured limits.
pub async fn avatar_handler<S: ImageSource, P: Pixelator>(
    State(state): State<AppState<S, P>>,
    Path(source_id): Path<String>,
    Query(query): Query<AvatarQueryParams>,
) -> Result<Response, HandlerError> {
    state.check_limits(query.pixel_size, query.width, query.height)?;

    let rendition = state
        .presenter
        .present(
            &source_id,
            query.pixel_size,
            query.width,
            query.height,
            query.mode(),
        )
        .await?;

    let cache_control = if rendition.status.is_final() {
        format!("public, max-age={}", state.cache_max_age)
    } else {
        "no-store".to_string()
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, rendition.content_type.to_string()),
            (header::CACHE_CONTROL, cache_control),
            (
                HeaderName::from_static(STATUS_HEADER),
                rendition.status.as_str().to_string(),
            ),
            (
                HeaderName::from_static(CACHE_HEADER),
                rendition.lookup.as_str().to_string(),
            ),
        ],
        rendition.body,
    )
        .into_response())
}

/// Handle cache statistics requests.
///
/// # Endpoint
///
/// `GET /cache/stats`
pub async fn cache_stats_handler<S: ImageSource, P: Pixelator>(
    State(state): State<AppState<S, P>>,
) -> Json<CacheStats> {
    Json(state.presenter.cache().stats())
}

/// Handle invalidation of one key, or of every key for a source.
///
/// # Endpoint
///
/// `DELETE /cache/{*source_id}?pixel_size=4&width=48&height=48`
/// `DELETE /cache/{*source_id}?all=true`
pub async fn invalidate_handler<S: ImageSource, P: Pixelator>(
    State(state): State<AppState<S, P>>,
    Path(source_id): Path<String>,
    Query(query): Query<InvalidateQueryParams>,
) -> Result<Json<RemovedResponse>, HandlerError> {
    let cache = state.presenter.cache();

    let removed = if query.all {
        if source_id.trim().is_empty() {
            return Err(CacheError::invalid("source id must not be empty").into());
        }
        cache.invalidate_source(&source_id)
    } else {
        let key = CacheKey::new(source_id.as_str(), query.pixel_size, query.width, query.height);
        key.validate()?;
        usize::from(cache.invalidate(&key))
    };

    info!(source_id = %source_id, all = query.all, removed, "Invalidated cache entries");
    Ok(Json(RemovedResponse { removed }))
}

/// Handle clearing the whole cache.
///
/// # Endpoint
///
/// `DELETE /cache`
pub async fn clear_handler<S: ImageSource, P: Pixelator>(
    State(state): State<AppState<S, P>>,
) -> Json<RemovedResponse> {
    let removed = state.presenter.cache().clear();
    info!(removed, "Cleared cache");
    Json(RemovedResponse { removed })
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
