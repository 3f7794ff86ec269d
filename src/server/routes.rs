//! Router configuration for pixel-cache.
//!
//! This module defines the HTTP routes and applies middleware for CORS and
//! request tracing.
//!
//! # Route Structure
//!
//! ```text
//! GET    /health                  - Health check
//! GET    /avatars/{*source_id}    - Pixelated avatar
//! GET    /cache/stats             - Cache statistics
//! DELETE /cache/{*source_id}      - Invalidate one key or a whole source
//! DELETE /cache                   - Clear the cache
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pixel_cache::cache::TransformCache;
//! use pixel_cache::pixelate::BlockPixelator;
//! use pixel_cache::presenter::Presenter;
//! use pixel_cache::server::{create_router, RouterConfig};
//! use pixel_cache::source::FsImageSource;
//!
//! let cache = TransformCache::new(FsImageSource::new("./avatars"), BlockPixelator::new());
//! let config = RouterConfig::new()
//!     .with_cors_origins(vec!["https://example.com".to_string()]);
//!
//! let router = create_router(Presenter::new(cache), config);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! ```

use std::time::Duration;

use axum::{
    routing::{delete, get},
    Router,
};
use http::header::{HeaderName, CONTENT_TYPE};
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    avatar_handler, cache_stats_handler, clear_handler, health_handler, invalidate_handler,
    AppState, CACHE_HEADER, STATUS_HEADER,
};
use crate::config::{DEFAULT_CACHE_MAX_AGE, DEFAULT_MAX_PIXEL_SIZE};
use crate::pixelate::{Pixelator, DEFAULT_MAX_DIMENSION};
use crate::presenter::Presenter;
use crate::source::ImageSource;

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Allowed CORS origins (None means any origin)
    pub cors_origins: Option<Vec<String>>,

    /// Cache-Control max-age in seconds for transformed images
    pub cache_max_age: u32,

    /// Whether to enable request tracing
    pub enable_tracing: bool,

    /// Largest pixel size accepted from clients
    pub max_pixel_size: u32,

    /// Largest width or height accepted from clients
    pub max_dimension: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            cors_origins: None, // Allow any origin by default
            cache_max_age: DEFAULT_CACHE_MAX_AGE,
            enable_tracing: true,
            max_pixel_size: DEFAULT_MAX_PIXEL_SIZE,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

impl RouterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set specific allowed CORS origins.
    ///
    /// An empty list disables cross-origin access.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = Some(origins);
        self
    }

    /// Allow any CORS origin.
    pub fn with_cors_any_origin(mut self) -> Self {
        self.cors_origins = None;
        self
    }

    pub fn with_cache_max_age(mut self, seconds: u32) -> Self {
        self.cache_max_age = seconds;
        self
    }

    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }

    /// Set the request limits enforced before reaching the cache.
    pub fn with_limits(mut self, max_pixel_size: u32, max_dimension: u32) -> Self {
        self.max_pixel_size = max_pixel_size;
        self.max_dimension = max_dimension;
        self
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the HTTP router for a presenter.
pub fn create_router<S, P>(presenter: Presenter<S, P>, config: RouterConfig) -> Router
where
    S: ImageSource,
    P: Pixelator,
{
    let app_state = AppState::new(presenter)
        .with_cache_max_age(config.cache_max_age)
        .with_limits(config.max_pixel_size, config.max_dimension);

    let cors = build_cors_layer(&config);

    let router = Router::new()
        .route("/health", get(health_handler))
        .route("/avatars/{*source_id}", get(avatar_handler::<S, P>))
        .route("/cache/stats", get(cache_stats_handler::<S, P>))
        .route("/cache", delete(clear_handler::<S, P>))
        .route("/cache/{*source_id}", delete(invalidate_handler::<S, P>))
        .with_state(app_state)
        .layer(cors);

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Build the CORS layer based on configuration.
fn build_cors_layer(config: &RouterConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::HEAD, Method::DELETE, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .expose_headers([
            HeaderName::from_static(STATUS_HEADER),
            HeaderName::from_static(CACHE_HEADER),
        ])
        .max_age(Duration::from_secs(86400)); // 24 hours

    match &config.cors_origins {
        None => cors.allow_origin(Any),
        Some(origins) if origins.is_empty() => cors,
        Some(origins) => {
            let parsed_origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            cors.allow_origin(parsed_origins)
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
