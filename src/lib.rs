//! # pixel-cache
//!
//! Pixelated avatars served from a keyed, bounded, single-flight transform
//! cache.
//!
//! Every distinct `(source_id, pixel_size, width, height)` request is fetched
//! and pixelated at most once while it is cached, no matter how many callers
//! ask for it concurrently. Callers that arrive while a computation is in
//! flight join it and receive the same result, success or failure.
//!
//! ## Features
//!
//! - **Single-flight**: concurrent requests for one key share one fetch and
//!   one transform
//! - **Bounded memory**: LRU eviction by entry count and encoded bytes
//! - **Graceful degradation**: the untransformed image or a placeholder is
//!   served while a transform is pending or after it failed
//! - **Pluggable sources**: local directories and S3-compatible buckets
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`source`] - Image sources (filesystem, S3)
//! - [`pixelate`] - The block-averaging pixelation transform
//! - [`cache`] - The single-flight transform cache
//! - [`presenter`] - Fallback-aware presentation on top of the cache
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use pixel_cache::{BlockPixelator, FsImageSource, TransformCache};
//!
//! #[tokio::main]
//! async fn main() {
//!     let cache = TransformCache::new(FsImageSource::new("./avatars"), BlockPixelator::new());
//!
//!     let handle = cache.request("avatar-1.png", 4, 48, 48).unwrap();
//!     match handle.await {
//!         Ok(image) => println!("{} bytes of {}", image.len(), image.content_type()),
//!         Err(e) => eprintln!("transform failed: {}", e),
//!     }
//! }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod pixelate;
pub mod presenter;
pub mod server;
pub mod source;

// Re-export commonly used types
pub use cache::{
    CacheKey, CacheStats, Lookup, TransformCache, TransformHandle, TransformResult,
    DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_ENTRIES,
};
pub use config::{parse_size, Cli, Command, RenderConfig, ServeConfig, SourceBackend};
pub use error::{CacheError, SourceError, TransformError};
pub use pixelate::{
    clamp_quality, is_valid_quality, pixelate_blocks, placeholder, BlockPixelator, OutputFormat,
    PixelateParams, Pixelator, TransformedImage, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_DIMENSION,
    MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use presenter::{sniff_content_type, Presenter, RenderMode, Rendition, RenditionStatus};
pub use server::{
    avatar_handler, cache_stats_handler, clear_handler, create_router, health_handler,
    invalidate_handler, AppState, AvatarQueryParams, ErrorResponse, HealthResponse,
    InvalidateQueryParams, RemovedResponse, RouterConfig,
};
pub use source::{create_s3_client, FsImageSource, ImageSource, S3ImageSource};
