//! Image source layer.
//!
//! Sources supply the raw, still-encoded bytes of an image given its source
//! identifier. The transform cache calls a source at most once per in-flight
//! cache key, and the presenter calls it again only to serve an untransformed
//! fallback.
//!
//! # Implementations
//!
//! - [`FsImageSource`]: files under a local root directory
//! - [`S3ImageSource`]: objects in an S3 or S3-compatible bucket
//!
//! # Example
//!
//! ```ignore
//! use pixel_cache::source::{FsImageSource, ImageSource};
//!
//! let source = FsImageSource::new("./avatars");
//! let raw = source.fetch("avatar-1.png").await?;
//! ```

mod fs;
mod s3;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::SourceError;

pub use fs::FsImageSource;
pub use s3::{create_s3_client, S3ImageSource};

/// Trait for fetching raw image bytes by source identifier.
///
/// Implementations must be cheap to share: the cache holds one instance behind
/// an `Arc` and calls it from spawned tasks.
#[async_trait]
pub trait ImageSource: Send + Sync + 'static {
    /// Fetch the complete encoded image for `source_id`.
    async fn fetch(&self, source_id: &str) -> Result<Bytes, SourceError>;

    /// Human-readable description of the backing store, used for logging.
    fn describe(&self) -> String;
}

#[async_trait]
impl<T: ImageSource + ?Sized> ImageSource for std::sync::Arc<T> {
    async fn fetch(&self, source_id: &str) -> Result<Bytes, SourceError> {
        (**self).fetch(source_id).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
