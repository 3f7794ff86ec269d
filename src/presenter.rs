//! Presentation layer.
//!
//! The presenter turns a cache request into bytes that can always be shown:
//! the pixelated image when it is ready, the untransformed source while it is
//! pending or after the transform failed, and a flat placeholder when even
//! the source is unavailable.

use bytes::Bytes;
use tracing::{debug, warn};

use crate::cache::{Lookup, TransformCache};
use crate::error::CacheError;
use crate::pixelate::{placeholder, Pixelator};
use crate::source::ImageSource;

/// Whether the presenter waits for the transform to settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderMode {
    /// Wait for the transform and serve it (or a degraded fallback)
    #[default]
    Wait,
    /// Serve whatever is available now; a pending transform keeps running
    NoWait,
}

/// What a rendition contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenditionStatus {
    /// The pixelated image
    Transformed,
    /// The untransformed source, served while the transform is in flight
    Pending,
    /// The untransformed source, served because the transform failed
    Degraded,
    /// A flat placeholder, served because the source itself is unavailable
    Placeholder,
}

impl RenditionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenditionStatus::Transformed => "transformed",
            RenditionStatus::Pending => "pending",
            RenditionStatus::Degraded => "degraded",
            RenditionStatus::Placeholder => "placeholder",
        }
    }

    /// Whether the bytes are the final, cacheable result.
    pub fn is_final(&self) -> bool {
        matches!(self, RenditionStatus::Transformed)
    }
}

/// Bytes ready to be displayed.
#[derive(Debug, Clone)]
pub struct Rendition {
    pub body: Bytes,
    pub content_type: &'static str,
    pub status: RenditionStatus,
    pub lookup: Lookup,
}

/// Presenter over a transform cache.
pub struct Presenter<S, P> {
    cache: TransformCache<S, P>,
}

impl<S, P> Clone for Presenter<S, P> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
        }
    }
}

impl<S: ImageSource, P: Pixelator> Presenter<S, P> {
    pub fn new(cache: TransformCache<S, P>) -> Self {
        Self { cache }
    }

    /// Get the underlying cache.
    pub fn cache(&self) -> &TransformCache<S, P> {
        &self.cache
    }

    /// Render a pixelated avatar.
    ///
    /// # Errors
    ///
    /// Only [`CacheError::InvalidRequest`] is returned. Source and transform
    /// failures degrade to a fallback rendition instead.
    pub async fn present(
        &self,
        source_id: &str,
        pixel_size: u32,
        width: u32,
        height: u32,
        mode: RenderMode,
    ) -> Result<Rendition, CacheError> {
        let handle = self.cache.request(source_id, pixel_size, width, height)?;
        let lookup = handle.lookup();

        let settled = match mode {
            RenderMode::Wait => Some(handle.wait().await),
            RenderMode::NoWait => handle.try_get(),
        };

        match settled {
            Some(Ok(image)) => Ok(Rendition {
                body: image.data().clone(),
                content_type: image.content_type(),
                status: RenditionStatus::Transformed,
                lookup,
            }),
            Some(Err(e)) if !e.is_degradable() => Err(e),
            Some(Err(e)) => {
                warn!(source_id, error = %e, "serving untransformed fallback");
                self.fallback(source_id, width, height, RenditionStatus::Degraded, lookup)
                    .await
            }
            None => {
                debug!(source_id, "transform pending, serving untransformed source");
                self.fallback(source_id, width, height, RenditionStatus::Pending, lookup)
                    .await
            }
        }
    }

    /// Serve the untransformed source, or a placeholder if that fails too.
    async fn fallback(
        &self,
        source_id: &str,
        width: u32,
        height: u32,
        status: RenditionStatus,
        lookup: Lookup,
    ) -> Result<Rendition, CacheError> {
        match self.cache.source().fetch(source_id).await {
            Ok(raw) => {
                if let Some(content_type) = sniff_content_type(&raw) {
                    return Ok(Rendition {
                        body: raw,
                        content_type,
                        status,
                        lookup,
                    });
                }
                debug!(source_id, "source is not a recognised image, using placeholder");
            }
            Err(e) => {
                debug!(source_id, error = %e, "source unavailable, using placeholder");
            }
        }

        let image = placeholder(width, height).map_err(CacheError::from)?;
        Ok(Rendition {
            body: image.data().clone(),
            content_type: image.content_type(),
            status: RenditionStatus::Placeholder,
            lookup,
        })
    }
}

/// Sniff an image MIME type from its leading bytes.
pub fn sniff_content_type(raw: &[u8]) -> Option<&'static str> {
    image::guess_format(raw)
        .ok()
        .map(|format| format.to_mime_type())
}
