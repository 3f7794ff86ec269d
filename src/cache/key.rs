//! Cache keys.

use std::fmt;
use std::sync::Arc;

use crate::error::CacheError;
use crate::pixelate::PixelateParams;

/// Cache key for transformed images.
///
/// Two requests map to the same entry only when every field matches exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Source identifier (file path or object key of the original image)
    pub source_id: Arc<str>,

    /// Edge length of one pixelation block
    pub pixel_size: u32,

    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,
}

impl CacheKey {
    /// Create a new cache key without validating it.
    pub fn new(source_id: impl Into<Arc<str>>, pixel_size: u32, width: u32, height: u32) -> Self {
        Self {
            source_id: source_id.into(),
            pixel_size,
            width,
            height,
        }
    }

    /// Check the request constraints: non-empty source and positive
    /// parameters.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.source_id.trim().is_empty() {
            return Err(CacheError::invalid("source id must not be empty"));
        }
        if self.pixel_size == 0 {
            return Err(CacheError::invalid("pixel_size must be greater than 0"));
        }
        if self.width == 0 {
            return Err(CacheError::invalid("width must be greater than 0"));
        }
        if self.height == 0 {
            return Err(CacheError::invalid("height must be greater than 0"));
        }
        Ok(())
    }

    /// The transform parameters carried by this key.
    pub fn params(&self) -> PixelateParams {
        PixelateParams::new(self.pixel_size, self.width, self.height)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}px/{}x{}",
            self.source_id, self.pixel_size, self.width, self.height
        )
    }
}
