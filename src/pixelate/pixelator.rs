//! Block pixelation.
//!
//! The pixelator decodes a raw image, cover-fits it into the requested box,
//! and flattens it into `pixel_size`-sized blocks of uniform colour.
//!
//! # Design Decisions
//!
//! - **Cover fit**: avatars are rendered into a fixed box, so the source is
//!   scaled to fill it and center-cropped rather than letterboxed.
//!
//! - **Box average**: each output block is the mean colour of the source
//!   pixels it covers. Edge blocks may be narrower than `pixel_size` when the
//!   box is not an exact multiple.
//!
//! - **Pure**: the same input and parameters always produce the same bytes,
//!   which is what makes the result safe to memoize.

use image::imageops::FilterType;
use image::{Rgba, RgbaImage};

use super::output::{OutputFormat, TransformedImage, DEFAULT_JPEG_QUALITY};
use crate::error::TransformError;

/// Default upper bound for output width and height.
pub const DEFAULT_MAX_DIMENSION: u32 = 1024;

/// Parameters for a single pixelation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelateParams {
    /// Edge length of one output block, in output pixels
    pub pixel_size: u32,

    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,
}

impl PixelateParams {
    pub fn new(pixel_size: u32, width: u32, height: u32) -> Self {
        Self {
            pixel_size,
            width,
            height,
        }
    }

    /// Number of blocks along each axis: `(ceil(w / p), ceil(h / p))`.
    pub fn block_grid(&self) -> (u32, u32) {
        (
            self.width.div_ceil(self.pixel_size),
            self.height.div_ceil(self.pixel_size),
        )
    }
}

/// A pure, CPU-bound image transform.
///
/// The transform cache runs implementations on the blocking thread pool.
pub trait Pixelator: Send + Sync + 'static {
    /// Transform raw encoded bytes into a pixelated, encoded image.
    fn transform(
        &self,
        raw: &[u8],
        params: &PixelateParams,
    ) -> Result<TransformedImage, TransformError>;
}

impl<T: Pixelator + ?Sized> Pixelator for std::sync::Arc<T> {
    fn transform(
        &self,
        raw: &[u8],
        params: &PixelateParams,
    ) -> Result<TransformedImage, TransformError> {
        (**self).transform(raw, params)
    }
}

/// Pixelator backed by the `image` crate.
///
/// # Example
///
/// ```ignore
/// use pixel_cache::pixelate::{BlockPixelator, PixelateParams, Pixelator};
///
/// let pixelator = BlockPixelator::new();
/// let avatar = pixelator.transform(&raw_png, &PixelateParams::new(4, 48, 48))?;
/// assert_eq!(avatar.content_type(), "image/png");
/// ```
#[derive(Debug, Clone)]
pub struct BlockPixelator {
    format: OutputFormat,
    jpeg_quality: u8,
    max_dimension: u32,
}

impl Default for BlockPixelator {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockPixelator {
    /// Create a pixelator producing PNG output.
    pub fn new() -> Self {
        Self {
            format: OutputFormat::Png,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }

    /// Set the output format.
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the JPEG quality (only used for JPEG output).
    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    /// Set the largest accepted output width or height.
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn check_params(&self, params: &PixelateParams) -> Result<(), TransformError> {
        let reject = |reason: String| TransformError::InvalidDimensions {
            width: params.width,
            height: params.height,
            pixel_size: params.pixel_size,
            reason,
        };

        if params.width == 0 || params.height == 0 || params.pixel_size == 0 {
            return Err(reject("all parameters must be positive".to_string()));
        }
        if params.width > self.max_dimension || params.height > self.max_dimension {
            return Err(reject(format!(
                "output exceeds the {}px limit",
                self.max_dimension
            )));
        }
        Ok(())
    }
}

impl Pixelator for BlockPixelator {
    fn transform(
        &self,
        raw: &[u8],
        params: &PixelateParams,
    ) -> Result<TransformedImage, TransformError> {
        self.check_params(params)?;

        let decoded = image::load_from_memory(raw).map_err(|e| TransformError::Decode {
            message: e.to_string(),
        })?;

        let fitted = decoded
            .resize_to_fill(params.width, params.height, FilterType::Triangle)
            .to_rgba8();

        let pixelated = pixelate_blocks(&fitted, params.pixel_size);

        TransformedImage::encode(pixelated, self.format, self.jpeg_quality)
    }
}

/// Flatten `image` into `pixel_size` blocks, each filled with the average
/// colour of the pixels it covers.
pub fn pixelate_blocks(image: &RgbaImage, pixel_size: u32) -> RgbaImage {
    let (width, height) = image.dimensions();
    let pixel_size = pixel_size.max(1);
    if pixel_size == 1 {
        return image.clone();
    }

    let grid_w = width.div_ceil(pixel_size);
    let grid_h = height.div_ceil(pixel_size);

    let cells = grid_w as usize * grid_h as usize;
    let mut sums = vec![[0u64; 4]; cells];
    let mut counts = vec![0u64; cells];

    for (x, y, pixel) in image.enumerate_pixels() {
        let idx = (y / pixel_size) as usize * grid_w as usize + (x / pixel_size) as usize;
        for (sum, channel) in sums[idx].iter_mut().zip(pixel.0) {
            *sum += u64::from(channel);
        }
        counts[idx] += 1;
    }

    let blocks: Vec<Rgba<u8>> = sums
        .iter()
        .zip(&counts)
        .map(|(sum, &count)| {
            let count = count.max(1);
            // Rounded mean, always within 0..=255
            Rgba(sum.map(|s| ((s + count / 2) / count) as u8))
        })
        .collect();

    RgbaImage::from_fn(width, height, |x, y| {
        blocks[(y / pixel_size) as usize * grid_w as usize + (x / pixel_size) as usize]
    })
}
