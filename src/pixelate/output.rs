//! Transformed image payloads and output encoding.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};

use crate::error::TransformError;

/// Default JPEG quality (1-100).
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Minimum allowed JPEG quality.
pub const MIN_JPEG_QUALITY: u8 = 1;

/// Maximum allowed JPEG quality.
pub const MAX_JPEG_QUALITY: u8 = 100;

/// Colour of the placeholder served when no image is available at all.
const PLACEHOLDER_COLOR: Rgba<u8> = Rgba([0xC8, 0xC8, 0xC8, 0xFF]);

/// Encoding used for transformed images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Lossless PNG with alpha (default; keeps block edges crisp)
    #[default]
    Png,
    /// JPEG at the configured quality, alpha is dropped
    Jpeg,
}

impl OutputFormat {
    /// MIME type for this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Png => "image/png",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }
}

/// An encoded, immutable transform result.
///
/// Once produced it is owned by the cache and shared read-only (behind an
/// `Arc`) by every consumer of the same cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedImage {
    data: Bytes,
    format: OutputFormat,
    width: u32,
    height: u32,
}

impl TransformedImage {
    /// Wrap already-encoded bytes.
    pub fn new(data: Bytes, format: OutputFormat, width: u32, height: u32) -> Self {
        Self {
            data,
            format,
            width,
            height,
        }
    }

    /// Encode an RGBA buffer in the given format.
    pub fn encode(
        pixels: RgbaImage,
        format: OutputFormat,
        jpeg_quality: u8,
    ) -> Result<Self, TransformError> {
        let (width, height) = pixels.dimensions();
        let mut output = Vec::new();

        match format {
            OutputFormat::Png => {
                DynamicImage::ImageRgba8(pixels)
                    .write_to(&mut Cursor::new(&mut output), ImageFormat::Png)
                    .map_err(|e| TransformError::Encode {
                        message: e.to_string(),
                    })?;
            }
            OutputFormat::Jpeg => {
                let rgb = DynamicImage::ImageRgba8(pixels).to_rgb8();
                let quality = clamp_quality(jpeg_quality);
                let mut encoder = JpegEncoder::new_with_quality(&mut output, quality);
                encoder
                    .encode_image(&rgb)
                    .map_err(|e| TransformError::Encode {
                        message: e.to_string(),
                    })?;
            }
        }

        Ok(Self::new(Bytes::from(output), format, width, height))
    }

    /// The encoded bytes. Cloning is cheap (reference counted).
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// The output format.
    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// MIME type of the encoded bytes.
    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Encoded size in bytes, used for cache accounting.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Render a flat neutral placeholder as PNG.
///
/// Used by the presenter when neither the transformed image nor the
/// untransformed source can be served, so the output is never blank.
pub fn placeholder(width: u32, height: u32) -> Result<TransformedImage, TransformError> {
    let width = width.max(1);
    let height = height.max(1);
    let pixels = RgbaImage::from_pixel(width, height, PLACEHOLDER_COLOR);
    TransformedImage::encode(pixels, OutputFormat::Png, DEFAULT_JPEG_QUALITY)
}

/// Validate JPEG quality parameter.
#[inline]
pub fn is_valid_quality(quality: u8) -> bool {
    (MIN_JPEG_QUALITY..=MAX_JPEG_QUALITY).contains(&quality)
}

/// Clamp quality to valid range.
#[inline]
pub fn clamp_quality(quality: u8) -> u8 {
    quality.clamp(MIN_JPEG_QUALITY, MAX_JPEG_QUALITY)
}
