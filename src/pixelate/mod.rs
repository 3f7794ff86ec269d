//! Pixelation layer.
//!
//! This module provides the pure image transform that the cache memoizes.
//!
//! # Components
//!
//! - [`Pixelator`]: trait for a deterministic, CPU-bound transform
//! - [`BlockPixelator`]: decode, cover-fit, block-average, encode
//! - [`PixelateParams`]: pixel size and output box
//! - [`TransformedImage`]: immutable encoded result shared by all consumers
//! - [`placeholder`]: flat image used when nothing else can be rendered

mod output;
mod pixelator;

pub use output::{
    clamp_quality, is_valid_quality, placeholder, OutputFormat, TransformedImage,
    DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY, MIN_JPEG_QUALITY,
};
pub use pixelator::{
    pixelate_blocks, BlockPixelator, PixelateParams, Pixelator, DEFAULT_MAX_DIMENSION,
};
