//! Test utilities for integration tests.
//!
//! This module provides a mock image source with request tracking and helper
//! functions for creating test images and routers.

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use pixel_cache::error::SourceError;
use pixel_cache::source::ImageSource;
use pixel_cache::{create_router, BlockPixelator, Presenter, RouterConfig, TransformCache};

// =============================================================================
// Mock Image Source with Request Tracking
// =============================================================================

/// An in-memory image source that counts fetches per source ID.
///
/// Clones share their images and counters, so a test can keep one clone while
/// the cache owns another.
#[derive(Clone, Default)]
pub struct MockImageSource {
    images: Arc<RwLock<HashMap<String, Bytes>>>,
    fetches: Arc<RwLock<HashMap<String, usize>>>,
    total_fetches: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
    delay: Duration,
}

impl MockImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(self, source_id: &str, data: Vec<u8>) -> Self {
        self.insert(source_id, data);
        self
    }

    /// Delay every fetch, so concurrent requests overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn insert(&self, source_id: &str, data: Vec<u8>) {
        self.images
            .write()
            .unwrap()
            .insert(source_id.to_string(), Bytes::from(data));
    }

    /// Make every fetch fail with a connection error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn fetch_count(&self, source_id: &str) -> usize {
        self.fetches
            .read()
            .unwrap()
            .get(source_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.total_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for MockImageSource {
    async fn fetch(&self, source_id: &str) -> Result<Bytes, SourceError> {
        self.total_fetches.fetch_add(1, Ordering::SeqCst);
        *self
            .fetches
            .write()
            .unwrap()
            .entry(source_id.to_string())
            .or_insert(0) += 1;

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.failing.load(Ordering::SeqCst) {
            return Err(SourceError::Connection("mock source offline".to_string()));
        }

        self.images
            .read()
            .unwrap()
            .get(source_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(source_id.to_string()))
    }

    fn describe(&self) -> String {
        "mock://".to_string()
    }
}

// =============================================================================
// Image Helpers
// =============================================================================

/// Create a PNG with a horizontal and vertical gradient.
pub fn create_test_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 4) as u8, (y * 4) as u8, 200, 255])
    });
    let mut buf = Vec::new();
    PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgba8)
        .unwrap();
    buf
}

/// A PNG whose signature is intact but whose body is cut short.
pub fn create_truncated_png() -> Vec<u8> {
    let mut data = create_test_png(32, 32);
    data.truncate(48);
    data
}

pub fn is_valid_png(data: &[u8]) -> bool {
    data.len() > 8 && data[..8] == [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]
}

/// Decode an image and return its dimensions.
pub fn image_dimensions(data: &[u8]) -> (u32, u32) {
    let img = image::load_from_memory(data).unwrap();
    (img.width(), img.height())
}

// =============================================================================
// Router Helpers
// =============================================================================

/// Build a router over a mock source with default settings.
pub fn test_router(source: MockImageSource) -> Router {
    test_router_with(source, BlockPixelator::new(), RouterConfig::new().with_tracing(false))
}

pub fn test_router_with(
    source: MockImageSource,
    pixelator: BlockPixelator,
    config: RouterConfig,
) -> Router {
    let cache = TransformCache::new(source, pixelator);
    create_router(Presenter::new(cache), config)
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn delete(uri: &str) -> Request<Body> {
    Request::builder()
        .method("DELETE")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn header<'a>(response: &'a Response<Body>, name: &str) -> &'a str {
    response.headers().get(name).unwrap().to_str().unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let body = body_bytes(response).await;
    serde_json::from_slice(&body).unwrap()
}
