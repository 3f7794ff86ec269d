//! Transform cache layer.
//!
//! This module memoizes pixelation results so each distinct request is
//! fetched and transformed at most once, no matter how many callers ask for
//! it concurrently.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         Presenter / HTTP handlers       │
//! └────────────────────┬────────────────────┘
//!                      │ request(key) -> TransformHandle
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │             TransformCache              │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  ReadyStore  │  │ pending entries │  │
//! │  │  (LRU, size  │  │ (one watch chan │  │
//! │  │   bounded)   │  │  per key)       │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └──────────┬─────────────────────┬────────┘
//!            ▼                     ▼
//!   ┌─────────────────┐   ┌─────────────────┐
//!   │   ImageSource   │   │    Pixelator    │
//!   └─────────────────┘   └─────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TransformCache`]: single-flight, bounded cache keyed by [`CacheKey`]
//! - [`TransformHandle`]: awaitable handle to a (possibly pending) result
//! - [`Lookup`]: whether a request hit, joined, or missed
//! - [`CacheStats`]: occupancy and counters for monitoring

mod key;
mod store;
mod transform;

pub use key::CacheKey;
pub use transform::{
    CacheStats, Lookup, TransformCache, TransformHandle, TransformResult, DEFAULT_CACHE_CAPACITY,
    DEFAULT_CACHE_ENTRIES,
};
