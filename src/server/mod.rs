//! HTTP server layer for pixel-cache.
//!
//! This module provides the HTTP API for serving pixelated avatars.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │                GET /avatars/{*source_id}                        │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │          routes             │  │
//! │  │ (avatar, cache, health)  │  │ (router config, CORS, trace)│  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    avatar_handler, cache_stats_handler, clear_handler, health_handler, invalidate_handler,
    AppState, AvatarQueryParams, ErrorResponse, HandlerError, HealthResponse,
    InvalidateQueryParams, RemovedResponse, CACHE_HEADER, STATUS_HEADER,
};
pub use routes::{create_router, RouterConfig};
