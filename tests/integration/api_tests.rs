//! API integration tests for avatar retrieval and error handling.
//!
//! Tests verify:
//! - Pixelated avatar retrieval and response headers
//! - Fallback renditions (pending, degraded, placeholder)
//! - Parameter validation and configured limits
//! - Health endpoint and CORS

use axum::http::StatusCode;
use std::time::Duration;
use tower::ServiceExt;

use pixel_cache::{BlockPixelator, OutputFormat, RouterConfig};

use super::test_utils::{
    body_bytes, body_json, create_test_png, create_truncated_png, get, header, image_dimensions,
    is_valid_png, test_router, test_router_with, MockImageSource,
};

// =============================================================================
// Avatar Retrieval
// =============================================================================

#[tokio::test]
async fn test_avatar_retrieval_success() {
    let source = MockImageSource::new().with_image("alice.png", create_test_png(64, 64));
    let router = test_router(source);

    let response = router.oneshot(get("/avatars/alice.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/png");
    assert_eq!(header(&response, "cache-control"), "public, max-age=3600");
    assert_eq!(header(&response, "x-pixelate-status"), "transformed");
    assert_eq!(header(&response, "x-pixelate-cache"), "miss");

    let body = body_bytes(response).await;
    assert!(is_valid_png(&body));
    assert_eq!(image_dimensions(&body), (48, 48));
}

#[tokio::test]
async fn test_avatar_custom_dimensions() {
    let source = MockImageSource::new().with_image("alice.png", create_test_png(64, 64));
    let router = test_router(source);

    let response = router
        .oneshot(get("/avatars/alice.png?pixel_size=8&width=32&height=16"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_bytes(response).await;
    assert_eq!(image_dimensions(&body), (32, 16));
}

#[tokio::test]
async fn test_avatar_second_request_hits_cache() {
    let source = MockImageSource::new().with_image("alice.png", create_test_png(64, 64));
    let router = test_router(source.clone());

    let first = router
        .clone()
        .oneshot(get("/avatars/alice.png"))
        .await
        .unwrap();
    assert_eq!(header(&first, "x-pixelate-cache"), "miss");
    let first_body = body_bytes(first).await;

    let second = router.oneshot(get("/avatars/alice.png")).await.unwrap();
    assert_eq!(header(&second, "x-pixelate-cache"), "hit");
    let second_body = body_bytes(second).await;

    assert_eq!(first_body, second_body);
    assert_eq!(source.fetch_count("alice.png"), 1);
}

#[tokio::test]
async fn test_avatar_nested_source_id() {
    let source =
        MockImageSource::new().with_image("users/42/avatar.png", create_test_png(40, 40));
    let router = test_router(source.clone());

    let response = router
        .oneshot(get("/avatars/users/42/avatar.png"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-pixelate-status"), "transformed");
    assert_eq!(source.fetch_count("users/42/avatar.png"), 1);
}

#[tokio::test]
async fn test_avatar_jpeg_output() {
    let source = MockImageSource::new().with_image("alice.png", create_test_png(64, 64));
    let router = test_router_with(
        source,
        BlockPixelator::new().with_format(OutputFormat::Jpeg),
        RouterConfig::new().with_tracing(false),
    );

    let response = router.oneshot(get("/avatars/alice.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "content-type"), "image/jpeg");
    let body = body_bytes(response).await;
    assert_eq!(&body[..2], &[0xFF, 0xD8]);
}

#[tokio::test]
async fn test_avatar_custom_cache_max_age() {
    let source = MockImageSource::new().with_image("alice.png", create_test_png(64, 64));
    let router = test_router_with(
        source,
        BlockPixelator::new(),
        RouterConfig::new().with_tracing(false).with_cache_max_age(60),
    );

    let response = router.oneshot(get("/avatars/alice.png")).await.unwrap();
    assert_eq!(header(&response, "cache-control"), "public, max-age=60");
}

// =============================================================================
// Fallback Renditions
// =============================================================================

#[tokio::test]
async fn test_missing_source_serves_placeholder() {
    let router = test_router(MockImageSource::new());

    let response = router.oneshot(get("/avatars/nobody.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-pixelate-status"), "placeholder");
    assert_eq!(header(&response, "cache-control"), "no-store");
    assert_eq!(header(&response, "content-type"), "image/png");

    let body = body_bytes(response).await;
    assert_eq!(image_dimensions(&body), (48, 48));
}

#[tokio::test]
async fn test_corrupt_source_serves_original() {
    let broken = create_truncated_png();
    let source = MockImageSource::new().with_image("broken.png", broken.clone());
    let router = test_router(source);

    let response = router.oneshot(get("/avatars/broken.png")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-pixelate-status"), "degraded");
    assert_eq!(header(&response, "cache-control"), "no-store");
    assert_eq!(header(&response, "content-type"), "image/png");

    let body = body_bytes(response).await;
    assert_eq!(&body[..], &broken[..]);
}

#[tokio::test]
async fn test_no_wait_serves_original_then_transformed() {
    let original = create_test_png(64, 64);
    let source = MockImageSource::new()
        .with_image("slow.png", original.clone())
        .with_delay(Duration::from_millis(50));
    let router = test_router(source.clone());

    let response = router
        .clone()
        .oneshot(get("/avatars/slow.png?wait=false"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-pixelate-status"), "pending");
    assert_eq!(header(&response, "x-pixelate-cache"), "miss");
    let body = body_bytes(response).await;
    assert_eq!(&body[..], &original[..]);

    // The computation kept running after the first response
    let response = router.oneshot(get("/avatars/slow.png")).await.unwrap();
    assert_eq!(header(&response, "x-pixelate-status"), "transformed");
    let body = body_bytes(response).await;
    assert_eq!(image_dimensions(&body), (48, 48));
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn test_zero_pixel_size_rejected() {
    let source = MockImageSource::new().with_image("alice.png", create_test_png(64, 64));
    let router = test_router(source.clone());

    let response = router
        .oneshot(get("/avatars/alice.png?pixel_size=0"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["error"], "invalid_request");
    assert_eq!(json["status"], 400);

    // Rejected before reaching the source
    assert_eq!(source.total_fetches(), 0);
}

#[tokio::test]
async fn test_zero_width_rejected() {
    let router = test_router(MockImageSource::new());

    let response = router
        .oneshot(get("/avatars/alice.png?width=0"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_whitespace_source_id_rejected() {
    let router = test_router(MockImageSource::new());

    let response = router.oneshot(get("/avatars/%20%20")).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_limits_enforced() {
    let source = MockImageSource::new().with_image("alice.png", create_test_png(64, 64));
    let router = test_router_with(
        source.clone(),
        BlockPixelator::new(),
        RouterConfig::new().with_tracing(false).with_limits(16, 128),
    );

    let response = router
        .clone()
        .oneshot(get("/avatars/alice.png?pixel_size=17"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert!(json["message"].as_str().unwrap().contains("pixel_size"));

    let response = router
        .clone()
        .oneshot(get("/avatars/alice.png?width=129"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = router
        .oneshot(get("/avatars/alice.png?pixel_size=16&width=128&height=128"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(source.fetch_count("alice.png"), 1);
}

#[tokio::test]
async fn test_non_numeric_parameter_rejected() {
    let router = test_router(MockImageSource::new());

    let response = router
        .oneshot(get("/avatars/alice.png?pixel_size=large"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Health and CORS
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let router = test_router(MockImageSource::new());

    let response = router.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_cors_any_origin() {
    let source = MockImageSource::new().with_image("alice.png", create_test_png(64, 64));
    let router = test_router(source);

    let request = axum::http::Request::builder()
        .uri("/avatars/alice.png")
        .header("origin", "https://app.example.com")
        .body(axum::body::Body::empty())
        .unwrap();

    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "access-control-allow-origin"), "*");
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let router = test_router(MockImageSource::new());

    let response = router.oneshot(get("/tiles/a/0/0/0.jpg")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
