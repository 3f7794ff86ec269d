//! Cache integration tests.
//!
//! Tests verify:
//! - Concurrent HTTP requests for one key share a single computation
//! - Distinct parameters are cached independently
//! - Failures are shared but not cached
//! - Statistics and invalidation endpoints

use axum::http::StatusCode;
use std::time::Duration;
use tower::ServiceExt;

use super::test_utils::{
    body_bytes, body_json, create_test_png, delete, get, header, test_router, MockImageSource,
};

// =============================================================================
// Single-flight
// =============================================================================

#[tokio::test]
async fn test_concurrent_requests_share_one_computation() {
    let source = MockImageSource::new()
        .with_image("alice.png", create_test_png(64, 64))
        .with_delay(Duration::from_millis(50));
    let router = test_router(source.clone());

    let mut tasks = Vec::new();
    for _ in 0..12 {
        let router = router.clone();
        tasks.push(tokio::spawn(async move {
            let response = router.oneshot(get("/avatars/alice.png")).await.unwrap();
            let lookup = header(&response, "x-pixelate-cache").to_string();
            let status = header(&response, "x-pixelate-status").to_string();
            (lookup, status, body_bytes(response).await)
        }));
    }

    let mut results = Vec::new();
    for task in tasks {
        results.push(task.await.unwrap());
    }

    assert_eq!(source.fetch_count("alice.png"), 1);

    let misses = results.iter().filter(|(lookup, _, _)| lookup == "miss").count();
    assert_eq!(misses, 1);
    assert!(results.iter().all(|(_, status, _)| status == "transformed"));

    let first_body = &results[0].2;
    assert!(results.iter().all(|(_, _, body)| body == first_body));
}

#[tokio::test]
async fn test_distinct_parameters_are_independent() {
    let source = MockImageSource::new().with_image("alice.png", create_test_png(64, 64));
    let router = test_router(source.clone());

    for uri in [
        "/avatars/alice.png?pixel_size=4",
        "/avatars/alice.png?pixel_size=8",
        "/avatars/alice.png?pixel_size=4&width=32",
        "/avatars/alice.png?pixel_size=4",
    ] {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    // Three distinct keys, the last request is a hit
    assert_eq!(source.fetch_count("alice.png"), 3);

    let stats = body_json(router.oneshot(get("/cache/stats")).await.unwrap()).await;
    assert_eq!(stats["entries"], 3);
    assert_eq!(stats["misses"], 3);
    assert_eq!(stats["hits"], 1);
}

#[tokio::test]
async fn test_failures_are_retried() {
    let source = MockImageSource::new().with_image("alice.png", create_test_png(64, 64));
    source.set_failing(true);
    let router = test_router(source.clone());

    let response = router
        .clone()
        .oneshot(get("/avatars/alice.png"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-pixelate-status"), "placeholder");

    let stats = body_json(
        router
            .clone()
            .oneshot(get("/cache/stats"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(stats["entries"], 0);
    assert_eq!(stats["failures"], 1);

    // Once the source recovers the next request computes again
    source.set_failing(false);
    let response = router.oneshot(get("/avatars/alice.png")).await.unwrap();
    assert_eq!(header(&response, "x-pixelate-status"), "transformed");
    assert_eq!(header(&response, "x-pixelate-cache"), "miss");
}

// =============================================================================
// Statistics
// =============================================================================

#[tokio::test]
async fn test_cache_stats_endpoint() {
    let source = MockImageSource::new().with_image("alice.png", create_test_png(64, 64));
    let router = test_router(source);

    let stats = body_json(router.clone().oneshot(get("/cache/stats")).await.unwrap()).await;
    assert_eq!(stats["entries"], 0);
    assert_eq!(stats["pending"], 0);
    assert_eq!(stats["size_bytes"], 0);
    assert!(stats["capacity_bytes"].as_u64().unwrap() > 0);
    assert!(stats["max_entries"].as_u64().unwrap() > 0);

    router
        .clone()
        .oneshot(get("/avatars/alice.png"))
        .await
        .unwrap();
    router
        .clone()
        .oneshot(get("/avatars/alice.png"))
        .await
        .unwrap();

    let stats = body_json(router.oneshot(get("/cache/stats")).await.unwrap()).await;
    assert_eq!(stats["entries"], 1);
    assert_eq!(stats["misses"], 1);
    assert_eq!(stats["hits"], 1);
    assert_eq!(stats["joins"], 0);
    assert_eq!(stats["failures"], 0);
    assert!(stats["size_bytes"].as_u64().unwrap() > 0);
}

// =============================================================================
// Invalidation
// =============================================================================

#[tokio::test]
async fn test_invalidate_single_key() {
    let source = MockImageSource::new().with_image("alice.png", create_test_png(64, 64));
    let router = test_router(source.clone());

    router
        .clone()
        .oneshot(get("/avatars/alice.png?pixel_size=6"))
        .await
        .unwrap();

    // Different parameters do not match the cached key
    let response = router
        .clone()
        .oneshot(delete("/cache/alice.png?pixel_size=4"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["removed"], 0);

    let response = router
        .clone()
        .oneshot(delete("/cache/alice.png?pixel_size=6"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["removed"], 1);

    // The next request recomputes
    let response = router
        .oneshot(get("/avatars/alice.png?pixel_size=6"))
        .await
        .unwrap();
    assert_eq!(header(&response, "x-pixelate-cache"), "miss");
    assert_eq!(source.fetch_count("alice.png"), 2);
}

#[tokio::test]
async fn test_invalidate_source() {
    let source = MockImageSource::new()
        .with_image("alice.png", create_test_png(64, 64))
        .with_image("bob.png", create_test_png(64, 64));
    let router = test_router(source);

    for uri in [
        "/avatars/alice.png?pixel_size=4",
        "/avatars/alice.png?pixel_size=8",
        "/avatars/bob.png",
    ] {
        router.clone().oneshot(get(uri)).await.unwrap();
    }

    let response = router
        .clone()
        .oneshot(delete("/cache/alice.png?all=true"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["removed"], 2);

    let response = router.oneshot(get("/avatars/bob.png")).await.unwrap();
    assert_eq!(header(&response, "x-pixelate-cache"), "hit");
}

#[tokio::test]
async fn test_invalidate_invalid_key_rejected() {
    let router = test_router(MockImageSource::new());

    let response = router
        .oneshot(delete("/cache/alice.png?pixel_size=0"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_clear_cache() {
    let source = MockImageSource::new()
        .with_image("alice.png", create_test_png(64, 64))
        .with_image("bob.png", create_test_png(64, 64));
    let router = test_router(source);

    router
        .clone()
        .oneshot(get("/avatars/alice.png"))
        .await
        .unwrap();
    router
        .clone()
        .oneshot(get("/avatars/bob.png"))
        .await
        .unwrap();

    let response = router.clone().oneshot(delete("/cache")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["removed"], 2);

    let stats = body_json(router.oneshot(get("/cache/stats")).await.unwrap()).await;
    assert_eq!(stats["entries"], 0);
    assert_eq!(stats["size_bytes"], 0);
}

#[tokio::test]
async fn test_invalidate_pending_still_answers_waiters() {
    let source = MockImageSource::new()
        .with_image("slow.png", create_test_png(64, 64))
        .with_delay(Duration::from_millis(100));
    let router = test_router(source.clone());

    let waiter = {
        let router = router.clone();
        tokio::spawn(async move { router.oneshot(get("/avatars/slow.png")).await.unwrap() })
    };

    // Let the request start its computation
    tokio::time::sleep(Duration::from_millis(20)).await;

    let response = router
        .clone()
        .oneshot(delete("/cache/slow.png"))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["removed"], 1);

    let response = waiter.await.unwrap();
    assert_eq!(header(&response, "x-pixelate-status"), "transformed");

    // The invalidated result was not stored
    let stats = body_json(router.oneshot(get("/cache/stats")).await.unwrap()).await;
    assert_eq!(stats["entries"], 0);
}
