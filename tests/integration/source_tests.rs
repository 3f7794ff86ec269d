//! Filesystem source integration tests.
//!
//! Tests verify:
//! - Avatars served from a local directory
//! - Path traversal never escapes the source root
//! - Source errors surface through the cache unchanged

use axum::http::StatusCode;
use tower::ServiceExt;

use pixel_cache::{
    create_router, BlockPixelator, CacheError, FsImageSource, Presenter, RouterConfig,
    SourceError, TransformCache,
};

use super::test_utils::{body_bytes, create_test_png, get, header, image_dimensions};

fn fs_router(root: &std::path::Path) -> axum::Router {
    let cache = TransformCache::new(FsImageSource::new(root), BlockPixelator::new());
    create_router(Presenter::new(cache), RouterConfig::new().with_tracing(false))
}

#[tokio::test]
async fn test_fs_source_serves_avatar() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("team")).unwrap();
    std::fs::write(dir.path().join("team/carol.png"), create_test_png(80, 60)).unwrap();

    let router = fs_router(dir.path());
    let response = router
        .oneshot(get("/avatars/team/carol.png?width=40&height=40"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-pixelate-status"), "transformed");
    let body = body_bytes(response).await;
    assert_eq!(image_dimensions(&body), (40, 40));
}

#[tokio::test]
async fn test_fs_source_rejects_traversal() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("avatars");
    std::fs::create_dir_all(&root).unwrap();
    std::fs::write(dir.path().join("secret.png"), create_test_png(16, 16)).unwrap();

    let router = fs_router(&root);
    let response = router
        .oneshot(get("/avatars/../secret.png"))
        .await
        .unwrap();

    // Neither the transformed nor the original secret is served
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, "x-pixelate-status"), "placeholder");
}

#[tokio::test]
async fn test_fs_source_errors_reach_waiters() {
    let dir = tempfile::tempdir().unwrap();
    let cache = TransformCache::new(FsImageSource::new(dir.path()), BlockPixelator::new());

    let first = cache.request("ghost.png", 4, 48, 48).unwrap();
    let second = cache.request("ghost.png", 4, 48, 48).unwrap();

    let a = first.await.unwrap_err();
    let b = second.await.unwrap_err();

    assert!(matches!(
        a,
        CacheError::SourceUnavailable(SourceError::NotFound(_))
    ));
    assert_eq!(a, b);
}
