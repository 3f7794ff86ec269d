//! pixel-cache - pixelated avatars from a single-flight transform cache.
//!
//! This binary starts the HTTP server or runs a one-shot render.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixel_cache::{
    config::{Cli, Command, RenderConfig, ServeConfig, SourceBackend},
    create_s3_client, create_router, BlockPixelator, FsImageSource, ImageSource, Presenter,
    RouterConfig, S3ImageSource, TransformCache,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Render(config) => run_render(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let (backend, cache_size) = match (config.backend(), config.cache_size_bytes()) {
        (Ok(backend), Ok(size)) => (backend, size),
        (Err(e), _) | (_, Err(e)) => {
            error!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("pixel-cache v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!(
        "  Cache: {} entries, {}KB",
        config.cache_entries,
        cache_size / 1024
    );
    info!(
        "  Output: {:?} (max {}px, pixel size <= {})",
        config.format, config.max_dimension, config.max_pixel_size
    );

    let source = match build_source(&backend).await {
        Ok(source) => source,
        Err(e) => {
            error!("  Image source unavailable: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("  Source: {}", source.describe());

    let pixelator = BlockPixelator::new()
        .with_format(config.format)
        .with_jpeg_quality(config.jpeg_quality)
        .with_max_dimension(config.max_dimension);

    let cache =
        TransformCache::with_capacity(source, pixelator, config.cache_entries, cache_size);
    let router = create_router(Presenter::new(cache), build_router_config(&config));

    let addr = config.bind_address();

    info!("");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl -o avatar.png http://{}/avatars/<source_id>", addr);
    info!("    curl http://{}/cache/stats", addr);
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Build the configured image source and check that it is reachable.
async fn build_source(backend: &SourceBackend) -> Result<Arc<dyn ImageSource>, String> {
    match backend {
        SourceBackend::Directory(dir) => {
            let metadata = tokio::fs::metadata(dir)
                .await
                .map_err(|e| format!("{}: {}", dir.display(), e))?;
            if !metadata.is_dir() {
                return Err(format!("{} is not a directory", dir.display()));
            }
            Ok(Arc::new(FsImageSource::new(dir.clone())))
        }
        SourceBackend::S3 {
            bucket,
            prefix,
            endpoint,
            region,
        } => {
            if let Some(endpoint) = endpoint {
                info!("  S3 endpoint: {}", endpoint);
            }
            info!("  S3 region: {}", region);

            let client = create_s3_client(endpoint.as_deref(), region).await;

            info!("Connecting to S3...");
            if let Err(e) = client.head_bucket().bucket(bucket).send().await {
                warn!("  Could not reach bucket '{}': {}", bucket, e);
                warn!("  Requests will fall back to placeholders until it is reachable");
            }

            Ok(Arc::new(
                S3ImageSource::new(client, bucket.clone()).with_prefix(prefix.clone()),
            ))
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "pixel_cache=debug,tower_http=debug"
    } else {
        "pixel_cache=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_limits(config.max_pixel_size, config.max_dimension)
        .with_tracing(!config.no_tracing);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Render Command
// =============================================================================

async fn run_render(config: RenderConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let (dir, source_id) = match config.source_parts() {
        Ok(parts) => parts,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let pixelator = BlockPixelator::new()
        .with_format(config.format)
        .with_jpeg_quality(config.quality)
        .with_max_dimension(config.max_dimension);
    let cache = TransformCache::new(FsImageSource::new(dir), pixelator);

    let handle = match cache.request(&source_id, config.pixel_size, config.width, config.height) {
        Ok(handle) => handle,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let image = match handle.await {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = tokio::fs::write(&config.output, image.data()).await {
        eprintln!("Error: failed to write {}: {}", config.output.display(), e);
        return ExitCode::FAILURE;
    }

    println!(
        "Wrote {} ({}x{}, {} bytes)",
        config.output.display(),
        image.width(),
        image.height(),
        image.len()
    );

    ExitCode::SUCCESS
}
