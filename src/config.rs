//! Configuration management for pixel-cache.
//!
//! This module provides a flexible configuration system that supports:
//! - Command-line arguments via clap
//! - Environment variables with `PIXEL_` prefix
//! - Sensible defaults for all optional settings
//!
//! # Example
//!
//! ```ignore
//! use clap::Parser;
//! use pixel_cache::config::{Cli, Command};
//!
//! match Cli::parse().into_command() {
//!     Command::Serve(config) => println!("Listening on {}", config.bind_address()),
//!     Command::Render(config) => println!("Rendering {}", config.input.display()),
//! }
//! ```
//!
//! # Environment Variables
//!
//! Server options can be set via environment variables with the `PIXEL_` prefix:
//!
//! - `PIXEL_HOST` - Server bind address (default: 0.0.0.0)
//! - `PIXEL_PORT` - Server port (default: 3000)
//! - `PIXEL_SOURCE_DIR` - Local directory holding source images
//! - `PIXEL_S3_BUCKET` - S3 bucket holding source images
//! - `PIXEL_S3_PREFIX` - Key prefix within the bucket
//! - `PIXEL_S3_ENDPOINT` - Custom S3 endpoint for S3-compatible services
//! - `PIXEL_S3_REGION` - AWS region (default: us-east-1)
//! - `PIXEL_CACHE_ENTRIES` - Max cached results (default: 4096)
//! - `PIXEL_CACHE_SIZE` - Max cached bytes, e.g. `64MB` (default: 64MB)
//! - `PIXEL_FORMAT` - Output format, `png` or `jpeg` (default: png)
//! - `PIXEL_JPEG_QUALITY` - JPEG quality (default: 80)
//! - `PIXEL_MAX_DIMENSION` - Largest output width/height (default: 1024)
//! - `PIXEL_MAX_PIXEL_SIZE` - Largest accepted pixel size (default: 256)
//! - `PIXEL_CACHE_MAX_AGE` - HTTP cache max-age seconds (default: 3600)
//! - `PIXEL_CORS_ORIGINS` - Allowed CORS origins, comma-separated

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::cache::DEFAULT_CACHE_ENTRIES;
use crate::pixelate::{is_valid_quality, OutputFormat, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_DIMENSION};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default AWS region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default cache size, as accepted by [`parse_size`]. Matches
/// [`DEFAULT_CACHE_CAPACITY`](crate::cache::DEFAULT_CACHE_CAPACITY).
pub const DEFAULT_CACHE_SIZE: &str = "64MB";

/// Hard upper bound for any configured output dimension.
pub const MAX_OUTPUT_DIMENSION: u32 = 8192;

/// Default largest accepted pixel size.
pub const DEFAULT_MAX_PIXEL_SIZE: u32 = 256;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

/// Default pixel size for avatar requests.
pub const DEFAULT_PIXEL_SIZE: u32 = 4;

/// Default avatar edge length in pixels.
pub const DEFAULT_AVATAR_SIZE: u32 = 48;

// =============================================================================
// CLI Arguments
// =============================================================================

/// pixel-cache - pixelated avatars from a single-flight transform cache.
#[derive(Parser, Debug, Clone)]
#[command(name = "pixel-cache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP avatar server.
    Serve(ServeConfig),

    /// Pixelate a single local image and write the result to disk.
    Render(RenderConfig),
}

/// Configuration for the `serve` command.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "PIXEL_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "PIXEL_PORT")]
    pub port: u16,

    // =========================================================================
    // Source Configuration
    // =========================================================================
    /// Local directory containing source images.
    #[arg(long, env = "PIXEL_SOURCE_DIR", conflicts_with = "s3_bucket")]
    pub source_dir: Option<PathBuf>,

    /// S3 bucket containing source images.
    #[arg(long, env = "PIXEL_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Key prefix prepended to every source ID within the bucket.
    #[arg(long, env = "PIXEL_S3_PREFIX")]
    pub s3_prefix: Option<String>,

    /// Custom S3 endpoint URL for S3-compatible services (MinIO, etc.).
    #[arg(long, env = "PIXEL_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// AWS region for S3.
    #[arg(long, default_value = DEFAULT_REGION, env = "PIXEL_S3_REGION")]
    pub s3_region: String,

    // =========================================================================
    // Cache Configuration
    // =========================================================================
    /// Maximum number of transformed images to keep in cache.
    #[arg(long, default_value_t = DEFAULT_CACHE_ENTRIES, env = "PIXEL_CACHE_ENTRIES")]
    pub cache_entries: usize,

    /// Maximum total size of cached images (e.g. "64MB", "512KB").
    #[arg(long, default_value = DEFAULT_CACHE_SIZE, env = "PIXEL_CACHE_SIZE")]
    pub cache_size: String,

    // =========================================================================
    // Transform Configuration
    // =========================================================================
    /// Output format for pixelated images.
    #[arg(long, value_enum, default_value_t = OutputFormat::Png, env = "PIXEL_FORMAT")]
    pub format: OutputFormat,

    /// JPEG quality for JPEG output (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY, env = "PIXEL_JPEG_QUALITY")]
    pub jpeg_quality: u8,

    /// Largest accepted output width or height.
    #[arg(long, default_value_t = DEFAULT_MAX_DIMENSION, env = "PIXEL_MAX_DIMENSION")]
    pub max_dimension: u32,

    /// Largest accepted pixel size.
    #[arg(long, default_value_t = DEFAULT_MAX_PIXEL_SIZE, env = "PIXEL_MAX_PIXEL_SIZE")]
    pub max_pixel_size: u32,

    /// HTTP Cache-Control max-age in seconds for pixelated images.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "PIXEL_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    // =========================================================================
    // CORS Configuration
    // =========================================================================
    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "PIXEL_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    // =========================================================================
    // Logging Configuration
    // =========================================================================
    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

/// Where source images come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceBackend {
    Directory(PathBuf),
    S3 {
        bucket: String,
        prefix: String,
        endpoint: Option<String>,
        region: String,
    },
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.backend()?;

        if let Some(ref bucket) = self.s3_bucket {
            if bucket.is_empty() {
                return Err(
                    "S3 bucket name must not be empty. Set --s3-bucket or PIXEL_S3_BUCKET"
                        .to_string(),
                );
            }
        }

        if self.cache_entries == 0 {
            return Err("cache_entries must be greater than 0".to_string());
        }
        let cache_size = parse_size(&self.cache_size)?;
        if cache_size == 0 {
            return Err("cache_size must be greater than 0".to_string());
        }

        if !is_valid_quality(self.jpeg_quality) {
            return Err("jpeg_quality must be between 1 and 100".to_string());
        }

        if self.max_dimension == 0 || self.max_dimension > MAX_OUTPUT_DIMENSION {
            return Err(format!(
                "max_dimension must be between 1 and {}",
                MAX_OUTPUT_DIMENSION
            ));
        }
        if self.max_pixel_size == 0 {
            return Err("max_pixel_size must be greater than 0".to_string());
        }

        Ok(())
    }

    /// Resolve the configured source backend.
    pub fn backend(&self) -> Result<SourceBackend, String> {
        match (&self.source_dir, &self.s3_bucket) {
            (Some(dir), None) => Ok(SourceBackend::Directory(dir.clone())),
            (None, Some(bucket)) => Ok(SourceBackend::S3 {
                bucket: bucket.clone(),
                prefix: self.s3_prefix.clone().unwrap_or_default(),
                endpoint: self.s3_endpoint.clone(),
                region: self.s3_region.clone(),
            }),
            (Some(_), Some(_)) => {
                Err("--source-dir and --s3-bucket are mutually exclusive".to_string())
            }
            (None, None) => Err(
                "No image source configured. Set --source-dir (PIXEL_SOURCE_DIR) \
                 or --s3-bucket (PIXEL_S3_BUCKET)"
                    .to_string(),
            ),
        }
    }

    /// Cache capacity in bytes.
    pub fn cache_size_bytes(&self) -> Result<usize, String> {
        parse_size(&self.cache_size)
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Configuration for the `render` command.
#[derive(Args, Debug, Clone)]
pub struct RenderConfig {
    /// Source image to pixelate.
    #[arg(short, long)]
    pub input: PathBuf,

    /// Where to write the pixelated image.
    #[arg(short, long)]
    pub output: PathBuf,

    /// Edge length of one pixelation block.
    #[arg(long, default_value_t = DEFAULT_PIXEL_SIZE)]
    pub pixel_size: u32,

    /// Output width in pixels.
    #[arg(long, default_value_t = DEFAULT_AVATAR_SIZE)]
    pub width: u32,

    /// Output height in pixels.
    #[arg(long, default_value_t = DEFAULT_AVATAR_SIZE)]
    pub height: u32,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Png)]
    pub format: OutputFormat,

    /// JPEG quality for JPEG output (1-100).
    #[arg(long, default_value_t = DEFAULT_JPEG_QUALITY)]
    pub quality: u8,

    /// Largest accepted output width or height.
    #[arg(long, default_value_t = DEFAULT_MAX_DIMENSION)]
    pub max_dimension: u32,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl RenderConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if !is_valid_quality(self.quality) {
            return Err("quality must be between 1 and 100".to_string());
        }
        if self.max_dimension == 0 || self.max_dimension > MAX_OUTPUT_DIMENSION {
            return Err(format!(
                "max_dimension must be between 1 and {}",
                MAX_OUTPUT_DIMENSION
            ));
        }
        if self.width == 0 || self.height == 0 || self.pixel_size == 0 {
            return Err("pixel_size, width and height must be greater than 0".to_string());
        }
        if self.width > self.max_dimension || self.height > self.max_dimension {
            return Err(format!(
                "dimensions {}x{} exceed max_dimension {}",
                self.width, self.height, self.max_dimension
            ));
        }
        if self.input.file_name().is_none() {
            return Err(format!("input is not a file: {}", self.input.display()));
        }
        Ok(())
    }

    /// Split the input into the directory to serve from and the source ID
    /// within it.
    pub fn source_parts(&self) -> Result<(PathBuf, String), String> {
        let file_name = self
            .input
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| format!("input is not a valid file name: {}", self.input.display()))?;

        let dir = match self.input.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        Ok((dir, file_name.to_string()))
    }
}

/// Parse a human-readable byte size such as `"64MB"`, `"512 KB"`, `"1GiB"`
/// or a plain byte count.
pub fn parse_size(input: &str) -> Result<usize, String> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);

    let value: usize = digits
        .parse()
        .map_err(|_| format!("invalid size: {:?}", input))?;

    let multiplier: usize = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        other => return Err(format!("unknown size unit {:?} in {:?}", other, input)),
    };

    value
        .checked_mul(multiplier)
        .ok_or_else(|| format!("size too large: {:?}", input))
}

// =============================================================================
// Tests
// =============================================================================
