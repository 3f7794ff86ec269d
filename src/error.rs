use thiserror::Error;

/// Errors raised by an image source while fetching raw image bytes
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// The requested image does not exist
    #[error("Image not found: {0}")]
    NotFound(String),

    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Network, connection or local I/O error
    #[error("Connection error: {0}")]
    Connection(String),

    /// The source identifier cannot be mapped onto the backing store
    #[error("Invalid source id: {0}")]
    InvalidId(String),
}

/// Errors raised by the pixelation algorithm
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    /// Raw bytes could not be decoded as an image
    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    /// Requested output dimensions are unusable
    #[error("Invalid dimensions {width}x{height} with pixel size {pixel_size}: {reason}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        pixel_size: u32,
        reason: String,
    },

    /// Pixelated image could not be encoded
    #[error("Failed to encode image: {message}")]
    Encode { message: String },
}

/// Errors surfaced by the transform cache.
///
/// Every variant is `Clone` because a single settled error is handed to
/// every waiter of the failed entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// Caller supplied an empty identifier or a non-positive parameter.
    /// Never cached, never shared.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// The image source could not supply the raw image
    #[error("Source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),

    /// The pixelation algorithm rejected the input
    #[error("Transform failed: {0}")]
    TransformFailed(#[from] TransformError),

    /// The producing task ended without settling the entry
    #[error("Transform for {source_id} was cancelled before completion")]
    Cancelled { source_id: String },
}

impl CacheError {
    /// Create an `InvalidRequest` error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        CacheError::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Whether the presentation layer should degrade to a fallback rendering
    /// instead of reporting the error to the caller.
    pub fn is_degradable(&self) -> bool {
        !matches!(self, CacheError::InvalidRequest { .. })
    }
}
