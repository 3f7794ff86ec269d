//! S3-backed image source.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use bytes::Bytes;

use super::ImageSource;
use crate::error::SourceError;

/// Image source backed by objects in S3 or S3-compatible storage.
///
/// The source ID, prefixed with the optional key prefix, is used as the
/// object key within the bucket.
///
/// # Example
///
/// ```ignore
/// use pixel_cache::source::{create_s3_client, S3ImageSource};
///
/// let client = create_s3_client(None, "us-east-1").await;
/// let source = S3ImageSource::new(client, "avatars".to_string())
///     .with_prefix("public/");
///
/// // The source ID "avatar-1.png" becomes the key "public/avatar-1.png"
/// let raw = source.fetch("avatar-1.png").await?;
/// ```
#[derive(Clone)]
pub struct S3ImageSource {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3ImageSource {
    /// Create a new S3ImageSource for the given bucket.
    pub fn new(client: Client, bucket: String) -> Self {
        Self {
            client,
            bucket,
            prefix: String::new(),
        }
    }

    /// Set a key prefix prepended to every source ID.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Get the bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Build the object key for a source ID.
    pub fn object_key(&self, source_id: &str) -> String {
        format!("{}{}", self.prefix, source_id)
    }
}

#[async_trait]
impl ImageSource for S3ImageSource {
    async fn fetch(&self, source_id: &str) -> Result<Bytes, SourceError> {
        let key = self.object_key(source_id);
        let location = format!("s3://{}/{}", self.bucket, key);

        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .map_err(|e| {
                let is_no_such_key = e
                    .as_service_error()
                    .map(|se| se.is_no_such_key())
                    .unwrap_or(false);

                let status_is_404 = e
                    .raw_response()
                    .map(|r| r.status().as_u16() == 404)
                    .unwrap_or(false);

                if is_no_such_key || status_is_404 {
                    return SourceError::NotFound(location.clone());
                }

                SourceError::S3(e.to_string())
            })?;

        let data = resp
            .body
            .collect()
            .await
            .map_err(|e| SourceError::Connection(e.to_string()))?
            .into_bytes();

        Ok(data)
    }

    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.prefix)
    }
}

/// Create an S3 client with optional custom endpoint and region.
///
/// Use a custom endpoint for S3-compatible services like MinIO:
/// ```ignore
/// let client = create_s3_client(Some("http://localhost:9000"), "us-east-1").await;
/// ```
pub async fn create_s3_client(endpoint_url: Option<&str>, region: &str) -> Client {
    let region = aws_config::Region::new(region.to_string());
    let mut config_loader =
        aws_config::defaults(aws_config::BehaviorVersion::latest()).region(region);

    if let Some(endpoint) = endpoint_url {
        config_loader = config_loader.endpoint_url(endpoint);
    }

    let sdk_config = config_loader.load().await;

    // S3-compatible services generally need path-style addressing
    let s3_config = if endpoint_url.is_some() {
        aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(true)
            .build()
    } else {
        aws_sdk_s3::config::Builder::from(&sdk_config).build()
    };

    Client::from_conf(s3_config)
}
