//! Local filesystem image source.

use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use super::ImageSource;
use crate::error::SourceError;

/// Image source that reads files below a root directory.
///
/// The source ID is interpreted as a relative path under the root, so
/// `"team/avatar-1.png"` reads `<root>/team/avatar-1.png`. IDs that are
/// absolute or that climb out of the root are rejected.
#[derive(Debug, Clone)]
pub struct FsImageSource {
    root: PathBuf,
}

impl FsImageSource {
    /// Create a source rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Get the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a source ID to a path under the root.
    pub fn resolve(&self, source_id: &str) -> Result<PathBuf, SourceError> {
        let relative = Path::new(source_id);

        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if source_id.is_empty() || escapes {
            return Err(SourceError::InvalidId(source_id.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ImageSource for FsImageSource {
    async fn fetch(&self, source_id: &str) -> Result<Bytes, SourceError> {
        let path = self.resolve(source_id)?;

        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(SourceError::NotFound(path.display().to_string()))
            }
            Err(e) => Err(SourceError::Connection(format!(
                "{}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn describe(&self) -> String {
        format!("file://{}", self.root.display())
    }
}
