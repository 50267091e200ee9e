//! Local filesystem storage implementation.
//!
//! Mirrors the blob store layout on disk for development and testing.
//! Production deployments should use S3BlobStore.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! └── {container}/
//!     ├── {key}                 # Object bytes
//!     └── {key}.tags.json       # Tag set
//! ```

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::{BlobStore, Tags};

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root_dir: PathBuf,
}

impl LocalBlobStore {
    /// Create a new LocalBlobStore rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the full path for an object, rejecting keys that escape the root.
    fn path(&self, container: &str, key: &str) -> Result<PathBuf> {
        let relative = Path::new(container).join(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if escapes || container.is_empty() || key.is_empty() {
            return Err(AppError::storage(container, key, "invalid object path"));
        }
        Ok(self.root_dir.join(relative))
    }

    fn tags_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".tags.json");
        PathBuf::from(name)
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Read the tag set of an object (empty if never tagged).
    pub async fn get_object_tagging(&self, container: &str, key: &str) -> Result<Tags> {
        let path = Self::tags_path(&self.path(container, key)?);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Tags::new()),
            Err(e) => Err(AppError::storage(container, key, e)),
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn get_object(&self, container: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.path(container, key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| AppError::storage(container, key, e))
    }

    async fn put_object(
        &self,
        container: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let path = self.path(container, key)?;
        Self::write_bytes(&path, &bytes)
            .await
            .map_err(|e| AppError::storage(container, key, e))?;
        log::debug!(
            "Stored {} bytes ({}) at {}",
            bytes.len(),
            content_type,
            path.display()
        );
        Ok(())
    }

    async fn put_object_tagging(&self, container: &str, key: &str, tags: &Tags) -> Result<()> {
        let path = self.path(container, key)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(AppError::storage(container, key, "no such object"));
        }

        let mut merged = self.get_object_tagging(container, key).await?;
        merged.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));

        let bytes = serde_json::to_vec_pretty(&merged)?;
        Self::write_bytes(&Self::tags_path(&path), &bytes)
            .await
            .map_err(|e| AppError::storage(container, key, e))
    }
}
