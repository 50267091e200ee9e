//! AWS S3 storage implementation.
//!
//! S3 replaces an object's tag set wholesale on `PutObjectTagging`, so
//! tagging reads the current set, merges, and writes it back. S3 allows at
//! most 10 tags per object; a merge that exceeds that is rejected by S3 and
//! surfaces as a storage error.

use aws_config::SdkConfig;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{Tag, Tagging};
use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::storage::{BlobStore, Tags};

/// S3-backed blob store.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
}

impl S3BlobStore {
    /// Create a new S3 blob store from a client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Create S3 blob store from shared AWS configuration.
    pub fn from_sdk_config(config: &SdkConfig) -> Self {
        Self::new(Client::new(config))
    }

    /// Read the current tag set of an object.
    pub async fn get_object_tagging(&self, bucket: &str, key: &str) -> Result<Tags> {
        let output = self
            .client
            .get_object_tagging()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::storage(bucket, key, DisplayErrorContext(e)))?;

        Ok(output
            .tag_set()
            .iter()
            .map(|tag| (tag.key().to_string(), tag.value().to_string()))
            .collect())
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::storage(bucket, key, DisplayErrorContext(e)))?;

        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| AppError::storage(bucket, key, e))?;

        log::info!("Fetched s3://{}/{}", bucket, key);
        Ok(bytes.into_bytes().to_vec())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| AppError::storage(bucket, key, DisplayErrorContext(e)))?;

        log::info!("Wrote {} bytes to s3://{}/{}", size, bucket, key);
        Ok(())
    }

    async fn put_object_tagging(&self, bucket: &str, key: &str, tags: &Tags) -> Result<()> {
        let mut merged = self.get_object_tagging(bucket, key).await?;
        merged.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));

        let tag_set = merged
            .iter()
            .map(|(k, v)| Tag::builder().key(k).value(v).build())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| AppError::storage(bucket, key, e))?;
        let tagging = Tagging::builder()
            .set_tag_set(Some(tag_set))
            .build()
            .map_err(|e| AppError::storage(bucket, key, e))?;

        self.client
            .put_object_tagging()
            .bucket(bucket)
            .key(key)
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| AppError::storage(bucket, key, DisplayErrorContext(e)))?;

        log::info!(
            "Tagged s3://{}/{} with {} tag(s)",
            bucket,
            key,
            merged.len()
        );
        Ok(())
    }
}
