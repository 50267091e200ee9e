//! Upload notification payload.
//!
//! Only the fields needed to locate the uploaded object are modelled; the
//! rest of the S3 notification record is ignored.

use std::fmt;

use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Lambda invocation payload for an object-created notification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<UploadRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    pub bucket: BucketRef,
    pub object: ObjectRef,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BucketRef {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectRef {
    /// URL-encoded object key
    pub key: Option<String>,
}

/// Where an image lives in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageLocation {
    pub container: String,
    pub key: String,
}

impl ImageLocation {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ImageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.key)
    }
}

impl UploadRecord {
    /// Resolve the record to a decoded object location.
    pub fn location(&self) -> Result<ImageLocation> {
        let bucket = self
            .s3
            .bucket
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| AppError::event("record is missing s3.bucket.name"))?;
        let raw_key = self
            .s3
            .object
            .key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| AppError::event("record is missing s3.object.key"))?;

        Ok(ImageLocation::new(bucket, decode_key(raw_key)))
    }
}

impl UploadEvent {
    /// One location (or per-record error) for each notification record.
    pub fn locations(&self) -> Vec<Result<ImageLocation>> {
        self.records.iter().map(UploadRecord::location).collect()
    }
}

/// Decode an S3 notification key (`+` for space, `%XX` escapes).
pub fn decode_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}
