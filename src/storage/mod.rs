//! Blob storage abstractions.
//!
//! The resolver reads uploaded images from, and writes face crops to, an
//! object store addressed by `(container, key)`:
//!
//! ```text
//! {container}/
//! ├── uploads/group.jpg        # Source image (tagged with matched identities)
//! └── faces/
//!     └── {identity}           # Stored crop (tagged with its identity)
//! ```

pub mod local;
#[cfg(feature = "aws")]
pub mod s3;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::error::Result;

// Re-export for convenience
pub use local::LocalBlobStore;
#[cfg(feature = "aws")]
pub use s3::S3BlobStore;

/// Object tag set.
pub type Tags = BTreeMap<String, String>;

/// Content type for stored face crops.
pub const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// Trait for blob store backends.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Fetch an object's bytes.
    async fn get_object(&self, container: &str, key: &str) -> Result<Vec<u8>>;

    /// Store an object, replacing any existing one.
    async fn put_object(
        &self,
        container: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()>;

    /// Merge `tags` into the object's tag set.
    ///
    /// Existing tags with other keys are kept; tags with the same key are
    /// overwritten.
    async fn put_object_tagging(&self, container: &str, key: &str, tags: &Tags) -> Result<()>;
}
