//! Face recognition service abstraction.
//!
//! Detection, embedding and similarity search all live in an external
//! managed service; this trait is the narrow surface the resolver needs.

#[cfg(feature = "aws")]
pub mod rekognition;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{FaceDetection, FaceMatch, ImageLocation};

#[cfg(feature = "aws")]
pub use rekognition::RekognitionService;

/// Outcome of a create-collection call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionCreation {
    Created,
    /// Another caller created it first
    AlreadyExists,
}

/// Trait for face recognition backends.
#[async_trait]
pub trait FaceRecognition: Send + Sync {
    /// Whether the collection exists.
    async fn describe_collection(&self, collection_id: &str) -> Result<bool>;

    /// Create the collection.
    async fn create_collection(&self, collection_id: &str) -> Result<CollectionCreation>;

    /// Detect faces in an encoded image, in detector order.
    ///
    /// `location` is where `image` was read from; backends that can read the
    /// blob store directly may use it instead of the bytes.
    async fn detect_faces(
        &self,
        image: &[u8],
        location: &ImageLocation,
    ) -> Result<Vec<FaceDetection>>;

    /// Search the collection for faces similar to the (single-face) image.
    async fn search_faces_by_image(
        &self,
        collection_id: &str,
        image: &[u8],
        max_matches: i32,
        min_similarity: f32,
    ) -> Result<Vec<FaceMatch>>;

    /// Register the face in `image` under `external_id`; returns the new face ids.
    async fn index_faces(
        &self,
        collection_id: &str,
        image: &[u8],
        external_id: &str,
    ) -> Result<Vec<String>>;
}
