//! In-memory fakes for the collaborator traits, with call recording and
//! per-operation failure injection.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Cursor;
use std::sync::Mutex;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use crate::error::{AppError, Result};
use crate::models::{FaceDetection, FaceMatch, ImageLocation};
use crate::recognition::{CollectionCreation, FaceRecognition};
use crate::storage::{BlobStore, Tags};

/// A JPEG with a soft gradient, big enough to crop faces from.
pub fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(image)
        .write_to(&mut buf, ImageFormat::Jpeg)
        .unwrap();
    buf.into_inner()
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub tags: Tags,
}

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl MemoryBlobStore {
    pub fn with_object(container: &str, key: &str, bytes: Vec<u8>) -> Self {
        let store = Self::default();
        store.objects.lock().unwrap().insert(
            (container.to_string(), key.to_string()),
            StoredObject {
                bytes,
                content_type: "image/jpeg".to_string(),
                tags: Tags::new(),
            },
        );
        store
    }

    /// Make every call to `operation` fail.
    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn object(&self, container: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&(container.to_string(), key.to_string()))
            .cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Number of calls made to `operation`.
    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    fn record(&self, operation: &'static str, container: &str, key: &str) -> Result<()> {
        self.calls.lock().unwrap().push(operation.to_string());
        if self.failing.lock().unwrap().contains(operation) {
            return Err(AppError::storage(container, key, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get_object(&self, container: &str, key: &str) -> Result<Vec<u8>> {
        self.record("get_object", container, key)?;
        self.object(container, key)
            .map(|o| o.bytes)
            .ok_or_else(|| AppError::storage(container, key, "no such key"))
    }

    async fn put_object(
        &self,
        container: &str,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        self.record("put_object", container, key)?;
        self.objects.lock().unwrap().insert(
            (container.to_string(), key.to_string()),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
                tags: Tags::new(),
            },
        );
        Ok(())
    }

    async fn put_object_tagging(&self, container: &str, key: &str, tags: &Tags) -> Result<()> {
        self.record("put_object_tagging", container, key)?;
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(&(container.to_string(), key.to_string()))
            .ok_or_else(|| AppError::storage(container, key, "no such key"))?;
        object
            .tags
            .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeRecognition {
    collections: Mutex<HashSet<String>>,
    detections: Vec<FaceDetection>,
    /// Responses handed out to successive searches; empty once drained
    search_results: Mutex<VecDeque<Vec<FaceMatch>>>,
    indexed: Mutex<Vec<(String, String)>>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl FakeRecognition {
    pub fn new(detections: Vec<FaceDetection>) -> Self {
        Self {
            detections,
            ..Self::default()
        }
    }

    pub fn with_collection(self, collection_id: &str) -> Self {
        self.collections
            .lock()
            .unwrap()
            .insert(collection_id.to_string());
        self
    }

    pub fn with_search_results(self, results: Vec<Vec<FaceMatch>>) -> Self {
        *self.search_results.lock().unwrap() = results.into();
        self
    }

    pub fn fail(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn has_collection(&self, collection_id: &str) -> bool {
        self.collections.lock().unwrap().contains(collection_id)
    }

    /// `(collection, external_id)` pairs registered so far.
    pub fn indexed(&self) -> Vec<(String, String)> {
        self.indexed.lock().unwrap().clone()
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    fn record(&self, operation: &'static str) -> Result<()> {
        self.calls.lock().unwrap().push(operation.to_string());
        if self.failing.lock().unwrap().contains(operation) {
            return Err(AppError::recognition(operation, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl FaceRecognition for FakeRecognition {
    async fn describe_collection(&self, collection_id: &str) -> Result<bool> {
        self.record("describe_collection")
            .map_err(|e| AppError::provisioning(collection_id, e))?;
        Ok(self.has_collection(collection_id))
    }

    async fn create_collection(&self, collection_id: &str) -> Result<CollectionCreation> {
        self.record("create_collection")
            .map_err(|e| AppError::provisioning(collection_id, e))?;
        if self
            .collections
            .lock()
            .unwrap()
            .insert(collection_id.to_string())
        {
            Ok(CollectionCreation::Created)
        } else {
            Ok(CollectionCreation::AlreadyExists)
        }
    }

    async fn detect_faces(
        &self,
        _image: &[u8],
        _location: &ImageLocation,
    ) -> Result<Vec<FaceDetection>> {
        self.record("detect_faces")?;
        Ok(self.detections.clone())
    }

    async fn search_faces_by_image(
        &self,
        collection_id: &str,
        _image: &[u8],
        max_matches: i32,
        min_similarity: f32,
    ) -> Result<Vec<FaceMatch>> {
        self.record("search_faces_by_image")?;
        if !self.has_collection(collection_id) {
            return Err(AppError::recognition(
                "search_faces_by_image",
                "collection not found",
            ));
        }
        let matches = self
            .search_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Ok(matches
            .into_iter()
            .filter(|m| m.similarity >= min_similarity)
            .take(max_matches.max(0) as usize)
            .collect())
    }

    async fn index_faces(
        &self,
        collection_id: &str,
        _image: &[u8],
        external_id: &str,
    ) -> Result<Vec<String>> {
        self.record("index_faces")?;
        let mut indexed = self.indexed.lock().unwrap();
        indexed.push((collection_id.to_string(), external_id.to_string()));
        Ok(vec![format!("face-{}", indexed.len())])
    }
}
