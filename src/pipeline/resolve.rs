// src/pipeline/resolve.rs

//! Identity resolution pipeline.
//!
//! For one uploaded image:
//! 1. Ensure the face collection exists
//! 2. Fetch and decode the image
//! 3. Detect faces
//! 4. Per face: crop, search the collection, then either tag the source
//!    image with the matched identity or register a new identity
//!
//! Steps 1-3 abort the invocation on failure. Per-face failures are
//! recorded in the report and never stop the remaining faces.

use std::sync::Arc;

use image::DynamicImage;
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};
use crate::models::{
    Config, DetectionReport, FaceDetection, FaceFailure, FaceMatch, FaceReport, FaceStage,
    Identity, ImageLocation, PixelBox, Resolution, StepStatus,
};
use crate::pipeline::crop::{crop_region, decode_image, pixel_box};
use crate::recognition::{CollectionCreation, FaceRecognition};
use crate::storage::{BlobStore, JPEG_CONTENT_TYPE, Tags};

/// Tag key carrying the region fingerprint on stored crops.
pub const REGION_TAG_KEY: &str = "region";

/// State of the collection after provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionStatus {
    Existing,
    Created,
}

/// Coordinates the blob store and the recognition service.
#[derive(Clone)]
pub struct IdentityResolver {
    store: Arc<dyn BlobStore>,
    recognition: Arc<dyn FaceRecognition>,
    config: Arc<Config>,
}

impl IdentityResolver {
    pub fn new(
        store: Arc<dyn BlobStore>,
        recognition: Arc<dyn FaceRecognition>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            store,
            recognition,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Create the collection if it does not exist yet.
    ///
    /// A concurrent creator winning the race counts as success.
    pub async fn ensure_collection(&self) -> Result<CollectionStatus> {
        let collection_id = &self.config.recognition.collection_id;

        if self.recognition.describe_collection(collection_id).await? {
            log::info!("Collection '{}' already exists", collection_id);
            return Ok(CollectionStatus::Existing);
        }

        match self.recognition.create_collection(collection_id).await? {
            CollectionCreation::Created => {
                log::info!("Collection '{}' created", collection_id);
                Ok(CollectionStatus::Created)
            }
            CollectionCreation::AlreadyExists => {
                log::info!("Collection '{}' was created concurrently", collection_id);
                Ok(CollectionStatus::Existing)
            }
        }
    }

    /// Resolve every face in the image at `location`.
    pub async fn process(&self, location: &ImageLocation) -> Result<DetectionReport> {
        log::info!("Processing image {}", location);

        self.ensure_collection().await.map_err(|e| match e {
            AppError::CollectionProvisioning { .. } => e,
            other => AppError::provisioning(&self.config.recognition.collection_id, other),
        })?;

        let bytes = self
            .store
            .get_object(&location.container, &location.key)
            .await?;
        let image = decode_image(&bytes)?;

        let detections = self.recognition.detect_faces(&bytes, location).await?;
        log::info!("Number of faces detected: {}", detections.len());

        let mut report = DetectionReport::new(location.clone(), image.width(), image.height());
        for (index, detection) in detections.into_iter().enumerate() {
            let face = self.process_face(location, &image, index, detection).await;
            report.faces.push(face);
        }

        log::info!(
            "Finished {}: {} face(s), {} matched, {} new, {} incomplete",
            location,
            report.face_count(),
            report.matched_identities().len(),
            report.new_identities().len(),
            report.failure_count()
        );
        Ok(report)
    }

    async fn process_face(
        &self,
        location: &ImageLocation,
        image: &DynamicImage,
        index: usize,
        detection: FaceDetection,
    ) -> FaceReport {
        let region = pixel_box(&detection.bounding_box, image.width(), image.height());
        let outcome = self.resolve_face(location, image, index, &region).await;

        if let Err(failure) = &outcome {
            log::error!(
                "Face {} failed at {:?}: {}",
                index + 1,
                failure.stage,
                failure.error
            );
        }

        FaceReport {
            index,
            detection,
            pixel_box: Some(region),
            outcome,
        }
    }

    async fn resolve_face(
        &self,
        location: &ImageLocation,
        image: &DynamicImage,
        index: usize,
        region: &PixelBox,
    ) -> std::result::Result<Resolution, FaceFailure> {
        let crop = crop_region(image, region, self.config.storage.jpeg_quality).map_err(|e| {
            FaceFailure {
                stage: FaceStage::Crop,
                error: e.to_string(),
            }
        })?;

        let recognition = &self.config.recognition;
        let matches = self
            .recognition
            .search_faces_by_image(
                &recognition.collection_id,
                &crop,
                recognition.max_matches,
                recognition.similarity_threshold,
            )
            .await
            .map_err(|e| FaceFailure {
                stage: FaceStage::Search,
                error: e.to_string(),
            })?;

        match self.best_match(&matches)? {
            Some((identity, similarity)) => {
                log::info!(
                    "Face {} matches with {} at {:.2}% similarity",
                    index + 1,
                    identity,
                    similarity
                );
                Ok(self.record_match(location, identity, similarity).await)
            }
            None => {
                log::info!("Face {} has no match in the collection", index + 1);
                Ok(self.register_identity(location, region, crop).await)
            }
        }
    }

    /// Highest-similarity match at or above the threshold.
    fn best_match<'a>(
        &self,
        matches: &'a [FaceMatch],
    ) -> std::result::Result<Option<(&'a str, f32)>, FaceFailure> {
        let threshold = self.config.recognition.similarity_threshold;
        let Some(best) = matches
            .iter()
            .filter(|m| m.similarity >= threshold)
            .max_by(|a, b| a.similarity.total_cmp(&b.similarity))
        else {
            return Ok(None);
        };

        match best.identity.as_deref() {
            Some(identity) if !identity.is_empty() => Ok(Some((identity, best.similarity))),
            _ => Err(FaceFailure {
                stage: FaceStage::Search,
                error: format!(
                    "match {} has no external identity",
                    best.face_id.as_deref().unwrap_or("<unknown>")
                ),
            }),
        }
    }

    /// Tag the source image with a matched identity.
    async fn record_match(
        &self,
        location: &ImageLocation,
        identity: &str,
        similarity: f32,
    ) -> Resolution {
        let tags = Tags::from([(identity.to_string(), format!("{similarity:.2}"))]);
        let tagged = self
            .store
            .put_object_tagging(&location.container, &location.key, &tags)
            .await;
        if let Err(e) = &tagged {
            log::error!("Failed to tag {} with {}: {}", location, identity, e);
        }

        Resolution::Matched {
            identity: identity.to_string(),
            similarity,
            source_tag: StepStatus::from_result(&tagged),
        }
    }

    /// Mint an identity for an unknown face, store its crop and index it.
    ///
    /// Each step is attempted even if an earlier one failed.
    async fn register_identity(
        &self,
        location: &ImageLocation,
        region: &PixelBox,
        crop: Vec<u8>,
    ) -> Resolution {
        let storage = &self.config.storage;
        let identity = Identity::mint();
        let container = storage
            .faces_container
            .as_deref()
            .unwrap_or(&location.container);
        let crop_key = storage.crop_key(identity.as_str());
        log::info!("Registering new identity {} at {}/{}", identity, container, crop_key);

        let stored = self
            .store
            .put_object(container, &crop_key, crop.clone(), JPEG_CONTENT_TYPE)
            .await;
        if let Err(e) = &stored {
            log::error!("Failed to store crop for {}: {}", identity, e);
        }

        let tags = Tags::from([
            (storage.identity_tag_key.clone(), identity.to_string()),
            (
                REGION_TAG_KEY.to_string(),
                region_fingerprint(location, region),
            ),
        ]);
        let tagged = self
            .store
            .put_object_tagging(container, &crop_key, &tags)
            .await;
        if let Err(e) = &tagged {
            log::error!("Failed to tag crop for {}: {}", identity, e);
        }

        let indexed = self
            .recognition
            .index_faces(
                &self.config.recognition.collection_id,
                &crop,
                identity.as_str(),
            )
            .await;
        match &indexed {
            Ok(face_ids) => log::debug!("Indexed {} as {:?}", identity, face_ids),
            Err(e) => log::error!("Failed to index face for {}: {}", identity, e),
        }

        Resolution::Registered {
            identity: identity.to_string(),
            crop_key,
            stored: StepStatus::from_result(&stored),
            tagged: StepStatus::from_result(&tagged),
            indexed: StepStatus::from_result(&indexed),
        }
    }
}

/// Stable fingerprint of a face region within a source image.
///
/// Two invocations racing on the same upload produce the same fingerprint
/// for the same face, so duplicate identities can be found afterwards.
pub fn region_fingerprint(location: &ImageLocation, region: &PixelBox) -> String {
    let mut hasher = Sha256::new();
    hasher.update(location.container.as_bytes());
    hasher.update([0]);
    hasher.update(location.key.as_bytes());
    hasher.update([0]);
    for coord in [region.left, region.top, region.right, region.bottom] {
        hasher.update(coord.to_be_bytes());
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundingBox;
    use crate::testing::{FakeRecognition, MemoryBlobStore, sample_jpeg};

    const BUCKET: &str = "uploads";
    const KEY: &str = "events/group.jpg";
    const COLLECTION: &str = "scu_faces_collection";

    fn detection(left: f32, top: f32) -> FaceDetection {
        FaceDetection::new(BoundingBox::new(left, top, 0.25, 0.25))
    }

    fn matched(identity: &str, similarity: f32) -> FaceMatch {
        FaceMatch {
            identity: Some(identity.to_string()),
            face_id: Some(format!("face-of-{identity}")),
            similarity,
        }
    }

    fn resolver(
        store: Arc<MemoryBlobStore>,
        recognition: Arc<FakeRecognition>,
    ) -> IdentityResolver {
        IdentityResolver::new(store, recognition, Arc::new(Config::default()))
    }

    fn setup(
        detections: Vec<FaceDetection>,
        search_results: Vec<Vec<FaceMatch>>,
    ) -> (Arc<MemoryBlobStore>, Arc<FakeRecognition>, IdentityResolver) {
        let store = Arc::new(MemoryBlobStore::with_object(
            BUCKET,
            KEY,
            sample_jpeg(200, 160),
        ));
        let recognition = Arc::new(
            FakeRecognition::new(detections)
                .with_collection(COLLECTION)
                .with_search_results(search_results),
        );
        let resolver = resolver(store.clone(), recognition.clone());
        (store, recognition, resolver)
    }

    fn location() -> ImageLocation {
        ImageLocation::new(BUCKET, KEY)
    }

    #[tokio::test]
    async fn test_ensure_collection_creates_then_is_idempotent() {
        let store = Arc::new(MemoryBlobStore::default());
        let recognition = Arc::new(FakeRecognition::default());
        let resolver = resolver(store, recognition.clone());

        assert_eq!(
            resolver.ensure_collection().await.unwrap(),
            CollectionStatus::Created
        );
        assert_eq!(
            resolver.ensure_collection().await.unwrap(),
            CollectionStatus::Existing
        );
        assert!(recognition.has_collection(COLLECTION));
        assert_eq!(recognition.calls("create_collection"), 1);
    }

    #[tokio::test]
    async fn test_ensure_collection_failure_aborts_processing() {
        let (store, recognition, resolver) = setup(vec![detection(0.1, 0.1)], vec![]);
        recognition.fail("describe_collection");

        let err = resolver.process(&location()).await.unwrap_err();
        assert!(matches!(err, AppError::CollectionProvisioning { .. }));
        assert_eq!(store.calls("get_object"), 0);
        assert_eq!(recognition.calls("detect_faces"), 0);
    }

    #[tokio::test]
    async fn test_match_tags_source_and_mints_nothing() {
        let (store, recognition, resolver) =
            setup(vec![detection(0.1, 0.1)], vec![vec![matched("A", 97.5)]]);

        let report = resolver.process(&location()).await.unwrap();

        assert_eq!(report.face_count(), 1);
        assert!(report.new_identities().is_empty());
        assert_eq!(store.calls("put_object_tagging"), 1);
        assert_eq!(store.calls("put_object"), 0);
        assert_eq!(recognition.calls("index_faces"), 0);
        assert_eq!(store.object(BUCKET, KEY).unwrap().tags["A"], "97.50");
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_no_match_registers_new_identity() {
        let (store, recognition, resolver) = setup(vec![detection(0.5, 0.5)], vec![]);

        let report = resolver.process(&location()).await.unwrap();

        let new_ids = report.new_identities();
        assert_eq!(new_ids.len(), 1);
        let crop_key = format!("faces/{}", new_ids[0]);

        assert_eq!(store.calls("put_object"), 1);
        assert_eq!(store.calls("put_object_tagging"), 1);
        assert_eq!(recognition.calls("index_faces"), 1);

        let crop = store.object(BUCKET, &crop_key).unwrap();
        assert_eq!(crop.content_type, "image/jpeg");
        assert_eq!(crop.tags["id"], new_ids[0]);
        assert_eq!(crop.tags[REGION_TAG_KEY].len(), 64);
        assert_eq!(
            recognition.indexed(),
            vec![(COLLECTION.to_string(), new_ids[0].to_string())]
        );

        // Source image is left untagged
        assert!(store.object(BUCKET, KEY).unwrap().tags.is_empty());
    }

    #[tokio::test]
    async fn test_registration_steps_fail_independently() {
        let (store, recognition, resolver) =
            setup(vec![detection(0.1, 0.1), detection(0.6, 0.6)], vec![]);
        store.fail("put_object");

        let report = resolver.process(&location()).await.unwrap();

        assert_eq!(report.face_count(), 2);
        for face in &report.faces {
            match face.outcome.as_ref().unwrap() {
                Resolution::Registered {
                    stored,
                    tagged,
                    indexed,
                    ..
                } => {
                    assert!(!stored.is_done());
                    // Tagging a crop that was never stored fails too
                    assert!(!tagged.is_done());
                    assert!(indexed.is_done());
                }
                other => panic!("unexpected resolution {other:?}"),
            }
        }
        assert_eq!(store.calls("put_object"), 2);
        assert_eq!(store.calls("put_object_tagging"), 2);
        assert_eq!(recognition.calls("index_faces"), 2);
        assert_eq!(report.failure_count(), 2);
    }

    #[tokio::test]
    async fn test_index_failure_keeps_stored_crop() {
        let (store, recognition, resolver) = setup(vec![detection(0.1, 0.1)], vec![]);
        recognition.fail("index_faces");

        let report = resolver.process(&location()).await.unwrap();

        let identity = report.new_identities()[0].to_string();
        assert!(store.object(BUCKET, &format!("faces/{identity}")).is_some());
        assert!(matches!(
            report.faces[0].outcome,
            Ok(Resolution::Registered {
                indexed: StepStatus::Failed { .. },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_source_tag_failure_does_not_stop_other_faces() {
        let (store, recognition, resolver) = setup(
            vec![detection(0.0, 0.0), detection(0.5, 0.5)],
            vec![vec![matched("A", 93.0)]],
        );
        store.fail("put_object_tagging");

        let report = resolver.process(&location()).await.unwrap();

        assert_eq!(report.face_count(), 2);
        assert!(matches!(
            report.faces[0].outcome,
            Ok(Resolution::Matched {
                source_tag: StepStatus::Failed { .. },
                ..
            })
        ));
        assert_eq!(recognition.calls("search_faces_by_image"), 2);
        assert_eq!(report.new_identities().len(), 1);
    }

    #[tokio::test]
    async fn test_two_faces_one_known_one_new() {
        let (store, recognition, resolver) = setup(
            vec![detection(0.1, 0.1), detection(0.6, 0.5)],
            vec![vec![matched("A", 95.0)], vec![]],
        );

        let report = resolver.process(&location()).await.unwrap();

        assert_eq!(report.face_count(), 2);
        assert_eq!(report.matched_identities(), vec!["A"]);

        let source = store.object(BUCKET, KEY).unwrap();
        assert_eq!(source.tags.len(), 1);
        assert_eq!(source.tags["A"], "95.00");

        let new_ids = report.new_identities();
        assert_eq!(new_ids.len(), 1);
        assert_ne!(new_ids[0], "A");
        assert_eq!(
            store.keys(),
            vec![KEY.to_string(), format!("faces/{}", new_ids[0])]
        );
        assert_eq!(recognition.indexed().len(), 1);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_zero_faces_touches_nothing() {
        let (store, recognition, resolver) = setup(vec![], vec![]);

        let report = resolver.process(&location()).await.unwrap();

        assert!(report.faces.is_empty());
        assert_eq!((report.image_width, report.image_height), (200, 160));
        assert_eq!(store.calls("put_object"), 0);
        assert_eq!(store.calls("put_object_tagging"), 0);
        assert_eq!(recognition.calls("create_collection"), 0);
        assert_eq!(recognition.calls("search_faces_by_image"), 0);
        assert_eq!(recognition.calls("index_faces"), 0);
    }

    #[tokio::test]
    async fn test_below_threshold_match_is_ignored() {
        let (_store, recognition, resolver) =
            setup(vec![detection(0.1, 0.1)], vec![vec![matched("A", 89.9)]]);

        let report = resolver.process(&location()).await.unwrap();

        assert!(report.matched_identities().is_empty());
        assert_eq!(report.new_identities().len(), 1);
        assert_eq!(recognition.calls("index_faces"), 1);
    }

    #[tokio::test]
    async fn test_match_without_identity_is_face_failure() {
        let (store, _recognition, resolver) = setup(
            vec![detection(0.1, 0.1)],
            vec![vec![FaceMatch {
                identity: None,
                face_id: Some("f-1".into()),
                similarity: 99.0,
            }]],
        );

        let report = resolver.process(&location()).await.unwrap();

        assert!(matches!(
            &report.faces[0].outcome,
            Err(FaceFailure { stage: FaceStage::Search, .. })
        ));
        assert_eq!(store.calls("put_object"), 0);
    }

    #[tokio::test]
    async fn test_search_failure_is_per_face() {
        let (store, recognition, resolver) =
            setup(vec![detection(0.1, 0.1), detection(0.5, 0.5)], vec![]);
        recognition.fail("search_faces_by_image");

        let report = resolver.process(&location()).await.unwrap();

        assert_eq!(report.face_count(), 2);
        assert_eq!(report.failure_count(), 2);
        assert_eq!(store.calls("put_object"), 0);
    }

    #[tokio::test]
    async fn test_degenerate_box_is_crop_failure() {
        let (_store, recognition, resolver) = setup(
            vec![
                FaceDetection::new(BoundingBox::new(1.5, 0.2, 0.2, 0.2)),
                detection(0.2, 0.2),
            ],
            vec![],
        );

        let report = resolver.process(&location()).await.unwrap();

        assert!(matches!(
            &report.faces[0].outcome,
            Err(FaceFailure { stage: FaceStage::Crop, .. })
        ));
        assert!(report.faces[1].outcome.is_ok());
        assert_eq!(recognition.calls("search_faces_by_image"), 1);
    }

    #[tokio::test]
    async fn test_unreadable_image_skips_detection() {
        let store = Arc::new(MemoryBlobStore::with_object(BUCKET, KEY, b"GIF89a....".to_vec()));
        let recognition = Arc::new(FakeRecognition::new(vec![]).with_collection(COLLECTION));
        let resolver = resolver(store, recognition.clone());

        let err = resolver.process(&location()).await.unwrap_err();
        assert!(matches!(err, AppError::UnreadableImage(_)));
        assert_eq!(recognition.calls("detect_faces"), 0);
    }

    #[tokio::test]
    async fn test_missing_object_is_storage_error() {
        let (_store, _recognition, resolver) = setup(vec![], vec![]);

        let err = resolver
            .process(&ImageLocation::new(BUCKET, "missing.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::StorageUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_faces_container_override() {
        let store = Arc::new(MemoryBlobStore::with_object(BUCKET, KEY, sample_jpeg(64, 64)));
        let recognition = Arc::new(
            FakeRecognition::new(vec![detection(0.25, 0.25)]).with_collection(COLLECTION),
        );
        let mut config = Config::default();
        config.storage.faces_container = Some("face-crops".to_string());
        let resolver = IdentityResolver::new(store.clone(), recognition, Arc::new(config));

        let report = resolver.process(&location()).await.unwrap();

        let identity = report.new_identities()[0].to_string();
        assert!(store.object("face-crops", &format!("faces/{identity}")).is_some());
    }

    #[test]
    fn test_region_fingerprint_is_stable() {
        let region = PixelBox {
            left: 1,
            top: 2,
            right: 3,
            bottom: 4,
        };
        let a = region_fingerprint(&location(), &region);
        assert_eq!(a, region_fingerprint(&location(), &region));

        let moved = PixelBox { left: 2, ..region };
        assert_ne!(a, region_fingerprint(&location(), &moved));
    }
}
