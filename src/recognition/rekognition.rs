//! AWS Rekognition implementation.

use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_rekognition::Client;
use aws_sdk_rekognition::error::DisplayErrorContext;
use aws_sdk_rekognition::primitives::Blob;
use aws_sdk_rekognition::types::{Attribute, FaceDetail, Image, S3Object};

use crate::error::{AppError, Result};
use crate::models::{BoundingBox, FaceAttributes, FaceDetection, FaceMatch, ImageLocation};
use crate::recognition::{CollectionCreation, FaceRecognition};

/// Rekognition-backed face recognition.
#[derive(Clone)]
pub struct RekognitionService {
    client: Client,
    /// Detect on the stored S3 object rather than inline bytes
    s3_objects: bool,
}

impl RekognitionService {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            s3_objects: false,
        }
    }

    /// Detect faces by S3 reference, which lifts the inline 5 MB image cap
    /// to the service's 15 MB object limit. Only valid when uploads live in S3.
    pub fn with_s3_objects(mut self) -> Self {
        self.s3_objects = true;
        self
    }

    pub fn from_sdk_config(config: &SdkConfig) -> Self {
        Self::new(Client::new(config))
    }

    fn image(bytes: &[u8]) -> Image {
        Image::builder().bytes(Blob::new(bytes.to_vec())).build()
    }
}

/// Image reference for detection: the S3 object when enabled, else inline bytes.
fn detection_image(bytes: &[u8], location: &ImageLocation, s3_objects: bool) -> Image {
    if !s3_objects {
        return RekognitionService::image(bytes);
    }
    Image::builder()
        .s3_object(
            S3Object::builder()
                .bucket(&location.container)
                .name(&location.key)
                .build(),
        )
        .build()
}

/// Convert a Rekognition face detail into the domain detection.
fn to_detection(detail: &FaceDetail) -> Option<FaceDetection> {
    let bbox = detail.bounding_box()?;
    let bounding_box = BoundingBox::new(
        bbox.left()?,
        bbox.top()?,
        bbox.width()?,
        bbox.height()?,
    );

    let dominant_emotion = detail
        .emotions()
        .iter()
        .filter_map(|e| Some((e.r#type()?, e.confidence()?)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(kind, _)| kind.as_str().to_string());

    Some(FaceDetection {
        bounding_box,
        confidence: detail.confidence(),
        attributes: FaceAttributes {
            age_low: detail.age_range().and_then(|a| a.low()),
            age_high: detail.age_range().and_then(|a| a.high()),
            gender: detail
                .gender()
                .and_then(|g| g.value())
                .map(|g| g.as_str().to_string()),
            smile: detail.smile().map(|s| s.value()),
            dominant_emotion,
        },
    })
}

#[async_trait]
impl FaceRecognition for RekognitionService {
    async fn describe_collection(&self, collection_id: &str) -> Result<bool> {
        match self
            .client
            .describe_collection()
            .collection_id(collection_id)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_resource_not_found_exception() {
                    Ok(false)
                } else {
                    Err(AppError::provisioning(
                        collection_id,
                        DisplayErrorContext(service_err),
                    ))
                }
            }
        }
    }

    async fn create_collection(&self, collection_id: &str) -> Result<CollectionCreation> {
        match self
            .client
            .create_collection()
            .collection_id(collection_id)
            .send()
            .await
        {
            Ok(_) => Ok(CollectionCreation::Created),
            Err(err) => {
                let service_err = err.into_service_error();
                if service_err.is_resource_already_exists_exception() {
                    Ok(CollectionCreation::AlreadyExists)
                } else {
                    Err(AppError::provisioning(
                        collection_id,
                        DisplayErrorContext(service_err),
                    ))
                }
            }
        }
    }

    async fn detect_faces(
        &self,
        image: &[u8],
        location: &ImageLocation,
    ) -> Result<Vec<FaceDetection>> {
        let output = self
            .client
            .detect_faces()
            .image(detection_image(image, location, self.s3_objects))
            .attributes(Attribute::All)
            .send()
            .await
            .map_err(|e| AppError::recognition("detect_faces", DisplayErrorContext(e)))?;

        let details = output.face_details();
        let detections: Vec<FaceDetection> = details.iter().filter_map(to_detection).collect();
        if detections.len() < details.len() {
            log::warn!(
                "Dropped {} face(s) without a complete bounding box",
                details.len() - detections.len()
            );
        }
        Ok(detections)
    }

    async fn search_faces_by_image(
        &self,
        collection_id: &str,
        image: &[u8],
        max_matches: i32,
        min_similarity: f32,
    ) -> Result<Vec<FaceMatch>> {
        let output = self
            .client
            .search_faces_by_image()
            .collection_id(collection_id)
            .image(Self::image(image))
            .max_faces(max_matches)
            .face_match_threshold(min_similarity)
            .send()
            .await
            .map_err(|e| {
                AppError::recognition("search_faces_by_image", DisplayErrorContext(e))
            })?;

        Ok(output
            .face_matches()
            .iter()
            .map(|m| FaceMatch {
                identity: m
                    .face()
                    .and_then(|f| f.external_image_id())
                    .map(str::to_string),
                face_id: m.face().and_then(|f| f.face_id()).map(str::to_string),
                similarity: m.similarity().unwrap_or_default(),
            })
            .collect())
    }

    async fn index_faces(
        &self,
        collection_id: &str,
        image: &[u8],
        external_id: &str,
    ) -> Result<Vec<String>> {
        let output = self
            .client
            .index_faces()
            .collection_id(collection_id)
            .image(Self::image(image))
            .external_image_id(external_id)
            .max_faces(1)
            .send()
            .await
            .map_err(|e| AppError::recognition("index_faces", DisplayErrorContext(e)))?;

        let face_ids: Vec<String> = output
            .face_records()
            .iter()
            .filter_map(|r| r.face().and_then(|f| f.face_id()))
            .map(str::to_string)
            .collect();

        if face_ids.is_empty() {
            return Err(AppError::recognition(
                "index_faces",
                format!("no face indexed for {external_id}"),
            ));
        }
        Ok(face_ids)
    }
}
