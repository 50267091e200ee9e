//! Per-invocation detection report.
//!
//! Every face carries its own `Result`, so a caller can decide how much
//! partial failure it tolerates instead of the resolver deciding for it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::ImageLocation;
use super::face::{FaceDetection, PixelBox};

/// Outcome of a single side-effecting step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Done,
    Failed { error: String },
}

impl StepStatus {
    pub fn from_result<T, E: std::fmt::Display>(result: &std::result::Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::Done,
            Err(e) => Self::Failed {
                error: e.to_string(),
            },
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// How a face was resolved to an identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Resolution {
    /// Face matched an existing identity
    Matched {
        identity: String,
        similarity: f32,
        source_tag: StepStatus,
    },
    /// Face was unknown and registered under a new identity
    Registered {
        identity: String,
        crop_key: String,
        stored: StepStatus,
        tagged: StepStatus,
        indexed: StepStatus,
    },
}

impl Resolution {
    pub fn identity(&self) -> &str {
        match self {
            Self::Matched { identity, .. } | Self::Registered { identity, .. } => identity,
        }
    }

    /// True when every side effect of the resolution succeeded.
    pub fn is_complete(&self) -> bool {
        match self {
            Self::Matched { source_tag, .. } => source_tag.is_done(),
            Self::Registered {
                stored,
                tagged,
                indexed,
                ..
            } => stored.is_done() && tagged.is_done() && indexed.is_done(),
        }
    }
}

/// Stage at which a face could not be resolved at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceStage {
    Crop,
    Search,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceFailure {
    pub stage: FaceStage,
    pub error: String,
}

/// Everything known about one detected face after processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceReport {
    /// Position in detector order
    pub index: usize,
    pub detection: FaceDetection,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pixel_box: Option<PixelBox>,
    pub outcome: Result<Resolution, FaceFailure>,
}

impl FaceReport {
    pub fn is_complete(&self) -> bool {
        self.outcome.as_ref().is_ok_and(Resolution::is_complete)
    }
}

/// Result of processing one uploaded image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub location: ImageLocation,
    pub image_width: u32,
    pub image_height: u32,
    pub faces: Vec<FaceReport>,
    pub processed_at: DateTime<Utc>,
}

impl DetectionReport {
    pub fn new(location: ImageLocation, image_width: u32, image_height: u32) -> Self {
        Self {
            location,
            image_width,
            image_height,
            faces: Vec::new(),
            processed_at: Utc::now(),
        }
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// True when every face resolved and every side effect succeeded.
    pub fn is_complete(&self) -> bool {
        self.faces.iter().all(FaceReport::is_complete)
    }

    /// Number of faces that failed outright or had a failed side effect.
    pub fn failure_count(&self) -> usize {
        self.faces.iter().filter(|f| !f.is_complete()).count()
    }

    /// Identities minted during this invocation.
    pub fn new_identities(&self) -> Vec<&str> {
        self.faces
            .iter()
            .filter_map(|f| match &f.outcome {
                Ok(r @ Resolution::Registered { .. }) => Some(r.identity()),
                _ => None,
            })
            .collect()
    }

    /// Pre-existing identities recognised in the image.
    pub fn matched_identities(&self) -> Vec<&str> {
        self.faces
            .iter()
            .filter_map(|f| match &f.outcome {
                Ok(r @ Resolution::Matched { .. }) => Some(r.identity()),
                _ => None,
            })
            .collect()
    }
}
