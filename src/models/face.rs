//! Face detection and identity types.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Normalized bounding box as returned by the detector.
///
/// All fields are fractions of the image width/height. Detectors may return
/// values slightly outside [0, 1] for faces cut off by the frame edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// Pixel-space rectangle, right/bottom exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl PixelBox {
    pub fn width(&self) -> u32 {
        self.right - self.left
    }

    pub fn height(&self) -> u32 {
        self.bottom - self.top
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

impl fmt::Display for PixelBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Detector metadata carried alongside a face region.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_low: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age_high: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smile: Option<bool>,
    /// Highest-confidence emotion label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dominant_emotion: Option<String>,
}

/// One face found by the detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    pub bounding_box: BoundingBox,

    /// Detector confidence (0-100)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,

    #[serde(default)]
    pub attributes: FaceAttributes,
}

impl FaceDetection {
    pub fn new(bounding_box: BoundingBox) -> Self {
        Self {
            bounding_box,
            confidence: None,
            attributes: FaceAttributes::default(),
        }
    }
}

/// A collection hit returned by a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    /// External identifier the matched face was registered under
    pub identity: Option<String>,
    /// Service-assigned face id
    pub face_id: Option<String>,
    /// Similarity (0-100)
    pub similarity: f32,
}

/// Opaque token for one recognized person.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
    /// Mint a fresh random identity.
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Identity {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
