// src/models/mod.rs

//! Domain models for the face resolver.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod event;
mod face;
mod report;

// Re-export all public types
pub use config::{Config, HandlerConfig, LoggingConfig, RecognitionConfig, StorageConfig};
pub use event::{ImageLocation, UploadEvent, UploadRecord, decode_key};
pub use face::{BoundingBox, FaceAttributes, FaceDetection, FaceMatch, Identity, PixelBox};
pub use report::{
    DetectionReport, FaceFailure, FaceReport, FaceStage, Resolution, StepStatus,
};
