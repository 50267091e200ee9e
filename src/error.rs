// src/error.rs

//! Unified error handling for the face resolver.

use std::fmt;

use thiserror::Error;

/// Result type alias for resolver operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// The face collection could not be described or created
    #[error("Collection provisioning failed for '{collection}': {message}")]
    CollectionProvisioning { collection: String, message: String },

    /// Blob store transport or lookup failure
    #[error("Storage unavailable for {container}/{key}: {message}")]
    StorageUnavailable {
        container: String,
        key: String,
        message: String,
    },

    /// Source bytes are not a decodable JPEG/PNG image
    #[error("Unreadable image: {0}")]
    UnreadableImage(String),

    /// Detect, search or index call failed
    #[error("Recognition service error during {operation}: {message}")]
    RecognitionService { operation: String, message: String },

    /// Face crop could not be produced
    #[error("Crop error: {0}")]
    Crop(String),

    /// Malformed trigger event
    #[error("Event error: {0}")]
    Event(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a collection provisioning error.
    pub fn provisioning(collection: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::CollectionProvisioning {
            collection: collection.into(),
            message: message.to_string(),
        }
    }

    /// Create a storage error for an object location.
    pub fn storage(
        container: impl Into<String>,
        key: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        Self::StorageUnavailable {
            container: container.into(),
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// Create an unreadable image error.
    pub fn unreadable(message: impl fmt::Display) -> Self {
        Self::UnreadableImage(message.to_string())
    }

    /// Create a recognition service error for the named operation.
    pub fn recognition(operation: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::RecognitionService {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Create a crop error.
    pub fn crop(message: impl Into<String>) -> Self {
        Self::Crop(message.into())
    }

    /// Create an event error.
    pub fn event(message: impl Into<String>) -> Self {
        Self::Event(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
