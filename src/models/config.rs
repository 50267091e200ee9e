//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Upper bound the recognition service accepts for matches per search.
pub const MAX_FACES_LIMIT: i32 = 4096;

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Face collection and matching settings
    #[serde(default)]
    pub recognition: RecognitionConfig,

    /// Where and how new face crops are stored
    #[serde(default)]
    pub storage: StorageConfig,

    /// Handler tolerance settings
    #[serde(default)]
    pub handler: HandlerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Override values from environment-style variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = lookup("FACE_COLLECTION_ID") {
            self.recognition.collection_id = id;
        }
        if let Some(raw) = lookup("FACE_MATCH_THRESHOLD") {
            match raw.parse() {
                Ok(threshold) => self.recognition.similarity_threshold = threshold,
                Err(_) => log::warn!("Ignoring invalid FACE_MATCH_THRESHOLD={}", raw),
            }
        }
        if let Some(raw) = lookup("FACE_MAX_MATCHES") {
            match raw.parse() {
                Ok(n) => self.recognition.max_matches = n,
                Err(_) => log::warn!("Ignoring invalid FACE_MAX_MATCHES={}", raw),
            }
        }
        if let Some(prefix) = lookup("FACES_PREFIX") {
            self.storage.faces_prefix = prefix;
        }
        if let Some(bucket) = lookup("FACES_BUCKET") {
            self.storage.faces_container = Some(bucket).filter(|b| !b.is_empty());
        }
        if let Some(raw) = lookup("FAIL_ON_INCOMPLETE") {
            match raw.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.handler.fail_on_incomplete = true,
                "0" | "false" | "no" => self.handler.fail_on_incomplete = false,
                _ => log::warn!("Ignoring invalid FAIL_ON_INCOMPLETE={}", raw),
            }
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.recognition.collection_id.trim().is_empty() {
            return Err(AppError::validation("recognition.collection_id is empty"));
        }
        let threshold = self.recognition.similarity_threshold;
        if !(0.0..=100.0).contains(&threshold) {
            return Err(AppError::validation(format!(
                "recognition.similarity_threshold must be within 0-100, got {threshold}"
            )));
        }
        let max_matches = self.recognition.max_matches;
        if !(1..=MAX_FACES_LIMIT).contains(&max_matches) {
            return Err(AppError::validation(format!(
                "recognition.max_matches must be within 1-{MAX_FACES_LIMIT}, got {max_matches}"
            )));
        }
        if self.storage.faces_prefix.trim_matches('/').is_empty() {
            return Err(AppError::validation("storage.faces_prefix is empty"));
        }
        if self.storage.identity_tag_key.trim().is_empty() {
            return Err(AppError::validation("storage.identity_tag_key is empty"));
        }
        if !(1..=100).contains(&self.storage.jpeg_quality) {
            return Err(AppError::validation(
                "storage.jpeg_quality must be within 1-100",
            ));
        }
        Ok(())
    }
}

/// Face collection and matching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognitionConfig {
    /// Name of the managed face collection
    #[serde(default = "defaults::collection_id")]
    pub collection_id: String,

    /// Minimum similarity (0-100) to treat a face as a known identity
    #[serde(default = "defaults::similarity_threshold")]
    pub similarity_threshold: f32,

    /// Maximum matches requested per search
    #[serde(default = "defaults::max_matches")]
    pub max_matches: i32,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            collection_id: defaults::collection_id(),
            similarity_threshold: defaults::similarity_threshold(),
            max_matches: defaults::max_matches(),
        }
    }
}

/// Crop storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Key prefix for stored face crops
    #[serde(default = "defaults::faces_prefix")]
    pub faces_prefix: String,

    /// Container for face crops; the source image's container when unset
    #[serde(default)]
    pub faces_container: Option<String>,

    /// Tag key carrying the identity on stored crops
    #[serde(default = "defaults::identity_tag_key")]
    pub identity_tag_key: String,

    /// JPEG quality for re-encoded crops (1-100)
    #[serde(default = "defaults::jpeg_quality")]
    pub jpeg_quality: u8,
}

impl StorageConfig {
    /// Object key for a crop stored under `identity`.
    pub fn crop_key(&self, identity: &str) -> String {
        format!("{}/{}", self.faces_prefix.trim_end_matches('/'), identity)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            faces_prefix: defaults::faces_prefix(),
            faces_container: None,
            identity_tag_key: defaults::identity_tag_key(),
            jpeg_quality: defaults::jpeg_quality(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Report a record as failed when any face was only partially processed
    #[serde(default)]
    pub fail_on_incomplete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    pub fn collection_id() -> String {
        "scu_faces_collection".into()
    }
    pub fn similarity_threshold() -> f32 {
        90.0
    }
    pub fn max_matches() -> i32 {
        1
    }

    pub fn faces_prefix() -> String {
        "faces".into()
    }
    pub fn identity_tag_key() -> String {
        "id".into()
    }
    pub fn jpeg_quality() -> u8 {
        75
    }

    pub fn log_level() -> String {
        "info".into()
    }
}
