// src/config.rs

//! Configuration loading utilities.
//!
//! The CLI reads `config.toml` from disk; the Lambda reads it from the blob
//! store when `CONFIG_S3_BUCKET`/`CONFIG_S3_KEY` are set. Environment
//! overrides are applied last in both cases.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::storage::BlobStore;

/// Config loader backed by a blob store.
pub struct ConfigLoader<'a> {
    storage: &'a dyn BlobStore,
    container: String,
    key: String,
}

impl<'a> ConfigLoader<'a> {
    pub fn new(storage: &'a dyn BlobStore, container: &str, key: &str) -> Self {
        Self {
            storage,
            container: container.to_string(),
            key: key.to_string(),
        }
    }

    /// Loader for the location named by `CONFIG_S3_BUCKET`/`CONFIG_S3_KEY`, if set.
    pub fn from_env(storage: &'a dyn BlobStore) -> Option<Self> {
        let bucket = std::env::var("CONFIG_S3_BUCKET").ok()?;
        let key = std::env::var("CONFIG_S3_KEY").unwrap_or_else(|_| "config.toml".to_string());
        Some(Self::new(storage, &bucket, &key))
    }

    pub async fn load_config(&self) -> Result<Config> {
        log::info!("Loading config from {}/{}", self.container, self.key);
        let bytes = self.storage.get_object(&self.container, &self.key).await?;

        let s = String::from_utf8(bytes).map_err(|e| {
            AppError::config(format!(
                "Config file {}/{} is not valid UTF-8: {}",
                self.container, self.key, e
            ))
        })?;
        Config::from_toml(&s)
    }
}

/// Load configuration for the Lambda environment.
///
/// Uses the blob store copy when configured, defaults otherwise, then
/// applies environment overrides and validates.
pub async fn load_lambda_config(storage: &dyn BlobStore) -> Result<Config> {
    let mut config = match ConfigLoader::from_env(storage) {
        Some(loader) => loader.load_config().await?,
        None => Config::default(),
    };
    config.apply_env_overrides(|name| std::env::var(name).ok());
    config.validate()?;
    Ok(config)
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if loading fails.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = Config::load_or_default(path);
    config.apply_env_overrides(|name| std::env::var(name).ok());
    config.validate()?;
    Ok(config)
}
