//! AWS Lambda entry point for the face resolver
//!
//! Deploy with `cargo lambda build --release --features lambda`
//! and subscribe the function to the upload bucket's ObjectCreated events.
//!
//! ## Environment Variables
//!
//! - `FACE_COLLECTION_ID`: Face collection name (default: `scu_faces_collection`)
//! - `FACE_MATCH_THRESHOLD`: Minimum similarity 0-100 (default: `90`)
//! - `FACES_PREFIX`: Key prefix for stored crops (default: `faces`)
//! - `FACES_BUCKET`: Bucket for stored crops (default: the upload bucket)
//! - `CONFIG_S3_BUCKET` / `CONFIG_S3_KEY`: Optional `config.toml` location
//! - `RUST_LOG`: Log level (e.g., `info`, `debug`)

use std::sync::Arc;

use lambda_runtime::{Error as LambdaError, LambdaEvent, service_fn};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use face_resolver::config::load_lambda_config;
use face_resolver::models::UploadEvent;
use face_resolver::{aws, lambda};

/// Main entry point for the AWS Lambda function.
#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Face resolver Lambda starting...");

    let sdk_config = aws::load_sdk_config().await;
    let (store, _) = aws::clients(&sdk_config);
    let config = load_lambda_config(&store).await?;
    info!(
        "Using collection '{}' at {}% threshold",
        config.recognition.collection_id, config.recognition.similarity_threshold
    );

    let resolver = Arc::new(aws::resolver(&sdk_config, config));

    lambda_runtime::run(service_fn(move |event: LambdaEvent<UploadEvent>| {
        let resolver = Arc::clone(&resolver);
        async move { lambda::handler(&resolver, event).await }
    }))
    .await
}
