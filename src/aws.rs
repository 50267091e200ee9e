// src/aws.rs

//! Shared AWS client setup.

use std::sync::Arc;

use aws_config::meta::region::RegionProviderChain;
use aws_config::{BehaviorVersion, Region, SdkConfig};

use crate::models::Config;
use crate::pipeline::IdentityResolver;
use crate::recognition::RekognitionService;
use crate::storage::S3BlobStore;

/// Load shared SDK configuration.
///
/// Region resolution: `AWS_REGION`, then the default provider chain, then
/// `us-east-1`.
pub async fn load_sdk_config() -> SdkConfig {
    let region = std::env::var("AWS_REGION").ok().map(Region::new);
    let region_provider = RegionProviderChain::first_try(region)
        .or_default_provider()
        .or_else(Region::new("us-east-1"));

    aws_config::defaults(BehaviorVersion::latest())
        .region(region_provider)
        .load()
        .await
}

/// Build S3 and Rekognition adapters from one SDK config.
///
/// Detection reads uploads straight from S3.
pub fn clients(sdk_config: &SdkConfig) -> (S3BlobStore, RekognitionService) {
    (
        S3BlobStore::from_sdk_config(sdk_config),
        RekognitionService::from_sdk_config(sdk_config).with_s3_objects(),
    )
}

/// Resolver wired to S3 and Rekognition.
pub fn resolver(sdk_config: &SdkConfig, config: Config) -> IdentityResolver {
    let (store, recognition) = clients(sdk_config);
    IdentityResolver::new(Arc::new(store), Arc::new(recognition), Arc::new(config))
}
