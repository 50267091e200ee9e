// src/lambda/mod.rs

//! AWS Lambda handler for the face resolver.
//!
//! This module provides the Lambda function entry point that:
//! 1. Parses the S3 upload notification
//! 2. Resolves every face in each uploaded image
//! 3. Returns the per-record detection reports

use lambda_runtime::{Error as LambdaError, LambdaEvent};
use tracing::{error, info, instrument};

use crate::handler::{HandlerResponse, handle_event};
use crate::models::UploadEvent;
use crate::pipeline::IdentityResolver;

/// Main Lambda handler function.
#[instrument(skip(resolver, event), fields(request_id = %event.context.request_id))]
pub async fn handler(
    resolver: &IdentityResolver,
    event: LambdaEvent<UploadEvent>,
) -> std::result::Result<HandlerResponse, LambdaError> {
    let (payload, _context) = event.into_parts();
    info!("Received upload event with {} record(s)", payload.records.len());

    let response = handle_event(resolver, &payload).await;

    if response.success() {
        info!(
            "Processed {} record(s) in {}ms",
            response.processed, response.execution_time_ms
        );
    } else {
        error!(
            "{} of {} record(s) failed",
            response.failed,
            response.results.len()
        );
    }
    Ok(response)
}
