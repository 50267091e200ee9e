// src/handler.rs

//! Upload event handling.
//!
//! Runs the resolver over every record of an upload notification and folds
//! the outcomes into a serializable response. Shared by the Lambda entry
//! point and the CLI's `invoke` command.

use std::time::Instant;

use serde::Serialize;

use crate::models::{DetectionReport, ImageLocation, UploadEvent};
use crate::pipeline::IdentityResolver;

/// Outcome for one notification record.
#[derive(Debug, Serialize)]
pub struct RecordResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    /// Detection report; `None` when the record failed outright
    pub report: Option<DetectionReport>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Handler response payload.
#[derive(Debug, Default, Serialize)]
pub struct HandlerResponse {
    /// Records that produced an acceptable report
    pub processed: usize,

    /// Records that failed (or were incomplete under `fail_on_incomplete`)
    pub failed: usize,

    pub results: Vec<RecordResult>,

    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl HandlerResponse {
    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// Process every record in `event`, sequentially.
pub async fn handle_event(resolver: &IdentityResolver, event: &UploadEvent) -> HandlerResponse {
    let start = Instant::now();
    let fail_on_incomplete = resolver.config().handler.fail_on_incomplete;
    let mut response = HandlerResponse::default();

    if event.records.is_empty() {
        log::warn!("Event contained no records");
    }

    for location in event.locations() {
        let result = match location {
            Ok(location) => process_record(resolver, location, fail_on_incomplete).await,
            Err(e) => {
                log::error!("Skipping malformed record: {}", e);
                RecordResult {
                    bucket: None,
                    key: None,
                    report: None,
                    error: Some(e.to_string()),
                }
            }
        };

        if result.error.is_some() {
            response.failed += 1;
        } else {
            response.processed += 1;
        }
        response.results.push(result);
    }

    response.execution_time_ms = start.elapsed().as_millis() as u64;
    response
}

async fn process_record(
    resolver: &IdentityResolver,
    location: ImageLocation,
    fail_on_incomplete: bool,
) -> RecordResult {
    match resolver.process(&location).await {
        Ok(report) => {
            let error = (fail_on_incomplete && !report.is_complete()).then(|| {
                format!(
                    "{} of {} face(s) incomplete",
                    report.failure_count(),
                    report.face_count()
                )
            });
            if let Some(message) = &error {
                log::error!("Image {} incomplete: {}", location, message);
            }
            RecordResult {
                bucket: Some(location.container),
                key: Some(location.key),
                report: Some(report),
                error,
            }
        }
        Err(e) => {
            log::error!("An error occurred while processing {}: {}", location, e);
            RecordResult {
                bucket: Some(location.container),
                key: Some(location.key),
                report: None,
                error: Some(e.to_string()),
            }
        }
    }
}
