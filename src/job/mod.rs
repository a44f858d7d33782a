//! Refresh job — one GET against the dashboard service per trigger.
//!
//! The job is a plain async function of (invocation context, URL, client).
//! It does not know which scheduler called it, reads no ambient config,
//! and never retries: failures are logged with the elapsed time and handed
//! back to the caller.

use chrono::{DateTime, SecondsFormat, Utc};
use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{error, info};

use crate::client::{DashboardClient, DashboardResponse};

pub mod error;

pub use error::RefreshError;

/// Task id registered with the scheduler.
pub const JOB_ID: &str = "refresh-kindle-dashboard";

const PNG_MIME: &str = "image/png";

/// What the scheduler hands the job for one run.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    /// When this run was scheduled to fire.
    pub timestamp: DateTime<Utc>,
    /// Upcoming scheduled runs, soonest first.
    pub upcoming: Vec<DateTime<Utc>>,
}

impl InvocationContext {
    pub fn new(timestamp: DateTime<Utc>, upcoming: Vec<DateTime<Utc>>) -> Self {
        Self { timestamp, upcoming }
    }

    pub fn next_run(&self) -> Option<DateTime<Utc>> {
        self.upcoming.first().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Success,
}

/// Success payload returned to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub status: JobStatus,
    /// Milliseconds from request start to response.
    pub duration: u64,
    /// `Content-Length` of the rendered image, when the service sent one.
    pub image_size: Option<u64>,
    /// Trigger time of the run, ISO-8601 with milliseconds.
    pub timestamp: String,
}

/// ISO-8601 with millisecond precision and a `Z` suffix.
pub fn iso_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Run one refresh: fetch `dashboard_url`, check it rendered a PNG.
pub async fn refresh_dashboard(
    ctx: &InvocationContext,
    dashboard_url: &str,
    client: &dyn DashboardClient,
) -> Result<JobResult, RefreshError> {
    info!(
        "[{}] Refreshing dashboard from: {}",
        iso_timestamp(ctx.timestamp),
        dashboard_url
    );

    let start = Instant::now();

    let outcome = match client.get(dashboard_url).await {
        Ok(resp) => {
            let duration = elapsed_ms(start);
            validate_response(&resp).map(|image_size| (duration, image_size))
        }
        Err(e) => Err(RefreshError::Network(e)),
    };

    match outcome {
        Ok((duration, image_size)) => {
            let next_run = ctx
                .next_run()
                .map(iso_timestamp)
                .unwrap_or_else(|| "none scheduled".to_string());

            info!(duration_ms = duration, image_size = ?image_size, "✅ Dashboard refreshed successfully");
            info!("   - Duration: {}ms", duration);
            match image_size {
                Some(bytes) => info!("   - Image size: {} bytes", bytes),
                None => info!("   - Image size: unknown (no Content-Length)"),
            }
            info!("   - Next run: {}", next_run);

            Ok(JobResult {
                status: JobStatus::Success,
                duration,
                image_size,
                timestamp: iso_timestamp(ctx.timestamp),
            })
        }
        Err(e) => {
            let duration = elapsed_ms(start);
            error!(
                duration_ms = duration,
                kind = e.kind(),
                "❌ Failed to refresh dashboard after {}ms: {}",
                duration,
                e
            );
            Err(e)
        }
    }
}

/// Check status, then content type, then pull the image size.
///
/// Status is checked first: a 5xx with `image/png` is still a remote error.
pub fn validate_response(resp: &DashboardResponse) -> Result<Option<u64>, RefreshError> {
    if !resp.status.is_success() {
        return Err(RefreshError::Remote {
            status: resp.status.as_u16(),
            status_text: resp.status_text.clone(),
        });
    }

    let content_type = resp.header_str(CONTENT_TYPE);
    if !content_type.is_some_and(|ct| ct.contains(PNG_MIME)) {
        return Err(RefreshError::ContentType {
            content_type: content_type.map(String::from),
        });
    }

    Ok(resp.header_str(CONTENT_LENGTH).and_then(leading_integer))
}

/// Integer value of the leading digits, so `"15000abc"` reads as 15000.
fn leading_integer(value: &str) -> Option<u64> {
    let value = value.trim_start();
    let end = value
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(value.len());
    value[..end].parse().ok()
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
