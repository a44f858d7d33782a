//! Local runner — fires the refresh job on its cron slots.
//!
//! Plays the part of the hosted scheduler when the trigger is self-hosted
//! or run by hand: it builds the invocation context, enforces the duration
//! ceiling and records the outcome. One run at a time; a slot that passes
//! while a run is still in flight is skipped. Nothing is retried.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::client::DashboardClient;
use crate::job::{self, InvocationContext, JobResult};
use crate::schedule::CronPattern;

/// How many future slots the job sees in its context.
const UPCOMING_SLOTS: usize = 5;

/// What the scheduler records for one invocation.
#[derive(Debug)]
pub enum RunOutcome {
    Succeeded(JobResult),
    Failed(String),
    TimedOut,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded(_))
    }
}

pub struct Runner {
    client: Arc<dyn DashboardClient>,
    dashboard_url: String,
    pattern: CronPattern,
    max_duration: Duration,
}

impl Runner {
    pub fn new(
        client: Arc<dyn DashboardClient>,
        dashboard_url: String,
        pattern: CronPattern,
        max_duration: Duration,
    ) -> Self {
        Self {
            client,
            dashboard_url,
            pattern,
            max_duration,
        }
    }

    pub fn context_for(&self, scheduled_at: DateTime<Utc>) -> InvocationContext {
        InvocationContext::new(
            scheduled_at,
            self.pattern.upcoming(scheduled_at, UPCOMING_SLOTS),
        )
    }

    /// Run the job once for `scheduled_at` under the duration ceiling.
    pub async fn run_invocation(&self, scheduled_at: DateTime<Utc>) -> RunOutcome {
        let ctx = self.context_for(scheduled_at);
        let run_id = Uuid::new_v4();
        let span = info_span!("run", run_id = %run_id, job = job::JOB_ID);

        async {
            let fut = job::refresh_dashboard(&ctx, &self.dashboard_url, self.client.as_ref());
            match time::timeout(self.max_duration, fut).await {
                Ok(Ok(result)) => RunOutcome::Succeeded(result),
                Ok(Err(e)) => RunOutcome::Failed(e.to_string()),
                Err(_) => {
                    error!(
                        max_duration_secs = self.max_duration.as_secs(),
                        "⏱️ Run exceeded its maximum duration and was cancelled"
                    );
                    RunOutcome::TimedOut
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Sleep until each cron slot and fire the job. Never returns.
    pub async fn run_forever(&self) {
        info!(
            pattern = %self.pattern,
            url = %self.dashboard_url,
            max_duration_secs = self.max_duration.as_secs(),
            "📅 Local runner started"
        );

        let mut completed: u64 = 0;
        let mut failed: u64 = 0;

        loop {
            let now = Utc::now();
            let slot = self.pattern.next_after(now);
            info!(next_run = %job::iso_timestamp(slot), "Waiting for next slot");

            // Slot is in the future, so the delta is positive.
            let wait = (slot - now).to_std().unwrap_or_default();
            time::sleep(wait).await;

            let outcome = self.run_invocation(slot).await;
            if outcome.is_success() {
                completed += 1;
            } else {
                failed += 1;
                if let RunOutcome::Failed(msg) = &outcome {
                    warn!("Run for {} failed: {}", job::iso_timestamp(slot), msg);
                }
            }

            info!(completed, failed, "Run recorded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::DashboardResponse;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use http::header::CONTENT_TYPE;
    use http::{HeaderMap, HeaderValue, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct PngClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DashboardClient for PngClient {
        async fn get(&self, _url: &str) -> Result<DashboardResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut headers = HeaderMap::new();
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/png"));
            Ok(DashboardResponse::new(StatusCode::OK, headers))
        }
    }

    struct FailingClient {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl DashboardClient for FailingClient {
        async fn get(&self, _url: &str) -> Result<DashboardResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DashboardResponse::new(StatusCode::BAD_GATEWAY, HeaderMap::new()))
        }
    }

    /// Never answers; stands in for a rendering service stuck on cold start.
    struct HangingClient;

    #[async_trait]
    impl DashboardClient for HangingClient {
        async fn get(&self, _url: &str) -> Result<DashboardResponse> {
            std::future::pending().await
        }
    }

    fn runner(client: Arc<dyn DashboardClient>) -> Runner {
        Runner::new(
            client,
            "http://dash.test/dashboard".into(),
            CronPattern::parse("*/30 * * * *").unwrap(),
            Duration::from_secs(300),
        )
    }

    fn slot() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 4, 30, 0).unwrap()
    }

    #[test]
    fn test_context_lists_following_slots() {
        let r = runner(Arc::new(HangingClient));
        let ctx = r.context_for(slot());
        assert_eq!(ctx.timestamp, slot());
        assert_eq!(ctx.upcoming.len(), UPCOMING_SLOTS);
        assert_eq!(ctx.next_run(), Some(Utc.with_ymd_and_hms(2024, 3, 1, 5, 0, 0).unwrap()));
    }

    #[tokio::test]
    async fn test_success_outcome_carries_result() {
        let client = Arc::new(PngClient {
            calls: AtomicUsize::new(0),
        });
        let outcome = runner(client.clone()).run_invocation(slot()).await;

        assert!(outcome.is_success());
        match outcome {
            RunOutcome::Succeeded(result) => {
                assert_eq!(result.timestamp, "2024-03-01T04:30:00.000Z");
                assert_eq!(result.image_size, None);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_without_retry() {
        let client = Arc::new(FailingClient {
            calls: AtomicUsize::new(0),
        });
        let outcome = runner(client.clone()).run_invocation(slot()).await;

        match outcome {
            RunOutcome::Failed(msg) => assert_eq!(msg, "HTTP 502: Bad Gateway"),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_past_ceiling_times_out() {
        let outcome = runner(Arc::new(HangingClient)).run_invocation(slot()).await;
        assert!(matches!(outcome, RunOutcome::TimedOut));
        assert!(!outcome.is_success());
    }
}
