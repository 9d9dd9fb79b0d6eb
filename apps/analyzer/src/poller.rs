//! Report poller: client side of `GET /api/v1/jobs/:id/report`.
//!
//! Polls until the report endpoint gives a terminal answer, sleeping a random
//! interval between checks. "Still working" answers (480/481/482) are
//! tolerated indefinitely; anything unexpected is retried a bounded number
//! of times. Cancellable at every wait.

use std::time::Duration;

use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::report::MatchReport;
use crate::routes::jobs::{STATUS_PROCESSING, STATUS_SCORING, STATUS_UPLOADED};
use crate::services::ServiceError;

const MAX_UNEXPECTED_RETRIES: u32 = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Ready(MatchReport),
    NotFound,
    Failed(String),
    /// Job completed without a match report.
    NoAnalysis,
    /// Too many unexpected answers in a row; carries the last one seen.
    GaveUp(String),
    Cancelled,
}

/// How a single response moves the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classification {
    Ready,
    Transient,
    NotFound,
    Failed,
    NoAnalysis,
    Unexpected,
}

fn classify(status: u16) -> Classification {
    match status {
        200 => Classification::Ready,
        204 => Classification::NoAnalysis,
        STATUS_UPLOADED | STATUS_PROCESSING | STATUS_SCORING => Classification::Transient,
        400 | 404 => Classification::NotFound,
        500 => Classification::Failed,
        _ => Classification::Unexpected,
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Clone)]
pub struct ReportPoller {
    client: Client,
    base_url: String,
    min_delay: Duration,
    max_delay: Duration,
    retry_unit: Duration,
}

impl ReportPoller {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ServiceError> {
        Ok(Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            retry_unit: Duration::from_secs(1),
        })
    }

    /// Overrides the random wait between polls (`min..=max`) and the unit
    /// of the linear backoff applied to unexpected answers.
    pub fn with_delays(mut self, min: Duration, max: Duration, retry_unit: Duration) -> Self {
        self.min_delay = min;
        self.max_delay = max.max(min);
        self.retry_unit = retry_unit;
        self
    }

    pub async fn poll(&self, job_id: Uuid, cancel: &CancellationToken) -> PollOutcome {
        let url = format!("{}/api/v1/jobs/{job_id}/report", self.base_url);
        let mut retries = 0;

        loop {
            if !self.wait(self.poll_delay(), cancel).await {
                return PollOutcome::Cancelled;
            }

            let unexpected = match self.client.get(&url).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    match classify(status) {
                        Classification::Transient => {
                            debug!("Job {job_id} still in progress ({status})");
                            retries = 0;
                            continue;
                        }
                        Classification::Ready => match response.json::<MatchReport>().await {
                            Ok(report) => {
                                info!("Job {job_id} report ready");
                                return PollOutcome::Ready(report);
                            }
                            Err(e) => format!("unreadable report: {e}"),
                        },
                        Classification::NotFound => return PollOutcome::NotFound,
                        Classification::NoAnalysis => return PollOutcome::NoAnalysis,
                        Classification::Failed => {
                            let body = response.text().await.unwrap_or_default();
                            let message = serde_json::from_str::<ErrorEnvelope>(&body)
                                .map(|e| e.error.message)
                                .unwrap_or(body);
                            return PollOutcome::Failed(message);
                        }
                        Classification::Unexpected => format!("unexpected status {status}"),
                    }
                }
                Err(e) => format!("request failed: {e}"),
            };

            retries += 1;
            if retries > MAX_UNEXPECTED_RETRIES {
                warn!("Giving up on job {job_id} after {MAX_UNEXPECTED_RETRIES} retries: {unexpected}");
                return PollOutcome::GaveUp(unexpected);
            }
            warn!("Polling job {job_id}: {unexpected}, retry {retries}/{MAX_UNEXPECTED_RETRIES}");
            if !self.wait(self.retry_unit * retries, cancel).await {
                return PollOutcome::Cancelled;
            }
        }
    }

    fn poll_delay(&self) -> Duration {
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    /// Sleeps unless cancelled first. Returns false on cancellation.
    async fn wait(&self, delay: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
