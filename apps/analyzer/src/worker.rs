//! Queue worker: pops upload events and runs one orchestrator task per job.
//!
//! At most `concurrency` jobs run at once. On shutdown the worker stops
//! popping and waits for in-flight jobs to finish.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::models::job::JobEvent;
use crate::pipeline::orchestrator::JobOrchestrator;
use crate::services::queue::RedisJobQueue;
use crate::services::ServiceError;

/// BRPOP timeout; also bounds how long shutdown waits on an idle queue.
const POP_TIMEOUT_SECS: u64 = 5;
const QUEUE_ERROR_BACKOFF: Duration = Duration::from_secs(2);

/// Where the worker gets its next upload event from.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn next_event(&self, timeout_secs: u64) -> Result<Option<JobEvent>, ServiceError>;
}

#[async_trait]
impl EventSource for RedisJobQueue {
    async fn next_event(&self, timeout_secs: u64) -> Result<Option<JobEvent>, ServiceError> {
        self.pop(timeout_secs).await
    }
}

pub struct Worker {
    source: Arc<dyn EventSource>,
    orchestrator: Arc<JobOrchestrator>,
    concurrency: usize,
}

impl Worker {
    pub fn new(
        source: Arc<dyn EventSource>,
        orchestrator: Arc<JobOrchestrator>,
        concurrency: usize,
    ) -> Self {
        Self {
            source,
            orchestrator,
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!("Worker started (concurrency {})", self.concurrency);
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let tracker = TaskTracker::new();

        loop {
            let permit = tokio::select! {
                _ = shutdown.cancelled() => break,
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            if shutdown.is_cancelled() {
                break;
            }

            // Not raced against shutdown: an event popped from Redis must not be dropped.
            match self.source.next_event(POP_TIMEOUT_SECS).await {
                Ok(Some(event)) => {
                    debug!("Dispatching job {}", event.job_id);
                    let orchestrator = self.orchestrator.clone();
                    tracker.spawn(async move {
                        orchestrator.process_event(&event).await;
                        drop(permit);
                    });
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Queue read failed: {e}");
                    tokio::select! {
                        _ = shutdown.cancelled() => break,
                        _ = tokio::time::sleep(QUEUE_ERROR_BACKOFF) => {}
                    }
                }
            }
        }

        tracker.close();
        info!("Worker stopping, waiting for {} in-flight jobs", tracker.len());
        tracker.wait().await;
        info!("Worker stopped");
    }
}
