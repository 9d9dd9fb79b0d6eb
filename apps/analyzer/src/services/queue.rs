use async_trait::async_trait;
use tracing::info;

use crate::models::job::JobEvent;
use crate::services::{JobQueue, ServiceError};

/// Redis list holding pending upload events.
pub const JOB_QUEUE_KEY: &str = "resume:jobs";

/// Upload events travel as JSON on a Redis list: LPUSH on upload, BRPOP in the worker.
#[derive(Clone)]
pub struct RedisJobQueue {
    client: redis::Client,
}

impl RedisJobQueue {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    /// Blocks for up to `timeout_secs` waiting for the next event.
    pub async fn pop(&self, timeout_secs: u64) -> Result<Option<JobEvent>, ServiceError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(JOB_QUEUE_KEY)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        match popped {
            Some((_, payload)) => Ok(Some(decode_event(&payload)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, event: &JobEvent) -> Result<(), ServiceError> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("LPUSH")
            .arg(JOB_QUEUE_KEY)
            .arg(payload)
            .query_async::<_, ()>(&mut conn)
            .await?;

        info!("Enqueued job {}", event.job_id);
        Ok(())
    }
}

fn decode_event(payload: &str) -> Result<JobEvent, ServiceError> {
    Ok(serde_json::from_str(payload)?)
}
