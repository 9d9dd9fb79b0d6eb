//! External collaborators of the pipeline.
//!
//! Every managed service the analyzer talks to sits behind one of these traits
//! so the orchestrator and the HTTP layer can be driven by in-memory fakes.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use uuid::Uuid;

use crate::models::entity::RawEntity;
use crate::models::job::{JobEvent, JobRecord, JobStatus};

pub mod blob;
pub mod extract;
pub mod queue;
pub mod recognize;
pub mod store;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("unreadable document: {0}")]
    Unreadable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("service returned status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("blob store error: {0}")]
    Blob(String),

    #[error("queue error: {0}")]
    Queue(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("job {0} not found")]
    JobNotFound(Uuid),
}

/// Turns document bytes into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    async fn extract(&self, document: &[u8]) -> Result<String, ServiceError>;
}

/// Tags spans of text with semantic types.
#[async_trait]
pub trait EntityRecognizer: Send + Sync {
    async fn detect_entities(&self, text: &str) -> Result<Vec<RawEntity>, ServiceError>;
}

/// Key-addressed storage for resume bytes and JSON artifacts.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), ServiceError>;
    async fn get(&self, key: &str) -> Result<Bytes, ServiceError>;
}

/// JobRecord persistence keyed by job_id. Updates are last-write-wins.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool, ServiceError>;
    async fn create_job(&self, job: &JobRecord) -> Result<(), ServiceError>;
    async fn get_job(&self, job_id: Uuid) -> Result<Option<JobRecord>, ServiceError>;
    async fn list_jobs(&self, user_id: Uuid) -> Result<Vec<JobRecord>, ServiceError>;
    async fn set_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), ServiceError>;
    async fn set_structured(&self, job_id: Uuid, structured_ref: &str)
        -> Result<(), ServiceError>;
    async fn mark_completed(
        &self,
        job_id: Uuid,
        analysis_ref: Option<&str>,
    ) -> Result<(), ServiceError>;
    async fn mark_failed(&self, job_id: Uuid, message: &str) -> Result<(), ServiceError>;
}

/// Hands upload events to whichever worker processes them.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, event: &JobEvent) -> Result<(), ServiceError>;
}
