//! In-memory fakes of the service traits, shared by unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use uuid::Uuid;

use crate::llm_client::{LlmError, TextGenerator};
use crate::models::entity::RawEntity;
use crate::models::job::{JobEvent, JobRecord, JobStatus};
use crate::services::{
    BlobStore, EntityRecognizer, JobQueue, JobStore, ServiceError, TextExtractor,
};

#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, JobRecord>>,
    users: Mutex<HashSet<Uuid>>,
}

impl MemoryJobStore {
    pub fn add_user(&self, user_id: Uuid) {
        self.users.lock().unwrap().insert(user_id);
    }

    pub fn insert(&self, job: JobRecord) {
        self.jobs.lock().unwrap().insert(job.job_id, job);
    }

    pub fn job(&self, job_id: Uuid) -> Option<JobRecord> {
        self.jobs.lock().unwrap().get(&job_id).cloned()
    }

    fn update(
        &self,
        job_id: Uuid,
        apply: impl FnOnce(&mut JobRecord),
    ) -> Result<(), ServiceError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id)
            .ok_or(ServiceError::JobNotFound(job_id))?;
        apply(job);
        job.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.users.lock().unwrap().contains(&user_id))
    }

    async fn create_job(&self, job: &JobRecord) -> Result<(), ServiceError> {
        self.insert(job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<JobRecord>, ServiceError> {
        Ok(self.job(job_id))
    }

    async fn list_jobs(&self, user_id: Uuid) -> Result<Vec<JobRecord>, ServiceError> {
        let mut jobs: Vec<JobRecord> = self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn set_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), ServiceError> {
        self.update(job_id, |job| job.status = status)
    }

    async fn set_structured(
        &self,
        job_id: Uuid,
        structured_ref: &str,
    ) -> Result<(), ServiceError> {
        self.update(job_id, |job| {
            job.structured_ref = Some(structured_ref.to_string())
        })
    }

    async fn mark_completed(
        &self,
        job_id: Uuid,
        analysis_ref: Option<&str>,
    ) -> Result<(), ServiceError> {
        self.update(job_id, |job| {
            job.status = JobStatus::Completed;
            job.analysis_ref = analysis_ref.map(String::from);
            job.error_message = None;
        })
    }

    async fn mark_failed(&self, job_id: Uuid, message: &str) -> Result<(), ServiceError> {
        self.update(job_id, |job| {
            job.status = JobStatus::Error;
            job.error_message = Some(message.to_string());
        })
    }
}

#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Bytes>>,
    puts: AtomicUsize,
}

impl MemoryBlobStore {
    pub fn insert(&self, key: &str, body: Vec<u8>) {
        self.blobs
            .lock()
            .unwrap()
            .insert(key.to_string(), Bytes::from(body));
    }

    pub fn remove(&self, key: &str) {
        self.blobs.lock().unwrap().remove(key);
    }

    pub fn blob(&self, key: &str) -> Option<Bytes> {
        self.blobs.lock().unwrap().get(key).cloned()
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, body: Bytes, _content_type: &str) -> Result<(), ServiceError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.blobs.lock().unwrap().insert(key.to_string(), body);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ServiceError> {
        self.blob(key)
            .ok_or_else(|| ServiceError::Blob(format!("no such key: {key}")))
    }
}

pub struct StaticExtractor {
    result: Result<String, String>,
}

impl StaticExtractor {
    pub fn ok(text: &str) -> Self {
        Self {
            result: Ok(text.to_string()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            result: Err(reason.to_string()),
        }
    }
}

#[async_trait]
impl TextExtractor for StaticExtractor {
    async fn extract(&self, _document: &[u8]) -> Result<String, ServiceError> {
        self.result.clone().map_err(ServiceError::Unreadable)
    }
}

pub struct StaticRecognizer {
    entities: Vec<RawEntity>,
    delay: Option<Duration>,
}

impl StaticRecognizer {
    pub fn new(entities: Vec<RawEntity>) -> Self {
        Self {
            entities,
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl EntityRecognizer for StaticRecognizer {
    async fn detect_entities(&self, _text: &str) -> Result<Vec<RawEntity>, ServiceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.entities.clone())
    }
}

/// Replays canned responses in order; errors once they run out.
#[derive(Default)]
pub struct ScriptedGenerator {
    responses: Mutex<VecDeque<String>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedGenerator {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            prompts: Arc::default(),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, _schema_hint: &str) -> Result<String, LlmError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(LlmError::EmptyContent)
    }
}

#[derive(Default)]
pub struct RecordingQueue {
    events: Mutex<Vec<JobEvent>>,
    unreachable: bool,
}

impl RecordingQueue {
    /// A queue whose every enqueue fails as if Redis were down.
    pub fn failing() -> Self {
        Self {
            unreachable: true,
            ..Default::default()
        }
    }

    pub fn events(&self) -> Vec<JobEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobQueue for RecordingQueue {
    async fn enqueue(&self, event: &JobEvent) -> Result<(), ServiceError> {
        if self.unreachable {
            return Err(ServiceError::Queue(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection refused",
            ))));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}
