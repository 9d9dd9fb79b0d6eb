use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::info;
use uuid::Uuid;

use crate::services::{BlobStore, ServiceError};

/// Key of the uploaded resume bytes.
pub fn resume_key(job_id: Uuid, filename: &str) -> String {
    format!("resumes/{job_id}/{filename}")
}

/// Key of the structured resume JSON.
pub fn structured_key(job_id: Uuid) -> String {
    format!("structured/{job_id}.json")
}

/// Key of the match report JSON.
pub fn analysis_key(job_id: Uuid) -> String {
    format!("analysis/{job_id}.json")
}

/// S3 / MinIO backed blob store.
#[derive(Clone)]
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, body: Bytes, content_type: &str) -> Result<(), ServiceError> {
        let size = body.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| ServiceError::Blob(format!("put {key} failed: {e}")))?;

        info!("Stored {size} bytes at s3://{}/{key}", self.bucket);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ServiceError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ServiceError::Blob(format!("get {key} failed: {e}")))?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| ServiceError::Blob(format!("reading {key} failed: {e}")))?;
        Ok(data.into_bytes())
    }
}
