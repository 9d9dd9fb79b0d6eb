use async_trait::async_trait;
use sqlx::postgres::PgQueryResult;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::job::{JobRecord, JobStatus};
use crate::models::user::UserRecord;
use crate::services::{JobStore, ServiceError};

/// Postgres-backed job store. Every write is a single-row UPDATE keyed by
/// `job_id`, so concurrent invocations for different jobs never contend.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn expect_row(result: PgQueryResult, job_id: Uuid) -> Result<(), ServiceError> {
    if result.rows_affected() == 0 {
        return Err(ServiceError::JobNotFound(job_id));
    }
    Ok(())
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn user_exists(&self, user_id: Uuid) -> Result<bool, ServiceError> {
        let user: Option<UserRecord> =
            sqlx::query_as("SELECT user_id, username, created_at FROM users WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(user.is_some())
    }

    async fn create_job(&self, job: &JobRecord) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO resume_jobs
                (job_id, user_id, status, original_filename, resume_blob_ref,
                 structured_ref, analysis_ref, error_message, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(job.job_id)
        .bind(job.user_id)
        .bind(job.status.as_str())
        .bind(&job.original_filename)
        .bind(&job.resume_blob_ref)
        .bind(&job.structured_ref)
        .bind(&job.analysis_ref)
        .bind(&job.error_message)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_job(&self, job_id: Uuid) -> Result<Option<JobRecord>, ServiceError> {
        let job = sqlx::query_as::<_, JobRecord>("SELECT * FROM resume_jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    async fn list_jobs(&self, user_id: Uuid) -> Result<Vec<JobRecord>, ServiceError> {
        let jobs = sqlx::query_as::<_, JobRecord>(
            "SELECT * FROM resume_jobs WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(jobs)
    }

    async fn set_status(&self, job_id: Uuid, status: JobStatus) -> Result<(), ServiceError> {
        let result =
            sqlx::query("UPDATE resume_jobs SET status = $2, updated_at = now() WHERE job_id = $1")
                .bind(job_id)
                .bind(status.as_str())
                .execute(&self.pool)
                .await?;
        expect_row(result, job_id)
    }

    async fn set_structured(
        &self,
        job_id: Uuid,
        structured_ref: &str,
    ) -> Result<(), ServiceError> {
        let result = sqlx::query(
            "UPDATE resume_jobs SET structured_ref = $2, updated_at = now() WHERE job_id = $1",
        )
        .bind(job_id)
        .bind(structured_ref)
        .execute(&self.pool)
        .await?;
        expect_row(result, job_id)
    }

    async fn mark_completed(
        &self,
        job_id: Uuid,
        analysis_ref: Option<&str>,
    ) -> Result<(), ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE resume_jobs
            SET status = 'completed', analysis_ref = $2, error_message = NULL, updated_at = now()
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .bind(analysis_ref)
        .execute(&self.pool)
        .await?;
        expect_row(result, job_id)
    }

    async fn mark_failed(&self, job_id: Uuid, message: &str) -> Result<(), ServiceError> {
        let result = sqlx::query(
            r#"
            UPDATE resume_jobs
            SET status = 'error', error_message = $2, updated_at = now()
            WHERE job_id = $1
            "#,
        )
        .bind(job_id)
        .bind(message)
        .execute(&self.pool)
        .await?;
        expect_row(result, job_id)
    }
}
