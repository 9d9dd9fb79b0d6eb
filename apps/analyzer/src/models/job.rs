use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Uploaded,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Uploaded => "uploaded",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    /// `completed` and `error` are final; the orchestrator never leaves them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(JobStatus::Uploaded),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "error" => Ok(JobStatus::Error),
            other => Err(format!("unknown job status '{other}'")),
        }
    }
}

impl TryFrom<String> for JobStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, String> {
        value.parse()
    }
}

/// One resume-analysis request, tracked from upload to a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct JobRecord {
    pub job_id: Uuid,
    pub user_id: Uuid,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub original_filename: String,
    pub resume_blob_ref: String,
    pub structured_ref: Option<String>,
    pub analysis_ref: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new_upload(
        job_id: Uuid,
        user_id: Uuid,
        original_filename: String,
        resume_blob_ref: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            job_id,
            user_id,
            status: JobStatus::Uploaded,
            original_filename,
            resume_blob_ref,
            structured_ref: None,
            analysis_ref: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// The job fields a resume is scored against. All optional at upload time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub required_skills: Vec<String>,
}

impl JobPosting {
    /// Splits a comma separated skills string, dropping blanks.
    pub fn parse_skills(raw: &str) -> Vec<String> {
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    /// True when there is something to score against.
    pub fn is_scoreable(&self) -> bool {
        let has_description = self
            .description
            .as_deref()
            .is_some_and(|d| !d.trim().is_empty());
        has_description || !self.required_skills.is_empty()
    }
}

/// Upload event carried on the job queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: Uuid,
    pub posting: JobPosting,
}
