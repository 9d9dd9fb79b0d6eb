//! Job Orchestrator: runs one resume through every stage and records the outcome.
//!
//! Flow: extract → recognize → normalize → structure → persist structured
//!       → (score → persist analysis) → completed.
//!
//! `process` never returns an error. Every stage failure, including the
//! wall-clock budget running out, ends as status `error` with the failure's
//! message stored on the JobRecord.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::job::{JobEvent, JobPosting, JobRecord, JobStatus};
use crate::models::report::MatchReport;
use crate::models::resume::StructuredResume;
use crate::pipeline::error::PipelineError;
use crate::pipeline::normalizer::{normalize, NormalizerConfig};
use crate::pipeline::scorer::MatchScorer;
use crate::pipeline::structurer::{structure, StructurerConfig};
use crate::services::blob::{analysis_key, structured_key};
use crate::services::{BlobStore, EntityRecognizer, JobStore, ServiceError, TextExtractor};

const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub normalizer: NormalizerConfig,
    pub structurer: StructurerConfig,
    /// Wall-clock budget for one job, all stages included.
    pub job_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            normalizer: NormalizerConfig::default(),
            structurer: StructurerConfig::default(),
            job_timeout: Duration::from_secs(300),
        }
    }
}

/// What a client gets back when it asks for a job's report.
#[derive(Debug, Clone, PartialEq)]
pub enum ReportLookup {
    Ready(MatchReport),
    Pending { status: JobStatus, structured: bool },
    Failed { message: String },
    /// Completed without scoring: the posting had nothing to score against.
    NoAnalysis,
    NotFound,
}

pub struct JobOrchestrator {
    store: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobStore>,
    extractor: Arc<dyn TextExtractor>,
    recognizer: Arc<dyn EntityRecognizer>,
    scorer: Arc<dyn MatchScorer>,
    settings: PipelineSettings,
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        blobs: Arc<dyn BlobStore>,
        extractor: Arc<dyn TextExtractor>,
        recognizer: Arc<dyn EntityRecognizer>,
        scorer: Arc<dyn MatchScorer>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            blobs,
            extractor,
            recognizer,
            scorer,
            settings,
        }
    }

    /// Handles one upload event: loads the stored resume and processes it.
    pub async fn process_event(&self, event: &JobEvent) {
        let Some(job) = self.load_pending(event.job_id).await else {
            return;
        };

        match self.blobs.get(&job.resume_blob_ref).await {
            Ok(bytes) => self.process(job.job_id, &bytes, &event.posting).await,
            Err(e) => {
                let err = PipelineError::Storage(format!(
                    "could not read resume {}: {e}",
                    job.resume_blob_ref
                ));
                self.fail(job.job_id, &err).await;
            }
        }
    }

    /// Runs the pipeline for `job_id`. Unknown and already-finished jobs are no-ops.
    pub async fn process(&self, job_id: Uuid, resume: &[u8], posting: &JobPosting) {
        if self.load_pending(job_id).await.is_none() {
            return;
        }

        info!("Processing job {job_id}");
        let outcome =
            tokio::time::timeout(self.settings.job_timeout, self.run(job_id, resume, posting))
                .await
                .unwrap_or(Err(PipelineError::TimeoutExceeded(
                    self.settings.job_timeout,
                )));

        match outcome {
            Ok(()) => info!("Job {job_id} completed"),
            Err(err) => self.fail(job_id, &err).await,
        }
    }

    /// The job if it exists and is not yet terminal; logs and returns `None` otherwise.
    async fn load_pending(&self, job_id: Uuid) -> Option<JobRecord> {
        match self.store.get_job(job_id).await {
            Ok(Some(job)) if job.status.is_terminal() => {
                info!("Job {job_id} is already {}, skipping", job.status);
                None
            }
            Ok(Some(job)) => Some(job),
            Ok(None) => {
                warn!("Job {job_id} not found, ignoring");
                None
            }
            Err(e) => {
                error!("Could not load job {job_id}: {e}");
                None
            }
        }
    }

    async fn run(
        &self,
        job_id: Uuid,
        resume: &[u8],
        posting: &JobPosting,
    ) -> Result<(), PipelineError> {
        self.store
            .set_status(job_id, JobStatus::Processing)
            .await
            .map_err(storage)?;

        // Step 1: Extract text
        let text = self
            .extractor
            .extract(resume)
            .await
            .map_err(|e| PipelineError::ExtractionFailure(e.to_string()))?;
        info!("Job {job_id}: extracted {} characters", text.chars().count());

        // Step 2: Recognize entities
        let entities = self
            .recognizer
            .detect_entities(&text)
            .await
            .map_err(|e| PipelineError::EntityRecognitionFailure(e.to_string()))?;
        if entities.is_empty() {
            return Err(PipelineError::EntityRecognitionFailure(
                "no entities recognized".to_string(),
            ));
        }

        // Step 3: Normalize
        let normalized = normalize(&entities, &self.settings.normalizer);
        info!(
            "Job {job_id}: {} entities, {} kept, {} dropped, {} merged",
            entities.len(),
            normalized.len(),
            normalized.dropped,
            normalized.merged
        );

        // Step 4: Structure and persist
        let outcome = structure(&normalized, &self.settings.structurer);
        let structured_ref = structured_key(job_id);
        self.put_json(&structured_ref, &outcome.resume).await?;
        self.store
            .set_structured(job_id, &structured_ref)
            .await
            .map_err(storage)?;

        if !posting.is_scoreable() {
            info!("Job {job_id}: posting has no description or skills, skipping analysis");
            self.store
                .mark_completed(job_id, None)
                .await
                .map_err(storage)?;
            return Ok(());
        }

        // Step 5: Score and persist
        let report = self.scorer.score(&outcome.resume, posting).await?;
        let analysis_ref = analysis_key(job_id);
        self.put_json(&analysis_ref, &report).await?;
        self.store
            .mark_completed(job_id, Some(&analysis_ref))
            .await
            .map_err(storage)?;
        Ok(())
    }

    async fn put_json<T: serde::Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<(), PipelineError> {
        let body = serde_json::to_vec(value).map_err(|e| PipelineError::Storage(e.to_string()))?;
        self.blobs
            .put(key, Bytes::from(body), JSON_CONTENT_TYPE)
            .await
            .map_err(storage)
    }

    async fn fail(&self, job_id: Uuid, err: &PipelineError) {
        error!("Job {job_id} failed: {err}");
        if let Err(e) = self.store.mark_failed(job_id, &err.to_string()).await {
            error!("Could not record failure for job {job_id}: {e}");
        }
    }

    /// Report lookup for the polling endpoint. An unknown job is
    /// `ReportLookup::NotFound`, not an error.
    pub async fn get_report(&self, job_id: Uuid) -> Result<ReportLookup, PipelineError> {
        let Some(job) = self.store.get_job(job_id).await.map_err(storage)? else {
            return Ok(ReportLookup::NotFound);
        };

        let lookup = match job.status {
            JobStatus::Uploaded | JobStatus::Processing => ReportLookup::Pending {
                status: job.status,
                structured: job.structured_ref.is_some(),
            },
            JobStatus::Error => ReportLookup::Failed {
                message: job
                    .error_message
                    .unwrap_or_else(|| "job failed without a message".to_string()),
            },
            JobStatus::Completed => match job.analysis_ref {
                Some(key) => ReportLookup::Ready(self.get_json(&key).await?),
                None => ReportLookup::NoAnalysis,
            },
        };
        Ok(lookup)
    }

    /// The structured resume, once the structuring stage has stored it.
    pub async fn get_structured(
        &self,
        job_id: Uuid,
    ) -> Result<Option<StructuredResume>, PipelineError> {
        let job = self
            .store
            .get_job(job_id)
            .await
            .map_err(storage)?
            .ok_or(PipelineError::NotFound(job_id))?;

        match job.structured_ref {
            Some(key) => Ok(Some(self.get_json(&key).await?)),
            None => Ok(None),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<T, PipelineError> {
        let bytes = self.blobs.get(key).await.map_err(storage)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| PipelineError::Storage(format!("corrupt artifact {key}: {e}")))
    }
}

fn storage(e: ServiceError) -> PipelineError {
    PipelineError::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::entity::{EntityType, RawEntity};
    use crate::models::report::Recommendation;
    use crate::pipeline::keyword::KeywordMatchScorer;
    use crate::pipeline::scorer::LlmMatchScorer;
    use crate::services::blob::resume_key;
    use crate::testing::{
        MemoryBlobStore, MemoryJobStore, ScriptedGenerator, StaticExtractor, StaticRecognizer,
    };

    struct Harness {
        store: Arc<MemoryJobStore>,
        blobs: Arc<MemoryBlobStore>,
        orchestrator: JobOrchestrator,
        job_id: Uuid,
    }

    fn jane_doe_entities() -> Vec<RawEntity> {
        vec![
            RawEntity::new(EntityType::Person, "Jane Doe", 0, 8, 0.99),
            RawEntity::new(EntityType::Organization, "MIT", 20, 23, 0.95),
            RawEntity::new(EntityType::Quantity, "3.8", 24, 27, 0.9),
            RawEntity::new(EntityType::Date, "2020", 28, 32, 0.9),
            RawEntity::new(EntityType::Title, "python", 200, 206, 0.9),
        ]
    }

    fn harness_with(
        extractor: StaticExtractor,
        recognizer: StaticRecognizer,
        scorer: Arc<dyn MatchScorer>,
        settings: PipelineSettings,
    ) -> Harness {
        let store = Arc::new(MemoryJobStore::default());
        let blobs = Arc::new(MemoryBlobStore::default());
        let job_id = Uuid::new_v4();
        store.insert(JobRecord::new_upload(
            job_id,
            Uuid::new_v4(),
            "cv.pdf".to_string(),
            resume_key(job_id, "cv.pdf"),
        ));
        blobs.insert(&resume_key(job_id, "cv.pdf"), b"%PDF-1.4 fake".to_vec());

        let orchestrator = JobOrchestrator::new(
            store.clone(),
            blobs.clone(),
            Arc::new(extractor),
            Arc::new(recognizer),
            scorer,
            settings,
        );
        Harness {
            store,
            blobs,
            orchestrator,
            job_id,
        }
    }

    fn harness(scorer: Arc<dyn MatchScorer>) -> Harness {
        harness_with(
            StaticExtractor::ok("Jane Doe ... MIT 3.8 2020"),
            StaticRecognizer::new(jane_doe_entities()),
            scorer,
            PipelineSettings::default(),
        )
    }

    fn posting() -> JobPosting {
        JobPosting {
            title: Some("Data Engineer".to_string()),
            description: Some("Python pipelines".to_string()),
            required_skills: vec!["Python".to_string(), "Spark".to_string()],
        }
    }

    #[tokio::test]
    async fn test_successful_run_stores_artifacts_and_completes() {
        let h = harness(Arc::new(KeywordMatchScorer));
        h.orchestrator.process(h.job_id, b"pdf", &posting()).await;

        let job = h.store.job(h.job_id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.structured_ref, Some(structured_key(h.job_id)));
        assert_eq!(job.analysis_ref, Some(analysis_key(h.job_id)));

        let structured: StructuredResume =
            serde_json::from_slice(&h.blobs.blob(&structured_key(h.job_id)).unwrap()).unwrap();
        assert_eq!(structured.personal.name.as_deref(), Some("Jane Doe"));
        assert_eq!(structured.education[0].gpa.as_deref(), Some("3.8"));

        match h.orchestrator.get_report(h.job_id).await.unwrap() {
            ReportLookup::Ready(report) => {
                assert_eq!(report.overall_score, 50);
                assert_eq!(report.recommendation, Recommendation::Interview);
            }
            other => panic!("expected a ready report, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_process_event_reads_uploaded_resume() {
        let h = harness(Arc::new(KeywordMatchScorer));
        let event = JobEvent {
            job_id: h.job_id,
            posting: posting(),
        };
        h.orchestrator.process_event(&event).await;
        assert_eq!(h.store.job(h.job_id).unwrap().status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_missing_resume_blob_fails_job() {
        let h = harness(Arc::new(KeywordMatchScorer));
        h.blobs.remove(&resume_key(h.job_id, "cv.pdf"));
        let event = JobEvent {
            job_id: h.job_id,
            posting: posting(),
        };
        h.orchestrator.process_event(&event).await;

        let job = h.store.job(h.job_id).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.error_message.unwrap().starts_with("Storage:"));
    }

    #[tokio::test]
    async fn test_processing_a_completed_job_is_a_no_op() {
        let h = harness(Arc::new(KeywordMatchScorer));
        h.orchestrator.process(h.job_id, b"pdf", &posting()).await;
        let first = h.store.job(h.job_id).unwrap();
        let puts = h.blobs.put_count();
        let analysis = h.blobs.blob(&analysis_key(h.job_id));

        h.orchestrator.process(h.job_id, b"pdf", &posting()).await;

        assert_eq!(h.store.job(h.job_id).unwrap(), first);
        assert_eq!(h.blobs.put_count(), puts);
        assert_eq!(h.blobs.blob(&analysis_key(h.job_id)), analysis);
    }

    #[tokio::test]
    async fn test_schema_violations_fail_job_with_schema_diagnostic() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            "Sure! The candidate looks strong.".to_string(),
            "Overall I would say 8/10.".to_string(),
        ]));
        let h = harness(Arc::new(LlmMatchScorer::new(generator)));
        h.orchestrator.process(h.job_id, b"pdf", &posting()).await;

        let job = h.store.job(h.job_id).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.error_message.as_deref().unwrap().contains("schema"));
        // Structuring had already succeeded.
        assert!(job.structured_ref.is_some());

        match h.orchestrator.get_report(h.job_id).await.unwrap() {
            ReportLookup::Failed { message } => assert!(message.contains("schema")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_extraction_failure_marks_error() {
        let h = harness_with(
            StaticExtractor::failing("document is encrypted"),
            StaticRecognizer::new(vec![]),
            Arc::new(KeywordMatchScorer),
            PipelineSettings::default(),
        );
        h.orchestrator.process(h.job_id, b"pdf", &posting()).await;

        let job = h.store.job(h.job_id).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        let message = job.error_message.unwrap();
        assert!(message.starts_with("ExtractionFailure:"), "{message}");
        assert!(job.structured_ref.is_none());
    }

    #[tokio::test]
    async fn test_empty_recognition_result_marks_error() {
        let h = harness_with(
            StaticExtractor::ok("lorem ipsum"),
            StaticRecognizer::new(vec![]),
            Arc::new(KeywordMatchScorer),
            PipelineSettings::default(),
        );
        h.orchestrator.process(h.job_id, b"pdf", &posting()).await;

        let job = h.store.job(h.job_id).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(
            job.error_message.as_deref(),
            Some("EntityRecognitionFailure: no entities recognized")
        );
        assert!(job.structured_ref.is_none());
        assert!(job.analysis_ref.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_stage_exceeds_budget() {
        let settings = PipelineSettings {
            job_timeout: Duration::from_secs(5),
            ..Default::default()
        };
        let h = harness_with(
            StaticExtractor::ok("text"),
            StaticRecognizer::new(jane_doe_entities()).with_delay(Duration::from_secs(60)),
            Arc::new(KeywordMatchScorer),
            settings,
        );
        h.orchestrator.process(h.job_id, b"pdf", &posting()).await;

        let job = h.store.job(h.job_id).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(
            job.error_message.as_deref(),
            Some("TimeoutExceeded: job did not finish within 5s")
        );
    }

    #[tokio::test]
    async fn test_posting_without_description_or_skills_skips_analysis() {
        let h = harness(Arc::new(KeywordMatchScorer));
        let posting = JobPosting {
            title: Some("Engineer".to_string()),
            ..Default::default()
        };
        h.orchestrator.process(h.job_id, b"pdf", &posting).await;

        let job = h.store.job(h.job_id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.structured_ref.is_some());
        assert!(job.analysis_ref.is_none());
        assert_eq!(
            h.orchestrator.get_report(h.job_id).await.unwrap(),
            ReportLookup::NoAnalysis
        );
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found_and_process_is_a_no_op() {
        let h = harness(Arc::new(KeywordMatchScorer));
        let unknown = Uuid::new_v4();

        h.orchestrator.process(unknown, b"pdf", &posting()).await;
        assert_eq!(h.blobs.put_count(), 0);
        assert_eq!(
            h.orchestrator.get_report(unknown).await.unwrap(),
            ReportLookup::NotFound
        );
        assert!(matches!(
            h.orchestrator.get_structured(unknown).await,
            Err(PipelineError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pending_lookup_reports_status() {
        let h = harness(Arc::new(KeywordMatchScorer));
        assert_eq!(
            h.orchestrator.get_report(h.job_id).await.unwrap(),
            ReportLookup::Pending {
                status: JobStatus::Uploaded,
                structured: false
            }
        );
        assert_eq!(h.orchestrator.get_structured(h.job_id).await.unwrap(), None);
    }
}
