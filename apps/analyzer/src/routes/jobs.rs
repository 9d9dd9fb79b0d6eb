use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::errors::{error_response, AppError};
use crate::models::job::{JobEvent, JobPosting, JobRecord, JobStatus};
use crate::models::resume::StructuredResume;
use crate::pipeline::orchestrator::ReportLookup;
use crate::services::blob::resume_key;
use crate::state::AppState;

/// Report endpoint answers for jobs that are still moving. Clients poll again.
pub const STATUS_UPLOADED: u16 = 480;
pub const STATUS_PROCESSING: u16 = 481;
pub const STATUS_SCORING: u16 = 482;

const DEFAULT_FILENAME: &str = "resume.pdf";

#[derive(Deserialize)]
pub struct UserIdQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub job_id: Uuid,
    pub status: JobStatus,
}

/// Fields collected from the upload form.
#[derive(Default)]
struct UploadForm {
    user_id: Option<String>,
    file: Option<(String, Bytes)>,
    posting: JobPosting,
}

/// POST /api/v1/jobs
pub async fn handle_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), AppError> {
    let form = read_upload_form(multipart).await?;

    let user_id = form
        .user_id
        .ok_or_else(|| AppError::Validation("missing field 'user_id'".to_string()))?;
    let user_id = Uuid::parse_str(user_id.trim())
        .map_err(|_| AppError::Validation(format!("'{user_id}' is not a valid user_id")))?;
    let (filename, data) = form
        .file
        .ok_or_else(|| AppError::Validation("missing field 'file'".to_string()))?;
    if data.is_empty() {
        return Err(AppError::Validation("uploaded file is empty".to_string()));
    }

    if !state.store.user_exists(user_id).await? {
        return Err(AppError::NotFound(format!("user {user_id}")));
    }

    let job_id = Uuid::new_v4();
    let blob_ref = resume_key(job_id, &filename);
    state.blobs.put(&blob_ref, data, "application/pdf").await?;

    let job = JobRecord::new_upload(job_id, user_id, filename, blob_ref);
    state.store.create_job(&job).await?;
    let event = JobEvent {
        job_id,
        posting: form.posting,
    };
    if let Err(e) = state.queue.enqueue(&event).await {
        // Nothing will ever pop this job, so it must not stay `uploaded`.
        error!("Failed to enqueue job {job_id}: {e}");
        state
            .store
            .mark_failed(job_id, &format!("could not queue job: {e}"))
            .await?;
        return Err(e.into());
    }

    info!("Accepted resume upload {job_id} for user {user_id}");
    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            job_id,
            status: job.status,
        }),
    ))
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, AppError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = sanitize_filename(field.file_name());
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("could not read file: {e}")))?;
                form.file = Some((filename, data));
            }
            "user_id" | "job_title" | "job_description" | "job_required_skills" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("could not read '{name}': {e}")))?;
                let trimmed = value.trim();
                match name.as_str() {
                    "user_id" => form.user_id = Some(value),
                    "job_required_skills" => {
                        form.posting.required_skills = JobPosting::parse_skills(trimmed)
                    }
                    _ if trimmed.is_empty() => {}
                    "job_title" => form.posting.title = Some(trimmed.to_string()),
                    _ => form.posting.description = Some(trimmed.to_string()),
                }
            }
            _ => {}
        }
    }

    Ok(form)
}

/// Keeps only the final path component; blob keys must not nest.
fn sanitize_filename(raw: Option<&str>) -> String {
    raw.and_then(|name| name.rsplit(['/', '\\']).next())
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")
        .unwrap_or(DEFAULT_FILENAME)
        .to_string()
}

/// GET /api/v1/jobs?user_id=
pub async fn handle_list_jobs(
    State(state): State<AppState>,
    Query(params): Query<UserIdQuery>,
) -> Result<Json<Vec<JobRecord>>, AppError> {
    Ok(Json(state.store.list_jobs(params.user_id).await?))
}

/// GET /api/v1/jobs/:id
pub async fn handle_get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobRecord>, AppError> {
    state
        .store
        .get_job(job_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("job {job_id}")))
}

/// GET /api/v1/jobs/:id/structured
pub async fn handle_get_structured(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<StructuredResume>, AppError> {
    state
        .orchestrator
        .get_structured(job_id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            AppError::NotFound(format!("structured resume for job {job_id} is not ready"))
        })
}

/// GET /api/v1/jobs/:id/report
pub async fn handle_get_report(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let response = match state.orchestrator.get_report(job_id).await? {
        ReportLookup::Ready(report) => Json(report).into_response(),
        ReportLookup::Pending { status, structured } => {
            let (code, message) = match (status, structured) {
                (JobStatus::Uploaded, _) => {
                    (STATUS_UPLOADED, "Resume uploaded, waiting to be processed")
                }
                (_, false) => (STATUS_PROCESSING, "Resume is being processed"),
                (_, true) => (STATUS_SCORING, "Resume structured, match report in progress"),
            };
            let status_code = StatusCode::from_u16(code).unwrap_or(StatusCode::ACCEPTED);
            (
                status_code,
                Json(json!({ "status": status, "message": message })),
            )
                .into_response()
        }
        ReportLookup::Failed { message } => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "JOB_FAILED", &message)
        }
        ReportLookup::NoAnalysis => StatusCode::NO_CONTENT.into_response(),
        ReportLookup::NotFound => {
            error_response(StatusCode::NOT_FOUND, "NOT_FOUND", &format!("job {job_id}"))
        }
    };
    Ok(response)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::Router;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::models::entity::{EntityType, RawEntity};
    use crate::pipeline::keyword::KeywordMatchScorer;
    use crate::pipeline::orchestrator::{JobOrchestrator, PipelineSettings};
    use crate::routes::build_router;
    use crate::services::JobStore;
    use crate::testing::{
        MemoryBlobStore, MemoryJobStore, RecordingQueue, StaticExtractor, StaticRecognizer,
    };

    const BOUNDARY: &str = "analyzer-test-boundary";

    struct TestApp {
        router: Router,
        store: Arc<MemoryJobStore>,
        blobs: Arc<MemoryBlobStore>,
        queue: Arc<RecordingQueue>,
        orchestrator: Arc<JobOrchestrator>,
        user_id: Uuid,
    }

    fn test_app() -> TestApp {
        test_app_with(RecordingQueue::default())
    }

    fn test_app_with(queue: RecordingQueue) -> TestApp {
        let store = Arc::new(MemoryJobStore::default());
        let blobs = Arc::new(MemoryBlobStore::default());
        let queue = Arc::new(queue);
        let user_id = Uuid::new_v4();
        store.add_user(user_id);

        let orchestrator = Arc::new(JobOrchestrator::new(
            store.clone(),
            blobs.clone(),
            Arc::new(StaticExtractor::ok("Jane Doe MIT 2020")),
            Arc::new(StaticRecognizer::new(vec![
                RawEntity::new(EntityType::Person, "Jane Doe", 0, 8, 0.99),
                RawEntity::new(EntityType::Organization, "MIT", 9, 12, 0.9),
                RawEntity::new(EntityType::Title, "Rust", 300, 304, 0.9),
            ])),
            Arc::new(KeywordMatchScorer),
            PipelineSettings::default(),
        ));

        let router = build_router(AppState {
            store: store.clone(),
            blobs: blobs.clone(),
            queue: queue.clone(),
            orchestrator: orchestrator.clone(),
        });

        TestApp {
            router,
            store,
            blobs,
            queue,
            orchestrator,
            user_id,
        }
    }

    fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((filename, data)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/pdf\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/jobs")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    fn seed_job(app: &TestApp) -> Uuid {
        let job_id = Uuid::new_v4();
        let blob_ref = resume_key(job_id, "cv.pdf");
        app.blobs.insert(&blob_ref, b"%PDF-1.4".to_vec());
        app.store.insert(JobRecord::new_upload(
            job_id,
            app.user_id,
            "cv.pdf".to_string(),
            blob_ref,
        ));
        job_id
    }

    #[tokio::test]
    async fn test_health_returns_ok() {
        let app = test_app();
        let (status, body) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_upload_stores_resume_and_enqueues_event() {
        let app = test_app();
        let user_id = app.user_id.to_string();
        let body = multipart_body(
            &[
                ("user_id", user_id.as_str()),
                ("job_title", "Backend Engineer"),
                ("job_description", "Build APIs"),
                ("job_required_skills", "Rust, Postgres,"),
            ],
            Some(("cv.pdf", &b"%PDF-1.4 resume"[..])),
        );

        let (status, body) = send(&app, upload_request(body)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["status"], "uploaded");

        let job_id: Uuid = serde_json::from_value(body["job_id"].clone()).unwrap();
        let job = app.store.job(job_id).unwrap();
        assert_eq!(job.status, JobStatus::Uploaded);
        assert_eq!(job.resume_blob_ref, resume_key(job_id, "cv.pdf"));
        assert_eq!(
            app.blobs.blob(&job.resume_blob_ref).unwrap().as_ref(),
            b"%PDF-1.4 resume"
        );

        let events = app.queue.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].job_id, job_id);
        assert_eq!(events[0].posting.title.as_deref(), Some("Backend Engineer"));
        assert_eq!(events[0].posting.required_skills, vec!["Rust", "Postgres"]);
    }

    #[tokio::test]
    async fn test_upload_with_unreachable_queue_fails_the_job() {
        let app = test_app_with(RecordingQueue::failing());
        let user_id = app.user_id.to_string();
        let body = multipart_body(
            &[("user_id", user_id.as_str()), ("job_description", "Build APIs")],
            Some(("cv.pdf", &b"%PDF-1.4 resume"[..])),
        );

        let (status, body) = send(&app, upload_request(body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "STORAGE_ERROR");

        let jobs = app.store.list_jobs(app.user_id).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status, JobStatus::Error);
        assert!(jobs[0]
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("could not queue job:"));
    }

    #[tokio::test]
    async fn test_upload_without_file_is_rejected() {
        let app = test_app();
        let user_id = app.user_id.to_string();
        let body = multipart_body(&[("user_id", user_id.as_str())], None);

        let (status, body) = send(&app, upload_request(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        assert!(app.queue.events().is_empty());
    }

    #[tokio::test]
    async fn test_upload_for_unknown_user_is_404() {
        let app = test_app();
        let stranger = Uuid::new_v4().to_string();
        let body = multipart_body(&[("user_id", stranger.as_str())], Some(("cv.pdf", &b"%PDF"[..])));

        let (status, _) = send(&app, upload_request(body)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(app.blobs.put_count(), 0);
    }

    #[tokio::test]
    async fn test_report_transient_statuses() {
        let app = test_app();
        let job_id = seed_job(&app);
        let uri = format!("/api/v1/jobs/{job_id}/report");

        let (status, body) = send(&app, get(&uri)).await;
        assert_eq!(status.as_u16(), STATUS_UPLOADED);
        assert_eq!(body["status"], "uploaded");

        app.store
            .set_status(job_id, JobStatus::Processing)
            .await
            .unwrap();
        let (status, _) = send(&app, get(&uri)).await;
        assert_eq!(status.as_u16(), STATUS_PROCESSING);

        app.store
            .set_structured(job_id, "structured/x.json")
            .await
            .unwrap();
        let (status, _) = send(&app, get(&uri)).await;
        assert_eq!(status.as_u16(), STATUS_SCORING);
    }

    #[tokio::test]
    async fn test_report_ready_after_processing() {
        let app = test_app();
        let job_id = seed_job(&app);
        let posting = JobPosting {
            required_skills: vec!["Rust".to_string()],
            ..Default::default()
        };
        app.orchestrator.process(job_id, b"%PDF", &posting).await;

        let (status, body) = send(&app, get(&format!("/api/v1/jobs/{job_id}/report"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["overall_score"], 100);
        assert_eq!(body["recommendation"], "hire");

        let (status, body) =
            send(&app, get(&format!("/api/v1/jobs/{job_id}/structured"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["personal"]["name"], "Jane Doe");
    }

    #[tokio::test]
    async fn test_report_failed_job_returns_500_with_message() {
        let app = test_app();
        let job_id = seed_job(&app);
        app.store
            .mark_failed(job_id, "ExtractionFailure: document is encrypted")
            .await
            .unwrap();

        let (status, body) = send(&app, get(&format!("/api/v1/jobs/{job_id}/report"))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["code"], "JOB_FAILED");
        assert_eq!(
            body["error"]["message"],
            "ExtractionFailure: document is encrypted"
        );
    }

    #[tokio::test]
    async fn test_report_without_analysis_is_204() {
        let app = test_app();
        let job_id = seed_job(&app);
        app.store.mark_completed(job_id, None).await.unwrap();

        let (status, body) = send(&app, get(&format!("/api/v1/jobs/{job_id}/report"))).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn test_unknown_job_is_404_everywhere() {
        let app = test_app();
        let job_id = Uuid::new_v4();
        for uri in [
            format!("/api/v1/jobs/{job_id}"),
            format!("/api/v1/jobs/{job_id}/report"),
            format!("/api/v1/jobs/{job_id}/structured"),
        ] {
            let (status, _) = send(&app, get(&uri)).await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_list_jobs_for_user() {
        let app = test_app();
        seed_job(&app);
        seed_job(&app);

        let (status, body) = send(
            &app,
            get(&format!("/api/v1/jobs?user_id={}", app.user_id)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_sanitize_filename_strips_paths() {
        assert_eq!(sanitize_filename(Some("../../etc/passwd")), "passwd");
        assert_eq!(sanitize_filename(Some("C:\\docs\\cv.pdf")), "cv.pdf");
        assert_eq!(sanitize_filename(Some("..")), DEFAULT_FILENAME);
        assert_eq!(sanitize_filename(None), DEFAULT_FILENAME);
    }
}
