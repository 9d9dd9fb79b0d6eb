pub mod health;
pub mod jobs;

use axum::{routing::get, Router};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Jobs API
        .route(
            "/api/v1/jobs",
            get(jobs::handle_list_jobs).post(jobs::handle_upload),
        )
        .route("/api/v1/jobs/:id", get(jobs::handle_get_job))
        .route("/api/v1/jobs/:id/structured", get(jobs::handle_get_structured))
        .route("/api/v1/jobs/:id/report", get(jobs::handle_get_report))
        .with_state(state)
}
