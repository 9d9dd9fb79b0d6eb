use std::sync::Arc;

use crate::pipeline::orchestrator::JobOrchestrator;
use crate::services::{BlobStore, JobQueue, JobStore};

/// Shared application state injected into all route handlers via Axum extractors.
///
/// Every collaborator is a trait object so the router can be exercised
/// against in-memory fakes.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn JobStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub queue: Arc<dyn JobQueue>,
    pub orchestrator: Arc<JobOrchestrator>,
}
