mod config;
mod db;
mod errors;
mod llm_client;
mod models;
mod pipeline;
mod poller;
mod routes;
mod services;
mod state;
#[cfg(test)]
mod testing;
mod worker;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

use crate::config::{Config, ScorerBackend};
use crate::db::{create_pool, ensure_schema};
use crate::llm_client::LlmClient;
use crate::pipeline::keyword::KeywordMatchScorer;
use crate::pipeline::normalizer::NormalizerConfig;
use crate::pipeline::orchestrator::{JobOrchestrator, PipelineSettings};
use crate::pipeline::scorer::{LlmMatchScorer, MatchScorer};
use crate::pipeline::structurer::StructurerConfig;
use crate::poller::{PollOutcome, ReportPoller};
use crate::routes::build_router;
use crate::services::blob::S3BlobStore;
use crate::services::extract::PdfTextExtractor;
use crate::services::queue::RedisJobQueue;
use crate::services::recognize::HttpEntityRecognizer;
use crate::services::store::PgJobStore;
use crate::state::AppState;
use crate::worker::Worker;

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("poll") => match args.as_slice() {
            [_, base_url, job_id] => poll(base_url, job_id).await,
            _ => bail!("usage: resume-analyzer poll <base-url> <job-id>"),
        },
        _ => serve().await,
    }
}

fn init_tracing(rust_log: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;
    init_tracing(&config.rust_log);

    info!("Starting resume analyzer v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    ensure_schema(&db).await?;
    let store = Arc::new(PgJobStore::new(db));

    // Initialize Redis
    let redis = redis::Client::open(config.redis_url.clone())?;
    let queue = Arc::new(RedisJobQueue::new(redis));
    info!("Redis client initialized");

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    let blobs = Arc::new(S3BlobStore::new(s3, config.s3_bucket.clone()));
    info!("S3 client initialized");

    // Initialize match scorer
    let scorer: Arc<dyn MatchScorer> = match config.match_scorer {
        ScorerBackend::Llm => {
            let llm = LlmClient::new(config.anthropic_api_key.clone())
                .context("Failed to build LLM client")?;
            info!("LLM match scorer initialized (model: {})", llm_client::MODEL);
            Arc::new(LlmMatchScorer::new(Arc::new(llm)))
        }
        ScorerBackend::Keyword => {
            info!("Keyword match scorer initialized");
            Arc::new(KeywordMatchScorer)
        }
    };

    let recognizer = HttpEntityRecognizer::new(config.entity_service_url.clone())
        .context("Failed to build entity recognizer client")?;

    let settings = PipelineSettings {
        normalizer: NormalizerConfig {
            min_confidence: config.min_entity_confidence,
            ..Default::default()
        },
        structurer: StructurerConfig {
            association_window: config.association_window,
            ..Default::default()
        },
        job_timeout: Duration::from_secs(config.job_timeout_secs),
    };

    let orchestrator = Arc::new(JobOrchestrator::new(
        store.clone(),
        blobs.clone(),
        Arc::new(PdfTextExtractor),
        Arc::new(recognizer),
        scorer,
        settings,
    ));

    // Start the queue worker
    let shutdown = CancellationToken::new();
    let worker = Worker::new(
        queue.clone(),
        orchestrator.clone(),
        config.worker_concurrency,
    );
    let worker_handle = tokio::spawn(worker.run(shutdown.clone()));

    // Build app state
    let state = AppState {
        store,
        blobs,
        queue,
        orchestrator,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await?;

    worker_handle.await.context("Worker task panicked")?;
    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}

/// `resume-analyzer poll <base-url> <job-id>`: waits for a job's report and
/// prints it as JSON.
async fn poll(base_url: &str, job_id: &str) -> Result<()> {
    init_tracing("info");
    let job_id = Uuid::parse_str(job_id).context("job id must be a UUID")?;
    let poller = ReportPoller::new(base_url)?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    match poller.poll(job_id, &cancel).await {
        PollOutcome::Ready(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        PollOutcome::NoAnalysis => {
            println!("Job {job_id} completed without a match report");
            Ok(())
        }
        PollOutcome::NotFound => bail!("job {job_id} not found"),
        PollOutcome::Failed(message) => bail!("job {job_id} failed: {message}"),
        PollOutcome::GaveUp(last) => bail!("gave up polling job {job_id}: {last}"),
        PollOutcome::Cancelled => bail!("polling cancelled"),
    }
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "resume-analyzer-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
