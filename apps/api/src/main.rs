mod config;
mod db;
mod errors;
mod llm_client;
mod models;
mod pipeline;
mod routes;
mod session;
mod state;
mod storage;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::Config;
use crate::db::{create_pool, ensure_schema};
use crate::llm_client::LlmClient;
use crate::pipeline::chunker::Chunker;
use crate::pipeline::embedding::create_embedder;
use crate::pipeline::index::IndexRegistry;
use crate::pipeline::ranker::CandidateRanker;
use crate::pipeline::scorer::LlmScorer;
use crate::routes::build_router;
use crate::session::pg_store::PgSessionStore;
use crate::session::queue::AnalysisQueue;
use crate::session::runner::AnalysisPipeline;
use crate::state::AppState;
use crate::storage::S3ObjectStore;

/// Pending session ids the queue holds before `enqueue` waits.
const QUEUE_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Screening API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    ensure_schema(&db).await?;
    let store = Arc::new(PgSessionStore::new(db));

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    let objects = Arc::new(S3ObjectStore::new(s3, config.s3_bucket.clone()));
    info!("S3 client initialized (bucket: {})", config.s3_bucket);

    // Initialize LLM scorer
    let llm = LlmClient::new(config.llm.clone());
    if llm.is_configured() {
        info!("LLM client initialized (model: {})", config.llm.model);
    } else {
        warn!("ANTHROPIC_API_KEY is not set; every score will be degraded as unavailable");
    }
    let scorer = Arc::new(LlmScorer::new(Arc::new(llm), config.scoring));

    // Initialize embedding provider
    let embedder = create_embedder(&config.embedding);
    info!(
        "Embedding provider: {} ({} dims)",
        embedder.model_name(),
        embedder.dims()
    );

    let pipeline = AnalysisPipeline::new(
        store.clone(),
        objects.clone(),
        embedder,
        scorer,
        Arc::new(IndexRegistry::new()),
        Chunker::new(config.chunker),
        CandidateRanker::new(config.ranker),
    );
    let queue = AnalysisQueue::start(
        pipeline.clone(),
        config.max_concurrent_sessions,
        QUEUE_CAPACITY,
    );
    info!(
        "Analysis queue started ({} concurrent sessions)",
        config.max_concurrent_sessions
    );

    // Build app state
    let state = AppState {
        store,
        objects,
        pipeline,
        queue,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Constructs an S3 client configured for MinIO (local) or AWS (production).
async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let credentials = Credentials::new(
        &config.aws_access_key_id,
        &config.aws_secret_access_key,
        None,
        None,
        "screening-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
