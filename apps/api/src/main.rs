mod config;
mod db;
mod document;
mod errors;
mod export;
mod handlers;
mod index;
mod llm_client;
mod orchestration;
mod retrieval;
mod routes;
mod routing;
mod splitter;
mod state;
mod store;

#[cfg(test)]
mod testing;

use anyhow::{Context, Result};
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::config::{Config, StorageBackend};
use crate::db::create_pool;
use crate::document::FileDocumentSource;
use crate::export::SessionExporter;
use crate::index::{Embedder, HttpEmbedder, MemorySemanticIndex, PgSemanticIndex, SemanticIndex};
use crate::llm_client::LlmClient;
use crate::orchestration::{Services, SessionRegistry};
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::{MemorySessionStore, PgSessionStore, SessionStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails fast on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("tailor_api={}", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Tailor API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize store and semantic index
    let embedder: Arc<dyn Embedder> = Arc::new(HttpEmbedder::new(config.embedding.clone()));
    info!(
        "Embeddings: {} ({} dimensions) via {}",
        config.embedding.model, config.embedding.dimensions, config.embedding.api_base
    );
    let (store, index): (Arc<dyn SessionStore>, Arc<dyn SemanticIndex>) = match config.storage_backend {
        StorageBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres backend")?;
            let db = create_pool(database_url).await?;
            (
                Arc::new(PgSessionStore::new(db.clone())) as Arc<dyn SessionStore>,
                Arc::new(PgSemanticIndex::new(db, embedder, config.chunk_words)) as Arc<dyn SemanticIndex>,
            )
        }
        StorageBackend::Memory => {
            info!("Using in-memory store and index (data is lost on restart)");
            (
                Arc::new(MemorySessionStore::new()) as Arc<dyn SessionStore>,
                Arc::new(MemorySemanticIndex::new(embedder, config.chunk_words)) as Arc<dyn SemanticIndex>,
            )
        }
    };

    // Initialize S3 / MinIO
    let s3 = build_s3_client(&config).await;
    info!("S3 client initialized");

    // Initialize LLM client
    let llm = Arc::new(LlmClient::new(config.anthropic_api_key.clone()));
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let services = Services::build(llm, store, index, config.orchestrator.clone());
    info!(
        "Orchestrator settings: distance threshold {}, top_k {}, history turns {}",
        config.orchestrator.distance_threshold,
        config.orchestrator.top_k,
        config.orchestrator.history_turns
    );

    // Build app state
    let state = AppState {
        sessions: Arc::new(SessionRegistry::new(services)),
        documents: Arc::new(FileDocumentSource),
        exporter: Arc::new(SessionExporter::new(s3, config.s3_bucket.clone())),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: tighten CORS in production

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
        "tailor-static",
    );

    let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(credentials)
        .endpoint_url(&config.s3_endpoint)
        .load()
        .await;

    aws_sdk_s3::Client::new(&s3_config)
}
