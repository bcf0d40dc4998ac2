use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use aws_config::Region;
use aws_sdk_s3::config::Credentials;
use axum::extract::DefaultBodyLimit;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use openlens::config::{BlobBackend, Config};
use openlens::db::create_pool;
use openlens::enrichment::queue::RedisJobQueue;
use openlens::reconciliation::scoring::DefaultConfidenceScorer;
use openlens::routes::build_router;
use openlens::state::AppState;
use openlens::storage::{BlobStore, LocalBlobStore, S3BlobStore};
use openlens::store::PgCatalogStore;
use openlens::telemetry::init_tracing;

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;
    init_tracing(env!("CARGO_BIN_NAME"), &config.rust_log);

    info!("Starting OpenLens API v{}", env!("CARGO_PKG_VERSION"));

    let db = create_pool(&config.database_url).await?;

    let redis = redis::Client::open(config.redis_url.clone())?;
    let queue = RedisJobQueue::connect(redis).await?;
    info!("Redis job queue connected");

    let blobs = build_blob_store(&config).await;

    let state = AppState {
        store: Arc::new(PgCatalogStore::new(db)),
        queue: Arc::new(queue),
        blobs,
        scorer: Arc::new(DefaultConfidenceScorer),
        config: Arc::new(config.clone()),
    };

    let app = build_router(state)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn build_blob_store(config: &Config) -> Arc<dyn BlobStore> {
    match &config.blob_backend {
        BlobBackend::S3 {
            bucket,
            endpoint,
            access_key_id,
            secret_access_key,
        } => {
            let credentials = Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "openlens-static",
            );
            let s3_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
                .region(Region::new("us-east-1"))
                .credentials_provider(credentials)
                .endpoint_url(endpoint)
                .load()
                .await;
            info!("Uploads stored in s3://{bucket}");
            Arc::new(S3BlobStore::new(
                aws_sdk_s3::Client::new(&s3_config),
                bucket.clone(),
            ))
        }
        BlobBackend::Local { root } => {
            info!("Uploads stored under {}", root.display());
            Arc::new(LocalBlobStore::new(root.clone()))
        }
    }
}
