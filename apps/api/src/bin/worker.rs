use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use openlens::config::Config;
use openlens::db::create_pool;
use openlens::enrichment::jobs::{JobContext, JobKind};
use openlens::enrichment::queue::RedisJobQueue;
use openlens::enrichment::vulns::FeedSet;
use openlens::enrichment::worker::WorkerPool;
use openlens::reconciliation::scoring::DefaultConfidenceScorer;
use openlens::store::PgCatalogStore;
use openlens::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    init_tracing(env!("CARGO_BIN_NAME"), &config.rust_log);

    info!("Starting OpenLens worker v{}", env!("CARGO_PKG_VERSION"));

    let db = create_pool(&config.database_url).await?;
    let redis = redis::Client::open(config.redis_url.clone())?;
    let queue = Arc::new(RedisJobQueue::connect(redis).await?);
    for kind in JobKind::ALL {
        queue.requeue_stalled(kind).await?;
    }

    let ctx = JobContext {
        store: Arc::new(PgCatalogStore::new(db)),
        queue: queue.clone(),
        feeds: Arc::new(FeedSet::standard(
            config.nvd_api_key.clone(),
            config.github_access_token.clone(),
            config.feed_timeout,
        )),
        scorer: Arc::new(DefaultConfidenceScorer),
    };

    let mut pool = WorkerPool::new(ctx, config.worker_concurrency);
    pool.spawn();
    info!("Worker started, listening for jobs...");

    shutdown_signal().await;
    info!("Shutdown requested, draining in-flight jobs");
    pool.shutdown().await;
    info!("Worker shut down gracefully");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
