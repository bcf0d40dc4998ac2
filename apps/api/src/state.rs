use std::sync::Arc;

use crate::config::Config;
use crate::enrichment::queue::JobQueue;
use crate::reconciliation::scoring::ConfidenceScorer;
use crate::storage::BlobStore;
use crate::store::CatalogStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CatalogStore>,
    /// Producer side only; jobs are consumed by the worker binary.
    pub queue: Arc<dyn JobQueue>,
    pub blobs: Arc<dyn BlobStore>,
    /// Pluggable confidence scorer. Default: DefaultConfidenceScorer.
    pub scorer: Arc<dyn ConfidenceScorer>,
    pub config: Arc<Config>,
}
