//! Shared fixtures for unit tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tempfile::TempDir;
use uuid::Uuid;

use crate::config::{BlobBackend, Config};
use crate::enrichment::queue::memory::MemoryJobQueue;
use crate::models::import::{Import, ImportRow};
use crate::models::library::{Library, LibraryAttributes};
use crate::reconciliation::scoring::DefaultConfidenceScorer;
use crate::state::AppState;
use crate::storage::LocalBlobStore;
use crate::store::{CatalogStore, MemoryCatalogStore, NewImport};

pub fn library(name: &str, version: &str) -> Library {
    Library {
        id: Uuid::new_v4(),
        name: name.to_string(),
        version: version.to_string(),
        purl: None,
        license_declared: None,
        license_detected: None,
        vulnerability_count: 0,
        owner: None,
        environment: None,
        deleted_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub fn attrs(name: &str, version: &str) -> LibraryAttributes {
    LibraryAttributes {
        name: Some(name.to_string()),
        version: Some(version.to_string()),
        ..Default::default()
    }
}

/// Persists an import whose rows are the given JSON objects.
pub async fn seed_import(store: &MemoryCatalogStore, rows: Vec<Value>) -> (Import, Vec<ImportRow>) {
    let import = store
        .insert_import(NewImport {
            filename: "deps.csv",
            uploaded_by: None,
            rows_count: rows.len() as i32,
            storage_key: "imports/test/deps.csv",
        })
        .await
        .unwrap();
    let mut inserted = Vec::new();
    for row in rows {
        let payload = row.as_object().cloned().unwrap();
        inserted.push(
            store
                .insert_import_row(import.id, "", &payload)
                .await
                .unwrap(),
        );
    }
    (import, inserted)
}

/// Router state wired to in-memory backends and a throwaway upload directory.
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryCatalogStore>,
    pub queue: Arc<MemoryJobQueue>,
    _uploads: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let uploads = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryCatalogStore::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let config = Config {
            database_url: "postgres://unused".to_string(),
            redis_url: "redis://unused".to_string(),
            blob_backend: BlobBackend::Local {
                root: uploads.path().to_path_buf(),
            },
            nvd_api_key: None,
            github_access_token: None,
            feed_timeout: Duration::from_secs(5),
            worker_concurrency: 2,
            license_allowlist: Vec::new(),
            port: 0,
            rust_log: "info".to_string(),
        };
        let state = AppState {
            store: store.clone(),
            queue: queue.clone(),
            blobs: Arc::new(LocalBlobStore::new(uploads.path())),
            scorer: Arc::new(DefaultConfidenceScorer),
            config: Arc::new(config),
        };
        Self {
            state,
            store,
            queue,
            _uploads: uploads,
        }
    }
}
