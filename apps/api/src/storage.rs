//! Blob storage for uploaded inventory files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores the upload and returns its storage key.
    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<String, AppError>;

    /// Best-effort removal. Missing blobs are not an error.
    async fn delete(&self, key: &str) -> Result<(), AppError>;
}

/// `imports/<uuid>/<filename>` with anything outside `[A-Za-z0-9._-]` replaced.
pub fn storage_key(filename: &str) -> String {
    format!("imports/{}/{}", Uuid::new_v4(), sanitize_filename(filename))
}

fn sanitize_filename(filename: &str) -> String {
    // Strip any client-supplied directory part.
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// S3 / MinIO
// ────────────────────────────────────────────────────────────────────────────

pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<String, AppError> {
        let key = storage_key(filename);
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 upload failed: {e}")))?;

        info!("Uploaded s3://{}/{}", self.bucket, key);
        Ok(key)
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 delete failed: {e}")))?;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Local filesystem
// ────────────────────────────────────────────────────────────────────────────

pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(Path::new(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn save(&self, filename: &str, bytes: &[u8]) -> Result<String, AppError> {
        let key = storage_key(filename);
        let path = self.path_for(&key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("creating {}: {e}", parent.display())))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::Storage(format!("writing {}: {e}", path.display())))?;

        info!("File saved: {}", path.display());
        Ok(key)
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Blob {} already gone", path.display());
                Ok(())
            }
            Err(e) => Err(AppError::Storage(format!("deleting {}: {e}", path.display()))),
        }
    }
}
