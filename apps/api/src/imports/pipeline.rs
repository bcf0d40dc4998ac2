//! Upload ingestion: parse, store the original file, persist the import and its rows.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::imports::parser::{parse_upload, source_id, ContentKind, MAX_PERSISTED_ROWS};
use crate::models::import::{Import, ImportRow};
use crate::storage::BlobStore;
use crate::store::{CatalogStore, NewImport};

pub const PREVIEW_ROWS: usize = 5;

#[derive(Debug, Clone)]
pub struct Upload<'a> {
    pub filename: &'a str,
    pub content_type: Option<&'a str>,
    pub uploaded_by: Option<Uuid>,
    pub bytes: &'a [u8],
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportPreview {
    pub headers: Vec<String>,
    pub rows: Vec<ImportRow>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub import: Import,
    pub preview: ImportPreview,
}

/// Runs one upload through to a pending import.
///
/// `rows_count` records every parsed row; only the first `MAX_PERSISTED_ROWS` are stored.
/// Parsing happens before anything is written, so a rejected file leaves no trace.
pub async fn ingest_upload(
    store: &dyn CatalogStore,
    blobs: &dyn BlobStore,
    upload: Upload<'_>,
) -> Result<IngestResponse, AppError> {
    let kind = ContentKind::detect(upload.content_type, upload.filename);
    let parsed = parse_upload(upload.bytes, kind)?;
    let rows_count = i32::try_from(parsed.rows.len())
        .map_err(|_| AppError::Validation("Too many rows in upload".to_string()))?;

    let storage_key = blobs.save(upload.filename, upload.bytes).await?;

    let import = match store
        .insert_import(NewImport {
            filename: upload.filename,
            uploaded_by: upload.uploaded_by,
            rows_count,
            storage_key: &storage_key,
        })
        .await
    {
        Ok(import) => import,
        Err(e) => {
            if let Err(cleanup) = blobs.delete(&storage_key).await {
                warn!("Could not remove orphaned upload {storage_key}: {cleanup}");
            }
            return Err(e);
        }
    };

    let mut preview_rows = Vec::with_capacity(PREVIEW_ROWS);
    for row in parsed.rows.iter().take(MAX_PERSISTED_ROWS) {
        let inserted = store
            .insert_import_row(import.id, &source_id(row), row)
            .await?;
        if preview_rows.len() < PREVIEW_ROWS {
            preview_rows.push(inserted);
        }
    }

    if parsed.rows.len() > MAX_PERSISTED_ROWS {
        warn!(
            "Import {} truncated: {} rows parsed, {MAX_PERSISTED_ROWS} stored",
            import.id,
            parsed.rows.len()
        );
    }
    info!(
        "Import {} created from {} ({kind:?}, {rows_count} rows)",
        import.id, upload.filename
    );

    Ok(IngestResponse {
        import,
        preview: ImportPreview {
            headers: parsed.headers,
            rows: preview_rows,
        },
    })
}
