use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enrichment::jobs::Job;
use crate::errors::AppError;
use crate::imports::mapping::ColumnMapping;
use crate::imports::pipeline::{ingest_upload, IngestResponse, Upload};
use crate::models::import::{Import, ImportRow};
use crate::pagination::{PageParams, Paginated};
use crate::reconciliation::matcher::{map_import, MapSummary};
use crate::state::AppState;
use crate::store::CatalogStore;

#[derive(Serialize)]
pub struct ImportDetailResponse {
    pub import: Import,
    pub rows: Vec<ImportRow>,
}

#[derive(Deserialize)]
pub struct MapRequest {
    pub mapping: ColumnMapping,
}

#[derive(Serialize)]
pub struct EnqueuedResponse {
    pub job_id: Uuid,
}

async fn require_import(store: &dyn CatalogStore, id: Uuid) -> Result<Import, AppError> {
    store
        .get_import(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Import {id} not found")))
}

/// POST /api/v1/imports
/// Multipart fields: `file` (required), `uploaded_by` (optional UUID).
pub async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<IngestResponse>), AppError> {
    let mut file = None;
    let mut uploaded_by = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Could not read file: {e}")))?;
                file = Some((filename, content_type, bytes));
            }
            Some("uploaded_by") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(e.to_string()))?;
                let id = Uuid::parse_str(text.trim())
                    .map_err(|_| AppError::Validation("uploaded_by must be a UUID".to_string()))?;
                uploaded_by = Some(id);
            }
            _ => {}
        }
    }

    let (filename, content_type, bytes) =
        file.ok_or_else(|| AppError::Validation("No file provided".to_string()))?;

    let response = ingest_upload(
        state.store.as_ref(),
        state.blobs.as_ref(),
        Upload {
            filename: &filename,
            content_type: content_type.as_deref(),
            uploaded_by,
            bytes: &bytes,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /api/v1/imports/:id
pub async fn handle_get_import(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ImportDetailResponse>, AppError> {
    let import = require_import(state.store.as_ref(), id).await?;
    let rows = state.store.list_import_rows(id, None, 0).await?;
    Ok(Json(ImportDetailResponse { import, rows }))
}

/// GET /api/v1/imports/:id/preview?page=&limit=
pub async fn handle_preview(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<PageParams>,
) -> Result<Json<Paginated<ImportRow>>, AppError> {
    require_import(state.store.as_ref(), id).await?;
    let rows = state
        .store
        .list_import_rows(id, Some(params.limit()), params.offset())
        .await?;
    let total = state.store.count_import_rows(id).await?;
    Ok(Json(Paginated::new(rows, &params, total)))
}

/// POST /api/v1/imports/:id/map
pub async fn handle_map(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<MapRequest>, JsonRejection>,
) -> Result<Json<MapSummary>, AppError> {
    let Json(req) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    let summary = map_import(state.store.as_ref(), state.scorer.as_ref(), id, &req.mapping).await?;
    Ok(Json(summary))
}

/// POST /api/v1/imports/:id/enrich
pub async fn handle_enrich(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<EnqueuedResponse>), AppError> {
    require_import(state.store.as_ref(), id).await?;
    let job_id = state.queue.enqueue(Job::EnrichImport { import_id: id }).await?;
    Ok((StatusCode::ACCEPTED, Json(EnqueuedResponse { job_id })))
}
