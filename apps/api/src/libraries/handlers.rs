use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::enrichment::jobs::Job;
use crate::errors::AppError;
use crate::imports::handlers::EnqueuedResponse;
use crate::libraries::{license_compliance, summarize, SeveritySummary};
use crate::models::library::Library;
use crate::models::vulnerability::Vulnerability;
use crate::state::AppState;

#[derive(Serialize)]
pub struct LibraryDetailResponse {
    #[serde(flatten)]
    pub library: Library,
    pub vulnerabilities: Vec<Vulnerability>,
    pub severity_summary: SeveritySummary,
    pub license_compliant: Option<bool>,
}

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Library {id} not found"))
}

/// GET /api/v1/libraries/:id
pub async fn handle_get_library(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LibraryDetailResponse>, AppError> {
    let library = state.store.get_library(id).await?.ok_or_else(|| not_found(id))?;
    let vulnerabilities = state.store.list_vulnerabilities(id).await?;
    Ok(Json(LibraryDetailResponse {
        severity_summary: summarize(&vulnerabilities),
        license_compliant: license_compliance(&library, &state.config.license_allowlist),
        library,
        vulnerabilities,
    }))
}

/// DELETE /api/v1/libraries/:id
pub async fn handle_delete_library(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.store.soft_delete_library(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(id))
    }
}

/// POST /api/v1/libraries/:id/enrich
pub async fn handle_enrich_library(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<EnqueuedResponse>), AppError> {
    state.store.get_library(id).await?.ok_or_else(|| not_found(id))?;
    let job_id = state.queue.enqueue(Job::EnrichLibrary { library_id: id }).await?;
    Ok((StatusCode::ACCEPTED, Json(EnqueuedResponse { job_id })))
}
