use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::reconciliation::{ReconciliationItem, ReconciliationStatus};
use crate::pagination::{lenient_i64, PageParams, Paginated};
use crate::reconciliation::resolve::{resolve_item, ResolveOutcome, ResolveRequest};
use crate::state::AppState;

/// `?status=&page=&limit=`. Fields are spelled out because `Query` cannot
/// deserialize numbers through `#[serde(flatten)]`.
#[derive(Debug, Deserialize)]
pub struct ReconciliationQuery {
    pub status: Option<ReconciliationStatus>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub limit: Option<i64>,
}

/// GET /api/v1/reconciliation
/// Lists pending items unless another status is asked for.
pub async fn handle_list(
    State(state): State<AppState>,
    Query(query): Query<ReconciliationQuery>,
) -> Result<Json<Paginated<ReconciliationItem>>, AppError> {
    let status = query.status.unwrap_or(ReconciliationStatus::Pending);
    let params = PageParams {
        page: query.page,
        limit: query.limit,
    };

    let items = state
        .store
        .list_reconciliation_items(Some(status), params.limit(), params.offset())
        .await?;
    let total = state.store.count_reconciliation_items(Some(status)).await?;
    Ok(Json(Paginated::new(items, &params, total)))
}

/// POST /api/v1/reconciliation/:id/resolve
pub async fn handle_resolve(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<Json<ResolveOutcome>, AppError> {
    let Json(req) = body.map_err(|e| AppError::Validation(e.body_text()))?;
    let outcome = resolve_item(state.store.as_ref(), id, &req).await?;
    Ok(Json(outcome))
}
