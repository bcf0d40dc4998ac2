pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::imports::handlers as imports;
use crate::libraries::handlers as libraries;
use crate::reconciliation::handlers as reconciliation;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Imports
        .route("/api/v1/imports", post(imports::handle_upload))
        .route("/api/v1/imports/:id", get(imports::handle_get_import))
        .route("/api/v1/imports/:id/preview", get(imports::handle_preview))
        .route("/api/v1/imports/:id/map", post(imports::handle_map))
        .route("/api/v1/imports/:id/enrich", post(imports::handle_enrich))
        // Reconciliation
        .route("/api/v1/reconciliation", get(reconciliation::handle_list))
        .route(
            "/api/v1/reconciliation/:id/resolve",
            post(reconciliation::handle_resolve),
        )
        // Libraries
        .route(
            "/api/v1/libraries/:id",
            get(libraries::handle_get_library).delete(libraries::handle_delete_library),
        )
        .route(
            "/api/v1/libraries/:id/enrich",
            post(libraries::handle_enrich_library),
        )
        .with_state(state)
}
