//! Resolve action: the only writer of a reconciliation item's terminal status.
//!
//! | action   | item status | row status | row library            |
//! |----------|-------------|------------|------------------------|
//! | accept   | accepted    | complete   | unchanged              |
//! | merge    | merged      | complete   | supplied `library_id`  |
//! | override | overridden  | complete   | new library from raw   |
//! | ignore   | ignored     | ignored    | unchanged              |
//!
//! Re-resolving an already resolved item is not rejected; the action is simply
//! applied again.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::import::{RowStatus, RowUpdate};
use crate::models::library::LibraryAttributes;
use crate::models::reconciliation::ReconciliationStatus;
use crate::store::CatalogStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveAction {
    Accept,
    Merge,
    Override,
    Ignore,
}

impl ResolveAction {
    /// Terminal (item, row) statuses written by this action.
    pub fn transition(&self) -> (ReconciliationStatus, RowStatus) {
        match self {
            ResolveAction::Accept => (ReconciliationStatus::Accepted, RowStatus::Complete),
            ResolveAction::Merge => (ReconciliationStatus::Merged, RowStatus::Complete),
            ResolveAction::Override => (ReconciliationStatus::Overridden, RowStatus::Complete),
            ResolveAction::Ignore => (ReconciliationStatus::Ignored, RowStatus::Ignored),
        }
    }

    fn requires_library(&self) -> bool {
        matches!(self, ResolveAction::Merge | ResolveAction::Override)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolveRequest {
    pub action: ResolveAction,
    pub library_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolveOutcome {
    pub item_id: Uuid,
    pub action: ResolveAction,
    pub item_status: ReconciliationStatus,
    pub row_status: RowStatus,
    /// Set only when the action re-pointed the row.
    pub mapped_library_id: Option<Uuid>,
}

pub async fn resolve_item(
    store: &dyn CatalogStore,
    item_id: Uuid,
    request: &ResolveRequest,
) -> Result<ResolveOutcome, AppError> {
    let item = store
        .get_reconciliation_item(item_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Reconciliation item {item_id} not found")))?;

    let action = request.action;
    let supplied_library = match (action.requires_library(), request.library_id) {
        (true, None) => {
            return Err(AppError::Validation(format!(
                "library_id is required for the {action:?} action"
            )))
        }
        (_, library_id) => library_id,
    };

    let row = store
        .get_import_row(item.import_row_id)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("Import row {} not found", item.import_row_id))
        })?;

    let mapped_library_id = match action {
        ResolveAction::Merge => supplied_library,
        ResolveAction::Override => {
            let attrs = LibraryAttributes::from_payload(row.payload());
            Some(store.insert_library(&attrs).await?)
        }
        ResolveAction::Accept | ResolveAction::Ignore => None,
    };

    let (item_status, row_status) = action.transition();
    store
        .update_import_row(
            row.id,
            RowUpdate {
                mapped_library_id,
                status: Some(row_status),
            },
        )
        .await?;
    store.set_reconciliation_status(item.id, item_status).await?;

    info!("Resolved reconciliation item {item_id} with {action:?}");

    Ok(ResolveOutcome {
        item_id,
        action,
        item_status,
        row_status,
        mapped_library_id,
    })
}
