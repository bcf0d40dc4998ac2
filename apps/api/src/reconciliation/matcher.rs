//! Matcher: resolves a mapped row to a canonical library by exact (name, version).
//!
//! On a miss the library is created immediately (optimistic insert) and a pending
//! reconciliation item is raised so a human can confirm, merge, or override it.
//! Creation is not deferred until the item is resolved.

use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::AppError;
use crate::imports::mapping::{apply_mapping, ColumnMapping};
use crate::models::import::{ImportRow, ImportStatus, RowStatus, RowUpdate};
use crate::models::library::LibraryAttributes;
use crate::models::reconciliation::NewReconciliationItem;
use crate::reconciliation::scoring::ConfidenceScorer;
use crate::store::CatalogStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MatchOutcome {
    Existing { library_id: Uuid },
    Created { library_id: Uuid, item_id: Uuid },
}

impl MatchOutcome {
    pub fn library_id(&self) -> Uuid {
        match self {
            MatchOutcome::Existing { library_id } | MatchOutcome::Created { library_id, .. } => {
                *library_id
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MapSummary {
    pub import_id: Uuid,
    pub rows: usize,
    pub matched: usize,
    pub created: usize,
}

/// Matches one row. Either way the row ends up `mapped` to a library id.
pub async fn match_row(
    store: &dyn CatalogStore,
    scorer: &dyn ConfidenceScorer,
    row: &ImportRow,
    attrs: &LibraryAttributes,
) -> Result<MatchOutcome, AppError> {
    let name = attrs.name_or_empty();
    let version = attrs.version_or_empty();

    if let Some(existing) = store.find_library(name, version).await? {
        store
            .update_import_row(
                row.id,
                RowUpdate {
                    mapped_library_id: Some(existing.id),
                    status: Some(RowStatus::Mapped),
                },
            )
            .await?;
        debug!("Row {} matched library {name}@{version}", row.id);
        return Ok(MatchOutcome::Existing {
            library_id: existing.id,
        });
    }

    let library_id = store.insert_library(attrs).await?;
    store
        .update_import_row(
            row.id,
            RowUpdate {
                mapped_library_id: Some(library_id),
                status: Some(RowStatus::Mapped),
            },
        )
        .await?;

    let item = store
        .insert_reconciliation_item(NewReconciliationItem {
            import_row_id: row.id,
            suggested_lib_name: attrs.name.clone(),
            suggested_version: attrs.version.clone(),
            detected_license: attrs.license_detected.clone(),
            confidence: scorer.new_library_confidence(),
        })
        .await?;

    debug!(
        "Row {} created library {name}@{version}, reconciliation item {}",
        row.id, item.id
    );
    Ok(MatchOutcome::Created {
        library_id,
        item_id: item.id,
    })
}

/// Applies `mapping` to every row of an import, matches each, then marks the import completed.
pub async fn map_import(
    store: &dyn CatalogStore,
    scorer: &dyn ConfidenceScorer,
    import_id: Uuid,
    mapping: &ColumnMapping,
) -> Result<MapSummary, AppError> {
    store
        .get_import(import_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Import {import_id} not found")))?;

    let rows = store.list_import_rows(import_id, None, 0).await?;
    let mut summary = MapSummary {
        import_id,
        rows: rows.len(),
        matched: 0,
        created: 0,
    };

    for row in &rows {
        let attrs = apply_mapping(row.payload(), mapping);
        match match_row(store, scorer, row, &attrs).await? {
            MatchOutcome::Existing { .. } => summary.matched += 1,
            MatchOutcome::Created { .. } => summary.created += 1,
        }
    }

    store
        .set_import_status(import_id, ImportStatus::Completed)
        .await?;

    info!(
        "Mapped import {import_id}: {} rows, {} matched, {} created",
        summary.rows, summary.matched, summary.created
    );
    Ok(summary)
}
