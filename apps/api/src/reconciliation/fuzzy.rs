//! Fuzzy reconcile: background variant of the matcher, run per import row.
//!
//! Reads `name`, `version` and `license_detected` straight off the row's raw payload.
//! Always inserts a fresh pending item; a second delivery of the same job produces a
//! second item for the row.

use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::reconciliation::{NewReconciliationItem, ReconciliationItem};
use crate::reconciliation::scoring::ConfidenceScorer;
use crate::store::CatalogStore;

pub const FUZZY_CANDIDATE_LIMIT: i64 = 5;

pub async fn fuzzy_reconcile(
    store: &dyn CatalogStore,
    scorer: &dyn ConfidenceScorer,
    row_id: Uuid,
) -> Result<ReconciliationItem, AppError> {
    let row = store
        .get_import_row(row_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Import row {row_id} not found")))?;

    // An empty fragment would match every library; treat it as no evidence instead.
    let candidates = match row.field("name").filter(|n| !n.trim().is_empty()) {
        Some(name) => store.search_libraries(&name, FUZZY_CANDIDATE_LIMIT).await?,
        None => Vec::new(),
    };

    let version = row.field("version");
    let scored = scorer.score_candidates(version.as_deref(), &candidates);
    debug!(
        "Row {row_id}: {} candidates, confidence {:.2}",
        candidates.len(),
        scored.confidence
    );

    store
        .insert_reconciliation_item(NewReconciliationItem {
            import_row_id: row.id,
            suggested_lib_name: scored.suggested.map(|l| l.name.clone()),
            suggested_version: scored.suggested.map(|l| l.version.clone()),
            detected_license: row.field("license_detected"),
            confidence: scored.confidence,
        })
        .await
}
