use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum ReconciliationStatus {
    Pending,
    Accepted,
    Merged,
    Overridden,
    Ignored,
}

/// A proposed or ambiguous match between an import row and a canonical library.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ReconciliationItem {
    pub id: Uuid,
    pub import_row_id: Uuid,
    pub suggested_lib_name: Option<String>,
    pub suggested_version: Option<String>,
    pub detected_license: Option<String>,
    pub status: ReconciliationStatus,
    /// 0.0 – 1.0
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert parameters. New items always start `pending`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReconciliationItem {
    pub import_row_id: Uuid,
    pub suggested_lib_name: Option<String>,
    pub suggested_version: Option<String>,
    pub detected_license: Option<String>,
    pub confidence: f64,
}
