use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Raw structured payload of one parsed source row, keyed by source field name.
pub type RowPayload = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum ImportStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum RowStatus {
    Pending,
    Mapped,
    Reconciling,
    Complete,
    Ignored,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Import {
    pub id: Uuid,
    pub filename: String,
    pub uploaded_by: Option<Uuid>,
    /// Total rows parsed from the upload, including any beyond the persistence cap.
    pub rows_count: i32,
    pub storage_key: String,
    pub status: ImportStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ImportRow {
    pub id: Uuid,
    pub import_id: Uuid,
    pub source_id: String,
    pub raw_json: Json<RowPayload>,
    pub mapped_library_id: Option<Uuid>,
    pub status: RowStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportRow {
    pub fn payload(&self) -> &RowPayload {
        &self.raw_json.0
    }

    /// Reads a payload field as text. Non-string scalars are stringified; nulls read as absent.
    pub fn field(&self, key: &str) -> Option<String> {
        payload_text(self.payload(), key)
    }
}

/// Partial update applied to an import row. `None` leaves the column untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowUpdate {
    pub mapped_library_id: Option<Uuid>,
    pub status: Option<RowStatus>,
}

pub fn payload_text(payload: &RowPayload, key: &str) -> Option<String> {
    match payload.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}
