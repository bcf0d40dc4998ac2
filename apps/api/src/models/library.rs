use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Canonical record for one (name, version) pair of a tracked dependency.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Library {
    pub id: Uuid,
    pub name: String,
    pub version: String,
    pub purl: Option<String>,
    pub license_declared: Option<String>,
    pub license_detected: Option<String>,
    /// Denormalized; written by the `enrich/library` job.
    pub vulnerability_count: i32,
    pub owner: Option<String>,
    pub environment: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Candidate attributes for a canonical library, as produced by the mapping engine.
///
/// Every field is optional: absent columns stay absent and are never defaulted here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryAttributes {
    pub name: Option<String>,
    pub version: Option<String>,
    pub purl: Option<String>,
    pub license_declared: Option<String>,
    pub license_detected: Option<String>,
    pub owner: Option<String>,
    pub environment: Option<String>,
}

impl LibraryAttributes {
    /// Name as written to the `libraries` table. Missing names flow through as empty.
    pub fn name_or_empty(&self) -> &str {
        self.name.as_deref().unwrap_or("")
    }

    pub fn version_or_empty(&self) -> &str {
        self.version.as_deref().unwrap_or("")
    }
}
