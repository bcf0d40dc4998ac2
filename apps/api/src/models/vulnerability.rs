use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Unknown,
}

impl Severity {
    /// Maps a feed-reported severity label onto the stored scale.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "critical" => Severity::Critical,
            "high" => Severity::High,
            "medium" | "moderate" => Severity::Medium,
            "low" => Severity::Low,
            _ => Severity::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Vulnerability {
    pub id: Uuid,
    pub library_id: Uuid,
    pub cve_id: String,
    pub severity: Severity,
    pub description: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub fixed_in: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One advisory as returned by a vulnerability feed, before it is stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedVulnerability {
    pub cve_id: String,
    pub severity: Severity,
    pub description: Option<String>,
    pub published_date: Option<NaiveDate>,
    pub fixed_in: Option<String>,
    /// Feed that reported it, e.g. "NVD" or "GitHub".
    pub source: String,
}
