use serde::{Deserialize, Deserializer, Serialize};

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 100;

/// `?page=&limit=` query parameters. Out-of-range or unparseable values fall back
/// to the defaults, never rejected.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    #[serde(default, deserialize_with = "lenient_i64")]
    pub page: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    pub limit: Option<i64>,
}

/// Reads a numeric query value, treating anything that is not an integer as absent.
pub(crate) fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.trim().parse().ok()))
}

impl PageParams {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageInfo {
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, params: &PageParams, total: i64) -> Self {
        let limit = params.limit();
        Self {
            data,
            pagination: PageInfo {
                page: params.page(),
                limit,
                total,
                total_pages: (total + limit - 1) / limit,
            },
        }
    }
}
