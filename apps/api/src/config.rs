use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::enrichment::worker::DEFAULT_ENRICH_CONCURRENCY;

/// Where uploaded files are kept.
#[derive(Debug, Clone)]
pub enum BlobBackend {
    /// S3 or MinIO. Selected when `S3_BUCKET` is set.
    S3 {
        bucket: String,
        endpoint: String,
        access_key_id: String,
        secret_access_key: String,
    },
    Local { root: PathBuf },
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub blob_backend: BlobBackend,
    pub nvd_api_key: Option<String>,
    pub github_access_token: Option<String>,
    pub feed_timeout: Duration,
    pub worker_concurrency: usize,
    /// Licenses accepted by the compliance check. Empty means the default denylist.
    pub license_allowlist: Vec<String>,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let blob_backend = match optional_env("S3_BUCKET") {
            Some(bucket) => BlobBackend::S3 {
                bucket,
                endpoint: require_env("S3_ENDPOINT")?,
                access_key_id: require_env("AWS_ACCESS_KEY_ID")?,
                secret_access_key: require_env("AWS_SECRET_ACCESS_KEY")?,
            },
            None => BlobBackend::Local {
                root: optional_env("UPLOAD_DIR")
                    .unwrap_or_else(|| "./uploads".to_string())
                    .into(),
            },
        };

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url: require_env("REDIS_URL")?,
            blob_backend,
            nvd_api_key: optional_env("NVD_API_KEY"),
            github_access_token: optional_env("GITHUB_ACCESS_TOKEN"),
            feed_timeout: Duration::from_secs(parse_env("FEED_TIMEOUT_SECS", 5)?),
            worker_concurrency: parse_env("WORKER_CONCURRENCY", DEFAULT_ENRICH_CONCURRENCY)?,
            license_allowlist: optional_env("LICENSE_ALLOWLIST")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            port: parse_env("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Unset and empty are treated the same.
fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} has an invalid value '{raw}'")),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
