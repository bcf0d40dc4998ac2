//! Vulnerability feeds and dedup/merge.
//!
//! ARCHITECTURAL RULE: a feed never fails its caller. Missing credentials, timeouts,
//! transport errors, non-success statuses and undecodable bodies all degrade to an
//! empty result plus a warning.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::vulnerability::{FeedVulnerability, Severity, Vulnerability};

pub const NVD_API_URL: &str = "https://services.nvd.nist.gov/rest/json/cves/2.0";
pub const GITHUB_GRAPHQL_URL: &str = "https://api.github.com/graphql";
const GITHUB_ECOSYSTEM: &str = "NPM";
const GITHUB_PAGE_SIZE: u32 = 10;

#[derive(Debug, Error)]
enum FeedError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(u16),
}

#[async_trait]
pub trait VulnerabilityFeed: Send + Sync {
    fn name(&self) -> &'static str;

    /// Advisories for `package` at `version`. Empty on any failure.
    async fn scan(&self, package: &str, version: &str) -> Vec<FeedVulnerability>;
}

/// Keeps the first occurrence of each CVE id, preserving first-seen order.
pub fn merge_vulnerabilities(vulnerabilities: Vec<FeedVulnerability>) -> Vec<FeedVulnerability> {
    let mut seen = HashSet::new();
    vulnerabilities
        .into_iter()
        .filter(|v| seen.insert(v.cve_id.clone()))
        .collect()
}

/// Fetched advisories whose CVE id is not yet stored for the library.
pub fn unseen<'a>(
    stored: &[Vulnerability],
    fetched: &'a [FeedVulnerability],
) -> Vec<&'a FeedVulnerability> {
    let known: HashSet<&str> = stored.iter().map(|v| v.cve_id.as_str()).collect();
    fetched
        .iter()
        .filter(|v| !known.contains(v.cve_id.as_str()))
        .collect()
}

pub(crate) fn parse_published(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = raw?;
    NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
}

fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

// ────────────────────────────────────────────────────────────────────────────
// FeedSet: fan-in across providers
// ────────────────────────────────────────────────────────────────────────────

/// All configured feeds, queried in order and merged by CVE id.
#[derive(Clone)]
pub struct FeedSet {
    feeds: Vec<Arc<dyn VulnerabilityFeed>>,
    timeout: Duration,
}

impl FeedSet {
    pub fn new(feeds: Vec<Arc<dyn VulnerabilityFeed>>, timeout: Duration) -> Self {
        Self { feeds, timeout }
    }

    /// NVD and GitHub advisories with the given credentials.
    pub fn standard(
        nvd_api_key: Option<String>,
        github_token: Option<String>,
        timeout: Duration,
    ) -> Self {
        let feeds: Vec<Arc<dyn VulnerabilityFeed>> = vec![
            Arc::new(NvdFeed::new(nvd_api_key, timeout)),
            Arc::new(GithubAdvisoryFeed::new(github_token, timeout)),
        ];
        Self::new(feeds, timeout)
    }

    pub async fn scan(&self, package: &str, version: &str) -> Vec<FeedVulnerability> {
        let mut all = Vec::new();
        for feed in &self.feeds {
            match tokio::time::timeout(self.timeout, feed.scan(package, version)).await {
                Ok(found) => {
                    debug!("{} returned {} advisories for {package}@{version}", feed.name(), found.len());
                    all.extend(found);
                }
                Err(_) => warn!(
                    "{} scan for {package}@{version} timed out after {:?}",
                    feed.name(),
                    self.timeout
                ),
            }
        }
        merge_vulnerabilities(all)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// NVD
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct NvdResponse {
    #[serde(default)]
    vulnerabilities: Vec<NvdItem>,
}

#[derive(Debug, Deserialize)]
struct NvdItem {
    cve: NvdCve,
}

#[derive(Debug, Deserialize)]
struct NvdCve {
    id: String,
    published: Option<String>,
    #[serde(default)]
    descriptions: Vec<NvdDescription>,
    metrics: Option<NvdMetrics>,
}

#[derive(Debug, Deserialize)]
struct NvdDescription {
    value: String,
}

#[derive(Debug, Deserialize)]
struct NvdMetrics {
    #[serde(rename = "cvssMetricV31", default)]
    cvss_v31: Vec<CvssMetric>,
}

#[derive(Debug, Deserialize)]
struct CvssMetric {
    #[serde(rename = "baseSeverity")]
    base_severity: Option<String>,
    #[serde(rename = "cvssData")]
    cvss_data: Option<CvssData>,
}

#[derive(Debug, Deserialize)]
struct CvssData {
    #[serde(rename = "baseSeverity")]
    base_severity: Option<String>,
}

impl NvdCve {
    fn severity(&self) -> Severity {
        self.metrics
            .as_ref()
            .and_then(|m| m.cvss_v31.first())
            .and_then(|m| {
                m.cvss_data
                    .as_ref()
                    .and_then(|d| d.base_severity.as_deref())
                    .or(m.base_severity.as_deref())
            })
            .map(Severity::from_label)
            .unwrap_or(Severity::Unknown)
    }
}

fn nvd_findings(response: NvdResponse) -> Vec<FeedVulnerability> {
    response
        .vulnerabilities
        .into_iter()
        .map(|item| {
            let cve = item.cve;
            FeedVulnerability {
                severity: cve.severity(),
                published_date: parse_published(cve.published.as_deref()),
                description: cve.descriptions.into_iter().next().map(|d| d.value),
                cve_id: cve.id,
                fixed_in: None,
                source: "NVD".to_string(),
            }
        })
        .collect()
}

/// National Vulnerability Database keyword search.
pub struct NvdFeed {
    client: Client,
    api_key: Option<String>,
    url: String,
}

impl NvdFeed {
    pub fn new(api_key: Option<String>, timeout: Duration) -> Self {
        Self::with_url(api_key, timeout, NVD_API_URL)
    }

    pub fn with_url(api_key: Option<String>, timeout: Duration, url: &str) -> Self {
        Self {
            client: http_client(timeout),
            api_key,
            url: url.to_string(),
        }
    }

    async fn fetch(
        &self,
        api_key: &str,
        package: &str,
        version: &str,
    ) -> Result<Vec<FeedVulnerability>, FeedError> {
        let response = self
            .client
            .get(&self.url)
            .header("apiKey", api_key)
            .query(&[("keywordSearch", format!("{package} {version}"))])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }
        Ok(nvd_findings(response.json().await?))
    }
}

#[async_trait]
impl VulnerabilityFeed for NvdFeed {
    fn name(&self) -> &'static str {
        "NVD"
    }

    async fn scan(&self, package: &str, version: &str) -> Vec<FeedVulnerability> {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!("NVD_API_KEY not configured, skipping NVD scan");
            return Vec::new();
        };
        self.fetch(api_key, package, version)
            .await
            .unwrap_or_else(|e| {
                warn!("NVD scan error for {package}@{version}: {e}");
                Vec::new()
            })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// GitHub Security Advisories
// ────────────────────────────────────────────────────────────────────────────

const GITHUB_ADVISORY_QUERY: &str = r#"
query($package: String!, $first: Int!, $ecosystem: SecurityAdvisoryEcosystem!) {
  securityVulnerabilities(first: $first, package: $package, ecosystem: $ecosystem) {
    nodes {
      severity
      firstPatchedVersion { identifier }
      advisory {
        ghsaId
        description
        publishedAt
        identifiers { type value }
      }
    }
  }
}
"#;

#[derive(Debug, Deserialize)]
struct GithubResponse {
    data: Option<GithubData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GithubData {
    security_vulnerabilities: Option<GithubConnection>,
}

#[derive(Debug, Deserialize)]
struct GithubConnection {
    #[serde(default)]
    nodes: Vec<GithubNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GithubNode {
    severity: Option<String>,
    first_patched_version: Option<GithubPatched>,
    advisory: GithubAdvisory,
}

#[derive(Debug, Deserialize)]
struct GithubPatched {
    identifier: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GithubAdvisory {
    ghsa_id: String,
    description: Option<String>,
    published_at: Option<String>,
    #[serde(default)]
    identifiers: Vec<GithubIdentifier>,
}

#[derive(Debug, Deserialize)]
struct GithubIdentifier {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

fn github_findings(response: GithubResponse) -> Vec<FeedVulnerability> {
    response
        .data
        .and_then(|d| d.security_vulnerabilities)
        .map(|c| c.nodes)
        .unwrap_or_default()
        .into_iter()
        .map(|node| {
            let advisory = node.advisory;
            // Prefer the CVE alias so results merge with NVD by id.
            let cve_id = advisory
                .identifiers
                .iter()
                .find(|i| i.kind == "CVE")
                .map(|i| i.value.clone())
                .unwrap_or(advisory.ghsa_id);
            FeedVulnerability {
                cve_id,
                severity: node
                    .severity
                    .as_deref()
                    .map(Severity::from_label)
                    .unwrap_or(Severity::Unknown),
                description: advisory.description,
                published_date: parse_published(advisory.published_at.as_deref()),
                fixed_in: node.first_patched_version.map(|p| p.identifier),
                source: "GitHub".to_string(),
            }
        })
        .collect()
}

/// GitHub advisory database (GraphQL). Matches on package name only.
pub struct GithubAdvisoryFeed {
    client: Client,
    token: Option<String>,
    url: String,
}

impl GithubAdvisoryFeed {
    pub fn new(token: Option<String>, timeout: Duration) -> Self {
        Self::with_url(token, timeout, GITHUB_GRAPHQL_URL)
    }

    pub fn with_url(token: Option<String>, timeout: Duration, url: &str) -> Self {
        Self {
            client: http_client(timeout),
            token,
            url: url.to_string(),
        }
    }

    async fn fetch(&self, token: &str, package: &str) -> Result<Vec<FeedVulnerability>, FeedError> {
        let body = json!({
            "query": GITHUB_ADVISORY_QUERY,
            "variables": {
                "package": package,
                "first": GITHUB_PAGE_SIZE,
                "ecosystem": GITHUB_ECOSYSTEM,
            }
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .header("user-agent", concat!("openlens/", env!("CARGO_PKG_VERSION")))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status.as_u16()));
        }
        Ok(github_findings(response.json().await?))
    }
}

#[async_trait]
impl VulnerabilityFeed for GithubAdvisoryFeed {
    fn name(&self) -> &'static str {
        "GitHub"
    }

    async fn scan(&self, package: &str, _version: &str) -> Vec<FeedVulnerability> {
        let Some(token) = self.token.as_deref() else {
            warn!("GITHUB_ACCESS_TOKEN not configured, skipping GitHub advisory scan");
            return Vec::new();
        };
        self.fetch(token, package).await.unwrap_or_else(|e| {
            warn!("GitHub advisory scan error for {package}: {e}");
            Vec::new()
        })
    }
}
