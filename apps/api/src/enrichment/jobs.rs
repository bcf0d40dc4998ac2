//! Job definitions and handlers run by the worker pool.
//!
//! Handlers share no in-memory state; everything flows through the store and the queue.
//! Delivery is at-least-once, so `reconcile_row` may run twice for one row and leave
//! two items behind. Vulnerability insertion is the only dedup point.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::enrichment::license::detect_license;
use crate::enrichment::queue::{JobQueue, QueuedJob};
use crate::enrichment::vulns::{unseen, FeedSet};
use crate::models::import::{payload_text, RowUpdate};
use crate::reconciliation::fuzzy::fuzzy_reconcile;
use crate::reconciliation::scoring::ConfidenceScorer;
use crate::store::CatalogStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    EnrichImport { import_id: Uuid },
    EnrichLibrary { library_id: Uuid },
    ReconcileRow { import_row_id: Uuid },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Enrich,
    Reconcile,
}

impl JobKind {
    pub const ALL: [JobKind; 2] = [JobKind::Enrich, JobKind::Reconcile];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Enrich => "enrich",
            JobKind::Reconcile => "reconcile",
        }
    }
}

impl Job {
    pub fn kind(&self) -> JobKind {
        match self {
            Job::EnrichImport { .. } | Job::EnrichLibrary { .. } => JobKind::Enrich,
            Job::ReconcileRow { .. } => JobKind::Reconcile,
        }
    }
}

/// Handles to everything a job touches. Built once per worker process.
#[derive(Clone)]
pub struct JobContext {
    pub store: Arc<dyn CatalogStore>,
    pub queue: Arc<dyn JobQueue>,
    pub feeds: Arc<FeedSet>,
    pub scorer: Arc<dyn ConfidenceScorer>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum JobOutcome {
    ImportEnriched {
        processed: usize,
        matched: usize,
        queued: usize,
    },
    LibraryEnriched {
        fetched: usize,
        inserted: usize,
    },
    RowReconciled {
        item_id: Uuid,
        confidence: f64,
    },
}

pub async fn run_job(ctx: &JobContext, queued: &QueuedJob) -> Result<JobOutcome> {
    match queued.job {
        Job::EnrichImport { import_id } => enrich_import(ctx, queued.id, import_id).await,
        Job::EnrichLibrary { library_id } => enrich_library(ctx, library_id).await,
        Job::ReconcileRow { import_row_id } => reconcile_row(ctx, import_row_id).await,
    }
}

async fn report(ctx: &JobContext, job_id: Uuid, done: usize, total: usize) {
    if let Err(e) = ctx.queue.report_progress(job_id, done, total).await {
        warn!("Progress update for job {job_id} failed: {e}");
    }
}

// ────────────────────────────────────────────────────────────────────────────
// enrich/import
// ────────────────────────────────────────────────────────────────────────────

/// Detects each row's license, then either links the row to an exact catalog match
/// or queues a fuzzy reconcile for it.
pub async fn enrich_import(ctx: &JobContext, job_id: Uuid, import_id: Uuid) -> Result<JobOutcome> {
    ctx.store
        .get_import(import_id)
        .await?
        .ok_or_else(|| anyhow!("Import {import_id} not found"))?;

    let rows = ctx.store.list_import_rows(import_id, None, 0).await?;
    let total = rows.len();
    let (mut matched, mut queued) = (0, 0);

    for (i, row) in rows.into_iter().enumerate() {
        let mut payload = row.raw_json.0;
        let declared = payload_text(&payload, "license_declared");
        let license = detect_license(declared.as_deref(), &payload);
        payload.insert("license_detected".to_string(), Value::String(license));
        ctx.store
            .set_row_payload(row.id, &payload)
            .await
            .with_context(|| format!("storing detected license for row {}", row.id))?;

        let name = payload_text(&payload, "name");
        let version = payload_text(&payload, "version");
        let existing = match (name.as_deref(), version.as_deref()) {
            (Some(name), Some(version)) => ctx.store.find_library(name, version).await?,
            _ => None,
        };

        match existing {
            Some(library) => {
                ctx.store
                    .update_import_row(
                        row.id,
                        RowUpdate {
                            mapped_library_id: Some(library.id),
                            status: None,
                        },
                    )
                    .await?;
                matched += 1;
            }
            None => {
                ctx.queue
                    .enqueue(Job::ReconcileRow {
                        import_row_id: row.id,
                    })
                    .await?;
                queued += 1;
            }
        }

        report(ctx, job_id, i + 1, total).await;
    }

    info!("Import {import_id} enriched: {total} rows, {matched} matched, {queued} queued for reconcile");
    Ok(JobOutcome::ImportEnriched {
        processed: total,
        matched,
        queued,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// enrich/library
// ────────────────────────────────────────────────────────────────────────────

/// Pulls advisories for the library and stores the ones not seen before.
///
/// `vulnerability_count` is overwritten with the size of this fetch, and only when
/// the fetch returned something.
pub async fn enrich_library(ctx: &JobContext, library_id: Uuid) -> Result<JobOutcome> {
    let library = ctx
        .store
        .get_library(library_id)
        .await?
        .ok_or_else(|| anyhow!("Library {library_id} not found"))?;

    let fetched = ctx.feeds.scan(&library.name, &library.version).await;
    let stored = ctx.store.list_vulnerabilities(library.id).await?;

    // `stored` can be stale if another job enriches the same library concurrently;
    // the store skips CVEs that landed in between.
    let mut inserted = 0;
    for vuln in unseen(&stored, &fetched) {
        if ctx.store.insert_vulnerability(library.id, vuln).await?.is_some() {
            inserted += 1;
        }
    }

    if !fetched.is_empty() {
        let count = i32::try_from(fetched.len()).context("vulnerability count overflow")?;
        ctx.store.update_vulnerability_count(library.id, count).await?;
    }

    debug!(
        "{}@{}: {} fetched, {inserted} new",
        library.name,
        library.version,
        fetched.len()
    );
    Ok(JobOutcome::LibraryEnriched {
        fetched: fetched.len(),
        inserted,
    })
}

// ────────────────────────────────────────────────────────────────────────────
// reconcile/row
// ────────────────────────────────────────────────────────────────────────────

pub async fn reconcile_row(ctx: &JobContext, import_row_id: Uuid) -> Result<JobOutcome> {
    let item = fuzzy_reconcile(ctx.store.as_ref(), ctx.scorer.as_ref(), import_row_id).await?;
    Ok(JobOutcome::RowReconciled {
        item_id: item.id,
        confidence: item.confidence,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::enrichment::queue::memory::MemoryJobQueue;
    use crate::enrichment::vulns::tests::{finding, StaticFeed};
    use crate::enrichment::vulns::VulnerabilityFeed;
    use crate::models::reconciliation::ReconciliationStatus;
    use crate::reconciliation::scoring::DefaultConfidenceScorer;
    use crate::store::MemoryCatalogStore;
    use crate::testing::{attrs, seed_import};

    pub(crate) struct Harness {
        pub store: Arc<MemoryCatalogStore>,
        pub queue: Arc<MemoryJobQueue>,
        pub ctx: JobContext,
    }

    pub(crate) fn harness(feeds: Vec<Arc<dyn VulnerabilityFeed>>) -> Harness {
        let store = Arc::new(MemoryCatalogStore::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let ctx = JobContext {
            store: store.clone(),
            queue: queue.clone(),
            feeds: Arc::new(FeedSet::new(feeds, Duration::from_secs(5))),
            scorer: Arc::new(DefaultConfidenceScorer),
        };
        Harness { store, queue, ctx }
    }

    #[test]
    fn test_job_kinds() {
        let id = Uuid::new_v4();
        assert_eq!(Job::EnrichImport { import_id: id }.kind(), JobKind::Enrich);
        assert_eq!(Job::EnrichLibrary { library_id: id }.kind(), JobKind::Enrich);
        assert_eq!(
            Job::ReconcileRow { import_row_id: id }.kind(),
            JobKind::Reconcile
        );
    }

    #[tokio::test]
    async fn test_enrich_import_matches_or_queues() {
        let h = harness(vec![]);
        let lodash = h.store.insert_library(&attrs("lodash", "4.17.21")).await.unwrap();
        let (import, rows) = seed_import(
            &h.store,
            vec![
                json!({"name": "lodash", "version": "4.17.21", "license_declared": "MIT License"}),
                json!({"name": "left-pad", "version": "1.3.0", "license": "WTFPL"}),
            ],
        )
        .await;

        let job_id = Uuid::new_v4();
        let outcome = enrich_import(&h.ctx, job_id, import.id).await.unwrap();
        assert_eq!(
            outcome,
            JobOutcome::ImportEnriched {
                processed: 2,
                matched: 1,
                queued: 1
            }
        );

        let first = h.store.get_import_row(rows[0].id).await.unwrap().unwrap();
        assert_eq!(first.mapped_library_id, Some(lodash));
        assert_eq!(first.field("license_detected").as_deref(), Some("MIT"));

        let second = h.store.get_import_row(rows[1].id).await.unwrap().unwrap();
        assert_eq!(second.mapped_library_id, None);
        assert_eq!(second.field("license_detected").as_deref(), Some("WTFPL"));

        assert_eq!(
            h.queue.pending(JobKind::Reconcile),
            vec![Job::ReconcileRow {
                import_row_id: rows[1].id
            }]
        );
        assert_eq!(h.queue.progress(job_id), Some((2, 2)));
    }

    #[tokio::test]
    async fn test_enrich_import_unknown_import_fails() {
        let h = harness(vec![]);
        assert!(enrich_import(&h.ctx, Uuid::new_v4(), Uuid::new_v4())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_enrich_library_inserts_new_and_replaces_count() {
        let feed: Arc<dyn VulnerabilityFeed> = Arc::new(StaticFeed(vec![
            finding("CVE-1", "NVD"),
            finding("CVE-2", "NVD"),
            finding("CVE-1", "NVD"),
        ]));
        let h = harness(vec![feed]);
        let id = h.store.insert_library(&attrs("lodash", "4.17.20")).await.unwrap();
        h.store
            .insert_vulnerability(id, &finding("CVE-1", "NVD"))
            .await
            .unwrap();
        h.store
            .insert_vulnerability(id, &finding("CVE-OLD", "NVD"))
            .await
            .unwrap();

        let outcome = enrich_library(&h.ctx, id).await.unwrap();
        assert_eq!(
            outcome,
            JobOutcome::LibraryEnriched {
                fetched: 2,
                inserted: 1
            }
        );

        let library = h.store.get_library(id).await.unwrap().unwrap();
        // Count reflects this fetch, not the three rows now stored.
        assert_eq!(library.vulnerability_count, 2);
        assert_eq!(h.store.list_vulnerabilities(id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_library_enrichment_inserts_each_cve_once() {
        let feed: Arc<dyn VulnerabilityFeed> = Arc::new(StaticFeed(vec![
            finding("CVE-1", "NVD"),
            finding("CVE-2", "GitHub"),
        ]));
        let h = harness(vec![feed]);
        let id = h.store.insert_library(&attrs("lodash", "4.17.20")).await.unwrap();

        let (a, b) = tokio::join!(enrich_library(&h.ctx, id), enrich_library(&h.ctx, id));
        let inserted: usize = [a.unwrap(), b.unwrap()]
            .into_iter()
            .map(|outcome| match outcome {
                JobOutcome::LibraryEnriched { fetched, inserted } => {
                    assert_eq!(fetched, 2);
                    inserted
                }
                other => panic!("unexpected outcome {other:?}"),
            })
            .sum();
        assert_eq!(inserted, 2);

        let mut cves: Vec<_> = h
            .store
            .all_vulnerabilities()
            .into_iter()
            .map(|v| (v.library_id, v.cve_id))
            .collect();
        cves.sort();
        assert_eq!(cves, vec![(id, "CVE-1".to_string()), (id, "CVE-2".to_string())]);
    }

    #[tokio::test]
    async fn test_enrich_library_empty_fetch_keeps_count() {
        let feed: Arc<dyn VulnerabilityFeed> = Arc::new(StaticFeed(vec![]));
        let h = harness(vec![feed]);
        let id = h.store.insert_library(&attrs("lodash", "4.17.20")).await.unwrap();
        h.store.update_vulnerability_count(id, 7).await.unwrap();

        enrich_library(&h.ctx, id).await.unwrap();
        let library = h.store.get_library(id).await.unwrap().unwrap();
        assert_eq!(library.vulnerability_count, 7);
    }

    #[tokio::test]
    async fn test_enrich_library_missing_library_fails() {
        let h = harness(vec![]);
        let err = enrich_library(&h.ctx, Uuid::new_v4()).await.unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn test_reconcile_row_creates_pending_item() {
        let h = harness(vec![]);
        h.store.insert_library(&attrs("express", "4.18.2")).await.unwrap();
        let (_, rows) = seed_import(&h.store, vec![json!({"name": "express", "version": "4.18.2"})]).await;

        let outcome = run_job(
            &h.ctx,
            &QueuedJob::new(Job::ReconcileRow {
                import_row_id: rows[0].id,
            }),
        )
        .await
        .unwrap();

        let JobOutcome::RowReconciled { confidence, .. } = outcome else {
            panic!("unexpected outcome {outcome:?}");
        };
        assert_eq!(confidence, 0.95);
        let items = h.store.all_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status, ReconciliationStatus::Pending);
    }
}
