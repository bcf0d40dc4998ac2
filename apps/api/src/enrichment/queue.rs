//! Durable job queue.
//!
//! Redis layout, per job kind:
//!   openlens:queue:<kind>             pending deliveries (LPUSH in, pop from the right)
//!   openlens:queue:<kind>:processing  claimed by a worker, awaiting ack
//!   openlens:queue:<kind>:failed      deliveries that exhausted their attempts
//! plus the `openlens:progress` hash keyed by job id, cleared when a job
//! completes or is parked.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::enrichment::jobs::{Job, JobKind};
use crate::errors::AppError;

pub const MAX_ATTEMPTS: u32 = 3;
const PROGRESS_KEY: &str = "openlens:progress";

/// One delivery of a job. `attempts` counts earlier failed deliveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: Uuid,
    pub job: Job,
    #[serde(default)]
    pub attempts: u32,
}

impl QueuedJob {
    pub fn new(job: Job) -> Self {
        Self {
            id: Uuid::new_v4(),
            job,
            attempts: 0,
        }
    }
}

/// A claimed job plus the exact payload needed to acknowledge it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub job: QueuedJob,
    receipt: String,
}

#[derive(Debug, Serialize)]
struct FailedEntry<'a> {
    job: &'a QueuedJob,
    error: &'a str,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Adds a job to the back of its kind's queue and returns the job id.
    async fn enqueue(&self, job: Job) -> Result<Uuid, AppError>;

    /// Claims the next job of `kind`, waiting up to `wait`. `None` when nothing arrived.
    async fn next(&self, kind: JobKind, wait: Duration) -> Result<Option<Delivery>, AppError>;

    async fn complete(&self, delivery: &Delivery) -> Result<(), AppError>;

    /// Re-enqueues the job until it has been attempted `MAX_ATTEMPTS` times, then
    /// parks it on the failed list. Returns whether it will be retried.
    async fn fail(&self, delivery: &Delivery, error: &str) -> Result<bool, AppError>;

    async fn report_progress(&self, job_id: Uuid, done: usize, total: usize)
        -> Result<(), AppError>;
}

fn queue_key(kind: JobKind) -> String {
    format!("openlens:queue:{}", kind.as_str())
}

fn processing_key(kind: JobKind) -> String {
    format!("openlens:queue:{}:processing", kind.as_str())
}

fn failed_key(kind: JobKind) -> String {
    format!("openlens:queue:{}:failed", kind.as_str())
}

fn encode<T: Serialize>(value: &T) -> Result<String, AppError> {
    serde_json::to_string(value).map_err(|e| AppError::Internal(e.into()))
}

// ────────────────────────────────────────────────────────────────────────────
// Redis
// ────────────────────────────────────────────────────────────────────────────

pub struct RedisJobQueue {
    client: redis::Client,
    conn: MultiplexedConnection,
    // BRPOPLPUSH blocks its connection, so each kind polls on its own.
    enrich_poll: Mutex<Option<MultiplexedConnection>>,
    reconcile_poll: Mutex<Option<MultiplexedConnection>>,
}

impl RedisJobQueue {
    pub async fn connect(client: redis::Client) -> Result<Self, AppError> {
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            client,
            conn,
            enrich_poll: Mutex::new(None),
            reconcile_poll: Mutex::new(None),
        })
    }

    fn poll_slot(&self, kind: JobKind) -> &Mutex<Option<MultiplexedConnection>> {
        match kind {
            JobKind::Enrich => &self.enrich_poll,
            JobKind::Reconcile => &self.reconcile_poll,
        }
    }

    /// Moves deliveries left in `processing` by a crashed worker back onto the queue.
    pub async fn requeue_stalled(&self, kind: JobKind) -> Result<usize, AppError> {
        let mut conn = self.conn.clone();
        let mut moved = 0;
        loop {
            let payload: Option<String> = conn
                .rpoplpush(processing_key(kind), queue_key(kind))
                .await?;
            if payload.is_none() {
                break;
            }
            moved += 1;
        }
        if moved > 0 {
            info!("Requeued {moved} stalled {} jobs", kind.as_str());
        }
        Ok(moved)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn enqueue(&self, job: Job) -> Result<Uuid, AppError> {
        let queued = QueuedJob::new(job);
        let kind = queued.job.kind();
        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(queue_key(kind), encode(&queued)?)
            .await?;
        Ok(queued.id)
    }

    async fn next(&self, kind: JobKind, wait: Duration) -> Result<Option<Delivery>, AppError> {
        let mut slot = self.poll_slot(kind).lock().await;
        if slot.is_none() {
            *slot = Some(self.client.get_multiplexed_async_connection().await?);
        }
        let Some(conn) = slot.as_mut() else {
            return Ok(None);
        };

        let payload: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(queue_key(kind))
            .arg(processing_key(kind))
            .arg(wait.as_secs().max(1))
            .query_async(conn)
            .await?;

        let Some(receipt) = payload else {
            return Ok(None);
        };
        match serde_json::from_str::<QueuedJob>(&receipt) {
            Ok(job) => Ok(Some(Delivery { job, receipt })),
            Err(e) => {
                // Unreadable payloads would otherwise be redelivered forever.
                warn!("Dropping malformed {} job: {e}", kind.as_str());
                let mut conn = self.conn.clone();
                redis::pipe()
                    .atomic()
                    .lrem(processing_key(kind), 1, &receipt)
                    .ignore()
                    .lpush(failed_key(kind), &receipt)
                    .ignore()
                    .query_async::<_, ()>(&mut conn)
                    .await?;
                Ok(None)
            }
        }
    }

    async fn complete(&self, delivery: &Delivery) -> Result<(), AppError> {
        let kind = delivery.job.job.kind();
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .lrem(processing_key(kind), 1, &delivery.receipt)
            .ignore()
            .hdel(PROGRESS_KEY, delivery.job.id.to_string())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn fail(&self, delivery: &Delivery, error: &str) -> Result<bool, AppError> {
        let kind = delivery.job.job.kind();
        let mut retry = delivery.job.clone();
        retry.attempts += 1;
        let retried = retry.attempts < MAX_ATTEMPTS;

        // Ack and requeue/park in one MULTI.
        let mut pipe = redis::pipe();
        pipe.atomic()
            .lrem(processing_key(kind), 1, &delivery.receipt)
            .ignore();
        if retried {
            pipe.lpush(queue_key(kind), encode(&retry)?).ignore();
        } else {
            let entry = FailedEntry { job: &retry, error };
            pipe.lpush(failed_key(kind), encode(&entry)?)
                .ignore()
                .hdel(PROGRESS_KEY, retry.id.to_string())
                .ignore();
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(retried)
    }

    async fn report_progress(
        &self,
        job_id: Uuid,
        done: usize,
        total: usize,
    ) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(PROGRESS_KEY, job_id.to_string(), format!("{done}/{total}"))
            .await?;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// In-memory queue for tests
// ────────────────────────────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::memory::MemoryJobQueue;
    use super::*;

    fn reconcile(id: Uuid) -> Job {
        Job::ReconcileRow { import_row_id: id }
    }

    #[test]
    fn test_queued_job_wire_format() {
        let id = Uuid::nil();
        let queued = QueuedJob {
            id,
            job: Job::EnrichLibrary { library_id: id },
            attempts: 1,
        };
        let value = serde_json::to_value(&queued).unwrap();
        assert_eq!(value["job"]["type"], "enrich_library");
        assert_eq!(value["attempts"], 1);

        let parsed: QueuedJob = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, queued);
    }

    #[test]
    fn test_attempts_default_to_zero() {
        let raw = format!(
            r#"{{"id":"{}","job":{{"type":"enrich_import","import_id":"{}"}}}}"#,
            Uuid::nil(),
            Uuid::nil()
        );
        let parsed: QueuedJob = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.attempts, 0);
    }

    #[test]
    fn test_keys_per_kind() {
        assert_eq!(queue_key(JobKind::Enrich), "openlens:queue:enrich");
        assert_eq!(
            processing_key(JobKind::Reconcile),
            "openlens:queue:reconcile:processing"
        );
        assert_eq!(failed_key(JobKind::Enrich), "openlens:queue:enrich:failed");
    }

    #[tokio::test]
    async fn test_memory_queue_is_fifo_per_kind() {
        let queue = MemoryJobQueue::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        queue.enqueue(reconcile(a)).await.unwrap();
        queue
            .enqueue(Job::EnrichLibrary { library_id: b })
            .await
            .unwrap();
        queue.enqueue(reconcile(b)).await.unwrap();

        let wait = Duration::from_millis(10);
        let first = queue.next(JobKind::Reconcile, wait).await.unwrap().unwrap();
        let second = queue.next(JobKind::Reconcile, wait).await.unwrap().unwrap();
        assert_eq!(first.job.job, reconcile(a));
        assert_eq!(second.job.job, reconcile(b));
        assert!(queue.next(JobKind::Reconcile, wait).await.unwrap().is_none());
        assert_eq!(queue.pending(JobKind::Enrich).len(), 1);
    }

    #[tokio::test]
    async fn test_fail_retries_then_parks() {
        let queue = MemoryJobQueue::new();
        queue.enqueue(reconcile(Uuid::new_v4())).await.unwrap();
        let wait = Duration::from_millis(10);

        for attempt in 1..MAX_ATTEMPTS {
            let delivery = queue.next(JobKind::Reconcile, wait).await.unwrap().unwrap();
            assert_eq!(delivery.job.attempts, attempt - 1);
            assert!(queue.fail(&delivery, "boom").await.unwrap());
        }
        let last = queue.next(JobKind::Reconcile, wait).await.unwrap().unwrap();
        assert!(!queue.fail(&last, "boom").await.unwrap());

        let failed = queue.failed();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].0.attempts, MAX_ATTEMPTS);
        assert_eq!(failed[0].1, "boom");
        assert_eq!(queue.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_progress_is_dropped_once_job_finishes() {
        let queue = MemoryJobQueue::new();
        let wait = Duration::from_millis(10);
        queue.enqueue(reconcile(Uuid::new_v4())).await.unwrap();
        queue.enqueue(reconcile(Uuid::new_v4())).await.unwrap();

        let done = queue.next(JobKind::Reconcile, wait).await.unwrap().unwrap();
        queue.report_progress(done.job.id, 1, 2).await.unwrap();
        assert_eq!(queue.progress(done.job.id), Some((1, 2)));
        queue.complete(&done).await.unwrap();
        assert_eq!(queue.progress(done.job.id), None);

        let mut delivery = queue.next(JobKind::Reconcile, wait).await.unwrap().unwrap();
        let id = delivery.job.id;
        queue.report_progress(id, 1, 4).await.unwrap();
        while queue.fail(&delivery, "boom").await.unwrap() {
            assert_eq!(queue.progress(id), Some((1, 4)));
            delivery = queue.next(JobKind::Reconcile, wait).await.unwrap().unwrap();
        }
        assert_eq!(queue.progress(id), None);
        assert_eq!(queue.failed().len(), 1);
    }

    #[tokio::test]
    async fn test_next_wakes_on_enqueue() {
        let queue = std::sync::Arc::new(MemoryJobQueue::new());
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.next(JobKind::Reconcile, Duration::from_secs(5)).await })
        };
        tokio::task::yield_now().await;
        queue.enqueue(reconcile(Uuid::new_v4())).await.unwrap();
        let delivery = waiter.await.unwrap().unwrap();
        assert!(delivery.is_some());
    }
}
