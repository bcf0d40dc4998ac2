//! Worker pool: one dispatcher per job kind, each bounded by its own semaphore.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::enrichment::jobs::{run_job, JobContext, JobKind};
use crate::enrichment::queue::Delivery;

pub const DEFAULT_ENRICH_CONCURRENCY: usize = 10;
pub const RECONCILE_CONCURRENCY: usize = 5;

const POLL_WAIT: Duration = Duration::from_secs(1);
const ERROR_BACKOFF: Duration = Duration::from_secs(2);

pub struct WorkerPool {
    ctx: JobContext,
    enrich_concurrency: usize,
    cancel: CancellationToken,
    dispatchers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn new(ctx: JobContext, enrich_concurrency: usize) -> Self {
        Self {
            ctx,
            enrich_concurrency: enrich_concurrency.max(1),
            cancel: CancellationToken::new(),
            dispatchers: Vec::new(),
        }
    }

    pub fn concurrency(&self, kind: JobKind) -> usize {
        match kind {
            JobKind::Enrich => self.enrich_concurrency,
            JobKind::Reconcile => RECONCILE_CONCURRENCY,
        }
    }

    /// Starts consuming. Calling it twice is a no-op.
    pub fn spawn(&mut self) {
        if !self.dispatchers.is_empty() {
            return;
        }
        for kind in JobKind::ALL {
            let limit = self.concurrency(kind);
            info!("Starting {} dispatcher (concurrency {limit})", kind.as_str());
            self.dispatchers.push(tokio::spawn(dispatch(
                self.ctx.clone(),
                kind,
                limit,
                self.cancel.child_token(),
            )));
        }
    }

    /// Stops claiming new jobs and waits for in-flight ones to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.dispatchers {
            if let Err(e) = handle.await {
                error!("Dispatcher task panicked: {e}");
            }
        }
        info!("Worker pool drained");
    }
}

async fn dispatch(ctx: JobContext, kind: JobKind, limit: usize, cancel: CancellationToken) {
    let permits = Arc::new(Semaphore::new(limit));

    while !cancel.is_cancelled() {
        let permit = tokio::select! {
            _ = cancel.cancelled() => break,
            permit = permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        // Not raced against cancellation: a claimed delivery must be processed.
        let delivery = match ctx.queue.next(kind, POLL_WAIT).await {
            Ok(Some(delivery)) => delivery,
            Ok(None) => continue,
            Err(e) => {
                error!("Polling {} queue failed: {e}", kind.as_str());
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                }
                continue;
            }
        };

        let ctx = ctx.clone();
        tokio::spawn(async move {
            process(&ctx, delivery).await;
            drop(permit);
        });
    }

    // Every permit back means every spawned job has finished.
    let _ = permits.acquire_many(limit as u32).await;
    info!("{} dispatcher stopped", kind.as_str());
}

async fn process(ctx: &JobContext, delivery: Delivery) {
    let job = &delivery.job;
    let kind = job.job.kind().as_str();
    info!("Processing {kind} job {} (attempt {})", job.id, job.attempts + 1);

    match run_job(ctx, job).await {
        Ok(outcome) => {
            info!("Job {} completed: {outcome:?}", job.id);
            if let Err(e) = ctx.queue.complete(&delivery).await {
                error!("Acknowledging job {} failed: {e}", job.id);
            }
        }
        Err(e) => {
            error!("Error processing {kind} job {}: {e:#}", job.id);
            match ctx.queue.fail(&delivery, &format!("{e:#}")).await {
                Ok(true) => warn!("Job {} will be retried", job.id),
                Ok(false) => error!("Job {} failed permanently", job.id),
                Err(qe) => error!("Recording failure of job {} failed: {qe}", job.id),
            }
        }
    }
}
