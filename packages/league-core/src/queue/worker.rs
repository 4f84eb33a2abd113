//! Worker pool: drives dispatched jobs through the Calculation Engine under a
//! timeout, and routes outcomes through the Error Handler.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::error::{ClassifiedError, Classifier};
use crate::handler::{ErrorHandler, HandlerDecision, JobContext};

use super::backoff::{self, BackoffConfig};
use super::job::{JobPriority, JobStatus};
use super::store::JobStore;

pub const CALCULATION_OPERATION: &str = "calculate_table";

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub job_timeout: Duration,
    pub max_retries: i32,
    pub backoff: BackoffConfig,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            job_timeout: Duration::from_secs(30),
            max_retries: 3,
            backoff: BackoffConfig::default(),
        }
    }
}

/// One dispatch-loop worker. `N` of these run concurrently inside the Runtime.
pub struct Worker {
    id: usize,
    store: Arc<JobStore>,
    engine: Arc<Engine>,
    handler: Arc<ErrorHandler>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        id: usize,
        store: Arc<JobStore>,
        engine: Arc<Engine>,
        handler: Arc<ErrorHandler>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            id,
            store,
            engine,
            handler,
            config,
        }
    }

    /// Dispatch loop: poll for work, process it, repeat until cancelled. A
    /// worker never preempts an in-flight job; it only checks for cancellation
    /// between dispatches.
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            let Some(job_id) = self.store.dispatch_next().await else {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(25)) => continue,
                    _ = shutdown.cancelled() => break,
                }
            };
            self.process(job_id).await;
        }
        info!(worker = self.id, "worker stopped");
    }

    async fn process(&self, job_id: uuid::Uuid) {
        let Some(job) = self.store.get(job_id) else {
            return;
        };
        self.store.update(job_id, |j| j.mark_processing());
        debug!(worker = self.id, job_id = %job_id, league_id = job.league_id, season_id = job.season_id, "dispatching job");

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.config.job_timeout,
            self.engine.calculate(job.league_id, job.season_id),
        )
        .await;

        match outcome {
            Ok(Ok(_entries)) => self.on_success(job_id, started).await,
            Ok(Err(error)) => {
                let classified = Classifier::classify(&error);
                self.on_failure(job_id, classified).await;
            }
            Err(_elapsed) => {
                self.store.update(job_id, |j| j.timeout_count += 1);
                let classified = ClassifiedError::of_type(
                    crate::error::ErrorType::JobTimeout,
                    format!("job_timeout: calculation exceeded {:?}", self.config.job_timeout),
                );
                self.on_failure(job_id, classified).await;
            }
        }
    }

    async fn on_success(&self, job_id: uuid::Uuid, started: Instant) {
        self.store.update(job_id, |j| j.mark_completed());
        self.handler.record_outcome(CALCULATION_OPERATION, true);
        if let Some(job) = self.store.get(job_id) {
            self.store.release_lock(job.key());
            info!(
                worker = self.id,
                job_id = %job_id,
                duration_ms = started.elapsed().as_millis() as u64,
                "job completed"
            );
        }
        self.store.trim_completed();
    }

    async fn on_failure(&self, job_id: uuid::Uuid, classified: ClassifiedError) {
        self.handler.record_outcome(CALCULATION_OPERATION, false);
        let Some(job) = self.store.get(job_id) else {
            return;
        };
        let ctx = JobContext {
            league_id: job.league_id,
            season_id: job.season_id,
            retry_count: job.retry_count,
            max_retries: self.config.max_retries,
        };
        let decision = self.handler.decide(CALCULATION_OPERATION, &classified, ctx);

        self.store.update(job_id, |j| j.push_error(classified.clone()));

        match decision {
            HandlerDecision::RetryWithBackoff => {
                self.schedule_retry(job_id, job.priority, job.retry_count + 1).await;
            }
            HandlerDecision::Rollback | HandlerDecision::FailFast | HandlerDecision::Escalate => {
                self.store.update(job_id, |j| j.mark_failed());
                self.store.release_lock(job.key());
                self.store.move_to_dead_letter(job_id).await;
                warn!(worker = self.id, job_id = %job_id, decision = ?decision, "job moved to dead-letter");
            }
        }
    }

    async fn schedule_retry(&self, job_id: uuid::Uuid, priority: JobPriority, attempt: i32) {
        self.store.update(job_id, |j| j.requeue_for_retry());
        let delay = backoff::next_delay(self.config.backoff, attempt.max(1) as u32);
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(job) = store.get(job_id) {
                if job.status == JobStatus::Pending {
                    store.redispatch(job_id, priority).await;
                }
            }
        });
    }
}
