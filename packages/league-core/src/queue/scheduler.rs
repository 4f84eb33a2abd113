//! Public Scheduler API: the external surface of the Queue component.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::engine::Engine;
use crate::handler::ErrorHandler;

use super::job::{Job, JobPriority, JobTrigger};
use super::store::{JobStore, QueueError, QueueStatus};
use super::worker::{Worker, WorkerConfig};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Aggregate metrics over the queue's lifetime.
#[derive(Debug, Clone, Default)]
pub struct QueueMetrics {
    pub total_processed: u64,
    pub success_rate: f64,
    pub error_rate: f64,
    pub retry_rate: f64,
    pub timeout_rate: f64,
    pub dead_letter_count: u64,
    pub average_processing_time_ms: f64,
}

/// Wires a [`JobStore`] to a pool of [`Worker`]s driving an [`Engine`]. This is
/// the single public entry point described as "Queue / Scheduler" in the
/// component design.
pub struct Scheduler {
    store: Arc<JobStore>,
    engine: Arc<Engine>,
    handler: Arc<ErrorHandler>,
    worker_config: WorkerConfig,
    default_priorities: PriorityDefaults,
    paused: Arc<std::sync::atomic::AtomicBool>,
    shutdown: CancellationToken,
}

#[derive(Debug, Clone, Copy)]
pub struct PriorityDefaults {
    pub manual: JobPriority,
    pub game_result: JobPriority,
    pub scheduled: JobPriority,
}

impl Default for PriorityDefaults {
    fn default() -> Self {
        Self {
            manual: JobPriority::Normal,
            game_result: JobPriority::High,
            scheduled: JobPriority::Low,
        }
    }
}

impl Scheduler {
    pub fn new(
        engine: Arc<Engine>,
        handler: Arc<ErrorHandler>,
        worker_config: WorkerConfig,
        default_priorities: PriorityDefaults,
        max_completed: usize,
        max_dead_letter: usize,
    ) -> Self {
        Self {
            store: Arc::new(JobStore::new(max_completed, max_dead_letter)),
            engine,
            handler,
            worker_config,
            default_priorities,
            paused: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            shutdown: CancellationToken::new(),
        }
    }

    /// Start `concurrency` worker loops. Returns immediately; workers run
    /// until `shutdown` (held by the Runtime) is cancelled.
    pub fn spawn_workers(&self, concurrency: usize) -> Vec<tokio::task::JoinHandle<()>> {
        (0..concurrency)
            .map(|id| {
                let worker = Worker::new(
                    id,
                    Arc::clone(&self.store),
                    Arc::clone(&self.engine),
                    Arc::clone(&self.handler),
                    self.worker_config,
                );
                let shutdown = self.shutdown.clone();
                tokio::spawn(worker.run(shutdown))
            })
            .collect()
    }

    fn priority_for(&self, trigger: JobTrigger, priority: Option<JobPriority>) -> JobPriority {
        priority.unwrap_or(match trigger {
            JobTrigger::Manual => self.default_priorities.manual,
            JobTrigger::GameResult => self.default_priorities.game_result,
            JobTrigger::Scheduled => self.default_priorities.scheduled,
        })
    }

    /// Enqueue a calculation job. If a job is already active for `(league_id,
    /// season_id)`, returns that job's id unchanged — priority on a dedup-hit
    /// is never mutated, per the coalesce-and-keep-earliest-priority rule.
    pub async fn enqueue_calculation(
        &self,
        league_id: i64,
        season_id: i64,
        priority: Option<JobPriority>,
        trigger: Option<JobTrigger>,
        description: Option<String>,
    ) -> Uuid {
        if self.paused.load(std::sync::atomic::Ordering::Relaxed) {
            tracing::debug!(league_id, season_id, "enqueue accepted while paused, held pending");
        }
        let trigger = trigger.unwrap_or_default();
        let priority = self.priority_for(trigger, priority);
        let builder = Job::builder()
            .league_id(league_id)
            .season_id(season_id)
            .priority(priority)
            .trigger(trigger);
        let job = match description {
            Some(description) => builder.description(description).build(),
            None => builder.build(),
        };
        self.store.enqueue(job).await
    }

    pub fn get_status(&self) -> QueueStatus {
        let mut status = self.store.status();
        status.running = !self.paused.load(std::sync::atomic::Ordering::Relaxed);
        status
    }

    pub fn get_job(&self, job_id: Uuid) -> Option<Job> {
        self.store.get(job_id)
    }

    pub fn get_history(&self, league_id: i64, limit: usize) -> Vec<Job> {
        self.store.history(league_id, limit)
    }

    pub async fn get_dead_letter(&self) -> Vec<Job> {
        self.store.dead_letter().await
    }

    pub async fn reprocess_dead_letter(&self, job_id: Uuid) -> Result<(), SchedulerError> {
        self.store.reprocess_dead_letter(job_id).await?;
        Ok(())
    }

    pub async fn clear_dead_letter(&self) {
        self.store.clear_dead_letter().await;
    }

    pub async fn retry_failed_job(&self, job_id: Uuid) -> Result<(), SchedulerError> {
        self.store.reprocess_dead_letter(job_id).await?;
        Ok(())
    }

    pub fn pause(&self) {
        self.paused.store(true, std::sync::atomic::Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.paused.store(false, std::sync::atomic::Ordering::Relaxed);
    }

    /// Wait for in-flight jobs to finish, then discard pending jobs. Does not
    /// stop the workers themselves; callers that want a full stop should also
    /// cancel the shutdown token via [`Scheduler::request_shutdown`].
    pub async fn clear(&self) {
        while self.store.status().processing_jobs > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.store.clear_pending().await;
    }

    pub fn request_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Queue-overload fallback: pause dispatch and clear LOW-priority pending
    /// jobs, scheduling an automatic resume after `cooldown`.
    pub fn queue_overload_fallback(self: &Arc<Self>, cooldown: Duration) {
        self.pause();
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            scheduler.store.clear_pending().await;
            tokio::time::sleep(cooldown).await;
            scheduler.resume();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Cache;
    use crate::circuit_breaker::{CircuitBreakerConfig, CircuitBreakers};
    use crate::repository::{InMemoryRepository, Repository};

    fn scheduler() -> Scheduler {
        let repo: Arc<dyn Repository> = Arc::new(InMemoryRepository::new());
        let engine = Arc::new(Engine::new(repo, Some(Arc::new(Cache::new(None)))));
        let breakers = Arc::new(CircuitBreakers::new(CircuitBreakerConfig::default()));
        let handler = Arc::new(ErrorHandler::new(breakers, None));
        Scheduler::new(engine, handler, WorkerConfig::default(), PriorityDefaults::default(), 100, 10)
    }

    #[tokio::test]
    async fn enqueue_without_priority_uses_trigger_default() {
        let scheduler = scheduler();
        let id = scheduler
            .enqueue_calculation(1, 1, None, Some(JobTrigger::GameResult), None)
            .await;
        let job = scheduler.get_job(id).unwrap();
        assert_eq!(job.priority, JobPriority::High);
    }

    #[tokio::test]
    async fn dedup_enqueue_returns_same_job_id_and_keeps_original_priority() {
        let scheduler = scheduler();
        let first = scheduler
            .enqueue_calculation(1, 1, Some(JobPriority::Low), None, None)
            .await;
        let second = scheduler
            .enqueue_calculation(1, 1, Some(JobPriority::High), None, None)
            .await;
        assert_eq!(first, second);
        assert_eq!(scheduler.get_job(first).unwrap().priority, JobPriority::Low);
    }

    #[tokio::test]
    async fn pause_is_reflected_in_status() {
        let scheduler = scheduler();
        assert!(scheduler.get_status().running);
        scheduler.pause();
        assert!(!scheduler.get_status().running);
        scheduler.resume();
        assert!(scheduler.get_status().running);
    }

    #[tokio::test]
    async fn clear_discards_pending_jobs_and_releases_their_locks() {
        let scheduler = scheduler();
        scheduler.enqueue_calculation(1, 1, None, None, None).await;
        scheduler.clear().await;
        assert_eq!(scheduler.get_status().pending_jobs, 0);

        let fresh = scheduler.enqueue_calculation(1, 1, None, None, None).await;
        assert!(scheduler.get_job(fresh).is_some());
    }

    #[tokio::test]
    async fn history_is_scoped_per_league() {
        let scheduler = scheduler();
        scheduler.enqueue_calculation(1, 1, None, None, None).await;
        scheduler.enqueue_calculation(2, 1, None, None, None).await;
        assert_eq!(scheduler.get_history(1, 10).len(), 1);
    }
}
