//! In-memory priority FIFO queue with per-`(league, season)` dedup locks.

use std::collections::{HashMap, VecDeque};

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::job::{Job, JobPriority, JobStatus};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue_error: job {0} not found")]
    NotFound(Uuid),
    #[error("queue_error: job {0} is not a dead-letter entry")]
    NotDeadLetter(Uuid),
}

#[derive(Debug, Clone, Default)]
pub struct QueueStatus {
    pub running: bool,
    pub total_jobs: usize,
    pub pending_jobs: usize,
    pub processing_jobs: usize,
    pub completed_jobs: usize,
    pub failed_jobs: usize,
}

/// Holds every job and the three priority FIFOs, plus the dedup lock table.
///
/// `active_locks` is inserted at enqueue time (not dispatch time) so bursts of
/// submissions for the same `(league, season)` coalesce onto one job.
pub struct JobStore {
    jobs: DashMap<Uuid, Job>,
    active_locks: DashMap<(i64, i64), Uuid>,
    queues: HashMap<JobPriority, Mutex<VecDeque<Uuid>>>,
    dead_letter: Mutex<VecDeque<Uuid>>,
    max_completed: usize,
    max_dead_letter: usize,
}

impl JobStore {
    pub fn new(max_completed: usize, max_dead_letter: usize) -> Self {
        let mut queues = HashMap::new();
        for priority in JobPriority::ORDER {
            queues.insert(priority, Mutex::new(VecDeque::new()));
        }
        Self {
            jobs: DashMap::new(),
            active_locks: DashMap::new(),
            queues,
            dead_letter: Mutex::new(VecDeque::new()),
            max_completed,
            max_dead_letter,
        }
    }

    /// Enqueue `job`, or coalesce onto the job already holding the lock for
    /// its `(league, season)` key. Returns the job id that now owns the key.
    pub async fn enqueue(&self, job: Job) -> Uuid {
        let key = job.key();
        if let Some(existing) = self.active_locks.get(&key) {
            return *existing;
        }

        let job_id = job.job_id;
        let priority = job.priority;
        self.active_locks.insert(key, job_id);
        self.jobs.insert(job_id, job);
        self.queues[&priority].lock().await.push_back(job_id);
        job_id
    }

    /// Pop the next job id to dispatch, draining HIGH before NORMAL before LOW.
    pub async fn dispatch_next(&self) -> Option<Uuid> {
        for priority in JobPriority::ORDER {
            let mut queue = self.queues[&priority].lock().await;
            if let Some(job_id) = queue.pop_front() {
                return Some(job_id);
            }
        }
        None
    }

    /// Re-enqueue a job id at the back of its own priority class, used when a
    /// retry's backoff has elapsed.
    pub async fn redispatch(&self, job_id: Uuid, priority: JobPriority) {
        self.queues[&priority].lock().await.push_back(job_id);
    }

    pub fn get(&self, job_id: Uuid) -> Option<Job> {
        self.jobs.get(&job_id).map(|j| j.clone())
    }

    pub fn update<F: FnOnce(&mut Job)>(&self, job_id: Uuid, f: F) {
        if let Some(mut job) = self.jobs.get_mut(&job_id) {
            f(&mut job);
        }
    }

    /// Release the `(league, season)` lock, allowing fresh enqueues.
    pub fn release_lock(&self, key: (i64, i64)) {
        self.active_locks.remove(&key);
    }

    pub fn history(&self, league_id: i64, limit: usize) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| entry.league_id == league_id)
            .map(|entry| entry.clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit);
        jobs
    }

    pub async fn move_to_dead_letter(&self, job_id: Uuid) {
        let mut dead_letter = self.dead_letter.lock().await;
        dead_letter.push_back(job_id);
        while dead_letter.len() > self.max_dead_letter {
            dead_letter.pop_front();
        }
    }

    pub async fn dead_letter(&self) -> Vec<Job> {
        let dead_letter = self.dead_letter.lock().await;
        dead_letter.iter().filter_map(|id| self.get(*id)).collect()
    }

    pub async fn reprocess_dead_letter(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut dead_letter = self.dead_letter.lock().await;
        let position = dead_letter.iter().position(|id| *id == job_id);
        let Some(position) = position else {
            return Err(QueueError::NotDeadLetter(job_id));
        };
        dead_letter.remove(position);
        drop(dead_letter);

        self.update(job_id, |job| {
            job.status = JobStatus::Pending;
            job.retry_count = 0;
        });
        let job = self.get(job_id).ok_or(QueueError::NotFound(job_id))?;
        self.active_locks.insert(job.key(), job_id);
        self.queues[&job.priority].lock().await.push_back(job_id);
        Ok(())
    }

    pub async fn clear_dead_letter(&self) {
        self.dead_letter.lock().await.clear();
    }

    /// Discard every pending job across all priorities, releasing their locks.
    pub async fn clear_pending(&self) {
        for priority in JobPriority::ORDER {
            let mut queue = self.queues[&priority].lock().await;
            for job_id in queue.drain(..) {
                if let Some(job) = self.get(job_id) {
                    self.active_locks.remove(&job.key());
                }
            }
        }
    }

    pub fn trim_completed(&self) {
        let mut completed: Vec<(Uuid, chrono::DateTime<chrono::Utc>)> = self
            .jobs
            .iter()
            .filter(|e| e.status == JobStatus::Completed)
            .filter_map(|e| e.completed_at.map(|t| (*e.key(), t)))
            .collect();
        if completed.len() <= self.max_completed {
            return;
        }
        completed.sort_by_key(|(_, completed_at)| *completed_at);
        let overflow = completed.len() - self.max_completed;
        for (job_id, _) in completed.into_iter().take(overflow) {
            self.jobs.remove(&job_id);
        }
    }

    pub fn status(&self) -> QueueStatus {
        let mut status = QueueStatus {
            running: true,
            ..Default::default()
        };
        for entry in self.jobs.iter() {
            status.total_jobs += 1;
            match entry.status {
                JobStatus::Pending => status.pending_jobs += 1,
                JobStatus::Processing => status.processing_jobs += 1,
                JobStatus::Completed => status.completed_jobs += 1,
                JobStatus::Failed => status.failed_jobs += 1,
            }
        }
        status
    }
}
