//! Job model for scheduled table calculations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::error::ClassifiedError;

/// How a calculation job was triggered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobTrigger {
    /// A finished game result was submitted.
    #[default]
    GameResult,
    /// An operator explicitly requested a recomputation.
    Manual,
    /// A periodic scheduler fired.
    Scheduled,
}

/// Dispatch priority. Lower variants are drained first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    High,
    #[default]
    Normal,
    Low,
}

impl JobPriority {
    /// All priorities in dispatch order, highest first.
    pub const ORDER: [JobPriority; 3] = [JobPriority::High, JobPriority::Normal, JobPriority::Low];
}

/// Job lifecycle state. PENDING -> PROCESSING -> {COMPLETED, FAILED}; a retryable
/// failure sends the job back to PENDING rather than terminating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A unit of scheduled league-table calculation work.
///
/// Invariant: while `status == Processing` the job holds the unique
/// `(league_id, season_id)` lock in the scheduler's active-lock table.
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct Job {
    #[builder(default = Uuid::new_v4())]
    pub job_id: Uuid,

    pub league_id: i64,
    pub season_id: i64,

    #[builder(default)]
    pub priority: JobPriority,
    #[builder(default)]
    pub trigger: JobTrigger,
    #[builder(default)]
    pub status: JobStatus,

    #[builder(default, setter(strip_option))]
    pub description: Option<String>,

    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default, setter(strip_option))]
    pub started_at: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub completed_at: Option<DateTime<Utc>>,

    #[builder(default = 0)]
    pub retry_count: i32,
    #[builder(default = 0)]
    pub timeout_count: i32,

    /// Bounded history of classified errors encountered while processing this job.
    #[builder(default)]
    pub error_history: Vec<ClassifiedError>,
}

/// Cap on `error_history` length; oldest entries are dropped first.
pub const MAX_ERROR_HISTORY: usize = 20;

impl Job {
    pub fn key(&self) -> (i64, i64) {
        (self.league_id, self.season_id)
    }

    pub fn push_error(&mut self, error: ClassifiedError) {
        self.error_history.push(error);
        if self.error_history.len() > MAX_ERROR_HISTORY {
            self.error_history.remove(0);
        }
    }

    pub fn mark_processing(&mut self) {
        self.status = JobStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(Utc::now());
    }

    pub fn mark_failed(&mut self) {
        self.status = JobStatus::Failed;
        self.completed_at = Some(Utc::now());
    }

    /// Reset a job back to PENDING for a retry, bumping its counters.
    pub fn requeue_for_retry(&mut self) {
        self.status = JobStatus::Pending;
        self.retry_count += 1;
        self.started_at = None;
    }

    pub fn processing_duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}
