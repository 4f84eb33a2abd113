//! Priority job queue: FIFOs per [`job::JobPriority`], dedup locks per
//! `(league, season)`, exponential backoff retries, and dead-letter handling.

pub mod backoff;
pub mod job;
pub mod scheduler;
pub mod store;
pub mod worker;
