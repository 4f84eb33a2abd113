// League table computation core.
//
// Computes and maintains standings tables for a league/season from finished
// game results, serving reads from a cache, recomputing asynchronously via a
// priority job queue, and snapshotting table state for rollback.

pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod models;
pub mod queue;
pub mod repository;
pub mod runtime;
pub mod snapshot;

pub use config::Config;
pub use error::{ClassifiedError, ErrorType, Severity};
pub use models::{Game, GameStatus, TableEntry, TableSource};
pub use repository::{InMemoryRepository, Repository};
pub use runtime::CoreRuntime;
