//! `CoreRuntime`: the single composed value a host process constructs at
//! startup and drives for the lifetime of the process.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::Cache;
use crate::circuit_breaker::CircuitBreakers;
use crate::config::Config;
use crate::engine::Engine;
use crate::handler::ErrorHandler;
use crate::queue::scheduler::Scheduler;
use crate::repository::Repository;
use crate::snapshot::SnapshotStore;

/// Owns one instance each of the Snapshot Store, Cache, Engine,
/// Queue/Scheduler and Error Handler, constructed once and handed to every
/// worker by reference. Internal synchronization of each component is an
/// implementation detail the Runtime does not itself manage.
pub struct CoreRuntime {
    pub cache: Arc<Cache>,
    pub snapshots: Arc<SnapshotStore>,
    pub engine: Arc<Engine>,
    pub scheduler: Arc<Scheduler>,
    pub handler: Arc<ErrorHandler>,
    config: Config,
    shutdown: CancellationToken,
}

impl CoreRuntime {
    pub fn new(config: Config, repository: Arc<dyn Repository>) -> anyhow::Result<Self> {
        let cache = Arc::new(Cache::new(config.cache.default_ttl));
        let cache_for_engine = if config.cache.enabled {
            Some(Arc::clone(&cache))
        } else {
            None
        };

        let snapshot_config = crate::snapshot::SnapshotStoreConfig::from(&config);
        let snapshots = Arc::new(SnapshotStore::new(snapshot_config, Arc::clone(&repository))?);

        let engine = Arc::new(Engine::new(Arc::clone(&repository), cache_for_engine));

        let breakers = Arc::new(CircuitBreakers::new(config.circuit_breaker));
        let handler = Arc::new(ErrorHandler::new(
            Arc::clone(&breakers),
            if config.features.circuit_breaker {
                Some(Arc::clone(&snapshots))
            } else {
                None
            },
        ));

        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&engine),
            Arc::clone(&handler),
            config.queue.worker_config(),
            config.queue.priority_defaults,
            config.queue.max_completed_jobs,
            config.queue.max_failed_jobs,
        ));

        Ok(Self {
            cache,
            snapshots,
            engine,
            scheduler,
            handler,
            config,
            shutdown: CancellationToken::new(),
        })
    }

    /// Start the worker pool and the cache-sweep task. Returns immediately;
    /// call [`CoreRuntime::shutdown`] and await the returned handles to stop.
    pub fn run(&self) -> Vec<tokio::task::JoinHandle<()>> {
        let mut handles = self.scheduler.spawn_workers(self.config.queue.concurrency);

        let cache = Arc::clone(&self.cache);
        let shutdown = self.shutdown.clone();
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let evicted = cache.sweep_expired();
                        if evicted > 0 {
                            info!(evicted, "cache sweep evicted expired entries");
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        }));

        handles
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.scheduler.request_shutdown();
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}
