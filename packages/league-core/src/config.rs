//! Layered configuration: compiled-in defaults, then `.env` (non-production
//! only), then process environment, highest precedence last.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::queue::backoff::BackoffConfig;
use crate::queue::scheduler::PriorityDefaults;
use crate::queue::worker::WorkerConfig;
use crate::snapshot::SnapshotStoreConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentProfile {
    Development,
    Test,
    Staging,
    Production,
}

impl EnvironmentProfile {
    fn parse(raw: &str) -> Result<Self> {
        Ok(match raw.to_ascii_lowercase().as_str() {
            "development" | "dev" => EnvironmentProfile::Development,
            "test" => EnvironmentProfile::Test,
            "staging" => EnvironmentProfile::Staging,
            "production" | "prod" => EnvironmentProfile::Production,
            other => bail!("configuration_error: unknown environment profile '{other}'"),
        })
    }

    /// Hard cap on `queue.concurrency` this profile allows.
    fn max_concurrency(self) -> usize {
        match self {
            EnvironmentProfile::Test => 1,
            _ => 64,
        }
    }

    /// Whether feature flags may be mutated at runtime (vs. only at load time).
    pub fn allows_runtime_feature_mutation(self) -> bool {
        !matches!(self, EnvironmentProfile::Production)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureFlags {
    pub automatic_calculation: bool,
    pub queue_processing: bool,
    pub snapshot_creation: bool,
    pub caching: bool,
    pub circuit_breaker: bool,
    pub notifications: bool,
}

impl FeatureFlags {
    fn enabled_by_default() -> Self {
        Self {
            automatic_calculation: true,
            queue_processing: true,
            snapshot_creation: true,
            caching: true,
            circuit_breaker: true,
            notifications: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub enabled: bool,
    pub default_ttl: Option<Duration>,
    pub table_data_ttl: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Some(Duration::from_secs(300)),
            table_data_ttl: Some(Duration::from_secs(300)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CalculationConfig {
    pub timeout: Duration,
    pub max_teams_per_liga: usize,
}

impl Default for CalculationConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_teams_per_liga: 64,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub max_retries: i32,
    pub job_timeout: Duration,
    pub backoff: BackoffConfig,
    pub max_completed_jobs: usize,
    pub max_failed_jobs: usize,
    pub priority_defaults: PriorityDefaults,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            max_retries: 3,
            job_timeout: Duration::from_secs(30),
            backoff: BackoffConfig::default(),
            max_completed_jobs: 500,
            max_failed_jobs: 200,
            priority_defaults: PriorityDefaults::default(),
        }
    }
}

impl QueueConfig {
    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            job_timeout: self.job_timeout,
            max_retries: self.max_retries,
            backoff: self.backoff,
        }
    }
}

/// Fully resolved, validated configuration surface. Every field named in the
/// external-interfaces configuration surface is represented.
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: EnvironmentProfile,
    pub queue: QueueConfig,
    pub snapshot_storage_directory: PathBuf,
    pub snapshot_max_count: usize,
    pub snapshot_max_age_days: i64,
    pub snapshot_compression_enabled: bool,
    pub snapshot_checksum_enabled: bool,
    pub cache: CacheConfig,
    pub calculation: CalculationConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub features: FeatureFlags,
    pub logging_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            environment: EnvironmentProfile::Development,
            queue: QueueConfig::default(),
            snapshot_storage_directory: PathBuf::from("./snapshots"),
            snapshot_max_count: 50,
            snapshot_max_age_days: 30,
            snapshot_compression_enabled: true,
            snapshot_checksum_enabled: true,
            cache: CacheConfig::default(),
            calculation: CalculationConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            features: FeatureFlags::enabled_by_default(),
            logging_level: "debug".to_string(),
        }
    }
}

impl Config {
    /// Load from compiled-in defaults, then `.env` (skipped in production),
    /// then process environment variables; validate ranges and profile caps.
    pub fn from_env() -> Result<Self> {
        let environment = match env::var("LEAGUE_CORE_ENV") {
            Ok(raw) => EnvironmentProfile::parse(&raw)?,
            Err(_) => EnvironmentProfile::Development,
        };

        if environment != EnvironmentProfile::Production {
            let _ = dotenv();
        }

        let mut config = Self {
            environment,
            logging_level: default_log_level(environment),
            ..Self::default()
        };

        if let Ok(raw) = env::var("QUEUE_CONCURRENCY") {
            config.queue.concurrency = raw.parse().context("QUEUE_CONCURRENCY must be a positive integer")?;
        }
        if let Ok(raw) = env::var("QUEUE_MAX_RETRIES") {
            config.queue.max_retries = raw.parse().context("QUEUE_MAX_RETRIES must be an integer")?;
        }
        if let Ok(raw) = env::var("QUEUE_JOB_TIMEOUT_MS") {
            let millis: u64 = raw.parse().context("QUEUE_JOB_TIMEOUT_MS must be an integer")?;
            config.queue.job_timeout = Duration::from_millis(millis);
        }
        if let Ok(raw) = env::var("SNAPSHOT_STORAGE_DIRECTORY") {
            config.snapshot_storage_directory = PathBuf::from(raw);
        }
        if let Ok(raw) = env::var("CACHE_ENABLED") {
            config.cache.enabled = parse_bool(&raw)?;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.queue.concurrency < 1 {
            bail!("configuration_error: queue.concurrency must be at least 1");
        }
        if self.queue.concurrency > self.environment.max_concurrency() {
            bail!(
                "configuration_error: queue.concurrency {} exceeds the {:?} profile cap of {}",
                self.queue.concurrency,
                self.environment,
                self.environment.max_concurrency()
            );
        }
        if self.queue.max_retries < 0 {
            bail!("configuration_error: queue.maxRetries must be non-negative");
        }
        if self.snapshot_max_count == 0 {
            bail!("configuration_error: snapshot.maxSnapshots must be at least 1");
        }
        Ok(())
    }
}

fn default_log_level(environment: EnvironmentProfile) -> String {
    match environment {
        EnvironmentProfile::Development | EnvironmentProfile::Test => "debug".to_string(),
        EnvironmentProfile::Staging | EnvironmentProfile::Production => "info".to_string(),
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => bail!("configuration_error: expected a boolean, got '{other}'"),
    }
}

impl From<&Config> for SnapshotStoreConfig {
    fn from(config: &Config) -> Self {
        SnapshotStoreConfig {
            storage_directory: config.snapshot_storage_directory.clone(),
            max_snapshots: config.snapshot_max_count,
            max_age_days: config.snapshot_max_age_days,
            compression_enabled: config.snapshot_compression_enabled,
            checksum_enabled: config.snapshot_checksum_enabled,
            production_mode: config.environment == EnvironmentProfile::Production,
        }
    }
}
