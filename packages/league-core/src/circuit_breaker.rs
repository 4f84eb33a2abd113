//! Per-operation circuit breakers guarding against repeated failures.

use std::time::{Duration, Instant};

use dashmap::DashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
struct BreakerRecord {
    state: BreakerState,
    failure_count: u32,
    opened_at: Option<Instant>,
    last_probe_at: Option<Instant>,
}

impl Default for BreakerRecord {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            failure_count: 0,
            opened_at: None,
            last_probe_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration: Duration::from_secs(30),
        }
    }
}

/// Whether a call to an operation should proceed right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Proceed normally.
    Allowed,
    /// Proceed, but this is the single half-open probe; record its outcome.
    Probe,
    /// Short-circuit without attempting the call.
    Rejected,
}

/// Process-local, per-operation-name circuit breaker table.
pub struct CircuitBreakers {
    config: CircuitBreakerConfig,
    breakers: DashMap<String, BreakerRecord>,
}

impl CircuitBreakers {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: DashMap::new(),
        }
    }

    /// Check whether `operation` may proceed, transitioning OPEN -> HALF_OPEN
    /// if `open_duration` has elapsed.
    pub fn admit(&self, operation: &str) -> Admission {
        let mut record = self.breakers.entry(operation.to_string()).or_default();
        match record.state {
            BreakerState::Closed => Admission::Allowed,
            BreakerState::Open => {
                let opened_at = record.opened_at.unwrap_or_else(Instant::now);
                if opened_at.elapsed() >= self.config.open_duration {
                    record.state = BreakerState::HalfOpen;
                    record.last_probe_at = Some(Instant::now());
                    Admission::Probe
                } else {
                    Admission::Rejected
                }
            }
            BreakerState::HalfOpen => Admission::Rejected,
        }
    }

    pub fn record_success(&self, operation: &str) {
        let mut record = self.breakers.entry(operation.to_string()).or_default();
        record.state = BreakerState::Closed;
        record.failure_count = 0;
        record.opened_at = None;
    }

    pub fn record_failure(&self, operation: &str) {
        let mut record = self.breakers.entry(operation.to_string()).or_default();
        match record.state {
            BreakerState::HalfOpen => {
                record.state = BreakerState::Open;
                record.opened_at = Some(Instant::now());
            }
            BreakerState::Closed => {
                record.failure_count += 1;
                if record.failure_count >= self.config.failure_threshold {
                    record.state = BreakerState::Open;
                    record.opened_at = Some(Instant::now());
                }
            }
            BreakerState::Open => {
                record.opened_at = Some(Instant::now());
            }
        }
    }

    pub fn reset(&self, operation: &str) {
        self.breakers.insert(operation.to_string(), BreakerRecord::default());
    }

    pub fn state_of(&self, operation: &str) -> BreakerState {
        self.breakers
            .get(operation)
            .map(|r| r.state)
            .unwrap_or(BreakerState::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breakers() -> CircuitBreakers {
        CircuitBreakers::new(CircuitBreakerConfig {
            failure_threshold: 3,
            open_duration: Duration::from_millis(20),
        })
    }

    #[test]
    fn opens_after_threshold_consecutive_failures() {
        let cb = breakers();
        for _ in 0..2 {
            cb.record_failure("calc");
            assert_eq!(cb.admit("calc"), Admission::Allowed);
        }
        cb.record_failure("calc");
        assert_eq!(cb.state_of("calc"), BreakerState::Open);
        assert_eq!(cb.admit("calc"), Admission::Rejected);
    }

    #[test]
    fn half_open_probe_admitted_after_open_duration() {
        let cb = breakers();
        for _ in 0..3 {
            cb.record_failure("calc");
        }
        std::thread::sleep(Duration::from_millis(25));
        assert_eq!(cb.admit("calc"), Admission::Probe);
    }

    #[test]
    fn successful_probe_closes_breaker_and_resets_count() {
        let cb = breakers();
        for _ in 0..3 {
            cb.record_failure("calc");
        }
        std::thread::sleep(Duration::from_millis(25));
        cb.admit("calc");
        cb.record_success("calc");
        assert_eq!(cb.state_of("calc"), BreakerState::Closed);
        assert_eq!(cb.admit("calc"), Admission::Allowed);
    }

    #[test]
    fn failed_probe_reopens_breaker() {
        let cb = breakers();
        for _ in 0..3 {
            cb.record_failure("calc");
        }
        std::thread::sleep(Duration::from_millis(25));
        cb.admit("calc");
        cb.record_failure("calc");
        assert_eq!(cb.state_of("calc"), BreakerState::Open);
    }

    #[test]
    fn manual_reset_forces_closed() {
        let cb = breakers();
        for _ in 0..3 {
            cb.record_failure("calc");
        }
        cb.reset("calc");
        assert_eq!(cb.state_of("calc"), BreakerState::Closed);
        assert_eq!(cb.admit("calc"), Admission::Allowed);
    }

    #[test]
    fn independent_operations_do_not_share_state() {
        let cb = breakers();
        for _ in 0..3 {
            cb.record_failure("calc");
        }
        assert_eq!(cb.state_of("snapshot"), BreakerState::Closed);
        assert_eq!(cb.admit("snapshot"), Admission::Allowed);
    }
}
