//! Error Handler: decides retry/rollback/escalate/fail-fast for a classified
//! error, gated by the per-operation circuit breaker.

use std::sync::Arc;

use tracing::{error, warn};

use crate::circuit_breaker::{Admission, CircuitBreakers};
use crate::error::{ClassifiedError, ErrorType, Severity};
use crate::snapshot::SnapshotStore;

/// Context the Handler needs to make its decision.
#[derive(Debug, Clone, Copy)]
pub struct JobContext {
    pub league_id: i64,
    pub season_id: i64,
    pub retry_count: i32,
    pub max_retries: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerDecision {
    RetryWithBackoff,
    Rollback,
    FailFast,
    Escalate,
}

pub struct ErrorHandler {
    breakers: Arc<CircuitBreakers>,
    snapshots: Option<Arc<SnapshotStore>>,
}

impl ErrorHandler {
    pub fn new(breakers: Arc<CircuitBreakers>, snapshots: Option<Arc<SnapshotStore>>) -> Self {
        Self { breakers, snapshots }
    }

    /// Decide the next action for `error` raised by `operation` during `ctx`.
    pub fn decide(&self, operation: &str, error: &ClassifiedError, ctx: JobContext) -> HandlerDecision {
        if self.breakers.admit(operation) == Admission::Rejected {
            warn!(operation, "circuit breaker open, failing fast");
            return HandlerDecision::FailFast;
        }

        if error.error_type == ErrorType::CalculationError
            && error.code == ErrorType::DataInconsistency.code()
        {
            return HandlerDecision::Rollback;
        }
        // DATA_INCONSISTENCY raised directly also triggers rollback.
        if error.error_type == ErrorType::DataInconsistency {
            return HandlerDecision::Rollback;
        }

        if error.severity == Severity::Critical {
            error!(
                operation,
                error.type = error.code,
                error.severity = "critical",
                "escalating critical error"
            );
            return HandlerDecision::Escalate;
        }

        if error.retryable && ctx.retry_count < ctx.max_retries {
            return HandlerDecision::RetryWithBackoff;
        }

        HandlerDecision::FailFast
    }

    pub fn record_outcome(&self, operation: &str, succeeded: bool) {
        if succeeded {
            self.breakers.record_success(operation);
        } else {
            self.breakers.record_failure(operation);
        }
    }

    /// Calculation-failure fallback for user-visible reads: restore the latest
    /// snapshot for `(L,S)`, or signal an empty fallback table if none exists.
    pub fn calculation_fallback(&self, league_id: i64, season_id: i64) -> FallbackTable {
        let Some(store) = &self.snapshots else {
            return FallbackTable::empty();
        };
        match store.list(league_id, season_id) {
            Ok(snapshots) if !snapshots.is_empty() => FallbackTable {
                entries: snapshots[0].entries.clone(),
                status: FallbackStatus::RestoredFromSnapshot,
            },
            _ => FallbackTable::empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStatus {
    RestoredFromSnapshot,
    Fallback,
}

#[derive(Debug, Clone)]
pub struct FallbackTable {
    pub entries: Vec<crate::models::TableEntry>,
    pub status: FallbackStatus,
}

impl FallbackTable {
    fn empty() -> Self {
        Self {
            entries: Vec::new(),
            status: FallbackStatus::Fallback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreakerConfig;
    use std::time::Duration;

    fn ctx(retry_count: i32) -> JobContext {
        JobContext {
            league_id: 1,
            season_id: 1,
            retry_count,
            max_retries: 3,
        }
    }

    fn handler() -> ErrorHandler {
        ErrorHandler::new(
            Arc::new(CircuitBreakers::new(CircuitBreakerConfig::default())),
            None,
        )
    }

    #[test]
    fn retryable_error_under_cap_retries_with_backoff() {
        let h = handler();
        let err = ClassifiedError::of_type(ErrorType::ConnectionError, "connection refused");
        assert_eq!(h.decide("calc", &err, ctx(1)), HandlerDecision::RetryWithBackoff);
    }

    #[test]
    fn retries_exhausted_fails_fast() {
        let h = handler();
        let err = ClassifiedError::of_type(ErrorType::ConnectionError, "connection refused");
        assert_eq!(h.decide("calc", &err, ctx(3)), HandlerDecision::FailFast);
    }

    #[test]
    fn non_retryable_error_fails_fast() {
        let h = handler();
        let err = ClassifiedError::of_type(ErrorType::ValidationError, "validation failed");
        assert_eq!(h.decide("calc", &err, ctx(0)), HandlerDecision::FailFast);
    }

    #[test]
    fn data_inconsistency_triggers_rollback() {
        let h = handler();
        let err = ClassifiedError::of_type(ErrorType::DataInconsistency, "data_inconsistency: dup club");
        assert_eq!(h.decide("calc", &err, ctx(0)), HandlerDecision::Rollback);
    }

    #[test]
    fn critical_severity_escalates() {
        let h = handler();
        let err = ClassifiedError::of_type(ErrorType::SystemError, "critical system failure");
        assert_eq!(h.decide("calc", &err, ctx(0)), HandlerDecision::Escalate);
    }

    #[test]
    fn open_circuit_breaker_forces_fail_fast_even_for_retryable_error() {
        let breakers = Arc::new(CircuitBreakers::new(CircuitBreakerConfig {
            failure_threshold: 1,
            open_duration: Duration::from_secs(30),
        }));
        let h = ErrorHandler::new(breakers.clone(), None);
        breakers.record_failure("calc");
        let err = ClassifiedError::of_type(ErrorType::ConnectionError, "connection refused");
        assert_eq!(h.decide("calc", &err, ctx(0)), HandlerDecision::FailFast);
    }

    #[test]
    fn calculation_fallback_with_no_store_returns_empty() {
        let h = handler();
        let fallback = h.calculation_fallback(1, 1);
        assert!(fallback.entries.is_empty());
        assert_eq!(fallback.status, FallbackStatus::Fallback);
    }
}
