//! Error taxonomy and deterministic classifier.
//!
//! Every failure that crosses a component boundary in this crate is turned into a
//! [`ClassifiedError`] before it reaches the Queue or an external caller. Components
//! raise `thiserror`-derived enums internally (`SnapshotError`, `EngineError`,
//! `QueueError`, `CacheError`); [`Classifier::classify`] maps any of those, or any
//! other `anyhow::Error`, onto the closed taxonomy below by inspecting its message.
//!
//! Classification is purely message-pattern based so that it stays deterministic:
//! the same raw error always yields the same `ClassifiedError`, regardless of which
//! component produced it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Closed set of error kinds the core can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    ConnectionError,
    TransactionError,
    ConstraintViolation,
    Deadlock,
    DatabaseError,
    ValidationError,
    InvalidInput,
    BusinessRuleViolation,
    MemoryError,
    TimeoutError,
    ResourceExhausted,
    SystemError,
    JobTimeout,
    JobCancelled,
    QueueFull,
    QueueError,
    ServiceUnavailable,
    NetworkError,
    PermissionDenied,
    FeatureDisabled,
    ConfigurationError,
    CalculationError,
    DataInconsistency,
    UnknownError,
}

impl ErrorType {
    /// The `code` string surfaced in a `ClassifiedError`, e.g. for `RestoreResult.errors`.
    pub fn code(self) -> &'static str {
        match self {
            ErrorType::ConnectionError => "connection_error",
            ErrorType::TransactionError => "transaction_error",
            ErrorType::ConstraintViolation => "constraint_violation",
            ErrorType::Deadlock => "deadlock",
            ErrorType::DatabaseError => "database_error",
            ErrorType::ValidationError => "validation_error",
            ErrorType::InvalidInput => "invalid_input",
            ErrorType::BusinessRuleViolation => "business_rule_violation",
            ErrorType::MemoryError => "memory_error",
            ErrorType::TimeoutError => "timeout_error",
            ErrorType::ResourceExhausted => "resource_exhausted",
            ErrorType::SystemError => "system_error",
            ErrorType::JobTimeout => "job_timeout",
            ErrorType::JobCancelled => "job_cancelled",
            ErrorType::QueueFull => "queue_full",
            ErrorType::QueueError => "queue_error",
            ErrorType::ServiceUnavailable => "service_unavailable",
            ErrorType::NetworkError => "network_error",
            ErrorType::PermissionDenied => "permission_denied",
            ErrorType::FeatureDisabled => "feature_disabled",
            ErrorType::ConfigurationError => "configuration_error",
            ErrorType::CalculationError => "calculation_error",
            ErrorType::DataInconsistency => "data_inconsistency",
            ErrorType::UnknownError => "unknown_error",
        }
    }

    fn base_severity(self) -> Severity {
        match self {
            ErrorType::SystemError
            | ErrorType::MemoryError
            | ErrorType::DatabaseError
            | ErrorType::DataInconsistency => Severity::Critical,
            ErrorType::TransactionError
            | ErrorType::ConstraintViolation
            | ErrorType::CalculationError
            | ErrorType::QueueError => Severity::High,
            ErrorType::TimeoutError
            | ErrorType::Deadlock
            | ErrorType::NetworkError
            | ErrorType::ConfigurationError => Severity::Medium,
            _ => Severity::Medium,
        }
    }

    fn base_retryable(self) -> bool {
        match self {
            ErrorType::ValidationError
            | ErrorType::InvalidInput
            | ErrorType::BusinessRuleViolation
            | ErrorType::ConstraintViolation
            | ErrorType::PermissionDenied
            | ErrorType::ConfigurationError => false,
            ErrorType::TimeoutError
            | ErrorType::NetworkError
            | ErrorType::ConnectionError
            | ErrorType::Deadlock
            | ErrorType::QueueError
            | ErrorType::QueueFull
            | ErrorType::ServiceUnavailable
            | ErrorType::JobTimeout => true,
            _ => false,
        }
    }
}

/// Impact level of a classified error, independent of its retryability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// The outcome of running a raw failure through [`Classifier::classify`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedError {
    #[serde(rename = "type")]
    pub error_type: ErrorType,
    pub code: &'static str,
    pub severity: Severity,
    pub retryable: bool,
    pub message: String,
    pub context: BTreeMap<String, String>,
}

impl ClassifiedError {
    /// Build directly from a known `ErrorType`, skipping message inspection.
    /// Used by components that already know the precise taxonomy entry.
    pub fn of_type(error_type: ErrorType, message: impl Into<String>) -> Self {
        let message = message.into();
        let severity = severity_for(error_type, &message);
        let retryable = retryable_for(error_type, &message);
        Self {
            error_type,
            code: error_type.code(),
            severity,
            retryable,
            message,
            context: BTreeMap::new(),
        }
    }

    /// Classify an arbitrary message as `UNKNOWN_ERROR`, pattern rules still apply.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::of_type(ErrorType::UnknownError, message)
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

impl std::fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

fn severity_for(error_type: ErrorType, message: &str) -> Severity {
    let lower = message.to_ascii_lowercase();
    if lower.contains("critical") || lower.contains("fatal") {
        return Severity::Critical;
    }
    if lower.contains("warning") {
        return Severity::Low;
    }
    error_type.base_severity()
}

fn retryable_for(error_type: ErrorType, message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    if lower.contains("invalid")
        || lower.contains("malformed")
        || lower.contains("unauthorized")
        || lower.contains("forbidden")
    {
        return false;
    }
    error_type.base_retryable()
}

/// Deterministic, message-pattern-based classifier.
///
/// Patterns are checked in the order below; the first match wins. Every
/// component's internal error messages are written so they hit the intended
/// pattern here, so the message itself is the classification contract.
pub struct Classifier;

impl Classifier {
    /// Classify any failure, typically an `anyhow::Error` wrapping a component's
    /// own `thiserror` enum.
    pub fn classify(error: &anyhow::Error) -> ClassifiedError {
        Self::classify_message(&error.to_string())
    }

    pub fn classify_message(message: &str) -> ClassifiedError {
        let lower = message.to_ascii_lowercase();

        let error_type = if lower.contains("deadlock") {
            ErrorType::Deadlock
        } else if lower.contains("constraint") {
            ErrorType::ConstraintViolation
        } else if lower.contains("transaction") {
            ErrorType::TransactionError
        } else if lower.contains("connection") {
            ErrorType::ConnectionError
        } else if lower.contains("data_inconsistency") || lower.contains("data inconsistency") {
            ErrorType::DataInconsistency
        } else if lower.contains("calculation") {
            ErrorType::CalculationError
        } else if lower.contains("database") {
            ErrorType::DatabaseError
        } else if lower.contains("job_timeout") || lower.contains("job timed out") {
            ErrorType::JobTimeout
        } else if lower.contains("job_cancelled") || lower.contains("job cancelled") {
            ErrorType::JobCancelled
        } else if lower.contains("timeout") || lower.contains("timed out") {
            ErrorType::TimeoutError
        } else if lower.contains("queue_full") || lower.contains("queue is full") {
            ErrorType::QueueFull
        } else if lower.contains("queue") {
            ErrorType::QueueError
        } else if lower.contains("service unavailable") || lower.contains("unavailable") {
            ErrorType::ServiceUnavailable
        } else if lower.contains("network") {
            ErrorType::NetworkError
        } else if lower.contains("permission") || lower.contains("forbidden") {
            ErrorType::PermissionDenied
        } else if lower.contains("feature") && lower.contains("disabled") {
            ErrorType::FeatureDisabled
        } else if lower.contains("config") {
            ErrorType::ConfigurationError
        } else if lower.contains("memory") {
            ErrorType::MemoryError
        } else if lower.contains("resource exhausted") || lower.contains("exhausted") {
            ErrorType::ResourceExhausted
        } else if lower.contains("business rule") || lower.contains("business_rule") {
            ErrorType::BusinessRuleViolation
        } else if lower.contains("invalid") {
            ErrorType::InvalidInput
        } else if lower.contains("validation") {
            ErrorType::ValidationError
        } else if lower.contains("system") {
            ErrorType::SystemError
        } else {
            ErrorType::UnknownError
        };

        ClassifiedError::of_type(error_type, message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_is_deterministic() {
        let a = Classifier::classify_message("connection refused");
        let b = Classifier::classify_message("connection refused");
        assert_eq!(a.error_type, b.error_type);
        assert_eq!(a.severity, b.severity);
        assert_eq!(a.retryable, b.retryable);
    }

    #[test]
    fn critical_keyword_overrides_base_severity() {
        let err = Classifier::classify_message("timeout: critical failure in engine");
        assert_eq!(err.severity, Severity::Critical);
    }

    #[test]
    fn warning_keyword_lowers_severity() {
        let err = Classifier::classify_message("deadlock warning detected");
        assert_eq!(err.severity, Severity::Low);
    }

    #[test]
    fn validation_errors_are_non_retryable() {
        let err = Classifier::classify_message("validation failed: missing club name");
        assert!(!err.retryable);
        assert_eq!(err.error_type, ErrorType::ValidationError);
    }

    #[test]
    fn invalid_keyword_forces_non_retryable_even_for_retryable_types() {
        let err = Classifier::classify_message("connection invalid: malformed handshake");
        assert!(!err.retryable);
    }

    #[test]
    fn timeout_errors_are_retryable() {
        let err = Classifier::classify_message("operation timed out after 30s");
        assert!(err.retryable);
        assert_eq!(err.error_type, ErrorType::TimeoutError);
    }

    #[test]
    fn data_inconsistency_is_critical() {
        let err = Classifier::classify_message("data_inconsistency: duplicate club id");
        assert_eq!(err.severity, Severity::Critical);
        assert_eq!(err.error_type, ErrorType::DataInconsistency);
    }

    #[test]
    fn unrecognized_message_falls_back_to_unknown() {
        let err = Classifier::classify_message("something unexpected happened");
        assert_eq!(err.error_type, ErrorType::UnknownError);
    }
}
