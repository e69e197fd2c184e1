//! Error types for refcache operations

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Classification of an upstream or validation failure.
///
/// This is the taxonomy surfaced on failed resolutions. It is derived from
/// HTTP status codes and transport error predicates at the client boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The identifier does not exist upstream.
    NotFound,
    /// The call did not complete within its timeout.
    Timeout,
    /// The local token bucket or the upstream rejected the call for rate.
    RateLimited,
    /// Connection-level failure or upstream outage.
    Network,
    /// The identifier or request was rejected as malformed.
    Validation,
    /// Anything else, including undecodable upstream payloads.
    Unknown,
}

impl ErrorKind {
    /// Stable snake_case name, as used in logs and serialized results.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Network => "network",
            ErrorKind::Validation => "validation",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::RateLimited | ErrorKind::Network
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Backend failure: {reason}")]
    Backend { reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid key '{raw}': {reason}")]
    InvalidKey { raw: String, reason: String },

    #[error("Scope must not be empty")]
    EmptyScope,

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to build HTTP client for {source_name}: {reason}")]
    HttpClient { source_name: String, reason: String },
}

/// Errors raised when handing a task to a scheduler.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("No async runtime available to schedule work")]
    NoRuntime,

    #[error("Scheduler rejected task: {reason}")]
    Rejected { reason: String },
}

/// Master error type for all refcache errors.
#[derive(Debug, Clone, Error)]
pub enum RefcacheError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),
}

/// Result type alias for refcache operations.
pub type RefcacheResult<T> = Result<T, RefcacheError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::RateLimited).unwrap();
        assert_eq!(json, "\"rate_limited\"");
        let back: ErrorKind = serde_json::from_str("\"not_found\"").unwrap();
        assert_eq!(back, ErrorKind::NotFound);
    }

    #[test]
    fn test_error_kind_display_matches_serde_name() {
        for kind in [
            ErrorKind::NotFound,
            ErrorKind::Timeout,
            ErrorKind::RateLimited,
            ErrorKind::Network,
            ErrorKind::Validation,
            ErrorKind::Unknown,
        ] {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind));
        }
    }

    #[test]
    fn test_transient_kinds() {
        assert!(ErrorKind::Timeout.is_transient());
        assert!(ErrorKind::Network.is_transient());
        assert!(ErrorKind::RateLimited.is_transient());
        assert!(!ErrorKind::NotFound.is_transient());
        assert!(!ErrorKind::Validation.is_transient());
    }

    #[test]
    fn test_validation_error_display_invalid_key() {
        let err = ValidationError::InvalidKey {
            raw: "12-ab".to_string(),
            reason: "must contain only digits".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("12-ab"));
        assert!(msg.contains("digits"));
    }

    #[test]
    fn test_master_error_from_storage() {
        let err: RefcacheError = StorageError::LockPoisoned.into();
        assert!(matches!(err, RefcacheError::Storage(StorageError::LockPoisoned)));
        assert!(format!("{}", err).contains("Storage error"));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "stale_after_days".to_string(),
            value: "3".to_string(),
            reason: "must exceed refresh_after_days".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("stale_after_days"));
        assert!(msg.contains("3"));
    }
}
