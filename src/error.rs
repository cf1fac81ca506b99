//! Error types for the inference gateway
//!
//! ## Table of Contents
//! - **GatewayError**: Main error enum covering request outcomes and ambient failures
//! - **ErrorKind**: Stable, serializable discriminant callers can branch on
//! - **Result**: Type alias for `Result<T, GatewayError>`

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Request carried no items
    #[error("empty input list")]
    EmptyInput,

    /// Request carried more items than a single request may hold
    #[error("batch too large: {len} items (max {max})")]
    BatchTooLarge {
        /// Number of items received
        len: usize,
        /// Configured maximum
        max: usize,
    },

    /// No admission permit became free within the grace period
    #[error("too many concurrent requests (waited {}ms)", waited.as_millis())]
    AdmissionTimeout {
        /// How long the request queued for a permit
        waited: Duration,
    },

    /// The compute collaborator failed for one of the request's batches
    #[error("compute failure: {0}")]
    ComputeFailure(String),

    /// The request deadline passed while batches were outstanding
    #[error("request timed out after {}ms", elapsed.as_millis())]
    RequestTimeout {
        /// Time spent awaiting batch completion
        elapsed: Duration,
    },

    /// Configuration error during builder setup
    #[error("configuration error: {0}")]
    Config(String),

    /// Networking failure (HTTP server or client transport)
    #[error("network error: {0}")]
    Network(String),

    /// Metrics collection or export failure
    #[error("metrics error: {0}")]
    Metrics(String),

    /// Generic IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error reported by a remote gateway in its JSON error body
    #[error("gateway returned {status} ({kind}): {message}")]
    Remote {
        /// Classification sent by the gateway
        kind: ErrorKind,
        /// HTTP status code
        status: u16,
        /// Message sent by the gateway
        message: String,
    },

    /// Internal error (should not occur in normal operation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable outward classification of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input: no items
    EmptyInput,
    /// Bad input: too many items
    BatchTooLarge,
    /// Slow down: admission permits exhausted
    Overloaded,
    /// Upstream compute broken
    ComputeFailure,
    /// Try again: deadline exceeded
    RequestTimeout,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// HTTP status code for this kind
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::EmptyInput => 400,
            ErrorKind::BatchTooLarge => 413,
            ErrorKind::Overloaded => 429,
            ErrorKind::ComputeFailure => 500,
            ErrorKind::RequestTimeout => 504,
            ErrorKind::Internal => 500,
        }
    }

    /// Label used in logs and metrics
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::EmptyInput => "empty_input",
            ErrorKind::BatchTooLarge => "batch_too_large",
            ErrorKind::Overloaded => "overloaded",
            ErrorKind::ComputeFailure => "compute_failure",
            ErrorKind::RequestTimeout => "request_timeout",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GatewayError {
    /// Create a compute failure
    pub fn compute(msg: impl Into<String>) -> Self {
        Self::ComputeFailure(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a network error
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a metrics error
    pub fn metrics(msg: impl Into<String>) -> Self {
        Self::Metrics(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Outward classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::EmptyInput => ErrorKind::EmptyInput,
            GatewayError::BatchTooLarge { .. } => ErrorKind::BatchTooLarge,
            GatewayError::AdmissionTimeout { .. } => ErrorKind::Overloaded,
            GatewayError::ComputeFailure(_) => ErrorKind::ComputeFailure,
            GatewayError::RequestTimeout { .. } => ErrorKind::RequestTimeout,
            GatewayError::Remote { kind, .. } => *kind,
            _ => ErrorKind::Internal,
        }
    }

    /// HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        self.kind().status_code()
    }

    /// Whether a caller may retry the same request later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Overloaded | ErrorKind::RequestTimeout
        )
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}

impl From<prometheus::Error> for GatewayError {
    fn from(err: prometheus::Error) -> Self {
        Self::Metrics(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_map_to_distinct_statuses() {
        let errors = [
            GatewayError::EmptyInput,
            GatewayError::BatchTooLarge { len: 129, max: 128 },
            GatewayError::AdmissionTimeout { waited: Duration::from_secs(20) },
            GatewayError::compute("boom"),
            GatewayError::RequestTimeout { elapsed: Duration::from_secs(90) },
        ];

        let statuses: Vec<u16> = errors.iter().map(|e| e.status_code()).collect();
        assert_eq!(statuses, vec![400, 413, 429, 500, 504]);

        let kinds: std::collections::HashSet<ErrorKind> = errors.iter().map(|e| e.kind()).collect();
        assert_eq!(kinds.len(), 5);
    }

    #[test]
    fn test_only_overload_and_timeout_are_retryable() {
        assert!(GatewayError::AdmissionTimeout { waited: Duration::ZERO }.is_retryable());
        assert!(GatewayError::RequestTimeout { elapsed: Duration::ZERO }.is_retryable());
        assert!(!GatewayError::EmptyInput.is_retryable());
        assert!(!GatewayError::compute("x").is_retryable());
        assert!(!GatewayError::config("x").is_retryable());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::BatchTooLarge).unwrap();
        assert_eq!(json, "\"batch_too_large\"");
        let back: ErrorKind = serde_json::from_str("\"overloaded\"").unwrap();
        assert_eq!(back, ErrorKind::Overloaded);
    }

    #[test]
    fn test_remote_error_keeps_gateway_kind() {
        let err = GatewayError::Remote {
            kind: ErrorKind::Overloaded,
            status: 429,
            message: "too many concurrent requests".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Overloaded);
        assert_eq!(err.status_code(), 429);
        assert!(err.is_retryable());
    }
}
