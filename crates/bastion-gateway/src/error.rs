//! Error types for the gateway.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Why fetching one service's rules failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchFailure {
    /// No answer within the fetch timeout.
    Timeout,
    /// Connection or protocol error.
    Transport,
    /// The service answered with a non-success status.
    Status(u16),
    /// The body was not a rule set document.
    Malformed,
}

impl FetchFailure {
    /// Metric label for this kind of failure.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::Status(_) => "status",
            Self::Malformed => "malformed",
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "status {code}"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Errors raised by the gateway.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GatewayError {
    /// The discovery registry could not be listed.
    #[error("discovery failed: {0}")]
    Discovery(String),

    /// Fetching a service's rule set failed.
    #[error("fetching rules from '{service}' failed ({kind}): {detail}")]
    Fetch {
        /// Discovery name of the service.
        service: String,
        /// Failure kind.
        kind: FetchFailure,
        /// Details for logs.
        detail: String,
    },

    /// Invalid gateway wiring or settings.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error while serving.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Create a discovery error.
    pub fn discovery(reason: impl Into<String>) -> Self {
        Self::Discovery(reason.into())
    }

    /// Create a fetch error.
    pub fn fetch(service: impl Into<String>, kind: FetchFailure, detail: impl fmt::Display) -> Self {
        Self::Fetch {
            service: service.into(),
            kind,
            detail: detail.to_string(),
        }
    }

    /// Create a fetch timeout error.
    pub fn fetch_timeout(service: impl Into<String>, after: Duration) -> Self {
        Self::fetch(service, FetchFailure::Timeout, format!("no response after {after:?}"))
    }

    /// Create a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }

    /// The fetch failure kind, if this is a fetch error.
    pub fn fetch_failure(&self) -> Option<FetchFailure> {
        match self {
            Self::Fetch { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether a later attempt may succeed without any change on our side.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Discovery(_) => true,
            Self::Fetch { kind, .. } => match kind {
                FetchFailure::Timeout | FetchFailure::Transport => true,
                FetchFailure::Status(code) => *code >= 500 || *code == 429,
                FetchFailure::Malformed => false,
            },
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors() {
        let _ = GatewayError::discovery("registry down");
        let _ = GatewayError::fetch("orders", FetchFailure::Transport, "refused");
        let _ = GatewayError::fetch_timeout("orders", Duration::from_secs(5));
        let _ = GatewayError::config("bad template");
    }

    #[test]
    fn test_is_retryable() {
        assert!(GatewayError::discovery("").is_retryable());
        assert!(GatewayError::fetch_timeout("a", Duration::from_secs(5)).is_retryable());
        assert!(GatewayError::fetch("a", FetchFailure::Status(503), "").is_retryable());
        assert!(!GatewayError::fetch("a", FetchFailure::Status(404), "").is_retryable());
        assert!(!GatewayError::fetch("a", FetchFailure::Malformed, "").is_retryable());
        assert!(!GatewayError::config("").is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::fetch("orders", FetchFailure::Status(502), "bad gateway");
        let msg = err.to_string();
        assert!(msg.contains("orders"));
        assert!(msg.contains("status 502"));
        assert_eq!(err.fetch_failure(), Some(FetchFailure::Status(502)));
    }
}
