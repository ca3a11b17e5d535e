//! Backend error types.

use thiserror::Error;

/// Failure of a backend health query
///
/// Distinct from "no health reported", which is a successful query that
/// returns no opinion.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// Connection or I/O level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend answered but the payload violates the protocol.
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),

    /// The query did not complete within the configured timeout.
    #[error("backend query timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The request itself is invalid; retrying cannot help.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl BackendError {
    pub fn transport<E: std::fmt::Display>(e: E) -> Self {
        Self::Transport(e.to_string())
    }

    pub fn malformed<E: std::fmt::Display>(e: E) -> Self {
        Self::MalformedResponse(e.to_string())
    }

    /// Whether the work queue should retry the check
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidArgument(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display() {
        let err = BackendError::Status {
            status: 503,
            body: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "backend returned 503: unavailable");
        assert_eq!(
            BackendError::Timeout(Duration::from_secs(2)).to_string(),
            "backend query timed out after 2s"
        );
    }

    #[test]
    fn test_only_invalid_argument_is_terminal() {
        assert!(BackendError::transport("connection refused").is_retryable());
        assert!(BackendError::malformed("missing health").is_retryable());
        assert!(BackendError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(!BackendError::InvalidArgument("empty volume id".into()).is_retryable());
    }
}
