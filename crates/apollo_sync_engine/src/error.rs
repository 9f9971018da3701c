//! Error types for the sync engine.

use apollo_sync_protocol::ProtocolError;
use std::time::Duration;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Error returned by a change callback.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The poll or fetch call exceeded its deadline.
    #[error("operation timed out")]
    Timeout,

    /// The service answered with an unexpected status.
    #[error("service error: status {status}: {message}")]
    ServiceError {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// The service answered with a payload of the wrong shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A namespace was read before its first synchronization completed.
    #[error("namespace {namespace} is not initialized yet")]
    NotInitialized {
        /// Namespace name.
        namespace: String,
    },

    /// The blocking first synchronization did not succeed in time.
    #[error("first sync of namespace {namespace} did not complete within {elapsed:?}")]
    StartupDeadlineExceeded {
        /// Namespace name.
        namespace: String,
        /// Time spent trying.
        elapsed: Duration,
    },

    /// Sync was cancelled by a stop request.
    #[error("sync cancelled")]
    Cancelled,

    /// Invalid state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },

    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Filesystem error (snapshot dumps).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Could not install the OS signal listener.
    #[error("signal handling error: {0}")]
    Signal(String),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout => true,
            SyncError::ServiceError { .. } => true,
            SyncError::MalformedResponse(_) => true,
            _ => false,
        }
    }

    /// Returns true if the failure was a deadline being exceeded.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SyncError::Timeout)
    }
}

impl From<ProtocolError> for SyncError {
    fn from(err: ProtocolError) -> Self {
        SyncError::MalformedResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("invalid certificate").is_retryable());
        assert!(SyncError::Timeout.is_retryable());
        assert!(SyncError::ServiceError {
            status: 500,
            message: "internal error".into()
        }
        .is_retryable());
        assert!(SyncError::MalformedResponse("expected array".into()).is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
        assert!(!SyncError::NotInitialized {
            namespace: "application".into()
        }
        .is_retryable());
    }

    #[test]
    fn only_timeout_is_timeout() {
        assert!(SyncError::Timeout.is_timeout());
        assert!(!SyncError::transport_retryable("refused").is_timeout());
    }

    #[test]
    fn protocol_errors_are_malformed_responses() {
        let err: SyncError = ProtocolError::invalid_payload("expected array").into();
        assert!(matches!(err, SyncError::MalformedResponse(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn error_display() {
        let err = SyncError::ServiceError {
            status: 503,
            message: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "service error: status 503: unavailable");

        let err = SyncError::NotInitialized {
            namespace: "db".into(),
        };
        assert!(err.to_string().contains("db"));
    }
}
