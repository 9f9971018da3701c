//! Error types for the reference server.

use apollo_sync_protocol::{ProtocolError, STATUS_NOT_FOUND, STATUS_UNAVAILABLE};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the reference server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No release exists for the namespace.
    #[error("namespace not found: {app_id}/{cluster}/{namespace}")]
    NamespaceNotFound {
        /// Application id.
        app_id: String,
        /// Cluster name.
        cluster: String,
        /// Namespace name.
        namespace: String,
    },

    /// Unsupported content format.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// The service is switched off for testing.
    #[error("service unavailable")]
    Unavailable,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::NamespaceNotFound { .. }
                | ServerError::UnsupportedFormat(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        matches!(self, ServerError::Unavailable | ServerError::Internal(_))
    }

    /// HTTP status for this error.
    pub fn status(&self) -> u16 {
        match self {
            ServerError::InvalidRequest(_) | ServerError::UnsupportedFormat(_) => 400,
            ServerError::NamespaceNotFound { .. } => STATUS_NOT_FOUND,
            ServerError::Unavailable => STATUS_UNAVAILABLE,
            ServerError::Internal(_) => 500,
        }
    }
}

impl From<ProtocolError> for ServerError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Encoding(e) => ServerError::Internal(e.to_string()),
            other => ServerError::InvalidRequest(other.to_string()),
        }
    }
}
