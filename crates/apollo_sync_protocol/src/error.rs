//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding or decoding protocol payloads.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Failed to encode a payload to JSON.
    #[error("encoding failed: {0}")]
    Encoding(#[source] serde_json::Error),

    /// Failed to decode a JSON payload.
    #[error("decoding failed: {0}")]
    Decoding(#[source] serde_json::Error),

    /// The payload decoded but does not have the expected shape.
    #[error("invalid payload: {message}")]
    InvalidPayload {
        /// Description of the structural problem.
        message: String,
    },

    /// A request did not match any known endpoint.
    #[error("unknown route: {0}")]
    UnknownRoute(String),

    /// A required query parameter is missing.
    #[error("missing query parameter: {0}")]
    MissingParameter(&'static str),
}

impl ProtocolError {
    /// Creates an invalid payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }
}
