//! Protocol error types

use thiserror::Error;

/// Errors that can occur while encoding or decoding envelopes
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Envelope is not valid JSON or has the wrong field types
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON object does not match any envelope shape
    #[error("Unknown envelope: {0}")]
    UnknownEnvelope(String),

    /// Connection id does not follow `<prefix><ClassName><separator><uuid>`
    #[error("Invalid connection id: {0}")]
    InvalidConnectionId(String),

    /// Line exceeds the configured maximum
    #[error("Line too long: {size} bytes exceeds maximum of {max} bytes")]
    LineTooLong { size: usize, max: usize },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
