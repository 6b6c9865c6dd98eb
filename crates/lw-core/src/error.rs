//! Core error types for labwire

use lw_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the bridge engine and everything it drives
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// A nested path lookup failed partway
    #[error("Property '{segment}' not found in path '{path}'{detail}")]
    PropertyNotFound {
        segment: String,
        path: String,
        detail: String,
    },

    /// The receiving model has no handler for the operation
    #[error("Unimplemented operation: {0}")]
    UnimplementedOperation(String),

    /// Transform directive not recognized
    #[error("Invalid transform: {0}")]
    InvalidTransform(String),

    /// A different object is already registered under the id
    #[error("Connection id already in use by another object: {0}")]
    RegistrationConflict(String),

    /// Registration rejected (empty id, not an object, already disposed)
    #[error("Registration failed: {0}")]
    Registration(String),

    /// A connection could not resolve its target object
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    /// The owning bridge closed before a response arrived
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// The peer reported a failure
    #[error("{0}")]
    RemoteError(String),

    /// The value at a path is not callable
    #[error("Not callable: {0}")]
    NotCallable(String),

    /// Operation needs a base object but the bridge has none
    #[error("Bridge has no base object")]
    NoBase,

    /// Payload is missing a field or has the wrong shape
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// No model type is registered under the class name
    #[error("Unknown model: {0}")]
    UnknownModel(String),

    /// Wire protocol error
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl BridgeError {
    /// Shorthand for the uniform close rejection
    pub fn closed() -> Self {
        BridgeError::Cancelled("closed".to_string())
    }

    /// Shorthand for a missing or mistyped payload field
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        BridgeError::InvalidPayload(message.into())
    }
}

impl From<ProtocolError> for BridgeError {
    fn from(e: ProtocolError) -> Self {
        BridgeError::Protocol(e.to_string())
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file not found
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    /// Invalid configuration
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialize error
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
