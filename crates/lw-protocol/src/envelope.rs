//! Envelopes exchanged over a bridge channel
//!
//! Every message is one flat JSON object. The id key tells the receiver who
//! started the exchange:
//!
//! - `correlationId`: the kernel issued the request and awaits the answer
//! - `requestId`: the GUI issued the request and awaits the answer
//!
//! A message carrying an id and an `operation` is a request; one carrying an
//! id but no `operation` is the matching response. `{closed: true}` is the
//! only control envelope.
//!
//! # Message Flow
//!
//! 1. Kernel sends `{operation, correlationId, payload, transform?}`
//! 2. GUI answers `{correlationId, payload?, error?}`
//! 3. GUI may send `{operation, requestId, payload, transform?}` at any time
//! 4. Kernel answers `{requestId, payload?, error?}`
//! 5. Either side may send `{closed: true}`; the receiver closes without echoing it

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::ProtocolError;

/// Which end of the channel a peer runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The browser/GUI end that owns live objects
    Gui,
    /// The kernel end that holds proxies
    Kernel,
}

impl Side {
    /// The opposite end
    pub fn peer(self) -> Self {
        match self {
            Side::Gui => Side::Kernel,
            Side::Kernel => Side::Gui,
        }
    }

    /// JSON key used for ids of requests originating on this side
    pub fn id_key(self) -> &'static str {
        match self {
            Side::Gui => "requestId",
            Side::Kernel => "correlationId",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Gui => write!(f, "gui"),
            Side::Kernel => write!(f, "kernel"),
        }
    }
}

/// A request for the peer to perform an operation
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Side that issued the request
    pub origin: Side,
    /// Id generated by the origin; echoed in the response
    pub id: String,
    /// Operation name
    pub operation: String,
    /// Operation arguments
    pub payload: Value,
    /// Transform directive applied to the result before it is returned
    pub transform: Option<Value>,
}

/// The answer to a [`Request`]
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    /// Side that issued the original request
    pub origin: Side,
    /// Id of the original request
    pub id: String,
    /// Transformed result
    pub payload: Option<Value>,
    /// Error message if the operation failed
    pub error: Option<String>,
}

/// One message unit on a bridge channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEnvelope", into = "RawEnvelope")]
pub enum Envelope {
    /// Operation request
    Request(Request),
    /// Operation result or error
    Response(Response),
    /// The sender has closed; `error` is set when initialization failed
    Closed { error: Option<String> },
}

impl Envelope {
    /// Build a request envelope
    pub fn request(
        origin: Side,
        id: impl Into<String>,
        operation: impl Into<String>,
        payload: Value,
        transform: Option<Value>,
    ) -> Self {
        Envelope::Request(Request {
            origin,
            id: id.into(),
            operation: operation.into(),
            payload,
            transform,
        })
    }

    /// Build a successful response envelope
    pub fn ok(origin: Side, id: impl Into<String>, payload: Value) -> Self {
        Envelope::Response(Response {
            origin,
            id: id.into(),
            payload: Some(payload),
            error: None,
        })
    }

    /// Build an error response envelope
    pub fn error(origin: Side, id: impl Into<String>, message: impl Into<String>) -> Self {
        Envelope::Response(Response {
            origin,
            id: id.into(),
            payload: None,
            error: Some(message.into()),
        })
    }

    /// Build a close notification
    pub fn closed() -> Self {
        Envelope::Closed { error: None }
    }

    /// Serialize to a JSON string
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from a JSON string
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Flat on-the-wire shape shared by every envelope kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    operation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transform: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    closed: Option<bool>,
}

impl TryFrom<RawEnvelope> for Envelope {
    type Error = ProtocolError;

    fn try_from(raw: RawEnvelope) -> Result<Self, Self::Error> {
        if raw.closed == Some(true) {
            return Ok(Envelope::Closed { error: raw.error });
        }

        let (origin, id) = match (raw.correlation_id, raw.request_id) {
            (Some(id), None) => (Side::Kernel, id),
            (None, Some(id)) => (Side::Gui, id),
            (Some(_), Some(_)) => {
                return Err(ProtocolError::UnknownEnvelope(
                    "both correlationId and requestId are set".to_string(),
                ))
            }
            (None, None) => {
                return Err(ProtocolError::UnknownEnvelope(
                    "no correlationId, requestId or closed flag".to_string(),
                ))
            }
        };

        Ok(match raw.operation {
            Some(operation) => Envelope::Request(Request {
                origin,
                id,
                operation,
                payload: raw.payload.unwrap_or(Value::Null),
                transform: raw.transform,
            }),
            None => Envelope::Response(Response {
                origin,
                id,
                payload: raw.payload,
                error: raw.error,
            }),
        })
    }
}

impl From<Envelope> for RawEnvelope {
    fn from(envelope: Envelope) -> Self {
        fn with_id(origin: Side, id: String) -> RawEnvelope {
            match origin {
                Side::Kernel => RawEnvelope {
                    correlation_id: Some(id),
                    ..Default::default()
                },
                Side::Gui => RawEnvelope {
                    request_id: Some(id),
                    ..Default::default()
                },
            }
        }

        match envelope {
            Envelope::Request(req) => RawEnvelope {
                operation: Some(req.operation),
                payload: Some(req.payload),
                transform: req.transform,
                ..with_id(req.origin, req.id)
            },
            Envelope::Response(resp) => RawEnvelope {
                payload: resp.payload,
                error: resp.error,
                ..with_id(resp.origin, resp.id)
            },
            Envelope::Closed { error } => RawEnvelope {
                closed: Some(true),
                error,
                ..Default::default()
            },
        }
    }
}
