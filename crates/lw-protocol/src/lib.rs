//! lw-protocol: Wire protocol for labwire bridges
//!
//! This crate defines the JSON envelopes exchanged between a kernel-side
//! proxy and the GUI-side bridge instance it drives, the connection id
//! format used to reference GUI objects across the channel, and the
//! newline-delimited codec used by stream transports.

pub mod cid;
pub mod codec;
pub mod envelope;
pub mod error;

pub use cid::{ConnectionId, CID_PREFIX, CID_SEPARATOR, CONNECTION_CLASS, SHELL_CONNECTION_CLASS};
pub use codec::{JsonLineCodec, DEFAULT_MAX_LINE_LENGTH};
pub use envelope::{Envelope, Request, Response, Side};
pub use error::ProtocolError;
