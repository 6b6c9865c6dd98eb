//! Message channels a bridge runs over
//!
//! A bridge only needs to send envelopes and receive them in order. The
//! in-memory pair covers in-process use and tests; [`tcp`] carries the same
//! envelopes over a localhost stream.

pub mod tcp;

use tokio::sync::mpsc;

use lw_protocol::Envelope;

use crate::error::BridgeError;

/// Sending half of a channel
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelSender {
    pub fn new(tx: mpsc::UnboundedSender<Envelope>) -> Self {
        Self { tx }
    }

    /// Queue an envelope for the peer
    pub fn send(&self, envelope: Envelope) -> Result<(), BridgeError> {
        self.tx.send(envelope).map_err(|_| BridgeError::closed())
    }

    /// Check whether the receiving side has gone away
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One end of a duplex envelope channel
#[derive(Debug)]
pub struct Channel {
    pub sender: ChannelSender,
    pub receiver: mpsc::UnboundedReceiver<Envelope>,
}

impl Channel {
    pub fn new(sender: ChannelSender, receiver: mpsc::UnboundedReceiver<Envelope>) -> Self {
        Self { sender, receiver }
    }

    pub fn into_parts(self) -> (ChannelSender, mpsc::UnboundedReceiver<Envelope>) {
        (self.sender, self.receiver)
    }
}

/// Create two connected in-memory channel ends
pub fn channel_pair() -> (Channel, Channel) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        Channel::new(ChannelSender::new(a_tx), b_rx),
        Channel::new(ChannelSender::new(b_tx), a_rx),
    )
}
