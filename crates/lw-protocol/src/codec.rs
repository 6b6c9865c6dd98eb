//! Tokio codec for newline-delimited JSON envelopes

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::envelope::Envelope;
use crate::error::ProtocolError;

/// Default maximum length of one encoded envelope (16MB)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 16 * 1024 * 1024;

/// Codec framing one [`Envelope`] per line
#[derive(Debug)]
pub struct JsonLineCodec {
    /// Maximum accepted line length in bytes
    max_length: usize,
    /// Offset already scanned for a newline
    next_index: usize,
}

impl JsonLineCodec {
    /// Create a codec with the default line limit
    pub fn new() -> Self {
        Self::with_max_length(DEFAULT_MAX_LINE_LENGTH)
    }

    /// Create a codec with a custom line limit
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
        }
    }

    /// Get the configured line limit
    pub fn max_length(&self) -> usize {
        self.max_length
    }
}

impl Default for JsonLineCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for JsonLineCodec {
    type Item = Envelope;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline = src[self.next_index..]
                .iter()
                .position(|b| *b == b'\n')
                .map(|offset| self.next_index + offset);

            let Some(end) = newline else {
                if src.len() > self.max_length {
                    return Err(ProtocolError::LineTooLong {
                        size: src.len(),
                        max: self.max_length,
                    });
                }
                // Need more data
                self.next_index = src.len();
                return Ok(None);
            };

            self.next_index = 0;
            let line = src.split_to(end + 1);
            let line = &line[..end];
            if line.len() > self.max_length {
                return Err(ProtocolError::LineTooLong {
                    size: line.len(),
                    max: self.max_length,
                });
            }
            if line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }

            let envelope: Envelope = serde_json::from_slice(line)?;
            return Ok(Some(envelope));
        }
    }
}

impl Encoder<Envelope> for JsonLineCodec {
    type Error = ProtocolError;

    fn encode(&mut self, envelope: Envelope, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let json = serde_json::to_vec(&envelope)?;
        if json.len() > self.max_length {
            return Err(ProtocolError::LineTooLong {
                size: json.len(),
                max: self.max_length,
            });
        }

        dst.reserve(json.len() + 1);
        dst.extend_from_slice(&json);
        dst.put_u8(b'\n');
        Ok(())
    }
}
