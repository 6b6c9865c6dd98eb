//! Envelope channels over TCP
//!
//! Each envelope is one line of JSON. A reader task decodes lines into the
//! channel's receiver; a writer task drains the sender into the socket. When
//! the stream ends or a line fails to decode, the receiver closes and the
//! owning bridge treats the channel as lost.

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};

use lw_protocol::{Envelope, JsonLineCodec};

use super::{Channel, ChannelSender};

/// Connect to a bridge host and wrap the stream as a channel
pub async fn connect(address: impl ToSocketAddrs, max_line_length: usize) -> Result<Channel> {
    let stream = TcpStream::connect(address)
        .await
        .context("Failed to connect to bridge host")?;
    stream.set_nodelay(true).ok();
    Ok(attach(stream, max_line_length))
}

/// Wrap an established stream as a channel
pub fn attach(stream: TcpStream, max_line_length: usize) -> Channel {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let (reader, writer) = stream.into_split();

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Envelope>();

    let read_peer = peer.clone();
    tokio::spawn(async move {
        let mut frames = FramedRead::new(reader, JsonLineCodec::with_max_length(max_line_length));
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(envelope) => {
                    if inbound_tx.send(envelope).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!("Dropping channel from {}: {}", read_peer, e);
                    break;
                }
            }
        }
        tracing::debug!("Reader for {} finished", read_peer);
    });

    tokio::spawn(async move {
        let mut sink = FramedWrite::new(writer, JsonLineCodec::with_max_length(max_line_length));
        while let Some(envelope) = outbound_rx.recv().await {
            if let Err(e) = sink.send(envelope).await {
                tracing::warn!("Failed to write to {}: {}", peer, e);
                break;
            }
        }
        tracing::debug!("Writer for {} finished", peer);
    });

    Channel::new(ChannelSender::new(outbound_tx), inbound_rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lw_protocol::{DEFAULT_MAX_LINE_LENGTH, Side};
    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_attach_frames_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (reader, mut writer) = stream.into_split();
            writer
                .write_all(b"{\"correlationId\":\"k1\",\"operation\":\"ping\",\"payload\":{}}\n")
                .await
                .unwrap();
            let mut lines = BufReader::new(reader).lines();
            lines.next_line().await.unwrap().unwrap()
        });

        let (stream, _) = listener.accept().await.unwrap();
        let mut channel = attach(stream, DEFAULT_MAX_LINE_LENGTH);

        match channel.receiver.recv().await {
            Some(Envelope::Request(req)) => {
                assert_eq!(req.origin, Side::Kernel);
                assert_eq!(req.operation, "ping");
            }
            other => panic!("Wrong envelope: {:?}", other),
        }

        channel
            .sender
            .send(Envelope::ok(Side::Kernel, "k1", json!("pong")))
            .unwrap();
        let line = client.await.unwrap();
        assert_eq!(
            serde_json::from_str::<serde_json::Value>(&line).unwrap(),
            json!({"correlationId": "k1", "payload": "pong"})
        );
    }

    #[tokio::test]
    async fn test_malformed_line_ends_channel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(b"not json\n").await.unwrap();
            stream
        });

        let (stream, _) = listener.accept().await.unwrap();
        let mut channel = attach(stream, DEFAULT_MAX_LINE_LENGTH);
        assert!(channel.receiver.recv().await.is_none());
        drop(client.await.unwrap());
    }
}
