// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Outbound WebSocket transport.
//!
//! One connection per Active session. A single io task owns the socket:
//! it drains an outbound channel into the write half and pushes inbound
//! text frames onto an inbound channel. Every producer (dispatcher,
//! download jobs, the interactive reader, the telemetry pump) holds an
//! [`Outbound`] clone feeding that one channel, which is the sole
//! serialization point for the wire: frames never interleave mid-frame.

use std::time::Duration;

use anyhow::Context;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// Maximum inbound frame size, matching the server default.
pub const MAX_FRAME_SIZE: usize = 100 * 1024 * 1024;
/// Heartbeat ping interval.
const PING_INTERVAL: Duration = Duration::from_secs(30);
/// Close the connection when no pong arrives within this window.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);
/// TCP connect + WebSocket handshake deadline.
const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection failures classified for the reconnect loop.
#[derive(Debug)]
pub enum DialError {
    Refused,
    Timeout,
    Io(tungstenite::Error),
}

impl std::fmt::Display for DialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Refused => write!(f, "connection refused"),
            Self::Timeout => write!(f, "connection timed out"),
            Self::Io(e) => write!(f, "connection error: {e}"),
        }
    }
}

impl std::error::Error for DialError {}

/// Clone-able handle for queueing whole text frames.
#[derive(Clone)]
pub struct Outbound {
    tx: mpsc::Sender<String>,
}

impl Outbound {
    pub(crate) fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx }
    }

    /// Queue one whole frame. Fails only once the connection is gone.
    pub async fn send(&self, frame: String) -> anyhow::Result<()> {
        self.tx.send(frame).await.map_err(|_| anyhow::anyhow!("transport closed"))
    }

    /// Serialize `value` and queue it as one frame.
    pub async fn send_json<T: Serialize>(&self, value: &T) -> anyhow::Result<()> {
        let frame = serde_json::to_string(value).context("serialize frame")?;
        self.send(frame).await
    }
}

/// An established connection. Dropping it (or the peer closing) ends the
/// io task; `recv` then reports the close.
pub struct Transport {
    outbound: Outbound,
    inbound: mpsc::Receiver<String>,
}

impl Transport {
    pub fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }

    /// Receive the next text frame; `None` means the connection closed.
    pub async fn recv(&mut self) -> Option<String> {
        self.inbound.recv().await
    }
}

/// Dial `ws://host:port` and start the io task.
pub async fn connect(host: &str, port: u16, max_frame_size: usize) -> Result<Transport, DialError> {
    let url = format!("ws://{host}:{port}");
    let ws_config = WebSocketConfig::default()
        .max_message_size(Some(max_frame_size))
        .max_frame_size(Some(max_frame_size));

    let dial = tokio_tungstenite::connect_async_with_config(&url, Some(ws_config), false);
    let (stream, _response) = match tokio::time::timeout(DIAL_TIMEOUT, dial).await {
        Ok(Ok(connected)) => connected,
        Ok(Err(e)) => return Err(classify(e)),
        Err(_) => return Err(DialError::Timeout),
    };

    let (out_tx, out_rx) = mpsc::channel(64);
    let (in_tx, in_rx) = mpsc::channel(64);
    tokio::spawn(io_loop(stream, out_rx, in_tx));

    Ok(Transport { outbound: Outbound::new(out_tx), inbound: in_rx })
}

fn classify(error: tungstenite::Error) -> DialError {
    match error {
        tungstenite::Error::Io(io) if io.kind() == std::io::ErrorKind::ConnectionRefused => {
            DialError::Refused
        }
        tungstenite::Error::Io(io) if io.kind() == std::io::ErrorKind::TimedOut => {
            DialError::Timeout
        }
        other => DialError::Io(other),
    }
}

/// Single owner of the socket: serializes writes, forwards reads, and
/// enforces the heartbeat.
async fn io_loop(
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut out_rx: mpsc::Receiver<String>,
    in_tx: mpsc::Sender<String>,
) {
    let (mut write, mut read) = stream.split();
    let mut ping = tokio::time::interval(PING_INTERVAL);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ping.tick().await; // the first tick fires immediately
    let mut last_pong = tokio::time::Instant::now();

    loop {
        tokio::select! {
            frame = out_rx.recv() => {
                match frame {
                    Some(text) => {
                        if write.send(Message::Text(text.into())).await.is_err() {
                            debug!("websocket write failed");
                            break;
                        }
                    }
                    // Every Outbound handle is gone: close cleanly.
                    None => {
                        let _ = write.close().await;
                        break;
                    }
                }
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if in_tx.send(text.to_string()).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        if write.send(Message::Pong(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = tokio::time::Instant::now();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("websocket closed by peer");
                        break;
                    }
                    Some(Err(e)) => {
                        debug!(err = %e, "websocket read error");
                        break;
                    }
                    _ => {} // binary/raw frames ignored
                }
            }

            _ = ping.tick() => {
                if last_pong.elapsed() > PONG_TIMEOUT {
                    debug!("heartbeat pong overdue, closing");
                    break;
                }
                if write.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }
    // Dropping in_tx surfaces the close to `recv`; dropping out_rx makes
    // every later producer send fail, which is how detached jobs learn
    // the connection is gone.
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
