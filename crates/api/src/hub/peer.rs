//! Per-connection reader and writer tasks.
//!
//! The reader turns client frames into hub commands and enforces the pong
//! deadline. The writer drains the peer's send buffer, coalescing queued
//! messages into newline-delimited frames, and pings every [`PING_PERIOD`].

use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use clubpulse_core::types::{DbId, TenantId};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::registry::{HubHandle, PeerCommand, PeerId, PeerRegistration};

/// Deadline for a single socket write.
pub const WRITE_WAIT: Duration = Duration::from_secs(10);
/// Read deadline, reset by every pong.
pub const PONG_WAIT: Duration = Duration::from_secs(60);
/// Must be shorter than [`PONG_WAIT`].
pub const PING_PERIOD: Duration = Duration::from_secs(54);
/// Largest client message accepted.
pub const MAX_MESSAGE_SIZE: usize = 512;

/// Coalescing stops once a frame reaches this size.
const MAX_FRAME_BYTES: usize = 64 * 1024;
const MAX_TOPIC_LEN: usize = 128;

/// Client-to-server control message:
/// `{"action": "subscribe" | "unsubscribe", "targets": ["facility:<id>", ...]}`.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientCommand {
    Subscribe { targets: Vec<String> },
    Unsubscribe { targets: Vec<String> },
}

impl ClientCommand {
    pub fn parse(text: &str) -> Result<Self, String> {
        let command: Self = serde_json::from_str(text).map_err(|e| e.to_string())?;
        let targets = command.targets();
        if targets.is_empty() {
            return Err("targets must not be empty".into());
        }
        if let Some(bad) = targets
            .iter()
            .find(|t| t.is_empty() || t.len() > MAX_TOPIC_LEN)
        {
            return Err(format!("topic '{bad}' must be 1..={MAX_TOPIC_LEN} bytes"));
        }
        Ok(command)
    }

    fn targets(&self) -> &[String] {
        match self {
            Self::Subscribe { targets } | Self::Unsubscribe { targets } => targets,
        }
    }

    /// One hub command per target, in request order.
    fn into_peer_commands(self, peer: PeerId) -> Vec<PeerCommand> {
        match self {
            Self::Subscribe { targets } => targets
                .into_iter()
                .map(|topic| PeerCommand::Subscribe { peer, topic })
                .collect(),
            Self::Unsubscribe { targets } => targets
                .into_iter()
                .map(|topic| PeerCommand::Unsubscribe { peer, topic })
                .collect(),
        }
    }
}

/// Run one WebSocket connection to completion.
pub async fn serve(socket: WebSocket, hub: HubHandle, tenant_id: TenantId, user_id: DbId) {
    let id = hub.next_peer_id();
    let (tx, rx) = mpsc::channel(hub.send_buffer());

    let registration = PeerRegistration {
        id,
        tenant_id: tenant_id.clone(),
        user_id,
        sender: tx,
    };
    if hub.register(registration).await.is_err() {
        tracing::debug!(peer_id = id, "Hub closed, refusing WebSocket");
        return;
    }
    tracing::info!(peer_id = id, tenant_id = %tenant_id, user_id = %user_id, "WebSocket connected");

    let (sink, stream) = socket.split();
    let stop = CancellationToken::new();
    let mut writer = tokio::spawn(write_loop(sink, rx, stop.clone()));

    read_loop(stream, &hub, id, &stop).await;

    stop.cancel();
    hub.unregister(id).await;
    if tokio::time::timeout(WRITE_WAIT, &mut writer).await.is_err() {
        tracing::warn!(peer_id = id, "Writer did not stop in time");
        writer.abort();
    }
    tracing::info!(peer_id = id, "WebSocket disconnected");
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    hub: &HubHandle,
    id: PeerId,
    stop: &CancellationToken,
) {
    let mut deadline = Instant::now() + PONG_WAIT;
    loop {
        let next = tokio::select! {
            _ = stop.cancelled() => break,
            next = tokio::time::timeout_at(deadline, stream.next()) => next,
        };
        let message = match next {
            Err(_) => {
                tracing::debug!(peer_id = id, "Pong deadline passed");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!(peer_id = id, error = %e, "WebSocket receive error");
                break;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Pong(_) => deadline = Instant::now() + PONG_WAIT,
            Message::Text(text) => {
                if text.len() > MAX_MESSAGE_SIZE {
                    tracing::debug!(peer_id = id, size = text.len(), "Client message too large");
                    break;
                }
                let commands = match ClientCommand::parse(text.as_str()) {
                    Ok(command) => command.into_peer_commands(id),
                    Err(e) => {
                        tracing::debug!(peer_id = id, error = %e, "Ignoring client message");
                        continue;
                    }
                };
                for command in commands {
                    if hub.command(command).await.is_err() {
                        return;
                    }
                }
            }
            Message::Close(_) => break,
            Message::Binary(_) | Message::Ping(_) => {}
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<String>,
    stop: CancellationToken,
) {
    let mut ping = tokio::time::interval_at(Instant::now() + PING_PERIOD, PING_PERIOD);
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            queued = rx.recv() => match queued {
                Some(first) => {
                    let frame = coalesce(first, &mut rx);
                    if !write(&mut sink, Message::Text(frame.into())).await {
                        break;
                    }
                }
                None => {
                    // The hub dropped this peer.
                    let _ = write(&mut sink, Message::Close(None)).await;
                    break;
                }
            },
            _ = ping.tick() => {
                if !write(&mut sink, Message::Ping(Bytes::new())).await {
                    break;
                }
            }
        }
    }
    stop.cancel();
}

async fn write(sink: &mut SplitSink<WebSocket, Message>, message: Message) -> bool {
    matches!(
        tokio::time::timeout(WRITE_WAIT, sink.send(message)).await,
        Ok(Ok(()))
    )
}

/// Join `first` with whatever else is already queued, newline-separated.
fn coalesce(first: String, rx: &mut mpsc::Receiver<String>) -> String {
    let mut frame = first;
    while frame.len() < MAX_FRAME_BYTES {
        match rx.try_recv() {
            Ok(next) => {
                frame.push('\n');
                frame.push_str(&next);
            }
            Err(_) => break,
        }
    }
    frame
}
