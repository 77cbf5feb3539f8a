//! Cluster bus to hub bridge.
//!
//! Subscribes to the booking and maintenance channels and forwards every
//! message to this node's hub. A dropped subscription is re-established
//! with exponential backoff until the token is cancelled.

use std::sync::Arc;
use std::time::Duration;

use clubpulse_core::channels::{CHANNEL_BOOKINGS, CHANNEL_MAINTENANCE};
use clubpulse_core::clock::Clock;
use clubpulse_core::types::DbId;
use clubpulse_events::HubFrame;
use clubpulse_kv::{KvMessage, KvStore};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::registry::{Broadcast, HubHandle, Unicast};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Doubling reconnect delay, capped at [`MAX_BACKOFF`].
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    initial: Duration,
    max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(INITIAL_BACKOFF, MAX_BACKOFF)
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            current: initial,
            initial,
            max,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

/// Run the bridge until `cancel` fires.
pub async fn run(
    kv: Arc<dyn KvStore>,
    hub: HubHandle,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) {
    run_with_backoff(kv, hub, clock, cancel, Backoff::default()).await;
}

pub async fn run_with_backoff(
    kv: Arc<dyn KvStore>,
    hub: HubHandle,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    mut backoff: Backoff,
) {
    tracing::info!("Event bridge started");

    'outer: loop {
        let subscription = tokio::select! {
            _ = cancel.cancelled() => break 'outer,
            result = kv.subscribe(&[CHANNEL_BOOKINGS, CHANNEL_MAINTENANCE]) => result,
        };

        match subscription {
            Ok(mut messages) => {
                tracing::info!("Event bridge subscribed");
                backoff.reset();
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break 'outer,
                        next = messages.next() => match next {
                            Some(message) => forward(&hub, clock.as_ref(), &message),
                            None => {
                                tracing::warn!("Event bridge subscription ended");
                                break;
                            }
                        },
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Event bridge failed to subscribe"),
        }

        let delay = backoff.next_delay();
        tracing::debug!(delay_ms = delay.as_millis() as u64, "Event bridge reconnecting");
        tokio::select! {
            _ = cancel.cancelled() => break 'outer,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    tracing::info!("Event bridge stopped");
}

/// Fan one bus message out to the hub.
///
/// Facility events go to that facility's topic subscribers. An event naming
/// a user also reaches that user's other devices.
fn forward(hub: &HubHandle, clock: &dyn Clock, message: &KvMessage) {
    let routed = match HubFrame::from_bus_message(&message.payload, clock.now()) {
        Ok(routed) => routed,
        Err(e) => {
            tracing::warn!(channel = %message.channel, error = %e, "Dropping malformed bus message");
            return;
        }
    };

    let user_id = routed
        .frame
        .payload
        .get("user_id")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<DbId>().ok());
    let payload = routed.frame.to_json();

    hub.broadcast(Broadcast {
        tenant_id: routed.tenant_id.clone(),
        topic: routed.topic.clone(),
        payload: payload.clone(),
        exclude: None,
    });

    if let Some(user_id) = user_id {
        hub.unicast(Unicast {
            tenant_id: routed.tenant_id,
            user_id,
            payload,
            skip_topic: routed.topic,
        });
    }
}
