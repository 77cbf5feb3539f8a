//! Cluster pub/sub envelope.
//!
//! Engine services publish [`BusEvent`]s through an [`EventPublisher`]; every
//! API node runs a bridge that subscribes to the same channels and turns each
//! message into a [`HubFrame`] for its connected WebSocket peers.

use std::sync::Arc;

use clubpulse_core::channels::{channel_for, facility_topic};
use clubpulse_core::slot::SlotRange;
use clubpulse_core::types::{DbId, TenantId, Timestamp};
use clubpulse_kv::{KvError, KvStore};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// BusEvent
// ---------------------------------------------------------------------------

/// A slot or maintenance event travelling on `clubpulse:*` channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEvent {
    /// Dot-separated event name, e.g. `"slot.released"`.
    #[serde(rename = "type")]
    pub event_type: String,

    pub tenant_id: TenantId,

    pub facility_id: DbId,

    pub start_time: Timestamp,

    pub end_time: Timestamp,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<DbId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    pub timestamp: Timestamp,
}

impl BusEvent {
    pub fn new(
        event_type: impl Into<String>,
        tenant_id: impl Into<TenantId>,
        facility_id: DbId,
        range: SlotRange,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            tenant_id: tenant_id.into(),
            facility_id,
            start_time: range.start,
            end_time: range.end,
            user_id: None,
            message: None,
            timestamp,
        }
    }

    pub fn with_user(mut self, user_id: DbId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// The pub/sub channel this event travels on.
    pub fn channel(&self) -> &'static str {
        channel_for(&self.event_type)
    }
}

// ---------------------------------------------------------------------------
// EventPublisher
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Kv(#[from] KvError),
}

/// Publishes [`BusEvent`]s onto the KV pub/sub channels.
#[derive(Clone)]
pub struct EventPublisher {
    kv: Arc<dyn KvStore>,
}

impl EventPublisher {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Publish one event. Returns the number of nodes that received it.
    pub async fn publish(&self, event: &BusEvent) -> Result<usize, PublishError> {
        let payload = serde_json::to_string(event)?;
        let receivers = self.kv.publish(event.channel(), &payload).await?;
        tracing::debug!(
            event_type = %event.event_type,
            tenant_id = %event.tenant_id,
            facility_id = %event.facility_id,
            receivers,
            "Bus event published"
        );
        Ok(receivers)
    }
}

// ---------------------------------------------------------------------------
// HubFrame
// ---------------------------------------------------------------------------

/// Server-to-client WebSocket frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub payload: serde_json::Value,
    pub timestamp: Timestamp,
}

/// A frame decoded from the bus plus the routing keys found in it.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedFrame {
    pub tenant_id: Option<TenantId>,
    /// `facility:{id}` when the message names a facility.
    pub topic: Option<String>,
    pub frame: HubFrame,
}

impl HubFrame {
    pub fn new(frame_type: impl Into<String>, payload: serde_json::Value, timestamp: Timestamp) -> Self {
        Self {
            frame_type: frame_type.into(),
            payload,
            timestamp,
        }
    }

    /// Wrap a raw pub/sub message.
    ///
    /// Any JSON object is accepted; a missing `type` becomes `"message"`, and
    /// `facility_id` / `tenant_id` are extracted for routing when present.
    pub fn from_bus_message(raw: &str, now: Timestamp) -> Result<RoutedFrame, serde_json::Error> {
        let payload: serde_json::Value = serde_json::from_str(raw)?;

        let frame_type = payload
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("message")
            .to_string();
        let tenant_id = payload
            .get("tenant_id")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let topic = payload
            .get("facility_id")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<DbId>().ok())
            .map(facility_topic);

        Ok(RoutedFrame {
            tenant_id,
            topic,
            frame: HubFrame::new(frame_type, payload, now),
        })
    }

    pub fn to_json(&self) -> String {
        // Serializing a Value-backed struct cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use clubpulse_core::channels::{
        CHANNEL_BOOKINGS, CHANNEL_MAINTENANCE, EVENT_MAINTENANCE_START, EVENT_SLOT_RELEASED,
    };
    use clubpulse_kv::MemoryKv;
    use futures::StreamExt;

    use super::*;

    fn range() -> SlotRange {
        SlotRange::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 15, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 1, 16, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn bus_event_wire_shape() {
        let facility = DbId::new_v4();
        let event = BusEvent::new(EVENT_SLOT_RELEASED, "club-a", facility, range(), Utc::now());
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "slot.released");
        assert_eq!(json["facility_id"], facility.to_string());
        assert_eq!(json["tenant_id"], "club-a");
        assert!(json.get("start_time").is_some());
        assert!(json.get("user_id").is_none());
        assert!(json.get("message").is_none());
    }

    #[tokio::test]
    async fn publisher_routes_by_event_type() {
        let kv = Arc::new(MemoryKv::new());
        let mut bookings = kv.subscribe(&[CHANNEL_BOOKINGS]).await.unwrap();
        let mut maintenance = kv.subscribe(&[CHANNEL_MAINTENANCE]).await.unwrap();
        let publisher = EventPublisher::new(kv.clone());
        let facility = DbId::new_v4();

        publisher
            .publish(&BusEvent::new(EVENT_SLOT_RELEASED, "t", facility, range(), Utc::now()))
            .await
            .unwrap();
        publisher
            .publish(&BusEvent::new(EVENT_MAINTENANCE_START, "t", facility, range(), Utc::now()))
            .await
            .unwrap();

        let msg = bookings.next().await.unwrap();
        assert!(msg.payload.contains("slot.released"));
        let msg = maintenance.next().await.unwrap();
        assert!(msg.payload.contains("maintenance.start"));
    }

    #[test]
    fn frame_from_bus_message_extracts_routing() {
        let facility = DbId::new_v4();
        let event = BusEvent::new(EVENT_SLOT_RELEASED, "club-a", facility, range(), Utc::now())
            .with_user(DbId::new_v4());
        let raw = serde_json::to_string(&event).unwrap();

        let routed = HubFrame::from_bus_message(&raw, Utc::now()).unwrap();
        assert_eq!(routed.tenant_id.as_deref(), Some("club-a"));
        assert_eq!(routed.topic, Some(facility_topic(facility)));
        assert_eq!(routed.frame.frame_type, "slot.released");
        assert_eq!(routed.frame.payload["facility_id"], facility.to_string());
    }

    #[test]
    fn frame_without_facility_is_global() {
        let routed = HubFrame::from_bus_message(r#"{"message":"hi"}"#, Utc::now()).unwrap();
        assert_eq!(routed.topic, None);
        assert_eq!(routed.tenant_id, None);
        assert_eq!(routed.frame.frame_type, "message");
    }

    #[test]
    fn malformed_bus_message_is_rejected() {
        assert!(HubFrame::from_bus_message("not json", Utc::now()).is_err());
    }
}
