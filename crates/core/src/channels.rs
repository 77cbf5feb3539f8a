//! Well-known pub/sub channel, event type, and hub topic names.
//!
//! Channel names are shared with every node in the cluster; changing one
//! is a wire-protocol change.

use crate::types::DbId;

/// Cluster pub/sub channel for booking and slot events.
pub const CHANNEL_BOOKINGS: &str = "clubpulse:bookings";

/// Cluster pub/sub channel for maintenance events.
pub const CHANNEL_MAINTENANCE: &str = "clubpulse:maintenance";

pub const EVENT_BOOKING_CREATED: &str = "booking.created";
pub const EVENT_BOOKING_CANCELLED: &str = "booking.cancelled";
pub const EVENT_SLOT_RELEASED: &str = "slot.released";
pub const EVENT_SLOT_AVAILABLE: &str = "slot.available";
pub const EVENT_MAINTENANCE_START: &str = "maintenance.start";
pub const EVENT_MAINTENANCE_END: &str = "maintenance.end";

/// Pick the pub/sub channel an event type travels on.
pub fn channel_for(event_type: &str) -> &'static str {
    if event_type.starts_with("maintenance.") {
        CHANNEL_MAINTENANCE
    } else {
        CHANNEL_BOOKINGS
    }
}

/// Hub topic that clients subscribe to for one facility's events.
pub fn facility_topic(facility_id: DbId) -> String {
    format!("facility:{facility_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maintenance_events_use_maintenance_channel() {
        assert_eq!(channel_for(EVENT_MAINTENANCE_START), CHANNEL_MAINTENANCE);
        assert_eq!(channel_for(EVENT_MAINTENANCE_END), CHANNEL_MAINTENANCE);
        assert_eq!(channel_for(EVENT_SLOT_RELEASED), CHANNEL_BOOKINGS);
        assert_eq!(channel_for(EVENT_BOOKING_CREATED), CHANNEL_BOOKINGS);
    }

    #[test]
    fn facility_topic_format() {
        let id = DbId::nil();
        assert_eq!(
            facility_topic(id),
            "facility:00000000-0000-0000-0000-000000000000"
        );
    }
}
