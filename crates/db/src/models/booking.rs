//! Booking model.
//!
//! A booking exclusively owns `[starts_at, ends_at)` on its facility while
//! its status is `pending` or `confirmed`.

use clubpulse_core::booking::BookingStatus;
use clubpulse_core::slot::SlotRange;
use clubpulse_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Booking {
    pub id: DbId,
    pub tenant_id: String,
    pub facility_id: DbId,
    pub owner_id: DbId,
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Booking {
    /// Parsed status; unknown stored values read as `cancelled` so they never
    /// block a slot.
    pub fn status(&self) -> BookingStatus {
        self.status.parse().unwrap_or(BookingStatus::Cancelled)
    }

    pub fn overlaps(&self, range: &SlotRange) -> bool {
        range.overlaps_raw(self.starts_at, self.ends_at)
    }
}

/// Insert DTO. The id is assigned by the caller so it can be logged before
/// the transaction commits.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub id: DbId,
    pub tenant_id: String,
    pub facility_id: DbId,
    pub owner_id: DbId,
    pub range: SlotRange,
    pub status: BookingStatus,
    pub notes: Option<String>,
    pub created_at: Timestamp,
}

/// Outcome of an insert guarded by the overlap probes.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckedInsert<T> {
    Inserted(T),
    /// An active row of the same kind already covers part of the range.
    Overlap,
    /// A non-cancelled maintenance window covers part of the range.
    Maintenance,
    /// An active booking covers part of the range of a new window.
    Booked,
}

/// Outcome of a cancellation.
#[derive(Debug, Clone, PartialEq)]
pub struct CancelOutcome {
    pub booking: Booking,
    /// `false` when the booking was already cancelled.
    pub changed: bool,
}
