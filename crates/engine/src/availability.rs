//! Read-only availability view for a facility.
//!
//! Lock probes fail open, so a KV outage shows held slots as free; the
//! lock acquire and the commit transaction remain the real gates.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use clubpulse_core::slot::SlotRange;
use clubpulse_core::types::{DbId, Timestamp};
use clubpulse_db::models::booking::Booking;
use clubpulse_db::models::maintenance::MaintenanceWindow;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::cancel::cancellable;
use crate::error::EngineError;
use crate::lock::SlotLockService;
use crate::store::{BookingStore, FacilityStore, MaintenanceStore};

/// Upper bound on slots returned by one query.
pub const MAX_SLOTS: i64 = 96;

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityQuery {
    pub start: Timestamp,
    pub end: Timestamp,
    /// Split the range into slots of this length. Absent means one slot.
    #[serde(default)]
    pub slot_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotAvailability {
    pub start: Timestamp,
    pub end: Timestamp,
    pub booked: bool,
    pub maintenance: bool,
    pub locked: bool,
}

impl SlotAvailability {
    pub fn is_free(&self) -> bool {
        !(self.booked || self.maintenance || self.locked)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Availability {
    pub facility_id: DbId,
    pub bookings: Vec<Booking>,
    pub maintenance: Vec<MaintenanceWindow>,
    pub slots: Vec<SlotAvailability>,
}

pub struct AvailabilityService {
    locks: Arc<SlotLockService>,
    facilities: Arc<dyn FacilityStore>,
    bookings: Arc<dyn BookingStore>,
    windows: Arc<dyn MaintenanceStore>,
}

impl AvailabilityService {
    pub fn new(
        locks: Arc<SlotLockService>,
        facilities: Arc<dyn FacilityStore>,
        bookings: Arc<dyn BookingStore>,
        windows: Arc<dyn MaintenanceStore>,
    ) -> Self {
        Self {
            locks,
            facilities,
            bookings,
            windows,
        }
    }

    pub async fn query(
        &self,
        tenant_id: &str,
        facility_id: DbId,
        query: AvailabilityQuery,
        cancel: &CancellationToken,
    ) -> Result<Availability, EngineError> {
        let range = SlotRange::new(query.start, query.end)?;
        let slots = split(range, query.slot_minutes)?;

        cancellable(cancel, self.facilities.find_facility(tenant_id, facility_id))
            .await?
            .ok_or_else(|| EngineError::not_found("Facility", facility_id))?;

        let bookings = cancellable(
            cancel,
            self.bookings
                .list_active_bookings(tenant_id, facility_id, range.start, range.end),
        )
        .await?;
        let maintenance = cancellable(
            cancel,
            self.windows
                .list_blocking_windows(tenant_id, facility_id, range.start, range.end),
        )
        .await?;

        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            let booked = bookings.iter().any(|b| b.overlaps(&slot));
            let blocked = maintenance.iter().any(|w| w.overlaps(&slot));
            let locked = self
                .locks
                .is_locked(tenant_id, facility_id, slot, cancel)
                .await;
            out.push(SlotAvailability {
                start: slot.start,
                end: slot.end,
                booked,
                maintenance: blocked,
                locked,
            });
        }

        Ok(Availability {
            facility_id,
            bookings,
            maintenance,
            slots: out,
        })
    }
}

fn split(range: SlotRange, slot_minutes: Option<i64>) -> Result<Vec<SlotRange>, EngineError> {
    let Some(minutes) = slot_minutes else {
        return Ok(vec![range]);
    };
    if minutes <= 0 {
        return Err(EngineError::Validation("slot_minutes must be positive".into()));
    }

    let step = ChronoDuration::minutes(minutes);
    let total = (range.end - range.start).num_minutes();
    if total / minutes > MAX_SLOTS {
        return Err(EngineError::Validation(format!(
            "Range covers more than {MAX_SLOTS} slots"
        )));
    }

    let mut slots = Vec::new();
    let mut start = range.start;
    while start + step <= range.end {
        slots.push(SlotRange {
            start,
            end: start + step,
        });
        start += step;
    }
    Ok(slots)
}
