//! Maintenance window model.

use clubpulse_core::maintenance::MaintenanceStatus;
use clubpulse_core::slot::SlotRange;
use clubpulse_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct MaintenanceWindow {
    pub id: DbId,
    pub tenant_id: String,
    pub facility_id: DbId,
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
    pub kind: String,
    pub status: String,
    pub description: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl MaintenanceWindow {
    /// Parsed status; unknown stored values read as `scheduled` so they keep
    /// blocking bookings.
    pub fn status(&self) -> MaintenanceStatus {
        self.status.parse().unwrap_or(MaintenanceStatus::Scheduled)
    }

    pub fn overlaps(&self, range: &SlotRange) -> bool {
        range.overlaps_raw(self.starts_at, self.ends_at)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMaintenanceWindow {
    pub facility_id: DbId,
    pub starts_at: Timestamp,
    pub ends_at: Timestamp,
    pub kind: String,
    pub description: Option<String>,
}

/// Insert DTO with server-assigned fields filled in.
#[derive(Debug, Clone)]
pub struct NewMaintenanceWindow {
    pub id: DbId,
    pub tenant_id: String,
    pub facility_id: DbId,
    pub range: SlotRange,
    pub kind: String,
    pub description: Option<String>,
    pub created_at: Timestamp,
}
