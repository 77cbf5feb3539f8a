//! Facility model (courts, pools, gyms, fields).

use clubpulse_core::facility::FacilityStatus;
use clubpulse_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Facility {
    pub id: DbId,
    pub tenant_id: String,
    pub name: String,
    pub facility_type: String,
    pub status: String,
    pub capacity: i32,
    pub hourly_rate_cents: i64,
    pub hours_of_operation: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Facility {
    /// Parsed status; unknown stored values read as `closed`.
    pub fn status(&self) -> FacilityStatus {
        self.status.parse().unwrap_or(FacilityStatus::Closed)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateFacility {
    pub name: String,
    pub facility_type: String,
    pub capacity: Option<i32>,
    pub hourly_rate_cents: Option<i64>,
    pub hours_of_operation: Option<serde_json::Value>,
}
