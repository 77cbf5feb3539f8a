//! Access log model. Immutable once written (no `updated_at`).

use clubpulse_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct AccessLog {
    pub id: DbId,
    pub tenant_id: String,
    pub event_id: Option<String>,
    pub user_id: DbId,
    pub facility_id: Option<DbId>,
    pub direction: String,
    #[sqlx(rename = "status")]
    pub decision: String,
    pub reason: String,
    pub at: Timestamp,
}

#[derive(Debug, Clone)]
pub struct NewAccessLog {
    pub id: DbId,
    pub tenant_id: String,
    pub event_id: Option<String>,
    pub user_id: DbId,
    pub facility_id: Option<DbId>,
    pub direction: String,
    pub decision: String,
    pub reason: String,
    pub at: Timestamp,
}
