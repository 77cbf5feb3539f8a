//! Membership model. Only `status` and the outstanding balance affect
//! access decisions; billing owns the rest.

use clubpulse_core::access::MembershipSnapshot;
use clubpulse_core::membership::MembershipStatus;
use clubpulse_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Membership {
    pub id: DbId,
    pub tenant_id: String,
    pub user_id: DbId,
    pub tier_id: Option<DbId>,
    pub status: String,
    pub outstanding_balance_cents: i64,
    pub next_billing_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Membership {
    /// Unknown stored statuses read as `inactive`, which never grants entry.
    pub fn snapshot(&self) -> MembershipSnapshot {
        MembershipSnapshot {
            status: self.status.parse().unwrap_or(MembershipStatus::Inactive),
            outstanding_balance_cents: self.outstanding_balance_cents,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateMembership {
    pub user_id: DbId,
    pub tier_id: Option<DbId>,
    pub status: Option<String>,
    pub outstanding_balance_cents: Option<i64>,
    pub next_billing_at: Option<Timestamp>,
}
