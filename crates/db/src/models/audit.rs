//! Audit trail models.
//!
//! An [`AuditEntry`] is first serialized onto the KV queue and later
//! bulk-inserted into `audit_logs`. The same struct is used on both sides so
//! the queue format and the table stay in lockstep.

use clubpulse_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: DbId,
    pub tenant_id: Option<String>,
    pub principal_id: Option<DbId>,
    pub action: String,
    pub resource: String,
    #[serde(default)]
    pub details_json: serde_json::Value,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub at: Timestamp,
}

/// Filter parameters for querying the durable audit table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditQuery {
    pub principal_id: Option<DbId>,
    pub action: Option<String>,
    pub resource: Option<String>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Paginated response for audit queries.
#[derive(Debug, Clone, Serialize)]
pub struct AuditLogPage {
    pub items: Vec<AuditEntry>,
    pub total: i64,
}
