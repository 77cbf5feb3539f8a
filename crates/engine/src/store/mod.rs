//! Storage capabilities used by the engine services.
//!
//! The services hold `Arc<dyn _>` handles to these traits. [`PgStore`]
//! implements all of them over the `clubpulse-db` repositories;
//! [`MemoryStore`] implements them in-process for tests and local runs.
//! Row types are the `clubpulse-db` models on both sides.

use async_trait::async_trait;
use clubpulse_core::facility::FacilityStatus;
use clubpulse_core::maintenance::MaintenanceStatus;
use clubpulse_core::types::{DbId, Timestamp};
use clubpulse_db::models::access_log::{AccessLog, NewAccessLog};
use clubpulse_db::models::audit::{AuditEntry, AuditLogPage, AuditQuery};
use clubpulse_db::models::booking::{Booking, CancelOutcome, NewBooking};
use clubpulse_db::models::facility::{CreateFacility, Facility};
use clubpulse_db::models::maintenance::{MaintenanceWindow, NewMaintenanceWindow};
use clubpulse_db::models::membership::{CreateMembership, Membership};
use clubpulse_db::models::user::{CreateUser, User};

use crate::error::{ConflictReason, EngineError};

pub mod memory;
pub mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// The range intersects an active row of the same kind, or a concurrent
    /// transaction won the serialization race for it.
    #[error("Range overlaps an existing reservation")]
    Overlap,

    #[error("Range overlaps a maintenance window")]
    MaintenanceOverlap,

    #[error("Duplicate key")]
    Duplicate,

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage error: {0}")]
    Other(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if clubpulse_db::is_serialization_failure(&err) || clubpulse_db::is_exclusion_violation(&err)
        {
            Self::Overlap
        } else if clubpulse_db::is_unique_violation(&err) {
            Self::Duplicate
        } else if clubpulse_db::is_transient(&err) {
            Self::Unavailable(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Overlap => EngineError::Conflict(ConflictReason::Overlap),
            StoreError::MaintenanceOverlap => EngineError::MaintenanceBusy,
            StoreError::Duplicate => EngineError::InvalidState(err.to_string()),
            StoreError::Unavailable(msg) => EngineError::Unavailable(msg),
            StoreError::Other(msg) => EngineError::Internal(msg),
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

#[async_trait]
pub trait FacilityStore: Send + Sync {
    async fn create_facility(
        &self,
        tenant_id: &str,
        id: DbId,
        input: &CreateFacility,
    ) -> Result<Facility, StoreError>;

    async fn find_facility(&self, tenant_id: &str, id: DbId)
        -> Result<Option<Facility>, StoreError>;

    async fn list_facilities(&self, tenant_id: &str) -> Result<Vec<Facility>, StoreError>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Insert atomically with the overlap probes.
    ///
    /// Fails with [`StoreError::Overlap`] or [`StoreError::MaintenanceOverlap`]
    /// when the range is taken.
    async fn insert_booking(&self, input: &NewBooking) -> Result<Booking, StoreError>;

    async fn find_booking(&self, tenant_id: &str, id: DbId) -> Result<Option<Booking>, StoreError>;

    async fn cancel_booking(
        &self,
        tenant_id: &str,
        id: DbId,
    ) -> Result<Option<CancelOutcome>, StoreError>;

    async fn list_active_bookings(
        &self,
        tenant_id: &str,
        facility_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<Booking>, StoreError>;
}

#[async_trait]
pub trait MaintenanceStore: Send + Sync {
    /// Fails with [`StoreError::Overlap`] if a non-cancelled window intersects.
    async fn insert_window(&self, input: &NewMaintenanceWindow)
        -> Result<MaintenanceWindow, StoreError>;

    async fn find_window(
        &self,
        tenant_id: &str,
        id: DbId,
    ) -> Result<Option<MaintenanceWindow>, StoreError>;

    async fn list_blocking_windows(
        &self,
        tenant_id: &str,
        facility_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<MaintenanceWindow>, StoreError>;

    /// Conditional status change, optionally flipping the facility status in
    /// the same transaction. `None` if the window was not in `from`.
    async fn transition_window(
        &self,
        tenant_id: &str,
        id: DbId,
        from: MaintenanceStatus,
        to: MaintenanceStatus,
        facility_status: Option<FacilityStatus>,
    ) -> Result<Option<MaintenanceWindow>, StoreError>;

    /// Windows across all tenants whose next boundary has passed.
    async fn list_due_windows(
        &self,
        status: MaintenanceStatus,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<MaintenanceWindow>, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(
        &self,
        tenant_id: &str,
        id: DbId,
        input: &CreateUser,
    ) -> Result<User, StoreError>;

    async fn find_user(&self, tenant_id: &str, id: DbId) -> Result<Option<User>, StoreError>;
}

#[async_trait]
pub trait AccessStore: Send + Sync {
    async fn create_membership(
        &self,
        tenant_id: &str,
        id: DbId,
        input: &CreateMembership,
    ) -> Result<Membership, StoreError>;

    async fn find_access_log_by_event(
        &self,
        tenant_id: &str,
        event_id: &str,
    ) -> Result<Option<AccessLog>, StoreError>;

    async fn list_memberships(
        &self,
        tenant_id: &str,
        user_id: DbId,
    ) -> Result<Vec<Membership>, StoreError>;

    /// Insert, or return the row already stored under the same event id.
    async fn insert_access_log(&self, input: &NewAccessLog) -> Result<AccessLog, StoreError>;

    async fn list_access_logs(
        &self,
        tenant_id: &str,
        user_id: Option<DbId>,
        limit: i64,
    ) -> Result<Vec<AccessLog>, StoreError>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append entries. Duplicate ids are stored again.
    async fn bulk_insert(&self, entries: &[AuditEntry]) -> Result<u64, StoreError>;

    async fn query_audit(
        &self,
        tenant_id: &str,
        params: &AuditQuery,
    ) -> Result<AuditLogPage, StoreError>;
}

/// Every capability, for wiring a single backend into all services.
pub trait Store:
    FacilityStore + BookingStore + MaintenanceStore + UserStore + AccessStore + AuditStore
{
}

impl<T> Store for T where
    T: FacilityStore + BookingStore + MaintenanceStore + UserStore + AccessStore + AuditStore
{
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn pool_timeout_is_unavailable() {
        assert_matches!(
            StoreError::from(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        );
    }

    #[test]
    fn row_not_found_is_other() {
        assert_matches!(
            StoreError::from(sqlx::Error::RowNotFound),
            StoreError::Other(_)
        );
    }

    #[test]
    fn overlap_maps_to_conflict() {
        assert_eq!(
            EngineError::from(StoreError::Overlap),
            EngineError::Conflict(ConflictReason::Overlap)
        );
        assert_eq!(
            EngineError::from(StoreError::MaintenanceOverlap),
            EngineError::MaintenanceBusy
        );
    }
}
