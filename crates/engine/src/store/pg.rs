//! PostgreSQL-backed store over the `clubpulse-db` repositories.

use async_trait::async_trait;
use clubpulse_core::facility::FacilityStatus;
use clubpulse_core::maintenance::MaintenanceStatus;
use clubpulse_core::types::{DbId, Timestamp};
use clubpulse_db::models::access_log::{AccessLog, NewAccessLog};
use clubpulse_db::models::audit::{AuditEntry, AuditLogPage, AuditQuery};
use clubpulse_db::models::booking::{Booking, CancelOutcome, CheckedInsert, NewBooking};
use clubpulse_db::models::facility::{CreateFacility, Facility};
use clubpulse_db::models::maintenance::{MaintenanceWindow, NewMaintenanceWindow};
use clubpulse_db::models::membership::{CreateMembership, Membership};
use clubpulse_db::models::user::{CreateUser, User};
use clubpulse_db::repositories::{
    AccessLogRepo, AuditLogRepo, BookingRepo, FacilityRepo, MaintenanceWindowRepo,
    MembershipRepo, UserRepo,
};
use clubpulse_db::DbPool;

use super::{
    AccessStore, AuditStore, BookingStore, FacilityStore, MaintenanceStore, StoreError, UserStore,
};

#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

#[async_trait]
impl FacilityStore for PgStore {
    async fn create_facility(
        &self,
        tenant_id: &str,
        id: DbId,
        input: &CreateFacility,
    ) -> Result<Facility, StoreError> {
        Ok(FacilityRepo::create(&self.pool, tenant_id, id, input).await?)
    }

    async fn find_facility(
        &self,
        tenant_id: &str,
        id: DbId,
    ) -> Result<Option<Facility>, StoreError> {
        Ok(FacilityRepo::find_by_id(&self.pool, tenant_id, id).await?)
    }

    async fn list_facilities(&self, tenant_id: &str) -> Result<Vec<Facility>, StoreError> {
        Ok(FacilityRepo::list(&self.pool, tenant_id).await?)
    }
}

#[async_trait]
impl BookingStore for PgStore {
    async fn insert_booking(&self, input: &NewBooking) -> Result<Booking, StoreError> {
        match BookingRepo::insert_checked(&self.pool, input).await? {
            CheckedInsert::Inserted(booking) => Ok(booking),
            CheckedInsert::Overlap => Err(StoreError::Overlap),
            CheckedInsert::Maintenance => Err(StoreError::MaintenanceOverlap),
            CheckedInsert::Booked => Err(StoreError::Overlap),
        }
    }

    async fn find_booking(&self, tenant_id: &str, id: DbId) -> Result<Option<Booking>, StoreError> {
        Ok(BookingRepo::find_by_id(&self.pool, tenant_id, id).await?)
    }

    async fn cancel_booking(
        &self,
        tenant_id: &str,
        id: DbId,
    ) -> Result<Option<CancelOutcome>, StoreError> {
        Ok(BookingRepo::cancel(&self.pool, tenant_id, id).await?)
    }

    async fn list_active_bookings(
        &self,
        tenant_id: &str,
        facility_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<Booking>, StoreError> {
        Ok(BookingRepo::list_active_in_range(&self.pool, tenant_id, facility_id, from, to).await?)
    }
}

#[async_trait]
impl MaintenanceStore for PgStore {
    async fn insert_window(
        &self,
        input: &NewMaintenanceWindow,
    ) -> Result<MaintenanceWindow, StoreError> {
        match MaintenanceWindowRepo::insert_checked(&self.pool, input).await? {
            CheckedInsert::Inserted(window) => Ok(window),
            CheckedInsert::Overlap | CheckedInsert::Maintenance | CheckedInsert::Booked => {
                Err(StoreError::Overlap)
            }
        }
    }

    async fn find_window(
        &self,
        tenant_id: &str,
        id: DbId,
    ) -> Result<Option<MaintenanceWindow>, StoreError> {
        Ok(MaintenanceWindowRepo::find_by_id(&self.pool, tenant_id, id).await?)
    }

    async fn list_blocking_windows(
        &self,
        tenant_id: &str,
        facility_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<MaintenanceWindow>, StoreError> {
        Ok(
            MaintenanceWindowRepo::list_blocking_in_range(&self.pool, tenant_id, facility_id, from, to)
                .await?,
        )
    }

    async fn transition_window(
        &self,
        tenant_id: &str,
        id: DbId,
        from: MaintenanceStatus,
        to: MaintenanceStatus,
        facility_status: Option<FacilityStatus>,
    ) -> Result<Option<MaintenanceWindow>, StoreError> {
        Ok(MaintenanceWindowRepo::transition_with_facility(
            &self.pool,
            tenant_id,
            id,
            from,
            to,
            facility_status,
        )
        .await?)
    }

    async fn list_due_windows(
        &self,
        status: MaintenanceStatus,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<MaintenanceWindow>, StoreError> {
        Ok(MaintenanceWindowRepo::list_due(&self.pool, status, now, limit).await?)
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(
        &self,
        tenant_id: &str,
        id: DbId,
        input: &CreateUser,
    ) -> Result<User, StoreError> {
        Ok(UserRepo::create(&self.pool, tenant_id, id, input).await?)
    }

    async fn find_user(&self, tenant_id: &str, id: DbId) -> Result<Option<User>, StoreError> {
        Ok(UserRepo::find_by_id(&self.pool, tenant_id, id).await?)
    }
}

#[async_trait]
impl AccessStore for PgStore {
    async fn create_membership(
        &self,
        tenant_id: &str,
        id: DbId,
        input: &CreateMembership,
    ) -> Result<Membership, StoreError> {
        Ok(MembershipRepo::create(&self.pool, tenant_id, id, input).await?)
    }

    async fn find_access_log_by_event(
        &self,
        tenant_id: &str,
        event_id: &str,
    ) -> Result<Option<AccessLog>, StoreError> {
        Ok(AccessLogRepo::find_by_event_id(&self.pool, tenant_id, event_id).await?)
    }

    async fn list_memberships(
        &self,
        tenant_id: &str,
        user_id: DbId,
    ) -> Result<Vec<Membership>, StoreError> {
        Ok(MembershipRepo::list_for_user(&self.pool, tenant_id, user_id).await?)
    }

    async fn insert_access_log(&self, input: &NewAccessLog) -> Result<AccessLog, StoreError> {
        Ok(AccessLogRepo::insert_idempotent(&self.pool, input).await?)
    }

    async fn list_access_logs(
        &self,
        tenant_id: &str,
        user_id: Option<DbId>,
        limit: i64,
    ) -> Result<Vec<AccessLog>, StoreError> {
        Ok(AccessLogRepo::list_recent(&self.pool, tenant_id, user_id, limit).await?)
    }
}

#[async_trait]
impl AuditStore for PgStore {
    async fn bulk_insert(&self, entries: &[AuditEntry]) -> Result<u64, StoreError> {
        Ok(AuditLogRepo::batch_insert(&self.pool, entries).await?)
    }

    async fn query_audit(
        &self,
        tenant_id: &str,
        params: &AuditQuery,
    ) -> Result<AuditLogPage, StoreError> {
        let items = AuditLogRepo::query(&self.pool, tenant_id, params).await?;
        let total = AuditLogRepo::count(&self.pool, tenant_id, params).await?;
        Ok(AuditLogPage { items, total })
    }
}
