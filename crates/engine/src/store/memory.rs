//! In-process store for tests and single-node development.
//!
//! One mutex guards all tables, so every trait method is atomic; that gives
//! `insert_booking` the same all-or-nothing behaviour as the SERIALIZABLE
//! transaction in PostgreSQL.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use clubpulse_core::booking::BookingStatus;
use clubpulse_core::facility::{FacilityStatus, FacilityType};
use clubpulse_core::maintenance::MaintenanceStatus;
use clubpulse_core::membership::MembershipStatus;
use clubpulse_core::roles::ROLE_MEMBER;
use clubpulse_core::types::{DbId, Timestamp};
use clubpulse_db::models::access_log::{AccessLog, NewAccessLog};
use clubpulse_db::models::audit::{AuditEntry, AuditLogPage, AuditQuery};
use clubpulse_db::models::booking::{Booking, CancelOutcome, NewBooking};
use clubpulse_db::models::facility::{CreateFacility, Facility};
use clubpulse_db::models::maintenance::{MaintenanceWindow, NewMaintenanceWindow};
use clubpulse_db::models::membership::{CreateMembership, Membership};
use clubpulse_db::models::user::{CreateUser, User};

use super::{
    AccessStore, AuditStore, BookingStore, FacilityStore, MaintenanceStore, StoreError, UserStore,
};

const DEFAULT_AUDIT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

#[derive(Default)]
struct Tables {
    facilities: HashMap<DbId, Facility>,
    users: HashMap<DbId, User>,
    bookings: Vec<Booking>,
    windows: Vec<MaintenanceWindow>,
    memberships: Vec<Membership>,
    access_logs: Vec<AccessLog>,
    audit: Vec<AuditEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    fail_memberships: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".into()));
        }
        Ok(self.tables.lock().unwrap_or_else(|p| p.into_inner()))
    }

    fn tables_unchecked(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|p| p.into_inner())
    }

    // -- fault injection ---------------------------------------------------

    /// Fail every capability call with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail only membership reads.
    pub fn set_fail_memberships(&self, fail: bool) {
        self.fail_memberships.store(fail, Ordering::SeqCst);
    }

    // -- seeding -----------------------------------------------------------

    pub fn add_facility(&self, tenant_id: &str, name: &str) -> Facility {
        let input = CreateFacility {
            name: name.to_string(),
            facility_type: FacilityType::Court.as_str().to_string(),
            capacity: Some(4),
            hourly_rate_cents: Some(2_000),
            hours_of_operation: None,
        };
        self.tables_unchecked()
            .insert_facility(tenant_id, DbId::now_v7(), &input)
    }

    pub fn add_user(&self, tenant_id: &str, email: &str) -> User {
        let input = CreateUser {
            email: email.to_string(),
            phone: None,
            full_name: email.split('@').next().unwrap_or(email).to_string(),
            role: None,
        };
        // Seeding bypasses the email uniqueness check.
        let mut tables = self.tables_unchecked();
        let user = Tables::build_user(tenant_id, DbId::now_v7(), &input);
        tables.users.insert(user.id, user.clone());
        user
    }

    pub fn add_membership(
        &self,
        tenant_id: &str,
        user_id: DbId,
        status: MembershipStatus,
        outstanding_balance_cents: i64,
    ) -> Membership {
        let input = CreateMembership {
            user_id,
            tier_id: None,
            status: Some(status.as_str().to_string()),
            outstanding_balance_cents: Some(outstanding_balance_cents),
            next_billing_at: None,
        };
        self.tables_unchecked()
            .insert_membership(tenant_id, DbId::now_v7(), &input)
    }

    // -- inspection --------------------------------------------------------

    pub fn bookings(&self) -> Vec<Booking> {
        self.tables_unchecked().bookings.clone()
    }

    pub fn windows(&self) -> Vec<MaintenanceWindow> {
        self.tables_unchecked().windows.clone()
    }

    pub fn access_logs(&self) -> Vec<AccessLog> {
        self.tables_unchecked().access_logs.clone()
    }

    pub fn audit_entries(&self) -> Vec<AuditEntry> {
        self.tables_unchecked().audit.clone()
    }

    pub fn facility(&self, id: DbId) -> Option<Facility> {
        self.tables_unchecked().facilities.get(&id).cloned()
    }
}

impl Tables {
    fn insert_facility(&mut self, tenant_id: &str, id: DbId, input: &CreateFacility) -> Facility {
        let now = Utc::now();
        let facility = Facility {
            id,
            tenant_id: tenant_id.to_string(),
            name: input.name.clone(),
            facility_type: input.facility_type.clone(),
            status: FacilityStatus::Active.as_str().to_string(),
            capacity: input.capacity.unwrap_or(1),
            hourly_rate_cents: input.hourly_rate_cents.unwrap_or(0),
            hours_of_operation: input
                .hours_of_operation
                .clone()
                .unwrap_or_else(|| serde_json::json!({})),
            created_at: now,
            updated_at: now,
        };
        self.facilities.insert(id, facility.clone());
        facility
    }

    fn build_user(tenant_id: &str, id: DbId, input: &CreateUser) -> User {
        let now = Utc::now();
        User {
            id,
            tenant_id: tenant_id.to_string(),
            email: input.email.clone(),
            phone: input.phone.clone(),
            full_name: input.full_name.clone(),
            role: input.role.clone().unwrap_or_else(|| ROLE_MEMBER.to_string()),
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn insert_membership(
        &mut self,
        tenant_id: &str,
        id: DbId,
        input: &CreateMembership,
    ) -> Membership {
        let now = Utc::now();
        let membership = Membership {
            id,
            tenant_id: tenant_id.to_string(),
            user_id: input.user_id,
            tier_id: input.tier_id,
            status: input
                .status
                .clone()
                .unwrap_or_else(|| MembershipStatus::Pending.as_str().to_string()),
            outstanding_balance_cents: input.outstanding_balance_cents.unwrap_or(0),
            next_billing_at: input.next_billing_at,
            created_at: now,
            updated_at: now,
        };
        self.memberships.push(membership.clone());
        membership
    }
}

fn limit_or(limit: Option<i64>, default: i64) -> usize {
    limit.unwrap_or(default).clamp(1, MAX_LIMIT) as usize
}

#[async_trait]
impl FacilityStore for MemoryStore {
    async fn create_facility(
        &self,
        tenant_id: &str,
        id: DbId,
        input: &CreateFacility,
    ) -> Result<Facility, StoreError> {
        let mut tables = self.tables()?;
        if tables.facilities.contains_key(&id) {
            return Err(StoreError::Duplicate);
        }
        Ok(tables.insert_facility(tenant_id, id, input))
    }

    async fn find_facility(
        &self,
        tenant_id: &str,
        id: DbId,
    ) -> Result<Option<Facility>, StoreError> {
        Ok(self
            .tables()?
            .facilities
            .get(&id)
            .filter(|f| f.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_facilities(&self, tenant_id: &str) -> Result<Vec<Facility>, StoreError> {
        let mut out: Vec<Facility> = self
            .tables()?
            .facilities
            .values()
            .filter(|f| f.tenant_id == tenant_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_booking(&self, input: &NewBooking) -> Result<Booking, StoreError> {
        let mut tables = self.tables()?;

        let overlaps_booking = tables.bookings.iter().any(|b| {
            b.tenant_id == input.tenant_id
                && b.facility_id == input.facility_id
                && b.status().holds_slot()
                && b.overlaps(&input.range)
        });
        if overlaps_booking {
            return Err(StoreError::Overlap);
        }

        let overlaps_window = tables.windows.iter().any(|w| {
            w.tenant_id == input.tenant_id
                && w.facility_id == input.facility_id
                && w.status().blocks_bookings()
                && w.overlaps(&input.range)
        });
        if overlaps_window {
            return Err(StoreError::MaintenanceOverlap);
        }

        if tables.bookings.iter().any(|b| b.id == input.id) {
            return Err(StoreError::Duplicate);
        }

        let booking = Booking {
            id: input.id,
            tenant_id: input.tenant_id.clone(),
            facility_id: input.facility_id,
            owner_id: input.owner_id,
            starts_at: input.range.start,
            ends_at: input.range.end,
            status: input.status.as_str().to_string(),
            notes: input.notes.clone(),
            created_at: input.created_at,
            updated_at: input.created_at,
        };
        tables.bookings.push(booking.clone());
        Ok(booking)
    }

    async fn find_booking(&self, tenant_id: &str, id: DbId) -> Result<Option<Booking>, StoreError> {
        Ok(self
            .tables()?
            .bookings
            .iter()
            .find(|b| b.tenant_id == tenant_id && b.id == id)
            .cloned())
    }

    async fn cancel_booking(
        &self,
        tenant_id: &str,
        id: DbId,
    ) -> Result<Option<CancelOutcome>, StoreError> {
        let mut tables = self.tables()?;
        let Some(booking) = tables
            .bookings
            .iter_mut()
            .find(|b| b.tenant_id == tenant_id && b.id == id)
        else {
            return Ok(None);
        };

        if booking.status() == BookingStatus::Cancelled {
            return Ok(Some(CancelOutcome {
                booking: booking.clone(),
                changed: false,
            }));
        }

        booking.status = BookingStatus::Cancelled.as_str().to_string();
        booking.updated_at = Utc::now();
        Ok(Some(CancelOutcome {
            booking: booking.clone(),
            changed: true,
        }))
    }

    async fn list_active_bookings(
        &self,
        tenant_id: &str,
        facility_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<Booking>, StoreError> {
        let mut out: Vec<Booking> = self
            .tables()?
            .bookings
            .iter()
            .filter(|b| {
                b.tenant_id == tenant_id
                    && b.facility_id == facility_id
                    && b.status().holds_slot()
                    && b.starts_at < to
                    && b.ends_at > from
            })
            .cloned()
            .collect();
        out.sort_by_key(|b| b.starts_at);
        Ok(out)
    }
}

#[async_trait]
impl MaintenanceStore for MemoryStore {
    async fn insert_window(
        &self,
        input: &NewMaintenanceWindow,
    ) -> Result<MaintenanceWindow, StoreError> {
        let mut tables = self.tables()?;

        let overlaps = tables.windows.iter().any(|w| {
            w.tenant_id == input.tenant_id
                && w.facility_id == input.facility_id
                && w.status().blocks_bookings()
                && w.overlaps(&input.range)
        });
        let booked = tables.bookings.iter().any(|b| {
            b.tenant_id == input.tenant_id
                && b.facility_id == input.facility_id
                && b.status().holds_slot()
                && b.overlaps(&input.range)
        });
        if overlaps || booked {
            return Err(StoreError::Overlap);
        }

        let window = MaintenanceWindow {
            id: input.id,
            tenant_id: input.tenant_id.clone(),
            facility_id: input.facility_id,
            starts_at: input.range.start,
            ends_at: input.range.end,
            kind: input.kind.clone(),
            status: MaintenanceStatus::Scheduled.as_str().to_string(),
            description: input.description.clone(),
            created_at: input.created_at,
            updated_at: input.created_at,
        };
        tables.windows.push(window.clone());
        Ok(window)
    }

    async fn find_window(
        &self,
        tenant_id: &str,
        id: DbId,
    ) -> Result<Option<MaintenanceWindow>, StoreError> {
        Ok(self
            .tables()?
            .windows
            .iter()
            .find(|w| w.tenant_id == tenant_id && w.id == id)
            .cloned())
    }

    async fn list_blocking_windows(
        &self,
        tenant_id: &str,
        facility_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<MaintenanceWindow>, StoreError> {
        let mut out: Vec<MaintenanceWindow> = self
            .tables()?
            .windows
            .iter()
            .filter(|w| {
                w.tenant_id == tenant_id
                    && w.facility_id == facility_id
                    && w.status().blocks_bookings()
                    && w.starts_at < to
                    && w.ends_at > from
            })
            .cloned()
            .collect();
        out.sort_by_key(|w| w.starts_at);
        Ok(out)
    }

    async fn transition_window(
        &self,
        tenant_id: &str,
        id: DbId,
        from: MaintenanceStatus,
        to: MaintenanceStatus,
        facility_status: Option<FacilityStatus>,
    ) -> Result<Option<MaintenanceWindow>, StoreError> {
        let mut tables = self.tables()?;
        let now = Utc::now();

        let Some(window) = tables
            .windows
            .iter_mut()
            .find(|w| w.tenant_id == tenant_id && w.id == id && w.status() == from)
        else {
            return Ok(None);
        };
        window.status = to.as_str().to_string();
        window.updated_at = now;
        let window = window.clone();

        if let Some(status) = facility_status {
            if let Some(facility) = tables
                .facilities
                .get_mut(&window.facility_id)
                .filter(|f| f.tenant_id == tenant_id)
            {
                facility.status = status.as_str().to_string();
                facility.updated_at = now;
            }
        }

        Ok(Some(window))
    }

    async fn list_due_windows(
        &self,
        status: MaintenanceStatus,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<MaintenanceWindow>, StoreError> {
        let boundary = |w: &MaintenanceWindow| match status {
            MaintenanceStatus::InProgress => w.ends_at,
            _ => w.starts_at,
        };
        let mut out: Vec<MaintenanceWindow> = self
            .tables()?
            .windows
            .iter()
            .filter(|w| w.status() == status && boundary(w) <= now)
            .cloned()
            .collect();
        out.sort_by_key(|w| boundary(w));
        out.truncate(limit.max(0) as usize);
        Ok(out)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(
        &self,
        tenant_id: &str,
        id: DbId,
        input: &CreateUser,
    ) -> Result<User, StoreError> {
        let mut tables = self.tables()?;
        let taken = tables
            .users
            .values()
            .any(|u| u.tenant_id == tenant_id && u.email == input.email);
        if taken || tables.users.contains_key(&id) {
            return Err(StoreError::Duplicate);
        }
        let user = Tables::build_user(tenant_id, id, input);
        tables.users.insert(id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, tenant_id: &str, id: DbId) -> Result<Option<User>, StoreError> {
        Ok(self
            .tables()?
            .users
            .get(&id)
            .filter(|u| u.tenant_id == tenant_id)
            .cloned())
    }
}

#[async_trait]
impl AccessStore for MemoryStore {
    async fn create_membership(
        &self,
        tenant_id: &str,
        id: DbId,
        input: &CreateMembership,
    ) -> Result<Membership, StoreError> {
        let mut tables = self.tables()?;
        if tables.memberships.iter().any(|m| m.id == id) {
            return Err(StoreError::Duplicate);
        }
        Ok(tables.insert_membership(tenant_id, id, input))
    }

    async fn find_access_log_by_event(
        &self,
        tenant_id: &str,
        event_id: &str,
    ) -> Result<Option<AccessLog>, StoreError> {
        Ok(self
            .tables()?
            .access_logs
            .iter()
            .find(|l| l.tenant_id == tenant_id && l.event_id.as_deref() == Some(event_id))
            .cloned())
    }

    async fn list_memberships(
        &self,
        tenant_id: &str,
        user_id: DbId,
    ) -> Result<Vec<Membership>, StoreError> {
        if self.fail_memberships.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("membership read failed".into()));
        }
        Ok(self
            .tables()?
            .memberships
            .iter()
            .filter(|m| m.tenant_id == tenant_id && m.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn insert_access_log(&self, input: &NewAccessLog) -> Result<AccessLog, StoreError> {
        let mut tables = self.tables()?;

        if let Some(event_id) = input.event_id.as_deref() {
            if let Some(existing) = tables
                .access_logs
                .iter()
                .find(|l| l.tenant_id == input.tenant_id && l.event_id.as_deref() == Some(event_id))
            {
                return Ok(existing.clone());
            }
        }

        let log = AccessLog {
            id: input.id,
            tenant_id: input.tenant_id.clone(),
            event_id: input.event_id.clone(),
            user_id: input.user_id,
            facility_id: input.facility_id,
            direction: input.direction.clone(),
            decision: input.decision.clone(),
            reason: input.reason.clone(),
            at: input.at,
        };
        tables.access_logs.push(log.clone());
        Ok(log)
    }

    async fn list_access_logs(
        &self,
        tenant_id: &str,
        user_id: Option<DbId>,
        limit: i64,
    ) -> Result<Vec<AccessLog>, StoreError> {
        let mut out: Vec<AccessLog> = self
            .tables()?
            .access_logs
            .iter()
            .filter(|l| l.tenant_id == tenant_id && user_id.map_or(true, |u| l.user_id == u))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.at.cmp(&a.at));
        out.truncate(limit.clamp(1, MAX_LIMIT) as usize);
        Ok(out)
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn bulk_insert(&self, entries: &[AuditEntry]) -> Result<u64, StoreError> {
        self.tables()?.audit.extend_from_slice(entries);
        Ok(entries.len() as u64)
    }

    async fn query_audit(
        &self,
        tenant_id: &str,
        params: &AuditQuery,
    ) -> Result<AuditLogPage, StoreError> {
        let mut matching: Vec<AuditEntry> = self
            .tables()?
            .audit
            .iter()
            .filter(|e| {
                e.tenant_id.as_deref() == Some(tenant_id)
                    && params.principal_id.map_or(true, |p| e.principal_id == Some(p))
                    && params.action.as_ref().map_or(true, |a| &e.action == a)
                    && params
                        .resource
                        .as_ref()
                        .map_or(true, |r| e.resource.starts_with(r.as_str()))
                    && params.from.map_or(true, |from| e.at >= from)
                    && params.to.map_or(true, |to| e.at <= to)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.at.cmp(&a.at));

        let total = matching.len() as i64;
        let offset = params.offset.unwrap_or(0).max(0) as usize;
        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit_or(params.limit, DEFAULT_AUDIT_LIMIT))
            .collect();
        Ok(AuditLogPage { items, total })
    }
}
