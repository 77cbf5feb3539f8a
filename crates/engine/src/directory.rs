//! Tenant directory: facilities, members, and their memberships.
//!
//! Plain CRUD over the store with input validation. Role checks live in the
//! HTTP layer.

use std::sync::Arc;

use clubpulse_core::clock::IdGenerator;
use clubpulse_core::facility::FacilityType;
use clubpulse_core::membership::MembershipStatus;
use clubpulse_core::roles::{ROLE_ADMIN, ROLE_DEVICE, ROLE_MEMBER, ROLE_STAFF};
use clubpulse_core::types::DbId;
use clubpulse_db::models::facility::{CreateFacility, Facility};
use clubpulse_db::models::membership::{CreateMembership, Membership};
use clubpulse_db::models::user::{CreateUser, User};
use tokio_util::sync::CancellationToken;

use crate::cancel::cancellable;
use crate::error::EngineError;
use crate::store::{AccessStore, FacilityStore, UserStore};

const KNOWN_ROLES: [&str; 4] = [ROLE_ADMIN, ROLE_STAFF, ROLE_MEMBER, ROLE_DEVICE];

pub struct DirectoryService {
    facilities: Arc<dyn FacilityStore>,
    users: Arc<dyn UserStore>,
    access: Arc<dyn AccessStore>,
    ids: Arc<dyn IdGenerator>,
}

impl DirectoryService {
    pub fn new(
        facilities: Arc<dyn FacilityStore>,
        users: Arc<dyn UserStore>,
        access: Arc<dyn AccessStore>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            facilities,
            users,
            access,
            ids,
        }
    }

    pub async fn create_facility(
        &self,
        tenant_id: &str,
        input: CreateFacility,
        cancel: &CancellationToken,
    ) -> Result<Facility, EngineError> {
        if input.name.trim().is_empty() {
            return Err(EngineError::Validation("Facility name is required".into()));
        }
        input
            .facility_type
            .parse::<FacilityType>()
            .map_err(EngineError::Validation)?;
        if input.capacity.is_some_and(|c| c < 1) {
            return Err(EngineError::Validation("capacity must be at least 1".into()));
        }
        if input.hourly_rate_cents.is_some_and(|r| r < 0) {
            return Err(EngineError::Validation(
                "hourly_rate_cents must not be negative".into(),
            ));
        }

        let id = self.ids.entity_id();
        let facility = cancellable(
            cancel,
            self.facilities.create_facility(tenant_id, id, &input),
        )
        .await?;
        tracing::info!(tenant_id, facility_id = %facility.id, name = %facility.name, "Facility created");
        Ok(facility)
    }

    pub async fn get_facility(
        &self,
        tenant_id: &str,
        id: DbId,
        cancel: &CancellationToken,
    ) -> Result<Facility, EngineError> {
        cancellable(cancel, self.facilities.find_facility(tenant_id, id))
            .await?
            .ok_or_else(|| EngineError::not_found("Facility", id))
    }

    pub async fn list_facilities(
        &self,
        tenant_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<Facility>, EngineError> {
        cancellable(cancel, self.facilities.list_facilities(tenant_id)).await
    }

    /// Register a user. A taken email within the tenant is a conflict.
    pub async fn create_member(
        &self,
        tenant_id: &str,
        input: CreateUser,
        cancel: &CancellationToken,
    ) -> Result<User, EngineError> {
        if !input.email.contains('@') {
            return Err(EngineError::Validation("email is not valid".into()));
        }
        if let Some(role) = input.role.as_deref() {
            if !KNOWN_ROLES.contains(&role) {
                return Err(EngineError::Validation(format!("unknown role '{role}'")));
            }
        }

        let id = self.ids.entity_id();
        match cancellable(cancel, self.users.create_user(tenant_id, id, &input)).await {
            Err(EngineError::InvalidState(_)) => Err(EngineError::InvalidState(format!(
                "A member with email '{}' already exists",
                input.email
            ))),
            other => other,
        }
    }

    pub async fn get_member(
        &self,
        tenant_id: &str,
        id: DbId,
        cancel: &CancellationToken,
    ) -> Result<User, EngineError> {
        cancellable(cancel, self.users.find_user(tenant_id, id))
            .await?
            .ok_or_else(|| EngineError::not_found("User", id))
    }

    pub async fn create_membership(
        &self,
        tenant_id: &str,
        input: CreateMembership,
        cancel: &CancellationToken,
    ) -> Result<Membership, EngineError> {
        if let Some(status) = input.status.as_deref() {
            status
                .parse::<MembershipStatus>()
                .map_err(EngineError::Validation)?;
        }
        if input.outstanding_balance_cents.is_some_and(|b| b < 0) {
            return Err(EngineError::Validation(
                "outstanding_balance_cents must not be negative".into(),
            ));
        }
        self.get_member(tenant_id, input.user_id, cancel).await?;

        let id = self.ids.entity_id();
        let membership = cancellable(
            cancel,
            self.access.create_membership(tenant_id, id, &input),
        )
        .await?;
        tracing::info!(
            tenant_id,
            user_id = %membership.user_id,
            status = %membership.status,
            "Membership created"
        );
        Ok(membership)
    }

    pub async fn list_memberships(
        &self,
        tenant_id: &str,
        user_id: DbId,
        cancel: &CancellationToken,
    ) -> Result<Vec<Membership>, EngineError> {
        cancellable(cancel, self.access.list_memberships(tenant_id, user_id)).await
    }
}
