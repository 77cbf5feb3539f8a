//! Handlers for the member directory and memberships.
//!
//! Admins register members and attach memberships. A member may read their
//! own record; staff may read anyone's in the tenant.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use clubpulse_core::error::CoreError;
use clubpulse_core::types::{DbId, Timestamp};
use clubpulse_db::models::membership::CreateMembership;
use clubpulse_db::models::user::CreateUser;
use serde::Deserialize;
use validator::Validate;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMemberRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 32))]
    pub phone: Option<String>,
    #[validate(length(min = 1, max = 200))]
    pub full_name: String,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMembershipRequest {
    pub tier_id: Option<DbId>,
    pub status: Option<String>,
    #[validate(range(min = 0))]
    pub outstanding_balance_cents: Option<i64>,
    pub next_billing_at: Option<Timestamp>,
}

fn ensure_self_or_staff(auth: &AuthUser, member_id: DbId) -> AppResult<()> {
    if auth.user_id == member_id || auth.context().is_staff() {
        Ok(())
    } else {
        Err(AppError::Core(CoreError::Forbidden(
            "Members may only view their own records".into(),
        )))
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /members
pub async fn create(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CreateMemberRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let cancel = state.request_token();
    let user = state
        .engine
        .directory
        .create_member(
            &admin.tenant_id,
            CreateUser {
                email: input.email.trim().to_lowercase(),
                phone: input.phone,
                full_name: input.full_name,
                role: input.role,
            },
            &cancel,
        )
        .await?;

    tracing::info!(
        tenant_id = %admin.tenant_id,
        user_id = %user.id,
        role = %user.role,
        "Member created"
    );
    Ok((StatusCode::CREATED, Json(DataResponse { data: user })))
}

/// GET /members/{id}
pub async fn get_by_id(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    ensure_self_or_staff(&auth, id)?;
    let cancel = state.request_token();
    let user = state
        .engine
        .directory
        .get_member(&auth.tenant_id, id, &cancel)
        .await?;
    Ok(Json(DataResponse { data: user }))
}

/// GET /members/{id}/memberships
pub async fn list_memberships(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    ensure_self_or_staff(&auth, id)?;
    let cancel = state.request_token();
    let memberships = state
        .engine
        .directory
        .list_memberships(&auth.tenant_id, id, &cancel)
        .await?;
    Ok(Json(DataResponse { data: memberships }))
}

/// POST /members/{id}/memberships
pub async fn create_membership(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<CreateMembershipRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let cancel = state.request_token();
    let membership = state
        .engine
        .directory
        .create_membership(
            &admin.tenant_id,
            CreateMembership {
                user_id: id,
                tier_id: input.tier_id,
                status: input.status,
                outstanding_balance_cents: input.outstanding_balance_cents,
                next_billing_at: input.next_billing_at,
            },
            &cancel,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: membership })))
}
