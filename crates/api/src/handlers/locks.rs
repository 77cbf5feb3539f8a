//! Handlers for slot locks (checkout holds).
//!
//! A lock is visible only to its owner and tenant admins. Another tenant's
//! lock id reads as not found.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use clubpulse_core::slot::SlotRange;
use clubpulse_core::types::{DbId, Timestamp};
use clubpulse_engine::lock::LockInfo;
use clubpulse_engine::{ConflictReason, EngineError};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct AcquireLockRequest {
    pub facility_id: DbId,
    pub start: Timestamp,
    pub end: Timestamp,
}

#[derive(Debug, Serialize)]
pub struct LockExtended {
    pub lock_id: String,
    pub expires_at: Timestamp,
}

/// Load a lock the caller may act on. `missing` is returned when the lock
/// is gone or belongs to another tenant.
async fn owned_lock(
    state: &AppState,
    auth: &AuthUser,
    lock_id: &str,
    missing: EngineError,
    cancel: &CancellationToken,
) -> AppResult<(LockInfo, SlotRange)> {
    let info = state
        .engine
        .locks
        .lock_info(lock_id, cancel)
        .await?
        .filter(|info| info.tenant_id == auth.tenant_id)
        .ok_or(missing)?;

    if !auth.context().can_act_for(info.user_id) {
        return Err(EngineError::NotOwner.into());
    }
    let range = SlotRange::new(info.start, info.end)
        .map_err(|e| EngineError::Internal(format!("stored lock has invalid range: {e}")))?;
    Ok((info, range))
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /locks
///
/// Hold a facility slot for the caller during checkout.
pub async fn acquire(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<AcquireLockRequest>,
) -> AppResult<impl IntoResponse> {
    let cancel = state.request_token();
    let range = SlotRange::new(input.start, input.end)
        .map_err(|_| EngineError::Conflict(ConflictReason::BadRange))?;

    state
        .engine
        .directory
        .get_facility(&auth.tenant_id, input.facility_id, &cancel)
        .await?;

    let lock = state
        .engine
        .locks
        .acquire(&auth.tenant_id, input.facility_id, auth.user_id, range, &cancel)
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: lock })))
}

/// GET /locks/{lock_id}
pub async fn get(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(lock_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let cancel = state.request_token();
    let missing = EngineError::not_found("Lock", &lock_id);
    let (info, _) = owned_lock(&state, &auth, &lock_id, missing, &cancel).await?;
    Ok(Json(DataResponse { data: info }))
}

/// POST /locks/{lock_id}/extend
///
/// Reset the lock TTL. Fails with `LOCK_EXPIRED` once the hold is gone.
pub async fn extend(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(lock_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let cancel = state.request_token();
    let (info, range) =
        owned_lock(&state, &auth, &lock_id, EngineError::LockExpired, &cancel).await?;

    let expires_at = state
        .engine
        .locks
        .extend(&auth.tenant_id, &lock_id, info.facility_id, range, &cancel)
        .await?;

    Ok(Json(DataResponse {
        data: LockExtended {
            lock_id,
            expires_at,
        },
    }))
}

/// DELETE /locks/{lock_id}
pub async fn release(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(lock_id): Path<String>,
) -> AppResult<StatusCode> {
    let cancel = state.request_token();
    let missing = EngineError::not_found("Lock", &lock_id);
    let (info, range) = owned_lock(&state, &auth, &lock_id, missing, &cancel).await?;

    state
        .engine
        .locks
        .release_owned(&auth.tenant_id, &lock_id, info.facility_id, range, &cancel)
        .await?;

    tracing::info!(
        tenant_id = %auth.tenant_id,
        lock_id = %lock_id,
        facility_id = %info.facility_id,
        "Slot lock released"
    );
    Ok(StatusCode::NO_CONTENT)
}
