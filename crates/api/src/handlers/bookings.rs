//! Handlers for bookings.
//!
//! A booking is created from a slot lock the caller holds. Members book
//! for themselves; admins may book on behalf of a member.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use clubpulse_core::types::{DbId, Timestamp};
use clubpulse_engine::coordinator::CommitRequest;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/* --------------------------------------------------------------------------
   Request bodies and filters
   -------------------------------------------------------------------------- */

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub lock_id: String,
    pub facility_id: DbId,
    pub start: Timestamp,
    pub end: Timestamp,
    /// Defaults to the caller.
    pub owner_id: Option<DbId>,
    pub notes: Option<String>,
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Debug, Deserialize)]
pub struct BookingRangeParams {
    pub from: Timestamp,
    pub to: Timestamp,
}

/* --------------------------------------------------------------------------
   Handlers
   -------------------------------------------------------------------------- */

/// POST /bookings
///
/// Commit the held lock into a booking. The lock is released on success.
pub async fn create(
    auth: AuthUser,
    State(state): State<AppState>,
    Json(input): Json<CreateBookingRequest>,
) -> AppResult<impl IntoResponse> {
    let cancel = state.request_token();
    let request = CommitRequest {
        lock_id: input.lock_id,
        facility_id: input.facility_id,
        owner_id: input.owner_id.unwrap_or(auth.user_id),
        start: input.start,
        end: input.end,
        notes: input.notes,
        confirmed: input.confirmed,
    };

    let booking = state
        .engine
        .coordinator
        .commit(&auth.context(), request, &cancel)
        .await?;

    Ok((StatusCode::CREATED, Json(DataResponse { data: booking })))
}

/// GET /bookings/{id}
pub async fn get_by_id(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let cancel = state.request_token();
    let booking = state
        .engine
        .coordinator
        .get(&auth.context(), id, &cancel)
        .await?;
    Ok(Json(DataResponse { data: booking }))
}

/// POST /bookings/{id}/cancel
///
/// Idempotent: cancelling twice returns the cancelled booking.
pub async fn cancel(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let cancel = state.request_token();
    let booking = state
        .engine
        .coordinator
        .cancel(&auth.context(), id, &cancel)
        .await?;
    Ok(Json(DataResponse { data: booking }))
}

/// GET /facilities/{id}/bookings?from&to
///
/// Active bookings overlapping the range. Members see only their own.
pub async fn list_for_facility(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(facility_id): Path<DbId>,
    Query(params): Query<BookingRangeParams>,
) -> AppResult<impl IntoResponse> {
    let cancel = state.request_token();
    let bookings = state
        .engine
        .coordinator
        .list_for_facility(&auth.context(), facility_id, params.from, params.to, &cancel)
        .await?;
    Ok(Json(DataResponse { data: bookings }))
}
