//! Handlers for the `/facilities` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use clubpulse_core::types::DbId;
use clubpulse_db::models::facility::CreateFacility;
use clubpulse_engine::availability::AvailabilityQuery;
use serde::Deserialize;
use validator::Validate;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateFacilityRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub facility_type: String,
    #[validate(range(min = 1, max = 10_000))]
    pub capacity: Option<i32>,
    #[validate(range(min = 0))]
    pub hourly_rate_cents: Option<i64>,
    pub hours_of_operation: Option<serde_json::Value>,
}

impl From<CreateFacilityRequest> for CreateFacility {
    fn from(req: CreateFacilityRequest) -> Self {
        Self {
            name: req.name,
            facility_type: req.facility_type,
            capacity: req.capacity,
            hourly_rate_cents: req.hourly_rate_cents,
            hours_of_operation: req.hours_of_operation,
        }
    }
}

/// GET /facilities
pub async fn list(auth: AuthUser, State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let cancel = state.request_token();
    let facilities = state
        .engine
        .directory
        .list_facilities(&auth.tenant_id, &cancel)
        .await?;
    Ok(Json(DataResponse { data: facilities }))
}

/// POST /facilities
pub async fn create(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Json(input): Json<CreateFacilityRequest>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let cancel = state.request_token();
    let facility = state
        .engine
        .directory
        .create_facility(&admin.tenant_id, input.into(), &cancel)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: facility })))
}

/// GET /facilities/{id}
pub async fn get_by_id(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let cancel = state.request_token();
    let facility = state
        .engine
        .directory
        .get_facility(&auth.tenant_id, id, &cancel)
        .await?;
    Ok(Json(DataResponse { data: facility }))
}

/// GET /facilities/{id}/availability?start&end&slot_minutes
///
/// Lock state is best-effort: a KV outage reports slots as unlocked.
pub async fn availability(
    auth: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Query(query): Query<AvailabilityQuery>,
) -> AppResult<impl IntoResponse> {
    let cancel = state.request_token();
    let availability = state
        .engine
        .availability
        .query(&auth.tenant_id, id, query, &cancel)
        .await?;
    Ok(Json(DataResponse { data: availability }))
}
