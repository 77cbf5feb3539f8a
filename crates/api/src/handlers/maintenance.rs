//! Handlers for maintenance windows. Staff only.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use clubpulse_core::types::DbId;
use clubpulse_db::models::maintenance::CreateMaintenanceWindow;

use crate::error::AppResult;
use crate::middleware::rbac::RequireStaff;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /maintenance
pub async fn create(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Json(input): Json<CreateMaintenanceWindow>,
) -> AppResult<impl IntoResponse> {
    let cancel = state.request_token();
    let window = state
        .engine
        .maintenance
        .create(&staff.tenant_id, input, &cancel)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: window })))
}

/// GET /maintenance/{id}
pub async fn get_by_id(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let cancel = state.request_token();
    let window = state
        .engine
        .maintenance
        .get(&staff.tenant_id, id, &cancel)
        .await?;
    Ok(Json(DataResponse { data: window }))
}

/// POST /maintenance/{id}/start
pub async fn start(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let cancel = state.request_token();
    let window = state
        .engine
        .maintenance
        .start(&staff.tenant_id, id, &cancel)
        .await?;
    Ok(Json(DataResponse { data: window }))
}

/// POST /maintenance/{id}/complete
pub async fn complete(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let cancel = state.request_token();
    let window = state
        .engine
        .maintenance
        .complete(&staff.tenant_id, id, &cancel)
        .await?;
    Ok(Json(DataResponse { data: window }))
}

/// POST /maintenance/{id}/cancel
pub async fn cancel(
    RequireStaff(staff): RequireStaff,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let cancel = state.request_token();
    let window = state
        .engine
        .maintenance
        .cancel(&staff.tenant_id, id, &cancel)
        .await?;
    Ok(Json(DataResponse { data: window }))
}
