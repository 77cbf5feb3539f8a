//! Handlers for door/turnstile access decisions.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use clubpulse_core::access::Decision;
use clubpulse_core::types::DbId;
use clubpulse_engine::access::AccessRequest;
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::rbac::{RequireAdmin, RequireDevice};
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_LOG_LIMIT: i64 = 50;

#[derive(Debug, Deserialize)]
pub struct AccessLogParams {
    pub user_id: Option<DbId>,
    pub limit: Option<i64>,
}

/// POST /access/decide
///
/// Called by entry devices. A denial is still a recorded decision: it is
/// returned as 403 with the log as the payload. Replaying an `event_id`
/// returns the original decision.
pub async fn decide(
    RequireDevice(device): RequireDevice,
    State(state): State<AppState>,
    Json(input): Json<AccessRequest>,
) -> AppResult<impl IntoResponse> {
    let cancel = state.request_token();
    let log = state
        .engine
        .access
        .decide(&device.tenant_id, input, &cancel)
        .await?;

    let status = if log.decision == Decision::Granted.as_str() {
        StatusCode::OK
    } else {
        StatusCode::FORBIDDEN
    };
    Ok((status, Json(DataResponse { data: log })))
}

/// GET /access/logs?user_id&limit
pub async fn list_logs(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Query(params): Query<AccessLogParams>,
) -> AppResult<impl IntoResponse> {
    let cancel = state.request_token();
    let logs = state
        .engine
        .access
        .recent(
            &admin.tenant_id,
            params.user_id,
            params.limit.unwrap_or(DEFAULT_LOG_LIMIT),
            &cancel,
        )
        .await?;
    Ok(Json(DataResponse { data: logs }))
}
