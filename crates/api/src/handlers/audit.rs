//! Admin query over the durable audit table.

use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use clubpulse_db::models::audit::AuditQuery;

use crate::error::AppResult;
use crate::middleware::rbac::RequireAdmin;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /admin/audit-logs
///
/// Filters: `principal_id`, `action`, `resource`, `from`, `to`, `limit`,
/// `offset`. Entries still queued in the KV buffer are not visible until
/// the next flush.
pub async fn query_audit_logs(
    RequireAdmin(admin): RequireAdmin,
    State(state): State<AppState>,
    Query(params): Query<AuditQuery>,
) -> AppResult<impl IntoResponse> {
    let cancel = state.request_token();
    let page = state
        .engine
        .audit
        .query(&admin.tenant_id, &params, &cancel)
        .await?;
    Ok(Json(DataResponse { data: page }))
}
