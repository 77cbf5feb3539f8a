use axum::routing::get;
use axum::Router;

use crate::handlers::audit;
use crate::state::AppState;

/// Routes mounted at `/admin` (admin only).
///
/// ```text
/// GET    /audit-logs            query_audit_logs
/// ```
pub fn router() -> Router<AppState> {
    Router::new().route("/audit-logs", get(audit::query_audit_logs))
}
