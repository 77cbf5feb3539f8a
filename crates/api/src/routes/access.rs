use axum::routing::{get, post};
use axum::Router;

use crate::handlers::access;
use crate::state::AppState;

/// Routes mounted at `/access`.
///
/// ```text
/// POST   /decide                decide (device, staff, admin)
/// GET    /logs                  list_logs (admin; ?user_id, ?limit)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/decide", post(access::decide))
        .route("/logs", get(access::list_logs))
}
