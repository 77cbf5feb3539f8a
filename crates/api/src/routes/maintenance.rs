use axum::routing::{get, post};
use axum::Router;

use crate::handlers::maintenance;
use crate::state::AppState;

/// Routes mounted at `/maintenance` (staff only).
///
/// ```text
/// POST   /                      create
/// GET    /{id}                  get_by_id
/// POST   /{id}/start            start
/// POST   /{id}/complete         complete
/// POST   /{id}/cancel           cancel
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(maintenance::create))
        .route("/{id}", get(maintenance::get_by_id))
        .route("/{id}/start", post(maintenance::start))
        .route("/{id}/complete", post(maintenance::complete))
        .route("/{id}/cancel", post(maintenance::cancel))
}
