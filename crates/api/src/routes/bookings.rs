//! Route definitions for bookings.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::bookings;
use crate::state::AppState;

/// Routes mounted at `/bookings`.
///
/// ```text
/// POST   /                      create (commit a held lock)
/// GET    /{id}                  get_by_id
/// POST   /{id}/cancel           cancel
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(bookings::create))
        .route("/{id}", get(bookings::get_by_id))
        .route("/{id}/cancel", post(bookings::cancel))
}
