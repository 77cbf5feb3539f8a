//! Route definitions for facilities.

use axum::routing::get;
use axum::Router;

use crate::handlers::{bookings, facilities};
use crate::state::AppState;

/// Routes mounted at `/facilities`.
///
/// ```text
/// GET    /                       list
/// POST   /                       create (admin)
/// GET    /{id}                   get_by_id
/// GET    /{id}/availability      availability (?start, ?end, ?slot_minutes)
/// GET    /{id}/bookings          list_for_facility (?from, ?to)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(facilities::list).post(facilities::create))
        .route("/{id}", get(facilities::get_by_id))
        .route("/{id}/availability", get(facilities::availability))
        .route("/{id}/bookings", get(bookings::list_for_facility))
}
