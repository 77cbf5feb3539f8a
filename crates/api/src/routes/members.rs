//! Route definitions for the member directory.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::members;
use crate::state::AppState;

/// Routes mounted at `/members`.
///
/// ```text
/// POST   /                      create (admin)
/// GET    /{id}                  get_by_id (self or staff)
/// GET    /{id}/memberships      list_memberships (self or staff)
/// POST   /{id}/memberships      create_membership (admin)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(members::create))
        .route("/{id}", get(members::get_by_id))
        .route(
            "/{id}/memberships",
            get(members::list_memberships).post(members::create_membership),
        )
}
