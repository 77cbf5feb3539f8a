//! Route definitions for slot locks.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::locks;
use crate::state::AppState;

/// Routes mounted at `/locks`.
///
/// ```text
/// POST   /                      acquire
/// GET    /{lock_id}             get
/// DELETE /{lock_id}             release
/// POST   /{lock_id}/extend      extend
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(locks::acquire))
        .route("/{lock_id}", get(locks::get).delete(locks::release))
        .route("/{lock_id}/extend", post(locks::extend))
}
