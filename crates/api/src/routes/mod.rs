pub mod access;
pub mod admin;
pub mod bookings;
pub mod facilities;
pub mod health;
pub mod locks;
pub mod maintenance;
pub mod members;

use axum::routing::get;
use axum::Router;

use crate::hub;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                   Event Hub WebSocket (?token=)
///
/// /locks                                acquire (POST)
/// /locks/{lock_id}                      status, release
/// /locks/{lock_id}/extend               extend (POST)
///
/// /bookings                             commit a held lock (POST)
/// /bookings/{id}                        get
/// /bookings/{id}/cancel                 cancel (POST)
///
/// /facilities                           list, create (admin)
/// /facilities/{id}                      get
/// /facilities/{id}/availability         slot availability
/// /facilities/{id}/bookings             active bookings in a range
///
/// /maintenance                          schedule a window (staff)
/// /maintenance/{id}                     get
/// /maintenance/{id}/start|complete|cancel
///
/// /access/decide                        entry decision (device)
/// /access/logs                          recent decisions (admin)
///
/// /members                              register (admin)
/// /members/{id}                         get
/// /members/{id}/memberships             list, attach (admin)
///
/// /admin/audit-logs                     audit query (admin)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Real-time events.
        .route("/ws", get(hub::ws_handler))
        // Checkout: hold a slot, then commit it.
        .nest("/locks", locks::router())
        .nest("/bookings", bookings::router())
        // Tenant directory.
        .nest("/facilities", facilities::router())
        .nest("/members", members::router())
        // Operations.
        .nest("/maintenance", maintenance::router())
        .nest("/access", access::router())
        .nest("/admin", admin::router())
}
