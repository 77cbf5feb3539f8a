use std::time::Duration;

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Upper bound on each dependency probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` when every dependency answered, else `degraded`.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    pub db_healthy: bool,
    pub kv_healthy: bool,
}

/// GET /health -- returns service, database and KV health.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_probe = tokio::time::timeout(PROBE_TIMEOUT, clubpulse_db::health_check(&state.pool));
    let kv_probe = tokio::time::timeout(PROBE_TIMEOUT, state.kv.ping());
    let (db, kv) = tokio::join!(db_probe, kv_probe);

    let db_healthy = matches!(db, Ok(Ok(())));
    let kv_healthy = matches!(kv, Ok(Ok(())));
    let status = if db_healthy && kv_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        db_healthy,
        kv_healthy,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
