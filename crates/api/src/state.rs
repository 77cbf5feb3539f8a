use std::sync::Arc;

use clubpulse_engine::Engine;
use clubpulse_kv::KvStore;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::hub::HubHandle;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: every field is an `Arc` or a handle over channels.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (health probe only; services use the engine).
    pub pool: clubpulse_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Reservation, access, audit, and maintenance services.
    pub engine: Engine,
    pub kv: Arc<dyn KvStore>,
    /// Sender side of the Event Hub loop.
    pub hub: HubHandle,
    /// Cancelled on shutdown. Handlers pass a child token to the engine.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn request_token(&self) -> CancellationToken {
        self.shutdown.child_token()
    }
}
