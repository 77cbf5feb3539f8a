use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use serde::Deserialize;

use super::peer::{self, MAX_MESSAGE_SIZE};
use crate::error::AppResult;
use crate::middleware::auth::{authenticate, bearer_token};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Browsers cannot set headers on a WebSocket handshake.
    pub token: Option<String>,
}

/// Upgrade an authenticated request to an Event Hub connection.
///
/// The token comes from `?token=` or the `Authorization` header. The peer
/// is scoped to the token's tenant for its whole lifetime.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let token = match params.token.as_deref() {
        Some(token) => token,
        None => bearer_token(&headers)?,
    };
    let user = authenticate(token, &state.config.jwt)?;

    let hub = state.hub.clone();
    Ok(ws
        .max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| peer::serve(socket, hub, user.tenant_id, user.user_id)))
}
