//! Audit ingest for mutating API requests.
//!
//! Mounted with `axum::middleware::from_fn_with_state` on the `/api/v1`
//! tree. The entry is queued after the handler runs so the response status
//! is recorded; ingest never delays or fails the request.

use axum::extract::{OriginalUri, Request, State};
use axum::http::{HeaderMap, Method};
use axum::middleware::Next;
use axum::response::Response;
use clubpulse_engine::audit_queue::NewAuditEntry;
use serde_json::json;

use super::auth::{authenticate, bearer_token};
use crate::state::AppState;

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// First hop of `x-forwarded-for`, else `x-real-ip`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
}

pub async fn record_mutations(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if !is_mutating(req.method()) {
        return next.run(req).await;
    }

    let method = req.method().clone();
    // Nested routers see a stripped URI; record the path as the client sent it.
    let path = req
        .extensions()
        .get::<OriginalUri>()
        .map_or_else(|| req.uri().path().to_string(), |uri| uri.path().to_string());
    let headers = req.headers();
    let principal = bearer_token(headers)
        .ok()
        .and_then(|token| authenticate(token, &state.config.jwt).ok());
    let ip = client_ip(headers);
    let user_agent = header_str(headers, "user-agent");
    let request_id = header_str(headers, "x-request-id");

    let response = next.run(req).await;

    state.engine.audit.ingest(NewAuditEntry {
        id: None,
        tenant_id: principal.as_ref().map(|p| p.tenant_id.clone()),
        principal_id: principal.as_ref().map(|p| p.user_id),
        action: method.as_str().to_string(),
        resource: path,
        details_json: json!({
            "status": response.status().as_u16(),
            "request_id": request_id,
            "role": principal.as_ref().map(|p| p.role.clone()),
        }),
        ip,
        user_agent,
    });

    response
}
