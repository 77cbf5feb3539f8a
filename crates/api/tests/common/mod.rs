#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use clubpulse_api::auth::jwt::{generate_access_token, JwtConfig};
use clubpulse_api::config::{LogFormat, ServerConfig};
use clubpulse_api::hub::{Hub, HubConfig};
use clubpulse_api::router::build_app_router;
use clubpulse_api::state::AppState;
use clubpulse_core::clock::{SystemClock, UuidGenerator};
use clubpulse_core::types::DbId;
use clubpulse_engine::store::MemoryStore;
use clubpulse_engine::{Engine, EngineConfig};
use clubpulse_events::NotificationDispatcher;
use clubpulse_kv::MemoryKv;
use http_body_util::BodyExt;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub const TENANT: &str = "club-a";
pub const OTHER_TENANT: &str = "club-b";

/// Build a test `ServerConfig` with safe defaults.
///
/// The database URL points at a closed port: the pool is lazy and only the
/// health probe ever touches it.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 5,
        database_url: "postgres://clubpulse@127.0.0.1:1/clubpulse".to_string(),
        redis_url: None,
        jwt: JwtConfig {
            secret: "test-secret".to_string(),
            access_token_expiry_mins: 15,
        },
        lock_ttl_secs: 300,
        audit_flush_every_secs: 300,
        audit_batch_size: 100,
        hub_send_buffer: 64,
        hub_channel_capacity: 256,
        maintenance_poll_secs: 60,
        log_format: LogFormat::Text,
    }
}

/// Everything an HTTP test needs: the router plus handles to the in-memory
/// backends behind it.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub kv: Arc<MemoryKv>,
    pub shutdown: CancellationToken,
}

impl TestApp {
    pub fn token(&self, user_id: DbId, role: &str) -> String {
        self.token_for(TENANT, user_id, role)
    }

    pub fn token_for(&self, tenant: &str, user_id: DbId, role: &str) -> String {
        generate_access_token(user_id, tenant, role, &self.state.config.jwt).unwrap()
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str, token: &str) -> Response<Body> {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: &str, body: serde_json::Value) -> Response<Body> {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Build the full application over in-memory stores, with the hub running.
pub fn build_test_app() -> TestApp {
    let config = test_config();
    let store = Arc::new(MemoryStore::new());
    let kv = Arc::new(MemoryKv::new());
    let shutdown = CancellationToken::new();

    let engine = Engine::new(
        store.clone(),
        kv.clone(),
        Arc::new(SystemClock),
        Arc::new(UuidGenerator),
        NotificationDispatcher::logging_only(),
        EngineConfig::default(),
    );

    let (hub, hub_handle) = Hub::new(HubConfig::default());
    tokio::spawn(hub.run(shutdown.child_token()));

    let pool = clubpulse_db::create_lazy_pool(&config.database_url).unwrap();
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        engine,
        kv: kv.clone(),
        hub: hub_handle,
        shutdown: shutdown.clone(),
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        store,
        kv,
        shutdown,
    }
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Send a GET request without credentials.
pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}
