use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use clubpulse_api::config::{LogFormat, ServerConfig};
use clubpulse_api::hub::{self, Hub};
use clubpulse_api::router::build_app_router;
use clubpulse_api::state::AppState;
use clubpulse_core::clock::{Clock, IdGenerator, SystemClock, UuidGenerator};
use clubpulse_engine::maintenance::MaintenanceScheduler;
use clubpulse_engine::store::pg::PgStore;
use clubpulse_engine::Engine;
use clubpulse_events::NotificationDispatcher;
use clubpulse_kv::{KvStore, MemoryKv, RedisKv};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid server configuration")?;

    // --- Tracing ---
    let fmt_layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer().json().boxed(),
        LogFormat::Text => tracing_subscriber::fmt::layer().boxed(),
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "clubpulse_api=debug,clubpulse_engine=debug,tower_http=debug".into()
            }),
        )
        .with(fmt_layer)
        .init();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let pool = clubpulse_db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    clubpulse_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    tracing::info!("Database health check passed");

    clubpulse_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- KV store ---
    let kv: Arc<dyn KvStore> = match config.redis_url.as_deref() {
        Some(url) => {
            let redis = RedisKv::connect(url)
                .await
                .context("Failed to connect to Redis")?;
            tracing::info!("Redis connection established");
            Arc::new(redis)
        }
        None => {
            tracing::warn!("REDIS_URL not set, using in-memory KV (single node only)");
            Arc::new(MemoryKv::new())
        }
    };

    // --- Engine ---
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let ids: Arc<dyn IdGenerator> = Arc::new(UuidGenerator);
    let engine = Engine::new(
        Arc::new(PgStore::new(pool.clone())),
        Arc::clone(&kv),
        Arc::clone(&clock),
        ids,
        NotificationDispatcher::from_env(),
        config.engine_config(),
    );

    // --- Background tasks ---
    // `realtime` stops the hub and its bridge as soon as a signal arrives so
    // WebSocket upgrades can finish. `shutdown` stops everything else once
    // in-flight requests have drained.
    let realtime = CancellationToken::new();
    let shutdown = CancellationToken::new();
    let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();

    let (event_hub, hub_handle) = Hub::new(config.hub_config());
    tasks.push(("event hub", tokio::spawn(event_hub.run(realtime.child_token()))));

    tasks.push((
        "event bridge",
        tokio::spawn(hub::bridge::run(
            Arc::clone(&kv),
            hub_handle.clone(),
            Arc::clone(&clock),
            realtime.child_token(),
        )),
    ));

    let audit = Arc::clone(&engine.audit);
    let audit_cancel = shutdown.child_token();
    tasks.push((
        "audit flush",
        tokio::spawn(async move { audit.run(audit_cancel).await }),
    ));

    let scheduler = MaintenanceScheduler::new(
        Arc::clone(&engine.maintenance),
        Duration::from_secs(config.maintenance_poll_secs),
    );
    let scheduler_cancel = shutdown.child_token();
    tasks.push((
        "maintenance scheduler",
        tokio::spawn(async move { scheduler.run(scheduler_cancel).await }),
    ));
    tracing::info!("Background tasks started (hub, bridge, audit flush, maintenance)");

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        engine,
        kv,
        hub: hub_handle,
        shutdown: shutdown.clone(),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let host = config
        .host
        .parse()
        .with_context(|| format!("Invalid HOST address '{}'", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    let close_peers = realtime.clone();
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            close_peers.cancel();
        })
        .await;

    // --- Post-shutdown cleanup ---
    // Requests have drained. The audit loop settles pending ingests before
    // its final flush.
    tracing::info!("Server stopped accepting connections, cleaning up");
    realtime.cancel();
    shutdown.cancel();

    let deadline = config.shutdown_timeout();
    for (name, handle) in tasks {
        match tokio::time::timeout(deadline, handle).await {
            Ok(Ok(())) => tracing::info!(task = name, "Background task stopped"),
            Ok(Err(e)) => tracing::error!(task = name, error = %e, "Background task panicked"),
            Err(_) => tracing::warn!(task = name, "Background task did not stop in time"),
        }
    }

    served.context("Server error")?;
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager (e.g. systemd, Docker, Kubernetes).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
