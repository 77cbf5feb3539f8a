use std::str::FromStr;
use std::time::Duration;

use clubpulse_engine::audit_queue::AuditQueueConfig;
use clubpulse_engine::EngineConfig;

use crate::auth::jwt::JwtConfig;
use crate::hub::HubConfig;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {message}")]
    Invalid { name: &'static str, message: String },
}

/// Output format of the `tracing` fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("expected 'text' or 'json', got '{other}'")),
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// Everything except `DATABASE_URL` and `JWT_SECRET` has a default suitable
/// for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
    /// Upper bound on waiting for background tasks after the server stops.
    pub shutdown_timeout_secs: u64,
    pub database_url: String,
    /// `None` runs on the in-memory KV store (single node only).
    pub redis_url: Option<String>,
    pub jwt: JwtConfig,
    pub lock_ttl_secs: u64,
    pub audit_flush_every_secs: u64,
    pub audit_batch_size: usize,
    pub hub_send_buffer: usize,
    pub hub_channel_capacity: usize,
    pub maintenance_poll_secs: u64,
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                    |
    /// |--------------------------|----------------------------|
    /// | `HOST`                   | `0.0.0.0`                  |
    /// | `PORT`                   | `3000`                     |
    /// | `CORS_ORIGINS`           | `http://localhost:5173`    |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                       |
    /// | `SHUTDOWN_TIMEOUT_SECS`  | `30`                       |
    /// | `DATABASE_URL`           | required                   |
    /// | `REDIS_URL`              | unset (in-memory KV)       |
    /// | `JWT_SECRET`             | required                   |
    /// | `LOCK_TTL_SECS`          | `300`                      |
    /// | `AUDIT_FLUSH_EVERY_SECS` | `300`                      |
    /// | `AUDIT_BATCH_SIZE`       | `100`                      |
    /// | `HUB_SEND_BUFFER`        | `256`                      |
    /// | `HUB_CHANNEL_CAPACITY`   | `1024`                     |
    /// | `MAINTENANCE_POLL_SECS`  | `60`                       |
    /// | `LOG_FORMAT`             | `text`                     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] over an arbitrary variable source.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port = parse_var(lookup, "PORT", 3000u16)?;

        let cors_origins: Vec<String> = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        for origin in &cors_origins {
            origin
                .parse::<axum::http::HeaderValue>()
                .map_err(|e| ConfigError::Invalid {
                    name: "CORS_ORIGINS",
                    message: format!("'{origin}': {e}"),
                })?;
        }

        let database_url = lookup("DATABASE_URL")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let redis_url = lookup("REDIS_URL").filter(|s| !s.is_empty());

        let audit_batch_size = parse_var(lookup, "AUDIT_BATCH_SIZE", 100usize)?;
        if audit_batch_size == 0 {
            return Err(ConfigError::Invalid {
                name: "AUDIT_BATCH_SIZE",
                message: "must be at least 1".into(),
            });
        }
        let hub_send_buffer = parse_var(lookup, "HUB_SEND_BUFFER", 256usize)?;
        let hub_channel_capacity = parse_var(lookup, "HUB_CHANNEL_CAPACITY", 1024usize)?;
        if hub_send_buffer == 0 || hub_channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                name: "HUB_SEND_BUFFER",
                message: "hub buffers must be at least 1".into(),
            });
        }

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: parse_var(lookup, "REQUEST_TIMEOUT_SECS", 30)?,
            shutdown_timeout_secs: parse_var(lookup, "SHUTDOWN_TIMEOUT_SECS", 30)?,
            database_url,
            redis_url,
            jwt: JwtConfig::from_lookup(lookup)?,
            lock_ttl_secs: parse_var(lookup, "LOCK_TTL_SECS", 300)?,
            audit_flush_every_secs: parse_var(lookup, "AUDIT_FLUSH_EVERY_SECS", 300)?,
            audit_batch_size,
            hub_send_buffer,
            hub_channel_capacity,
            maintenance_poll_secs: parse_var(lookup, "MAINTENANCE_POLL_SECS", 60)?,
            log_format: parse_var(lookup, "LOG_FORMAT", LogFormat::Text)?,
        })
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            lock_ttl: Duration::from_secs(self.lock_ttl_secs),
            audit: AuditQueueConfig {
                flush_every: Duration::from_secs(self.audit_flush_every_secs),
                batch_size: self.audit_batch_size,
            },
        }
    }

    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            send_buffer: self.hub_send_buffer,
            channel_capacity: self.hub_channel_capacity,
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Parse an optional variable, falling back to `default` when unset.
pub(crate) fn parse_var<T>(
    lookup: &dyn Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            message: e.to_string(),
        }),
    }
}
