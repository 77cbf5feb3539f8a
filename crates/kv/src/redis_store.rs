//! Redis-backed [`KvStore`].
//!
//! Commands go through a shared [`ConnectionManager`] (auto-reconnecting,
//! multiplexed). Each subscription opens its own dedicated pub/sub
//! connection, as Redis requires.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};

use crate::{KvError, KvMessage, KvStore, Subscription};

#[derive(Clone)]
pub struct RedisKv {
    client: Client,
    conn: ConnectionManager,
}

impl RedisKv {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - connection URL (e.g. `redis://127.0.0.1:6379`)
    pub async fn connect(redis_url: &str) -> Result<Self, KvError> {
        let client = Client::open(redis_url)
            .map_err(|e| KvError::Command(format!("Invalid Redis URL: {e}")))?;
        let conn = ConnectionManager::new(client.clone())
            .await
            .map_err(classify)?;
        Ok(Self { client, conn })
    }
}

fn classify(e: RedisError) -> KvError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout()
    {
        KvError::Unavailable(e.to_string())
    } else {
        KvError::Command(e.to_string())
    }
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KvStore for RedisKv {
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(classify)?;
        Ok(reply.is_some())
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(millis(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await.map_err(classify)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(classify)
    }

    async fn del(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(key).await.map_err(classify)?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        conn.exists(key).await.map_err(classify)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        let mut conn = self.conn.clone();
        let ms = i64::try_from(millis(ttl)).unwrap_or(i64::MAX);
        conn.pexpire(key, ms).await.map_err(classify)
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64, KvError> {
        let mut conn = self.conn.clone();
        conn.incr(key, by).await.map_err(classify)
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<usize, KvError> {
        let mut conn = self.conn.clone();
        conn.lpush(key, value).await.map_err(classify)
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, KvError> {
        let mut conn = self.conn.clone();
        conn.lrange(key, start, stop).await.map_err(classify)
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        conn.ltrim(key, start, stop).await.map_err(classify)
    }

    async fn llen(&self, key: &str) -> Result<usize, KvError> {
        let mut conn = self.conn.clone();
        conn.llen(key).await.map_err(classify)
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, KvError> {
        let mut conn = self.conn.clone();
        conn.publish(channel, payload).await.map_err(classify)
    }

    async fn subscribe(&self, channels: &[&str]) -> Result<Subscription, KvError> {
        let mut pubsub = self.client.get_async_pubsub().await.map_err(classify)?;
        for channel in channels {
            pubsub.subscribe(*channel).await.map_err(classify)?;
        }

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(KvMessage {
                    channel: msg.get_channel_name().to_string(),
                    payload,
                }),
                Err(e) => {
                    tracing::warn!(error = %e, "Dropping non-UTF-8 pub/sub payload");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn ping(&self) -> Result<(), KvError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(classify)?;
        Ok(())
    }
}
