//! Key/value + list + pub/sub capability used by the Clubpulse core.
//!
//! The engine only ever sees [`KvStore`]. Production wires [`RedisKv`];
//! tests and single-node development use [`MemoryKv`], which follows the
//! same semantics (TTL expiry, Redis list index rules, fan-out publish).

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

pub mod memory;
pub mod redis_store;

pub use memory::MemoryKv;
pub use redis_store::RedisKv;

/// Errors surfaced by a KV backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum KvError {
    /// The store could not be reached or timed out. Callers may retry.
    #[error("KV store unavailable: {0}")]
    Unavailable(String),

    /// The store answered but rejected the command (wrong type, bad args).
    #[error("KV command failed: {0}")]
    Command(String),
}

/// A message received on a pub/sub channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvMessage {
    pub channel: String,
    pub payload: String,
}

/// Stream of pub/sub messages. Ends when the underlying connection drops.
pub type Subscription = BoxStream<'static, KvMessage>;

#[async_trait]
pub trait KvStore: Send + Sync {
    /// Set `key` to `value` with a TTL iff the key is absent.
    ///
    /// Returns `true` when this call created the key.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError>;

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError>;

    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Returns `true` when a key was removed.
    async fn del(&self, key: &str) -> Result<bool, KvError>;

    async fn exists(&self, key: &str) -> Result<bool, KvError>;

    /// Reset the TTL of an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError>;

    async fn incr(&self, key: &str, by: i64) -> Result<i64, KvError>;

    /// Prepend to a list, returning its new length.
    async fn lpush(&self, key: &str, value: &str) -> Result<usize, KvError>;

    /// Inclusive range with Redis index semantics (negative counts from the tail).
    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, KvError>;

    /// Keep only the inclusive range, with Redis index semantics.
    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<(), KvError>;

    async fn llen(&self, key: &str) -> Result<usize, KvError>;

    /// Returns the number of subscribers that received the message.
    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, KvError>;

    async fn subscribe(&self, channels: &[&str]) -> Result<Subscription, KvError>;

    async fn ping(&self) -> Result<(), KvError>;
}
