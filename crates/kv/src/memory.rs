//! In-process [`KvStore`] for tests and single-node development.
//!
//! Expiry uses `tokio::time::Instant`, so tests can drive TTLs with
//! `tokio::time::pause()` / `advance()`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_stream::wrappers::BroadcastStream;

use crate::{KvError, KvMessage, KvStore, Subscription};

const CHANNEL_CAPACITY: usize = 1024;

enum Value {
    Str(String),
    List(VecDeque<String>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Entry>>,
    channels: Mutex<HashMap<String, broadcast::Sender<KvMessage>>>,
    unavailable: AtomicBool,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`KvError::Unavailable`] until
    /// switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), KvError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(KvError::Unavailable("memory store marked unavailable".into()))
        } else {
            Ok(())
        }
    }

    /// Run `f` over the entry map after dropping expired keys.
    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, Entry>) -> T) -> T {
        let mut entries = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        entries.retain(|_, e| e.is_live(now));
        f(&mut entries)
    }
}

fn wrong_type(key: &str) -> KvError {
    KvError::Command(format!("WRONGTYPE operation against key '{key}'"))
}

/// Resolve a Redis-style inclusive `[start, stop]` into a half-open range.
fn resolve_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len_i = len as isize;
    let start = if start < 0 { (len_i + start).max(0) } else { start };
    let stop = if stop < 0 { len_i + stop } else { stop.min(len_i - 1) };
    if start > stop || start >= len_i {
        None
    } else {
        Some((start as usize, stop as usize + 1))
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, KvError> {
        self.check()?;
        Ok(self.with_entries(|entries| {
            if entries.contains_key(key) {
                return false;
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Str(value.to_string()),
                    expires_at: Some(Instant::now() + ttl),
                },
            );
            true
        }))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), KvError> {
        self.check()?;
        self.with_entries(|entries| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Str(value.to_string()),
                    expires_at: ttl.map(|t| Instant::now() + t),
                },
            );
        });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        self.check()?;
        self.with_entries(|entries| match entries.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn del(&self, key: &str) -> Result<bool, KvError> {
        self.check()?;
        Ok(self.with_entries(|entries| entries.remove(key).is_some()))
    }

    async fn exists(&self, key: &str) -> Result<bool, KvError> {
        self.check()?;
        Ok(self.with_entries(|entries| entries.contains_key(key)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, KvError> {
        self.check()?;
        Ok(self.with_entries(|entries| match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        }))
    }

    async fn incr(&self, key: &str, by: i64) -> Result<i64, KvError> {
        self.check()?;
        self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::Str("0".into()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::Str(s) => {
                    let current: i64 = s
                        .parse()
                        .map_err(|_| KvError::Command(format!("value at '{key}' is not an integer")))?;
                    let next = current + by;
                    *s = next.to_string();
                    Ok(next)
                }
                Value::List(_) => Err(wrong_type(key)),
            }
        })
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<usize, KvError> {
        self.check()?;
        self.with_entries(|entries| {
            let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
                value: Value::List(VecDeque::new()),
                expires_at: None,
            });
            match &mut entry.value {
                Value::List(list) => {
                    list.push_front(value.to_string());
                    Ok(list.len())
                }
                Value::Str(_) => Err(wrong_type(key)),
            }
        })
    }

    async fn lrange(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, KvError> {
        self.check()?;
        self.with_entries(|entries| match entries.get(key) {
            None => Ok(Vec::new()),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(match resolve_range(list.len(), start, stop) {
                Some((from, to)) => list.range(from..to).cloned().collect(),
                None => Vec::new(),
            }),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn ltrim(&self, key: &str, start: isize, stop: isize) -> Result<(), KvError> {
        self.check()?;
        self.with_entries(|entries| {
            let emptied = match entries.get_mut(key) {
                None => return Ok(()),
                Some(Entry {
                    value: Value::List(list),
                    ..
                }) => {
                    match resolve_range(list.len(), start, stop) {
                        Some((from, to)) => {
                            list.truncate(to);
                            list.drain(..from);
                        }
                        None => list.clear(),
                    }
                    list.is_empty()
                }
                Some(_) => return Err(wrong_type(key)),
            };
            if emptied {
                entries.remove(key);
            }
            Ok(())
        })
    }

    async fn llen(&self, key: &str) -> Result<usize, KvError> {
        self.check()?;
        self.with_entries(|entries| match entries.get(key) {
            None => Ok(0),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(list.len()),
            Some(_) => Err(wrong_type(key)),
        })
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<usize, KvError> {
        self.check()?;
        let channels = self.channels.lock().unwrap_or_else(|p| p.into_inner());
        let Some(tx) = channels.get(channel) else {
            return Ok(0);
        };
        Ok(tx
            .send(KvMessage {
                channel: channel.to_string(),
                payload: payload.to_string(),
            })
            .unwrap_or(0))
    }

    async fn subscribe(&self, channels: &[&str]) -> Result<Subscription, KvError> {
        self.check()?;
        let mut registry = self.channels.lock().unwrap_or_else(|p| p.into_inner());
        let streams = channels.iter().map(|name| {
            let rx = registry
                .entry((*name).to_string())
                .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
                .subscribe();
            BroadcastStream::new(rx)
        });
        let merged = futures::stream::select_all(streams.collect::<Vec<_>>())
            .filter_map(|item| async move { item.ok() });
        Ok(merged.boxed())
    }

    async fn ping(&self) -> Result<(), KvError> {
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn set_nx_only_succeeds_once() {
        let kv = MemoryKv::new();
        assert!(kv.set_nx("k", "a", Duration::from_secs(5)).await.unwrap());
        assert!(!kv.set_nx("k", "b", Duration::from_secs(5)).await.unwrap());
        assert_eq!(kv.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_expire_after_ttl() {
        let kv = MemoryKv::new();
        kv.set_nx("k", "a", Duration::from_secs(5)).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(kv.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!kv.exists("k").await.unwrap());
        assert!(kv.set_nx("k", "b", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn expire_extends_ttl() {
        let kv = MemoryKv::new();
        kv.set("k", "a", Some(Duration::from_secs(5))).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(kv.expire("k", Duration::from_secs(10)).await.unwrap());
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(kv.exists("k").await.unwrap());
        assert!(!kv.expire("missing", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test]
    async fn list_ops_follow_redis_indices() {
        let kv = MemoryKv::new();
        for v in ["a", "b", "c", "d"] {
            kv.lpush("q", v).await.unwrap();
        }
        // Head is the most recent push.
        assert_eq!(kv.lrange("q", 0, -1).await.unwrap(), ["d", "c", "b", "a"]);
        assert_eq!(kv.lrange("q", -2, -1).await.unwrap(), ["b", "a"]);
        assert_eq!(kv.lrange("q", 1, 100).await.unwrap(), ["c", "b", "a"]);
        assert!(kv.lrange("q", 3, 1).await.unwrap().is_empty());

        kv.ltrim("q", 0, -3).await.unwrap();
        assert_eq!(kv.lrange("q", 0, -1).await.unwrap(), ["d", "c"]);

        kv.ltrim("q", 5, -1).await.unwrap();
        assert_eq!(kv.llen("q").await.unwrap(), 0);
        assert!(!kv.exists("q").await.unwrap());
    }

    #[tokio::test]
    async fn incr_counts_from_zero() {
        let kv = MemoryKv::new();
        assert_eq!(kv.incr("n", 1).await.unwrap(), 1);
        assert_eq!(kv.incr("n", 5).await.unwrap(), 6);
        kv.lpush("l", "x").await.unwrap();
        assert_matches!(kv.incr("l", 1).await, Err(KvError::Command(_)));
    }

    #[tokio::test]
    async fn publish_reaches_every_subscriber() {
        let kv = MemoryKv::new();
        let mut a = kv.subscribe(&["one", "two"]).await.unwrap();
        let mut b = kv.subscribe(&["two"]).await.unwrap();

        assert_eq!(kv.publish("two", "hello").await.unwrap(), 2);
        assert_eq!(kv.publish("one", "only-a").await.unwrap(), 1);
        assert_eq!(kv.publish("nobody", "x").await.unwrap(), 0);

        assert_eq!(a.next().await.unwrap().payload, "hello");
        let second = a.next().await.unwrap();
        assert_eq!(second.channel, "one");
        assert_eq!(second.payload, "only-a");
        assert_eq!(b.next().await.unwrap().payload, "hello");
    }

    #[tokio::test]
    async fn unavailable_toggle_fails_every_call() {
        let kv = MemoryKv::new();
        kv.set_unavailable(true);
        assert_matches!(kv.ping().await, Err(KvError::Unavailable(_)));
        assert_matches!(
            kv.set_nx("k", "v", Duration::from_secs(1)).await,
            Err(KvError::Unavailable(_))
        );
        kv.set_unavailable(false);
        assert!(kv.ping().await.is_ok());
    }
}
