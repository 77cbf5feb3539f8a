//! Slot Lock Service: short-lived soft reservations of facility time slots.
//!
//! A lock is two KV keys with the same TTL:
//!
//! - `lock:slot:{facility_id}:{start_unix}:{end_unix}` holds the lock id.
//!   `SET NX` on this key is the linearisation point for a slot.
//! - `lock:info:{lock_id}` holds JSON [`LockInfo`] describing the owner.
//!
//! Facility ids are globally unique UUIDs, so slot keys never collide across
//! tenants; the tenant recorded in `LockInfo` is checked on every owned
//! operation.

use std::sync::Arc;
use std::time::Duration;

use clubpulse_core::clock::{Clock, IdGenerator};
use clubpulse_core::slot::SlotRange;
use clubpulse_core::types::{DbId, TenantId, Timestamp};
use clubpulse_kv::KvStore;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::cancel::cancellable;
use crate::error::EngineError;

/// Default lock TTL: five minutes.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(300);

pub fn slot_key(facility_id: DbId, range: &SlotRange) -> String {
    format!(
        "lock:slot:{facility_id}:{}:{}",
        range.start_unix(),
        range.end_unix()
    )
}

pub fn info_key(lock_id: &str) -> String {
    format!("lock:info:{lock_id}")
}

/// Owner metadata stored under `lock:info:{lock_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub lock_id: String,
    pub tenant_id: TenantId,
    pub facility_id: DbId,
    pub user_id: DbId,
    pub start: Timestamp,
    pub end: Timestamp,
    pub acquired_at: Timestamp,
    pub expires_at: Timestamp,
}

impl LockInfo {
    /// Whether this lock was taken for exactly this tenant, facility, and range.
    pub fn covers(&self, tenant_id: &str, facility_id: DbId, range: &SlotRange) -> bool {
        self.tenant_id == tenant_id
            && self.facility_id == facility_id
            && self.start == range.start
            && self.end == range.end
    }
}

pub struct SlotLockService {
    kv: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    ttl: Duration,
}

impl SlotLockService {
    pub fn new(
        kv: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        ttl: Duration,
    ) -> Self {
        Self {
            kv,
            clock,
            ids,
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn expiry_from(&self, now: Timestamp) -> Timestamp {
        now + chrono::Duration::seconds(self.ttl.as_secs() as i64)
    }

    /// Claim a slot for `user_id`.
    ///
    /// Fails with [`EngineError::AlreadyLocked`] if any live lock holds the
    /// slot, or [`EngineError::Unavailable`] if the KV store cannot be reached.
    pub async fn acquire(
        &self,
        tenant_id: &str,
        facility_id: DbId,
        user_id: DbId,
        range: SlotRange,
        cancel: &CancellationToken,
    ) -> Result<LockInfo, EngineError> {
        let lock_id = self.ids.token();
        let key = slot_key(facility_id, &range);

        let won = cancellable(cancel, self.kv.set_nx(&key, &lock_id, self.ttl)).await?;
        if !won {
            tracing::debug!(tenant_id, %facility_id, key = %key, "Slot already locked");
            return Err(EngineError::AlreadyLocked);
        }

        let now = self.clock.now();
        let info = LockInfo {
            lock_id: lock_id.clone(),
            tenant_id: tenant_id.to_string(),
            facility_id,
            user_id,
            start: range.start,
            end: range.end,
            acquired_at: now,
            expires_at: self.expiry_from(now),
        };
        let encoded =
            serde_json::to_string(&info).map_err(|e| EngineError::Internal(e.to_string()))?;

        let stored = cancellable(
            cancel,
            self.kv.set(&info_key(&lock_id), &encoded, Some(self.ttl)),
        )
        .await;
        if let Err(e) = stored {
            // Without its info key the lock cannot be committed; give the slot back.
            if let Err(del_err) = self.kv.del(&key).await {
                tracing::warn!(key = %key, error = %del_err, "Failed to roll back slot lock");
            }
            return Err(e);
        }

        tracing::info!(tenant_id, %facility_id, %user_id, lock_id = %lock_id, "Slot locked");
        Ok(info)
    }

    /// Unconditionally free a slot. Idempotent.
    pub async fn release(
        &self,
        tenant_id: &str,
        facility_id: DbId,
        range: SlotRange,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let key = slot_key(facility_id, &range);
        if let Some(lock_id) = cancellable(cancel, self.kv.get(&key)).await? {
            cancellable(cancel, self.kv.del(&info_key(&lock_id))).await?;
        }
        cancellable(cancel, self.kv.del(&key)).await?;
        tracing::info!(tenant_id, %facility_id, key = %key, "Slot released");
        Ok(())
    }

    /// Free a slot only if `lock_id` still holds it.
    pub async fn release_owned(
        &self,
        tenant_id: &str,
        lock_id: &str,
        facility_id: DbId,
        range: SlotRange,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let key = slot_key(facility_id, &range);
        self.check_owner(tenant_id, lock_id, &key, cancel).await?;

        cancellable(cancel, self.kv.del(&key)).await?;
        cancellable(cancel, self.kv.del(&info_key(lock_id))).await?;
        tracing::debug!(tenant_id, %facility_id, lock_id, "Owned slot lock released");
        Ok(())
    }

    /// Reset the TTL of an owned lock. Returns the new expiry.
    pub async fn extend(
        &self,
        tenant_id: &str,
        lock_id: &str,
        facility_id: DbId,
        range: SlotRange,
        cancel: &CancellationToken,
    ) -> Result<Timestamp, EngineError> {
        let key = slot_key(facility_id, &range);
        let mut info = self.check_owner(tenant_id, lock_id, &key, cancel).await?;

        if !cancellable(cancel, self.kv.expire(&key, self.ttl)).await? {
            return Err(EngineError::LockExpired);
        }

        info.expires_at = self.expiry_from(self.clock.now());
        let encoded =
            serde_json::to_string(&info).map_err(|e| EngineError::Internal(e.to_string()))?;
        cancellable(
            cancel,
            self.kv.set(&info_key(lock_id), &encoded, Some(self.ttl)),
        )
        .await?;

        tracing::debug!(tenant_id, %facility_id, lock_id, "Slot lock extended");
        Ok(info.expires_at)
    }

    /// Whether any live lock holds the slot.
    ///
    /// Fails open: a KV error reports "not locked".
    pub async fn is_locked(
        &self,
        tenant_id: &str,
        facility_id: DbId,
        range: SlotRange,
        cancel: &CancellationToken,
    ) -> bool {
        let key = slot_key(facility_id, &range);
        match cancellable(cancel, self.kv.exists(&key)).await {
            Ok(locked) => locked,
            Err(e) => {
                tracing::warn!(
                    tenant_id,
                    %facility_id,
                    error = %e,
                    "Lock probe failed, reporting unlocked"
                );
                false
            }
        }
    }

    /// Owner metadata for a lock id, or `None` once it has expired.
    pub async fn lock_info(
        &self,
        lock_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<LockInfo>, EngineError> {
        let Some(raw) = cancellable(cancel, self.kv.get(&info_key(lock_id))).await? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(info) => Ok(Some(info)),
            Err(e) => {
                tracing::warn!(lock_id, error = %e, "Unreadable lock info");
                Ok(None)
            }
        }
    }

    /// Verify `lock_id` holds `key` on behalf of `tenant_id`.
    async fn check_owner(
        &self,
        tenant_id: &str,
        lock_id: &str,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<LockInfo, EngineError> {
        match cancellable(cancel, self.kv.get(key)).await? {
            None => return Err(EngineError::LockExpired),
            Some(holder) if holder != lock_id => return Err(EngineError::NotOwner),
            Some(_) => {}
        }

        match self.lock_info(lock_id, cancel).await? {
            Some(info) if info.tenant_id == tenant_id => Ok(info),
            Some(_) => Err(EngineError::NotOwner),
            // Slot key still held but the info key is gone: treat as expired.
            None => Err(EngineError::LockExpired),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};
    use clubpulse_core::clock::{SystemClock, UuidGenerator};
    use clubpulse_kv::MemoryKv;

    use super::*;

    fn service(kv: Arc<MemoryKv>) -> SlotLockService {
        SlotLockService::new(
            kv,
            Arc::new(SystemClock),
            Arc::new(UuidGenerator),
            Duration::from_secs(300),
        )
    }

    fn range() -> SlotRange {
        SlotRange::new(
            Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 3, 2, 11, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn slot_key_uses_unix_seconds() {
        let id = DbId::nil();
        assert_eq!(
            slot_key(id, &range()),
            format!(
                "lock:slot:{id}:{}:{}",
                range().start.timestamp(),
                range().end.timestamp()
            )
        );
    }

    #[tokio::test]
    async fn second_acquire_is_already_locked() {
        let kv = Arc::new(MemoryKv::new());
        let locks = service(kv);
        let token = CancellationToken::new();
        let f = DbId::now_v7();

        let info = locks
            .acquire("t", f, DbId::now_v7(), range(), &token)
            .await
            .unwrap();
        assert!(!info.lock_id.is_empty());
        assert_matches!(
            locks.acquire("t", f, DbId::now_v7(), range(), &token).await,
            Err(EngineError::AlreadyLocked)
        );
    }

    #[tokio::test]
    async fn acquire_then_release_owned_unlocks() {
        let kv = Arc::new(MemoryKv::new());
        let locks = service(kv.clone());
        let token = CancellationToken::new();
        let f = DbId::now_v7();

        let info = locks.acquire("t", f, DbId::now_v7(), range(), &token).await.unwrap();
        assert!(locks.is_locked("t", f, range(), &token).await);

        locks
            .release_owned("t", &info.lock_id, f, range(), &token)
            .await
            .unwrap();
        assert!(!locks.is_locked("t", f, range(), &token).await);
        assert!(!kv.exists(&info_key(&info.lock_id)).await.unwrap());
    }

    #[tokio::test]
    async fn stale_holder_is_not_owner() {
        let kv = Arc::new(MemoryKv::new());
        let locks = service(kv);
        let token = CancellationToken::new();
        let f = DbId::now_v7();

        locks.acquire("t", f, DbId::now_v7(), range(), &token).await.unwrap();
        assert_matches!(
            locks.release_owned("t", "someone-else", f, range(), &token).await,
            Err(EngineError::NotOwner)
        );
        assert_matches!(
            locks.extend("t", "someone-else", f, range(), &token).await,
            Err(EngineError::NotOwner)
        );
    }

    #[tokio::test]
    async fn other_tenant_cannot_release_owned() {
        let kv = Arc::new(MemoryKv::new());
        let locks = service(kv);
        let token = CancellationToken::new();
        let f = DbId::now_v7();

        let info = locks.acquire("a", f, DbId::now_v7(), range(), &token).await.unwrap();
        assert_matches!(
            locks.release_owned("b", &info.lock_id, f, range(), &token).await,
            Err(EngineError::NotOwner)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn expired_lock_reports_expired_and_frees_slot() {
        let kv = Arc::new(MemoryKv::new());
        let locks = service(kv);
        let token = CancellationToken::new();
        let f = DbId::now_v7();

        let info = locks.acquire("t", f, DbId::now_v7(), range(), &token).await.unwrap();
        tokio::time::advance(Duration::from_secs(301)).await;

        assert_matches!(
            locks.release_owned("t", &info.lock_id, f, range(), &token).await,
            Err(EngineError::LockExpired)
        );
        assert!(locks.acquire("t", f, DbId::now_v7(), range(), &token).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn extend_keeps_lock_alive() {
        let kv = Arc::new(MemoryKv::new());
        let locks = service(kv);
        let token = CancellationToken::new();
        let f = DbId::now_v7();

        let info = locks.acquire("t", f, DbId::now_v7(), range(), &token).await.unwrap();
        tokio::time::advance(Duration::from_secs(200)).await;
        locks.extend("t", &info.lock_id, f, range(), &token).await.unwrap();
        tokio::time::advance(Duration::from_secs(200)).await;

        assert!(locks.is_locked("t", f, range(), &token).await);
        assert!(locks.lock_info(&info.lock_id, &token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let kv = Arc::new(MemoryKv::new());
        let locks = service(kv);
        let token = CancellationToken::new();
        let f = DbId::now_v7();

        locks.acquire("t", f, DbId::now_v7(), range(), &token).await.unwrap();
        locks.release("t", f, range(), &token).await.unwrap();
        locks.release("t", f, range(), &token).await.unwrap();
        assert!(!locks.is_locked("t", f, range(), &token).await);
    }

    #[tokio::test]
    async fn is_locked_fails_open() {
        let kv = Arc::new(MemoryKv::new());
        let locks = service(kv.clone());
        let token = CancellationToken::new();
        let f = DbId::now_v7();

        locks.acquire("t", f, DbId::now_v7(), range(), &token).await.unwrap();
        kv.set_unavailable(true);

        assert!(!locks.is_locked("t", f, range(), &token).await);
        assert_matches!(
            locks.acquire("t", f, DbId::now_v7(), range(), &token).await,
            Err(EngineError::Unavailable(_))
        );
    }
}
