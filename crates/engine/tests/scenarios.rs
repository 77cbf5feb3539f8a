//! End-to-end engine flows over the in-memory KV and store.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use clubpulse_core::booking::BookingStatus;
use clubpulse_core::channels::{CHANNEL_BOOKINGS, EVENT_BOOKING_CREATED, EVENT_SLOT_RELEASED};
use clubpulse_core::clock::{ManualClock, UuidGenerator};
use clubpulse_core::membership::MembershipStatus;
use clubpulse_core::roles::{ROLE_ADMIN, ROLE_MEMBER};
use clubpulse_core::slot::SlotRange;
use clubpulse_core::tenant::TenantContext;
use clubpulse_core::types::Timestamp;
use clubpulse_db::models::audit::{AuditEntry, AuditLogPage, AuditQuery};
use clubpulse_db::models::maintenance::CreateMaintenanceWindow;
use clubpulse_engine::access::AccessRequest;
use clubpulse_engine::audit_queue::{AuditQueue, AuditQueueConfig, NewAuditEntry};
use clubpulse_engine::availability::AvailabilityQuery;
use clubpulse_engine::coordinator::CommitRequest;
use clubpulse_engine::lock::LockInfo;
use clubpulse_engine::store::{AuditStore, MemoryStore, StoreError};
use clubpulse_engine::{ConflictReason, Engine, EngineConfig, EngineError};
use clubpulse_events::NotificationDispatcher;
use clubpulse_kv::{KvStore, MemoryKv};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

const TENANT: &str = "club-a";

fn at(hour: u32) -> Timestamp {
    Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap()
}

struct Harness {
    store: Arc<MemoryStore>,
    kv: Arc<MemoryKv>,
    engine: Engine,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let kv = Arc::new(MemoryKv::new());
    let engine = Engine::new(
        store.clone(),
        kv.clone(),
        Arc::new(ManualClock::new(at(7))),
        Arc::new(UuidGenerator),
        NotificationDispatcher::logging_only(),
        EngineConfig::default(),
    );
    Harness { store, kv, engine }
}

fn commit_request(lock: &LockInfo) -> CommitRequest {
    CommitRequest {
        lock_id: lock.lock_id.clone(),
        facility_id: lock.facility_id,
        owner_id: lock.user_id,
        start: lock.start,
        end: lock.end,
        notes: None,
        confirmed: false,
    }
}

#[tokio::test]
async fn double_booking_race_has_one_winner() {
    let h = harness();
    let court = h.store.add_facility(TENANT, "Court 1");
    let alice = h.store.add_user(TENANT, "alice@club.test");
    let bob = h.store.add_user(TENANT, "bob@club.test");
    let range = SlotRange::new(at(10), at(11)).unwrap();
    let cancel = CancellationToken::new();

    let locks = &h.engine.locks;
    let (a, b) = tokio::join!(
        locks.acquire(TENANT, court.id, alice.id, range, &cancel),
        locks.acquire(TENANT, court.id, bob.id, range, &cancel),
    );
    let (winner, loser) = match (a, b) {
        (Ok(lock), Err(e)) => ((lock, alice.id), (e, bob.id)),
        (Err(e), Ok(lock)) => ((lock, bob.id), (e, alice.id)),
        other => panic!("expected exactly one winner, got {other:?}"),
    };
    assert_eq!(loser.0, EngineError::AlreadyLocked);

    // Loser retries while the winner still holds the slot.
    assert_matches!(
        locks.acquire(TENANT, court.id, loser.1, range, &cancel).await,
        Err(EngineError::AlreadyLocked)
    );

    let (lock, owner) = winner;
    let ctx = TenantContext::new(TENANT, owner, ROLE_MEMBER);
    let booking = h
        .engine
        .coordinator
        .commit(&ctx, commit_request(&lock), &cancel)
        .await
        .unwrap();
    assert_eq!(booking.status(), BookingStatus::Pending);
    assert!(!locks.is_locked(TENANT, court.id, range, &cancel).await);

    let view = h
        .engine
        .availability
        .query(
            TENANT,
            court.id,
            AvailabilityQuery {
                start: at(9),
                end: at(12),
                slot_minutes: Some(60),
            },
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(view.bookings.len(), 1);
    let taken: Vec<_> = view.slots.iter().map(|s| s.booked).collect();
    assert_eq!(taken, [false, true, false]);
}

#[tokio::test]
async fn commit_publishes_booking_created() {
    let h = harness();
    let court = h.store.add_facility(TENANT, "Court 1");
    let alice = h.store.add_user(TENANT, "alice@club.test");
    let cancel = CancellationToken::new();
    let mut bus = h.kv.subscribe(&[CHANNEL_BOOKINGS]).await.unwrap();

    let lock = h
        .engine
        .locks
        .acquire(TENANT, court.id, alice.id, SlotRange::new(at(10), at(11)).unwrap(), &cancel)
        .await
        .unwrap();
    let ctx = TenantContext::new(TENANT, alice.id, ROLE_MEMBER);
    h.engine
        .coordinator
        .commit(&ctx, commit_request(&lock), &cancel)
        .await
        .unwrap();

    let msg = bus.next().await.unwrap();
    let event: serde_json::Value = serde_json::from_str(&msg.payload).unwrap();
    assert_eq!(event["type"], EVENT_BOOKING_CREATED);
    assert_eq!(event["tenant_id"], TENANT);
    assert_eq!(event["facility_id"], court.id.to_string());
}

#[tokio::test]
async fn debt_denies_entry_idempotently() {
    let h = harness();
    let court = h.store.add_facility(TENANT, "Gym");
    let user = h.store.add_user(TENANT, "debtor@club.test");
    h.store
        .add_membership(TENANT, user.id, MembershipStatus::Active, 1_000);
    let cancel = CancellationToken::new();

    let request = || AccessRequest {
        user_id: user.id,
        facility_id: Some(court.id),
        direction: Default::default(),
        event_id: Some("e1".into()),
    };

    let first = h.engine.access.decide(TENANT, request(), &cancel).await.unwrap();
    assert_eq!(first.decision, "denied");
    assert_eq!(first.reason, "Outstanding debt");

    let second = h.engine.access.decide(TENANT, request(), &cancel).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(h.store.access_logs().len(), 1);
}

#[tokio::test]
async fn cancel_publishes_slot_released_once() {
    let h = harness();
    let court = h.store.add_facility(TENANT, "Court 1");
    let owner = h.store.add_user(TENANT, "owner@club.test");
    let range = SlotRange::new(at(15), at(16)).unwrap();
    let cancel = CancellationToken::new();
    let ctx = TenantContext::new(TENANT, owner.id, ROLE_MEMBER);

    let lock = h
        .engine
        .locks
        .acquire(TENANT, court.id, owner.id, range, &cancel)
        .await
        .unwrap();
    let booking = h
        .engine
        .coordinator
        .commit(&ctx, commit_request(&lock), &cancel)
        .await
        .unwrap();

    let mut bus = h.kv.subscribe(&[CHANNEL_BOOKINGS]).await.unwrap();
    let cancelled = h.engine.coordinator.cancel(&ctx, booking.id, &cancel).await.unwrap();
    assert_eq!(cancelled.status(), BookingStatus::Cancelled);

    let msg = bus.next().await.unwrap();
    let event: serde_json::Value = serde_json::from_str(&msg.payload).unwrap();
    assert_eq!(event["type"], EVENT_SLOT_RELEASED);
    assert_eq!(event["facility_id"], court.id.to_string());
    assert_eq!(event["message"], "Booking cancelled");

    // Second cancel is a no-op and publishes nothing.
    let again = h.engine.coordinator.cancel(&ctx, booking.id, &cancel).await.unwrap();
    assert_eq!(again.status(), BookingStatus::Cancelled);
    let next = tokio::time::timeout(Duration::from_millis(50), bus.next()).await;
    assert!(next.is_err(), "unexpected second event");
}

#[tokio::test]
async fn only_owner_or_admin_may_cancel() {
    let h = harness();
    let court = h.store.add_facility(TENANT, "Court 1");
    let owner = h.store.add_user(TENANT, "owner@club.test");
    let other = h.store.add_user(TENANT, "other@club.test");
    let cancel = CancellationToken::new();
    let owner_ctx = TenantContext::new(TENANT, owner.id, ROLE_MEMBER);

    let lock = h
        .engine
        .locks
        .acquire(TENANT, court.id, owner.id, SlotRange::new(at(9), at(10)).unwrap(), &cancel)
        .await
        .unwrap();
    let booking = h
        .engine
        .coordinator
        .commit(&owner_ctx, commit_request(&lock), &cancel)
        .await
        .unwrap();

    let intruder = TenantContext::new(TENANT, other.id, ROLE_MEMBER);
    assert_matches!(
        h.engine.coordinator.cancel(&intruder, booking.id, &cancel).await,
        Err(EngineError::Forbidden(_))
    );

    let foreign_admin = TenantContext::new("club-b", other.id, ROLE_ADMIN);
    assert_matches!(
        h.engine.coordinator.cancel(&foreign_admin, booking.id, &cancel).await,
        Err(EngineError::NotFound { .. })
    );

    let admin = TenantContext::new(TENANT, other.id, ROLE_ADMIN);
    h.engine.coordinator.cancel(&admin, booking.id, &cancel).await.unwrap();
}

#[tokio::test]
async fn commit_rejects_a_lock_for_another_slot() {
    let h = harness();
    let court = h.store.add_facility(TENANT, "Court 1");
    let alice = h.store.add_user(TENANT, "alice@club.test");
    let cancel = CancellationToken::new();
    let ctx = TenantContext::new(TENANT, alice.id, ROLE_MEMBER);

    let lock = h
        .engine
        .locks
        .acquire(TENANT, court.id, alice.id, SlotRange::new(at(9), at(10)).unwrap(), &cancel)
        .await
        .unwrap();
    let mut req = commit_request(&lock);
    req.end = at(11);

    assert_matches!(
        h.engine.coordinator.commit(&ctx, req, &cancel).await,
        Err(EngineError::InvalidLock)
    );
    assert!(h.store.bookings().is_empty());
}

#[tokio::test]
async fn commit_rejects_unaligned_range() {
    let h = harness();
    let court = h.store.add_facility(TENANT, "Court 1");
    let alice = h.store.add_user(TENANT, "alice@club.test");
    let ctx = TenantContext::new(TENANT, alice.id, ROLE_MEMBER);

    let req = CommitRequest {
        lock_id: "whatever".into(),
        facility_id: court.id,
        owner_id: alice.id,
        start: at(9) + chrono::Duration::seconds(30),
        end: at(10),
        notes: None,
        confirmed: false,
    };
    assert_eq!(
        h.engine
            .coordinator
            .commit(&ctx, req, &CancellationToken::new())
            .await
            .unwrap_err(),
        EngineError::Conflict(ConflictReason::BadRange)
    );
}

#[tokio::test(start_paused = true)]
async fn lock_expiry_during_slow_checkout() {
    let h = harness();
    let court = h.store.add_facility(TENANT, "Court 1");
    let slow = h.store.add_user(TENANT, "slow@club.test");
    let fast = h.store.add_user(TENANT, "fast@club.test");
    let range = SlotRange::new(at(10), at(11)).unwrap();
    let cancel = CancellationToken::new();

    let slow_lock = h
        .engine
        .locks
        .acquire(TENANT, court.id, slow.id, range, &cancel)
        .await
        .unwrap();

    tokio::time::advance(h.engine.locks.ttl() + Duration::from_secs(1)).await;

    // A second client takes the slot during the gap.
    let fast_lock = h
        .engine
        .locks
        .acquire(TENANT, court.id, fast.id, range, &cancel)
        .await
        .unwrap();

    // The slow commit still succeeds; the durable insert is the gate.
    let slow_ctx = TenantContext::new(TENANT, slow.id, ROLE_MEMBER);
    let booking = h
        .engine
        .coordinator
        .commit(&slow_ctx, commit_request(&slow_lock), &cancel)
        .await
        .unwrap();
    assert_eq!(booking.owner_id, slow.id);

    let fast_ctx = TenantContext::new(TENANT, fast.id, ROLE_MEMBER);
    assert_eq!(
        h.engine
            .coordinator
            .commit(&fast_ctx, commit_request(&fast_lock), &cancel)
            .await
            .unwrap_err(),
        EngineError::Conflict(ConflictReason::Overlap)
    );
    // The refused commit gives its lock back.
    assert!(!h.engine.locks.is_locked(TENANT, court.id, range, &cancel).await);
    assert_eq!(h.store.bookings().len(), 1);
}

#[tokio::test]
async fn maintenance_window_shadows_bookings() {
    let h = harness();
    let court = h.store.add_facility(TENANT, "Court 1");
    let alice = h.store.add_user(TENANT, "alice@club.test");
    let range = SlotRange::new(at(10), at(11)).unwrap();
    let cancel = CancellationToken::new();

    h.engine
        .maintenance
        .create(
            TENANT,
            CreateMaintenanceWindow {
                facility_id: court.id,
                starts_at: at(9),
                ends_at: at(12),
                kind: "corrective".into(),
                description: None,
            },
            &cancel,
        )
        .await
        .unwrap();

    let lock = h
        .engine
        .locks
        .acquire(TENANT, court.id, alice.id, range, &cancel)
        .await
        .unwrap();
    let ctx = TenantContext::new(TENANT, alice.id, ROLE_MEMBER);
    assert_eq!(
        h.engine
            .coordinator
            .commit(&ctx, commit_request(&lock), &cancel)
            .await
            .unwrap_err(),
        EngineError::MaintenanceBusy
    );
    assert!(!h.engine.locks.is_locked(TENANT, court.id, range, &cancel).await);
    assert!(h.store.bookings().is_empty());
}

#[tokio::test]
async fn window_cannot_be_scheduled_over_a_confirmed_booking() {
    let h = harness();
    let court = h.store.add_facility(TENANT, "Court 1");
    let alice = h.store.add_user(TENANT, "alice@club.test");
    let cancel = CancellationToken::new();

    let lock = h
        .engine
        .locks
        .acquire(TENANT, court.id, alice.id, SlotRange::new(at(10), at(11)).unwrap(), &cancel)
        .await
        .unwrap();
    let ctx = TenantContext::new(TENANT, alice.id, ROLE_ADMIN);
    let booking = h
        .engine
        .coordinator
        .commit(
            &ctx,
            CommitRequest {
                confirmed: true,
                ..commit_request(&lock)
            },
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(booking.status(), BookingStatus::Confirmed);

    let window = || CreateMaintenanceWindow {
        facility_id: court.id,
        starts_at: at(9),
        ends_at: at(12),
        kind: "preventive".into(),
        description: None,
    };
    assert_eq!(
        h.engine
            .maintenance
            .create(TENANT, window(), &cancel)
            .await
            .unwrap_err(),
        EngineError::Conflict(ConflictReason::Overlap)
    );
    assert!(h.store.windows().is_empty());

    // Once the booking is cancelled the range is free for maintenance.
    h.engine
        .coordinator
        .cancel(&ctx, booking.id, &cancel)
        .await
        .unwrap();
    h.engine
        .maintenance
        .create(TENANT, window(), &cancel)
        .await
        .unwrap();
}

#[tokio::test]
async fn cancelled_token_aborts_commit() {
    let h = harness();
    let court = h.store.add_facility(TENANT, "Court 1");
    let alice = h.store.add_user(TENANT, "alice@club.test");
    let live = CancellationToken::new();
    let lock = h
        .engine
        .locks
        .acquire(TENANT, court.id, alice.id, SlotRange::new(at(9), at(10)).unwrap(), &live)
        .await
        .unwrap();

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let ctx = TenantContext::new(TENANT, alice.id, ROLE_MEMBER);
    assert_matches!(
        h.engine
            .coordinator
            .commit(&ctx, commit_request(&lock), &cancelled)
            .await,
        Err(EngineError::Cancelled)
    );
    assert!(h.store.bookings().is_empty());
}

// ---------------------------------------------------------------------------
// Audit crash recovery
// ---------------------------------------------------------------------------

/// Inserts into the inner store, then takes the KV store down so the trim
/// that follows fails, as if the process died between the two steps.
struct CrashAfterInsert {
    inner: Arc<MemoryStore>,
    kv: Arc<MemoryKv>,
}

#[async_trait]
impl AuditStore for CrashAfterInsert {
    async fn bulk_insert(&self, entries: &[AuditEntry]) -> Result<u64, StoreError> {
        let inserted = self.inner.bulk_insert(entries).await?;
        self.kv.set_unavailable(true);
        Ok(inserted)
    }

    async fn query_audit(
        &self,
        tenant_id: &str,
        params: &AuditQuery,
    ) -> Result<AuditLogPage, StoreError> {
        self.inner.query_audit(tenant_id, params).await
    }
}

#[tokio::test]
async fn audit_flush_is_at_least_once_across_crash() {
    let kv = Arc::new(MemoryKv::new());
    let durable = Arc::new(MemoryStore::new());
    let config = AuditQueueConfig {
        flush_every: Duration::from_secs(300),
        batch_size: 100,
    };
    let cancel = CancellationToken::new();

    let crashing = AuditQueue::new(
        kv.clone(),
        Arc::new(CrashAfterInsert {
            inner: durable.clone(),
            kv: kv.clone(),
        }),
        Arc::new(ManualClock::new(at(7))),
        Arc::new(UuidGenerator),
        config,
    );
    for i in 0..1_000 {
        crashing
            .push(
                NewAuditEntry {
                    tenant_id: Some(TENANT.into()),
                    action: format!("action-{i}"),
                    resource: "/api/v1/bookings".into(),
                    ..NewAuditEntry::default()
                },
                &cancel,
            )
            .await
            .unwrap();
    }

    assert_matches!(crashing.flush(&cancel).await, Err(EngineError::Unavailable(_)));
    assert_eq!(durable.audit_entries().len(), 100);

    // Restart with a healthy store.
    kv.set_unavailable(false);
    let restarted = AuditQueue::new(
        kv.clone(),
        durable.clone(),
        Arc::new(ManualClock::new(at(7))),
        Arc::new(UuidGenerator),
        config,
    );
    assert_eq!(restarted.drain(&cancel).await.unwrap(), 1_000);
    assert_eq!(restarted.pending(&cancel).await.unwrap(), 0);

    let entries = durable.audit_entries();
    assert_eq!(entries.len(), 1_100);
    // The first batch was re-delivered, and every id is present.
    let first_id = entries[0].id;
    assert_eq!(entries.iter().filter(|e| e.id == first_id).count(), 2);
    let mut ids: Vec<_> = entries.iter().map(|e| e.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 1_000);
}
