//! Clubpulse reservation and access core.
//!
//! Services here own the concurrency-sensitive behaviour of the system:
//!
//! - [`lock::SlotLockService`]: KV soft-locks on facility time slots.
//! - [`coordinator::BookingCoordinator`]: turns a held lock into a booking.
//! - [`access::AccessEngine`]: GRANT/DENY decisions with idempotent logs.
//! - [`audit_queue::AuditQueue`]: KV-backed audit ingest with batch flush.
//! - [`maintenance::MaintenanceService`] and its scheduler.
//! - [`availability::AvailabilityService`]: read-only slot view.
//! - [`directory::DirectoryService`]: facilities, members, memberships.
//!
//! Persistence goes through the capability traits in [`store`], with a
//! PostgreSQL implementation for production and an in-memory one for tests.
//! Every public operation takes a [`CancellationToken`] and returns
//! [`EngineError::Cancelled`] if it fires first.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod access;
pub mod audit_queue;
pub mod availability;
pub mod cancel;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod lock;
pub mod maintenance;
pub mod store;

pub use error::{ConflictReason, EngineError};

use std::sync::Arc;
use std::time::Duration;

use clubpulse_core::clock::{Clock, IdGenerator};
use clubpulse_events::{EventPublisher, NotificationDispatcher};
use clubpulse_kv::KvStore;

use crate::access::AccessEngine;
use crate::audit_queue::{AuditQueue, AuditQueueConfig};
use crate::availability::AvailabilityService;
use crate::coordinator::BookingCoordinator;
use crate::directory::DirectoryService;
use crate::lock::{SlotLockService, DEFAULT_LOCK_TTL};
use crate::maintenance::MaintenanceService;
use crate::store::Store;

/// Tunables for [`Engine::new`].
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub lock_ttl: Duration,
    pub audit: AuditQueueConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_ttl: DEFAULT_LOCK_TTL,
            audit: AuditQueueConfig::default(),
        }
    }
}

/// Every engine service, wired to one store and one KV backend.
#[derive(Clone)]
pub struct Engine {
    pub locks: Arc<SlotLockService>,
    pub coordinator: Arc<BookingCoordinator>,
    pub access: Arc<AccessEngine>,
    pub audit: Arc<AuditQueue>,
    pub maintenance: Arc<MaintenanceService>,
    pub availability: Arc<AvailabilityService>,
    pub directory: Arc<DirectoryService>,
}

impl Engine {
    pub fn new<S: Store + 'static>(
        store: Arc<S>,
        kv: Arc<dyn KvStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        notifier: NotificationDispatcher,
        config: EngineConfig,
    ) -> Self {
        let publisher = EventPublisher::new(Arc::clone(&kv));
        let locks = Arc::new(SlotLockService::new(
            Arc::clone(&kv),
            Arc::clone(&clock),
            Arc::clone(&ids),
            config.lock_ttl,
        ));

        let coordinator = BookingCoordinator::new(
            Arc::clone(&locks),
            store.clone(),
            store.clone(),
            store.clone(),
            publisher.clone(),
            notifier,
            Arc::clone(&clock),
            Arc::clone(&ids),
        );
        let access = AccessEngine::new(
            store.clone(),
            store.clone(),
            Arc::clone(&clock),
            Arc::clone(&ids),
        );
        let audit = AuditQueue::new(
            Arc::clone(&kv),
            store.clone(),
            Arc::clone(&clock),
            Arc::clone(&ids),
            config.audit,
        );
        let maintenance = MaintenanceService::new(
            store.clone(),
            store.clone(),
            publisher,
            Arc::clone(&clock),
            Arc::clone(&ids),
        );
        let directory = DirectoryService::new(store.clone(), store.clone(), store.clone(), ids);
        let availability =
            AvailabilityService::new(Arc::clone(&locks), store.clone(), store.clone(), store);

        Self {
            locks,
            coordinator: Arc::new(coordinator),
            access: Arc::new(access),
            audit: Arc::new(audit),
            maintenance: Arc::new(maintenance),
            availability: Arc::new(availability),
            directory: Arc::new(directory),
        }
    }
}
