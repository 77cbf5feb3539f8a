//! Clock and id provider.
//!
//! Engine services never call `Utc::now()` or `Uuid::new_v4()` directly;
//! they go through these capabilities so tests can pin time and ids.

use std::sync::Mutex;

use chrono::Utc;

use crate::types::{DbId, Timestamp};

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Production clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: Timestamp) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Generator for entity ids and opaque tokens.
pub trait IdGenerator: Send + Sync {
    /// Id for a persisted entity. Time-ordered so btree indexes stay compact.
    fn entity_id(&self) -> DbId;

    /// Unpredictable token (lock ids, idempotency keys).
    fn token(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn entity_id(&self) -> DbId {
        uuid::Uuid::now_v7()
    }

    fn token(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
