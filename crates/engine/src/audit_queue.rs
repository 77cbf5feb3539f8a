//! Audit Queue: KV-backed audit ingest with periodic batch flush.
//!
//! Entries are `LPUSH`ed onto `audit:queue`, so the oldest records sit at the
//! tail. A flush reads the tail batch, bulk-inserts it, and only then trims
//! exactly those records. A crash between insert and trim re-delivers the
//! batch on the next flush (at-least-once).
//!
//! Fire-and-forget ingest goes through one bounded channel to a single pusher
//! task, so records from one producer reach the list in call order.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use clubpulse_core::clock::{Clock, IdGenerator};
use clubpulse_core::types::DbId;
use clubpulse_db::models::audit::{AuditEntry, AuditLogPage, AuditQuery};
use clubpulse_kv::KvStore;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::cancel::cancellable;
use crate::error::EngineError;
use crate::store::AuditStore;

pub const AUDIT_QUEUE_KEY: &str = "audit:queue";

pub const DEFAULT_FLUSH_EVERY: Duration = Duration::from_secs(300);
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// Records accepted by `ingest` but not yet pushed. Further ingests are dropped.
pub const INGEST_BUFFER: usize = 10_000;

#[derive(Debug, Clone, Copy)]
pub struct AuditQueueConfig {
    pub flush_every: Duration,
    pub batch_size: usize,
}

impl Default for AuditQueueConfig {
    fn default() -> Self {
        Self {
            flush_every: DEFAULT_FLUSH_EVERY,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// An audit record before the queue stamps it.
#[derive(Debug, Clone, Default)]
pub struct NewAuditEntry {
    /// Kept when present so re-ingesting the same event is recognisable.
    pub id: Option<DbId>,
    pub tenant_id: Option<String>,
    pub principal_id: Option<DbId>,
    pub action: String,
    pub resource: String,
    pub details_json: serde_json::Value,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Outcome of one flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStats {
    pub read: usize,
    pub inserted: u64,
    pub malformed: usize,
}

enum Pending {
    Record { id: DbId, encoded: String },
    /// Acknowledged once every earlier record has been pushed.
    Barrier(oneshot::Sender<()>),
}

pub struct AuditQueue {
    kv: Arc<dyn KvStore>,
    store: Arc<dyn AuditStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    config: AuditQueueConfig,
    pending_tx: mpsc::Sender<Pending>,
    /// Taken by the first caller that needs the pusher task running.
    pending_rx: Mutex<Option<mpsc::Receiver<Pending>>>,
}

impl AuditQueue {
    pub fn new(
        kv: Arc<dyn KvStore>,
        store: Arc<dyn AuditStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
        config: AuditQueueConfig,
    ) -> Self {
        let (pending_tx, pending_rx) = mpsc::channel(INGEST_BUFFER);
        Self {
            kv,
            store,
            clock,
            ids,
            config,
            pending_tx,
            pending_rx: Mutex::new(Some(pending_rx)),
        }
    }

    /// Spawn the pusher on first use. It exits when the queue is dropped.
    fn ensure_pusher(&self) {
        let rx = match self.pending_rx.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(mut rx) = rx else {
            return;
        };
        let kv = Arc::clone(&self.kv);
        tokio::spawn(async move {
            while let Some(pending) = rx.recv().await {
                match pending {
                    Pending::Record { id, encoded } => {
                        if let Err(e) = kv.lpush(AUDIT_QUEUE_KEY, &encoded).await {
                            tracing::warn!(audit_id = %id, error = %e, "Audit ingest dropped");
                        }
                    }
                    Pending::Barrier(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
        });
    }

    fn stamp(&self, entry: NewAuditEntry) -> AuditEntry {
        AuditEntry {
            id: entry.id.unwrap_or_else(|| self.ids.entity_id()),
            tenant_id: entry.tenant_id,
            principal_id: entry.principal_id,
            action: entry.action,
            resource: entry.resource,
            details_json: entry.details_json,
            ip: entry.ip,
            user_agent: entry.user_agent,
            at: self.clock.now(),
        }
    }

    /// Enqueue an entry and wait for the KV write.
    pub async fn push(
        &self,
        entry: NewAuditEntry,
        cancel: &CancellationToken,
    ) -> Result<DbId, EngineError> {
        let record = self.stamp(entry);
        let encoded =
            serde_json::to_string(&record).map_err(|e| EngineError::Internal(e.to_string()))?;
        cancellable(cancel, self.kv.lpush(AUDIT_QUEUE_KEY, &encoded)).await?;
        Ok(record.id)
    }

    /// Fire-and-forget enqueue. KV failures are logged and dropped.
    pub fn ingest(&self, entry: NewAuditEntry) -> DbId {
        let record = self.stamp(entry);
        let id = record.id;

        let encoded = match serde_json::to_string(&record) {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::error!(audit_id = %id, error = %e, "Failed to encode audit entry");
                return id;
            }
        };

        self.ensure_pusher();
        if let Err(e) = self.pending_tx.try_send(Pending::Record { id, encoded }) {
            tracing::warn!(audit_id = %id, error = %e, "Audit ingest buffer full, entry dropped");
        }
        id
    }

    /// Wait until every record accepted by `ingest` so far is in the KV list.
    pub async fn settle(&self) {
        self.ensure_pusher();
        let (ack, done) = oneshot::channel();
        if self.pending_tx.send(Pending::Barrier(ack)).await.is_ok() {
            let _ = done.await;
        }
    }

    /// Number of records waiting in the queue.
    pub async fn pending(&self, cancel: &CancellationToken) -> Result<usize, EngineError> {
        cancellable(cancel, self.kv.llen(AUDIT_QUEUE_KEY)).await
    }

    /// Move up to one batch of the oldest records into durable storage.
    pub async fn flush(&self, cancel: &CancellationToken) -> Result<FlushStats, EngineError> {
        let batch = self.config.batch_size.max(1) as isize;
        let mut raw = cancellable(cancel, self.kv.lrange(AUDIT_QUEUE_KEY, -batch, -1)).await?;
        if raw.is_empty() {
            return Ok(FlushStats::default());
        }
        // Tail is oldest; insert in ingest order.
        raw.reverse();

        let mut stats = FlushStats {
            read: raw.len(),
            ..FlushStats::default()
        };
        let mut entries = Vec::with_capacity(raw.len());
        for record in &raw {
            match serde_json::from_str::<AuditEntry>(record) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    stats.malformed += 1;
                    tracing::warn!(error = %e, "Skipping malformed audit record");
                }
            }
        }

        if !entries.is_empty() {
            stats.inserted = cancellable(cancel, self.store.bulk_insert(&entries)).await?;
        }

        // Keep everything except the `read` records just processed.
        let keep_until = -(stats.read as isize) - 1;
        cancellable(cancel, self.kv.ltrim(AUDIT_QUEUE_KEY, 0, keep_until)).await?;

        tracing::debug!(
            read = stats.read,
            inserted = stats.inserted,
            malformed = stats.malformed,
            "Audit batch flushed"
        );
        Ok(stats)
    }

    /// Flush batches until the queue is short of a full batch.
    pub async fn drain(&self, cancel: &CancellationToken) -> Result<u64, EngineError> {
        let mut total = 0;
        loop {
            let stats = self.flush(cancel).await?;
            total += stats.inserted;
            if stats.read < self.config.batch_size.max(1) {
                return Ok(total);
            }
        }
    }

    /// Query the durable audit table.
    pub async fn query(
        &self,
        tenant_id: &str,
        params: &AuditQuery,
        cancel: &CancellationToken,
    ) -> Result<AuditLogPage, EngineError> {
        cancellable(cancel, self.store.query_audit(tenant_id, params)).await
    }

    /// Run the flush loop until `cancel` fires, then drain once more.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.flush_every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    match self.drain(&cancel).await {
                        Ok(0) => {}
                        Ok(count) => tracing::info!(count, "Flushed audit entries"),
                        Err(EngineError::Cancelled) => break,
                        Err(e) => tracing::error!(error = %e, "Audit flush failed"),
                    }
                }
            }
        }

        // The loop token is already cancelled; the final drain gets its own.
        self.settle().await;
        match self.drain(&CancellationToken::new()).await {
            Ok(count) => tracing::info!(count, "Audit queue stopped after final flush"),
            Err(e) => tracing::error!(error = %e, "Final audit flush failed"),
        }
    }
}
