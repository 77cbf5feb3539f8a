//! Maintenance windows: creation, lifecycle transitions, and the scheduler
//! that moves windows through their lifecycle as time passes.

use std::sync::Arc;
use std::time::Duration;

use clubpulse_core::channels::{EVENT_MAINTENANCE_END, EVENT_MAINTENANCE_START};
use clubpulse_core::clock::{Clock, IdGenerator};
use clubpulse_core::facility::FacilityStatus;
use clubpulse_core::maintenance::{MaintenanceKind, MaintenanceStatus};
use clubpulse_core::slot::SlotRange;
use clubpulse_core::types::DbId;
use clubpulse_db::models::maintenance::{
    CreateMaintenanceWindow, MaintenanceWindow, NewMaintenanceWindow,
};
use clubpulse_events::{BusEvent, EventPublisher};
use tokio_util::sync::CancellationToken;

use crate::cancel::cancellable;
use crate::error::EngineError;
use crate::store::{FacilityStore, MaintenanceStore};

/// Default scheduler poll period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Windows handled per status per scheduler tick.
const DUE_BATCH: i64 = 100;

// ---------------------------------------------------------------------------
// MaintenanceService
// ---------------------------------------------------------------------------

pub struct MaintenanceService {
    windows: Arc<dyn MaintenanceStore>,
    facilities: Arc<dyn FacilityStore>,
    publisher: EventPublisher,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl MaintenanceService {
    pub fn new(
        windows: Arc<dyn MaintenanceStore>,
        facilities: Arc<dyn FacilityStore>,
        publisher: EventPublisher,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            windows,
            facilities,
            publisher,
            clock,
            ids,
        }
    }

    /// Schedule a window. Overlap with another non-cancelled window or an
    /// active booking on the same facility is a `Conflict(overlap)`.
    pub async fn create(
        &self,
        tenant_id: &str,
        input: CreateMaintenanceWindow,
        cancel: &CancellationToken,
    ) -> Result<MaintenanceWindow, EngineError> {
        let range = SlotRange::new(input.starts_at, input.ends_at)?;
        let kind: MaintenanceKind = input.kind.parse().map_err(EngineError::Validation)?;

        cancellable(cancel, self.facilities.find_facility(tenant_id, input.facility_id))
            .await?
            .ok_or_else(|| EngineError::not_found("Facility", input.facility_id))?;

        let new_window = NewMaintenanceWindow {
            id: self.ids.entity_id(),
            tenant_id: tenant_id.to_string(),
            facility_id: input.facility_id,
            range,
            kind: kind.as_str().to_string(),
            description: input.description,
            created_at: self.clock.now(),
        };
        let window = cancellable(cancel, self.windows.insert_window(&new_window)).await?;

        tracing::info!(
            tenant_id,
            window_id = %window.id,
            facility_id = %window.facility_id,
            kind = %window.kind,
            "Maintenance window scheduled"
        );
        Ok(window)
    }

    pub async fn get(
        &self,
        tenant_id: &str,
        id: DbId,
        cancel: &CancellationToken,
    ) -> Result<MaintenanceWindow, EngineError> {
        cancellable(cancel, self.windows.find_window(tenant_id, id))
            .await?
            .ok_or_else(|| EngineError::not_found("MaintenanceWindow", id))
    }

    /// `scheduled → in_progress`; the facility goes into maintenance.
    pub async fn start(
        &self,
        tenant_id: &str,
        id: DbId,
        cancel: &CancellationToken,
    ) -> Result<MaintenanceWindow, EngineError> {
        let window = self
            .transition(
                tenant_id,
                id,
                MaintenanceStatus::InProgress,
                Some(FacilityStatus::Maintenance),
                cancel,
            )
            .await?;
        self.publish(EVENT_MAINTENANCE_START, &window).await;
        Ok(window)
    }

    /// `in_progress → completed`; the facility becomes active again.
    pub async fn complete(
        &self,
        tenant_id: &str,
        id: DbId,
        cancel: &CancellationToken,
    ) -> Result<MaintenanceWindow, EngineError> {
        let window = self
            .transition(
                tenant_id,
                id,
                MaintenanceStatus::Completed,
                Some(FacilityStatus::Active),
                cancel,
            )
            .await?;
        self.publish(EVENT_MAINTENANCE_END, &window).await;
        Ok(window)
    }

    /// `scheduled → cancelled`. The range stops blocking bookings.
    pub async fn cancel(
        &self,
        tenant_id: &str,
        id: DbId,
        cancel: &CancellationToken,
    ) -> Result<MaintenanceWindow, EngineError> {
        self.transition(tenant_id, id, MaintenanceStatus::Cancelled, None, cancel)
            .await
    }

    async fn transition(
        &self,
        tenant_id: &str,
        id: DbId,
        to: MaintenanceStatus,
        facility_status: Option<FacilityStatus>,
        cancel: &CancellationToken,
    ) -> Result<MaintenanceWindow, EngineError> {
        let current = self.get(tenant_id, id, cancel).await?;
        let from = current.status();
        from.validate_transition(to).map_err(EngineError::InvalidState)?;

        let updated = cancellable(
            cancel,
            self.windows
                .transition_window(tenant_id, id, from, to, facility_status),
        )
        .await?
        .ok_or_else(|| {
            EngineError::InvalidState(format!(
                "Maintenance window changed concurrently (expected {from})"
            ))
        })?;

        tracing::info!(
            tenant_id,
            window_id = %id,
            facility_id = %updated.facility_id,
            from = %from,
            to = %to,
            "Maintenance window transitioned"
        );
        Ok(updated)
    }

    async fn publish(&self, event_type: &str, window: &MaintenanceWindow) {
        let range = SlotRange {
            start: window.starts_at,
            end: window.ends_at,
        };
        let mut event = BusEvent::new(
            event_type,
            &window.tenant_id,
            window.facility_id,
            range,
            self.clock.now(),
        );
        if let Some(description) = &window.description {
            event = event.with_message(description.clone());
        }
        if let Err(e) = self.publisher.publish(&event).await {
            tracing::warn!(
                event_type,
                window_id = %window.id,
                error = %e,
                "Failed to publish maintenance event"
            );
        }
    }

    /// Start every scheduled window whose start has passed, then complete
    /// every in-progress window whose end has passed. Returns how many
    /// windows moved.
    pub async fn advance_due(&self, cancel: &CancellationToken) -> Result<usize, EngineError> {
        let now = self.clock.now();
        let mut moved = 0;

        let due = cancellable(
            cancel,
            self.windows
                .list_due_windows(MaintenanceStatus::Scheduled, now, DUE_BATCH),
        )
        .await?;
        for window in due {
            match self.start(&window.tenant_id, window.id, cancel).await {
                Ok(_) => moved += 1,
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(e) => tracing::warn!(window_id = %window.id, error = %e, "Failed to start window"),
            }
        }

        let due = cancellable(
            cancel,
            self.windows
                .list_due_windows(MaintenanceStatus::InProgress, now, DUE_BATCH),
        )
        .await?;
        for window in due {
            match self.complete(&window.tenant_id, window.id, cancel).await {
                Ok(_) => moved += 1,
                Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                Err(e) => {
                    tracing::warn!(window_id = %window.id, error = %e, "Failed to complete window")
                }
            }
        }

        Ok(moved)
    }
}

// ---------------------------------------------------------------------------
// MaintenanceScheduler
// ---------------------------------------------------------------------------

/// Background task driving [`MaintenanceService::advance_due`].
pub struct MaintenanceScheduler {
    service: Arc<MaintenanceService>,
    poll: Duration,
}

impl MaintenanceScheduler {
    pub fn new(service: Arc<MaintenanceService>, poll: Duration) -> Self {
        Self { service, poll }
    }

    /// Run until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.poll);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Maintenance scheduler cancelled");
                    break;
                }
                _ = interval.tick() => {
                    match self.service.advance_due(&cancel).await {
                        Ok(0) | Err(EngineError::Cancelled) => {}
                        Ok(moved) => tracing::info!(moved, "Advanced maintenance windows"),
                        Err(e) => tracing::error!(error = %e, "Maintenance scheduler tick failed"),
                    }
                }
            }
        }
    }
}
