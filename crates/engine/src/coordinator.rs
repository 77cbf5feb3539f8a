//! Booking Coordinator: turns a held slot lock into a persisted booking.
//!
//! The storage transaction is the real gate. The lock only keeps honest
//! concurrent checkouts apart; a lock that expired before commit is not an
//! error as long as the overlap probes pass.

use std::sync::Arc;

use clubpulse_core::booking::BookingStatus;
use clubpulse_core::channels::{EVENT_BOOKING_CREATED, EVENT_SLOT_RELEASED};
use clubpulse_core::clock::{Clock, IdGenerator};
use clubpulse_core::facility::FacilityStatus;
use clubpulse_core::slot::SlotRange;
use clubpulse_core::tenant::TenantContext;
use clubpulse_core::types::{DbId, Timestamp};
use clubpulse_db::models::booking::{Booking, NewBooking};
use clubpulse_events::{BusEvent, EventPublisher, Notification, NotificationDispatcher, NotificationKind};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::cancel::cancellable;
use crate::error::{ConflictReason, EngineError};
use crate::lock::SlotLockService;
use crate::store::{BookingStore, FacilityStore, UserStore};

/// Input to [`BookingCoordinator::commit`].
#[derive(Debug, Clone, Deserialize)]
pub struct CommitRequest {
    pub lock_id: String,
    pub facility_id: DbId,
    pub owner_id: DbId,
    pub start: Timestamp,
    pub end: Timestamp,
    #[serde(default)]
    pub notes: Option<String>,
    /// Insert as `confirmed` instead of `pending` (staff-originated bookings).
    #[serde(default)]
    pub confirmed: bool,
}

pub struct BookingCoordinator {
    locks: Arc<SlotLockService>,
    bookings: Arc<dyn BookingStore>,
    facilities: Arc<dyn FacilityStore>,
    users: Arc<dyn UserStore>,
    publisher: EventPublisher,
    notifier: NotificationDispatcher,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl BookingCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        locks: Arc<SlotLockService>,
        bookings: Arc<dyn BookingStore>,
        facilities: Arc<dyn FacilityStore>,
        users: Arc<dyn UserStore>,
        publisher: EventPublisher,
        notifier: NotificationDispatcher,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            locks,
            bookings,
            facilities,
            users,
            publisher,
            notifier,
            clock,
            ids,
        }
    }

    /// Persist a booking for a held lock.
    ///
    /// Errors: `Conflict(bad-range | overlap)`, `MaintenanceBusy`,
    /// `InvalidLock`, `Forbidden`, `NotFound` (facility), `Unavailable`.
    pub async fn commit(
        &self,
        ctx: &TenantContext,
        req: CommitRequest,
        cancel: &CancellationToken,
    ) -> Result<Booking, EngineError> {
        let range = SlotRange::new(req.start, req.end)
            .map_err(|_| EngineError::Conflict(ConflictReason::BadRange))?;
        let tenant_id = ctx.tenant_id.as_str();

        if !ctx.can_act_for(req.owner_id) {
            return Err(EngineError::Forbidden(
                "Cannot book on behalf of another member".into(),
            ));
        }
        if req.confirmed && !ctx.is_staff() {
            return Err(EngineError::Forbidden(
                "Only staff may create confirmed bookings".into(),
            ));
        }

        match self.locks.lock_info(&req.lock_id, cancel).await? {
            Some(info) if info.covers(tenant_id, req.facility_id, &range) && info.user_id == req.owner_id => {}
            Some(_) => {
                tracing::warn!(
                    tenant_id,
                    lock_id = %req.lock_id,
                    facility_id = %req.facility_id,
                    "Lock does not match commit request"
                );
                return Err(EngineError::InvalidLock);
            }
            None => {
                tracing::debug!(
                    tenant_id,
                    lock_id = %req.lock_id,
                    "Lock info gone before commit, relying on overlap probe"
                );
            }
        }

        let facility = cancellable(cancel, self.facilities.find_facility(tenant_id, req.facility_id))
            .await?
            .ok_or_else(|| EngineError::not_found("Facility", req.facility_id))?;
        if facility.status() == FacilityStatus::Closed {
            return Err(EngineError::Validation("Facility is closed".into()));
        }

        let new_booking = NewBooking {
            id: self.ids.entity_id(),
            tenant_id: tenant_id.to_string(),
            facility_id: req.facility_id,
            owner_id: req.owner_id,
            range,
            status: if req.confirmed {
                BookingStatus::Confirmed
            } else {
                BookingStatus::Pending
            },
            notes: req.notes.clone(),
            created_at: self.clock.now(),
        };

        let booking = match cancellable(cancel, self.bookings.insert_booking(&new_booking)).await {
            Ok(booking) => booking,
            Err(err @ (EngineError::Conflict(_) | EngineError::MaintenanceBusy)) => {
                tracing::info!(
                    tenant_id,
                    facility_id = %req.facility_id,
                    error = %err,
                    "Booking commit refused"
                );
                self.release_lock(tenant_id, &req.lock_id, req.facility_id, range, cancel)
                    .await;
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        tracing::info!(
            tenant_id,
            booking_id = %booking.id,
            facility_id = %booking.facility_id,
            owner_id = %booking.owner_id,
            status = %booking.status,
            "Booking committed"
        );

        self.release_lock(tenant_id, &req.lock_id, req.facility_id, range, cancel)
            .await;

        let event = BusEvent::new(
            EVENT_BOOKING_CREATED,
            tenant_id,
            booking.facility_id,
            range,
            self.clock.now(),
        )
        .with_user(booking.owner_id);
        self.publish(&event).await;

        self.notify_owner(
            tenant_id,
            booking.owner_id,
            "Booking received",
            format!(
                "Your booking from {} to {} is {}.",
                booking.starts_at, booking.ends_at, booking.status
            ),
        );

        Ok(booking)
    }

    /// Cancel a booking as its owner or an admin.
    ///
    /// Cancelling an already-cancelled booking succeeds without side effects.
    pub async fn cancel(
        &self,
        ctx: &TenantContext,
        booking_id: DbId,
        cancel: &CancellationToken,
    ) -> Result<Booking, EngineError> {
        let tenant_id = ctx.tenant_id.as_str();

        let booking = cancellable(cancel, self.bookings.find_booking(tenant_id, booking_id))
            .await?
            .ok_or_else(|| EngineError::not_found("Booking", booking_id))?;

        if !ctx.can_act_for(booking.owner_id) {
            return Err(EngineError::Forbidden(
                "Only the owner or an admin may cancel this booking".into(),
            ));
        }

        let outcome = cancellable(cancel, self.bookings.cancel_booking(tenant_id, booking_id))
            .await?
            .ok_or_else(|| EngineError::not_found("Booking", booking_id))?;

        if !outcome.changed {
            tracing::debug!(tenant_id, %booking_id, "Booking already cancelled");
            return Ok(outcome.booking);
        }

        let booking = outcome.booking;
        tracing::info!(
            tenant_id,
            %booking_id,
            actor_id = %ctx.principal_id,
            "Booking cancelled"
        );

        let range = SlotRange {
            start: booking.starts_at,
            end: booking.ends_at,
        };
        let event = BusEvent::new(
            EVENT_SLOT_RELEASED,
            tenant_id,
            booking.facility_id,
            range,
            self.clock.now(),
        )
        .with_user(booking.owner_id)
        .with_message("Booking cancelled");
        self.publish(&event).await;

        self.notify_owner(
            tenant_id,
            booking.owner_id,
            "Booking cancelled",
            format!(
                "Your booking from {} to {} has been cancelled.",
                booking.starts_at, booking.ends_at
            ),
        );

        Ok(booking)
    }

    /// Load a booking visible to the caller (owner or staff).
    pub async fn get(
        &self,
        ctx: &TenantContext,
        booking_id: DbId,
        cancel: &CancellationToken,
    ) -> Result<Booking, EngineError> {
        let booking = cancellable(cancel, self.bookings.find_booking(&ctx.tenant_id, booking_id))
            .await?
            .ok_or_else(|| EngineError::not_found("Booking", booking_id))?;
        if booking.owner_id != ctx.principal_id && !ctx.is_staff() {
            return Err(EngineError::not_found("Booking", booking_id));
        }
        Ok(booking)
    }

    /// Active bookings of a facility overlapping `[from, to)`.
    ///
    /// Members only see their own rows; staff see every booking.
    pub async fn list_for_facility(
        &self,
        ctx: &TenantContext,
        facility_id: DbId,
        from: Timestamp,
        to: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<Vec<Booking>, EngineError> {
        if from >= to {
            return Err(EngineError::Conflict(ConflictReason::BadRange));
        }
        let mut bookings = cancellable(
            cancel,
            self.bookings
                .list_active_bookings(&ctx.tenant_id, facility_id, from, to),
        )
        .await?;
        if !ctx.is_staff() {
            bookings.retain(|b| b.owner_id == ctx.principal_id);
        }
        Ok(bookings)
    }

    /// Release the caller's lock, logging rather than surfacing failures.
    async fn release_lock(
        &self,
        tenant_id: &str,
        lock_id: &str,
        facility_id: DbId,
        range: SlotRange,
        cancel: &CancellationToken,
    ) {
        match self
            .locks
            .release_owned(tenant_id, lock_id, facility_id, range, cancel)
            .await
        {
            Ok(()) => {}
            Err(EngineError::LockExpired) => {
                tracing::warn!(tenant_id, lock_id, "Slot lock expired before release");
            }
            Err(EngineError::NotOwner) => {
                tracing::warn!(tenant_id, lock_id, "Slot lock taken over before release");
            }
            Err(e) => {
                tracing::warn!(tenant_id, lock_id, error = %e, "Failed to release slot lock");
            }
        }
    }

    async fn publish(&self, event: &BusEvent) {
        if let Err(e) = self.publisher.publish(event).await {
            tracing::warn!(
                event_type = %event.event_type,
                facility_id = %event.facility_id,
                error = %e,
                "Failed to publish bus event"
            );
        }
    }

    /// Best-effort email to the booking owner, off the request path.
    fn notify_owner(&self, tenant_id: &str, owner_id: DbId, title: &str, body: String) {
        let users = Arc::clone(&self.users);
        let notifier = self.notifier.clone();
        let tenant_id = tenant_id.to_string();
        let title = title.to_string();

        tokio::spawn(async move {
            let user = match users.find_user(&tenant_id, owner_id).await {
                Ok(Some(user)) => user,
                Ok(None) => {
                    tracing::debug!(%owner_id, "Booking owner not found, skipping notification");
                    return;
                }
                Err(e) => {
                    tracing::warn!(%owner_id, error = %e, "Owner lookup for notification failed");
                    return;
                }
            };

            let notification = Notification {
                recipient: user.email,
                kind: NotificationKind::Email,
                title,
                body,
                action_url: None,
            };
            if let Err(e) = notifier.send(&notification).await {
                tracing::warn!(%owner_id, error = %e, "Booking notification failed");
            }
        });
    }
}
