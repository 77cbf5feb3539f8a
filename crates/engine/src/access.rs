//! Access Decision Engine.
//!
//! Every decision is persisted, including denials. Membership read failures
//! deny entry instead of erroring so controllers fail closed.

use std::sync::Arc;

use clubpulse_core::access::{
    evaluate_entry, Direction, Verdict, REASON_MEMBERSHIP_LOOKUP_FAILED, REASON_USER_NOT_FOUND,
};
use clubpulse_core::clock::{Clock, IdGenerator};
use clubpulse_core::types::DbId;
use clubpulse_db::models::access_log::{AccessLog, NewAccessLog};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::cancel::cancellable;
use crate::error::EngineError;
use crate::store::{AccessStore, UserStore};

/// Upper bound for [`AccessEngine::recent`].
pub const MAX_RECENT_LOGS: i64 = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct AccessRequest {
    pub user_id: DbId,
    #[serde(default)]
    pub facility_id: Option<DbId>,
    #[serde(default)]
    pub direction: Direction,
    /// Client-supplied idempotency key.
    #[serde(default)]
    pub event_id: Option<String>,
}

pub struct AccessEngine {
    users: Arc<dyn UserStore>,
    access: Arc<dyn AccessStore>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl AccessEngine {
    pub fn new(
        users: Arc<dyn UserStore>,
        access: Arc<dyn AccessStore>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            users,
            access,
            clock,
            ids,
        }
    }

    /// Decide and log an entry or exit.
    ///
    /// A repeated `event_id` returns the stored log without writing.
    pub async fn decide(
        &self,
        tenant_id: &str,
        req: AccessRequest,
        cancel: &CancellationToken,
    ) -> Result<AccessLog, EngineError> {
        let event_id = req
            .event_id
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);

        if let Some(event_id) = event_id.as_deref() {
            let existing = cancellable(
                cancel,
                self.access.find_access_log_by_event(tenant_id, event_id),
            )
            .await?;
            if let Some(log) = existing {
                tracing::debug!(tenant_id, event_id, "Replaying stored access decision");
                return Ok(log);
            }
        }

        let verdict = self.evaluate(tenant_id, &req, cancel).await?;

        let input = NewAccessLog {
            id: self.ids.entity_id(),
            tenant_id: tenant_id.to_string(),
            event_id,
            user_id: req.user_id,
            facility_id: req.facility_id,
            direction: req.direction.as_str().to_string(),
            decision: verdict.decision.as_str().to_string(),
            reason: verdict.reason.to_string(),
            at: self.clock.now(),
        };
        let log = cancellable(cancel, self.access.insert_access_log(&input)).await?;

        tracing::info!(
            tenant_id,
            user_id = %log.user_id,
            direction = %log.direction,
            decision = %log.decision,
            reason = %log.reason,
            "Access decision"
        );
        Ok(log)
    }

    /// Most recent logs for the tenant, newest first.
    pub async fn recent(
        &self,
        tenant_id: &str,
        user_id: Option<DbId>,
        limit: i64,
        cancel: &CancellationToken,
    ) -> Result<Vec<AccessLog>, EngineError> {
        let limit = limit.clamp(1, MAX_RECENT_LOGS);
        cancellable(cancel, self.access.list_access_logs(tenant_id, user_id, limit)).await
    }

    async fn evaluate(
        &self,
        tenant_id: &str,
        req: &AccessRequest,
        cancel: &CancellationToken,
    ) -> Result<Verdict, EngineError> {
        let user = cancellable(cancel, self.users.find_user(tenant_id, req.user_id)).await?;
        if user.is_none() {
            return Ok(Verdict::denied(REASON_USER_NOT_FOUND));
        }

        if req.direction == Direction::Out {
            return Ok(Verdict::granted());
        }

        match cancellable(cancel, self.access.list_memberships(tenant_id, req.user_id)).await {
            Ok(memberships) => {
                let snapshots: Vec<_> = memberships.iter().map(|m| m.snapshot()).collect();
                Ok(evaluate_entry(&snapshots))
            }
            Err(EngineError::Cancelled) => Err(EngineError::Cancelled),
            Err(e) => {
                tracing::error!(
                    tenant_id,
                    user_id = %req.user_id,
                    error = %e,
                    "Membership lookup failed, denying entry"
                );
                Ok(Verdict::denied(REASON_MEMBERSHIP_LOOKUP_FAILED))
            }
        }
    }
}
