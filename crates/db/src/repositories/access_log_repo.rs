//! Repository for the append-only `access_logs` table.

use clubpulse_core::types::DbId;
use sqlx::PgPool;

use crate::models::access_log::{AccessLog, NewAccessLog};

const COLUMNS: &str = "id, tenant_id, event_id, user_id, facility_id, direction, status, reason, at";

pub struct AccessLogRepo;

impl AccessLogRepo {
    pub async fn find_by_event_id(
        pool: &PgPool,
        tenant_id: &str,
        event_id: &str,
    ) -> Result<Option<AccessLog>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM access_logs WHERE tenant_id = $1 AND event_id = $2");
        sqlx::query_as::<_, AccessLog>(&query)
            .bind(tenant_id)
            .bind(event_id)
            .fetch_optional(pool)
            .await
    }

    /// Insert a log, or return the row already stored under the same
    /// `(tenant_id, event_id)`.
    ///
    /// Two devices racing on one event id both get the first writer's row.
    pub async fn insert_idempotent(
        pool: &PgPool,
        input: &NewAccessLog,
    ) -> Result<AccessLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO access_logs (id, tenant_id, event_id, user_id, facility_id, \
                                      direction, status, reason, at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (tenant_id, event_id) WHERE event_id IS NOT NULL DO NOTHING
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, AccessLog>(&query)
            .bind(input.id)
            .bind(&input.tenant_id)
            .bind(&input.event_id)
            .bind(input.user_id)
            .bind(input.facility_id)
            .bind(&input.direction)
            .bind(&input.decision)
            .bind(&input.reason)
            .bind(input.at)
            .fetch_optional(pool)
            .await?;

        match (inserted, input.event_id.as_deref()) {
            (Some(row), _) => Ok(row),
            (None, Some(event_id)) => Self::find_by_event_id(pool, &input.tenant_id, event_id)
                .await?
                .ok_or(sqlx::Error::RowNotFound),
            (None, None) => Err(sqlx::Error::RowNotFound),
        }
    }

    /// Most recent logs for a tenant, optionally for one user.
    pub async fn list_recent(
        pool: &PgPool,
        tenant_id: &str,
        user_id: Option<DbId>,
        limit: i64,
    ) -> Result<Vec<AccessLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM access_logs
             WHERE tenant_id = $1 AND ($2::UUID IS NULL OR user_id = $2)
             ORDER BY at DESC
             LIMIT $3"
        );
        sqlx::query_as::<_, AccessLog>(&query)
            .bind(tenant_id)
            .bind(user_id)
            .bind(limit.clamp(1, 500))
            .fetch_all(pool)
            .await
    }
}
