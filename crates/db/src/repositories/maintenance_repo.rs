//! Repository for the `maintenance_windows` table.

use clubpulse_core::facility::FacilityStatus;
use clubpulse_core::maintenance::MaintenanceStatus;
use clubpulse_core::slot::SlotRange;
use clubpulse_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::is_exclusion_violation;
use crate::models::booking::CheckedInsert;
use crate::models::maintenance::{MaintenanceWindow, NewMaintenanceWindow};
use crate::repositories::{BookingRepo, FacilityRepo};

const COLUMNS: &str = "id, tenant_id, facility_id, starts_at, ends_at, kind, status, \
                       description, created_at, updated_at";

pub struct MaintenanceWindowRepo;

impl MaintenanceWindowRepo {
    /// Insert a window unless another non-cancelled window or an active
    /// booking on the same facility intersects it.
    pub async fn insert_checked(
        pool: &PgPool,
        input: &NewMaintenanceWindow,
    ) -> Result<CheckedInsert<MaintenanceWindow>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        let overlapping =
            Self::count_overlapping(&mut *tx, &input.tenant_id, input.facility_id, &input.range)
                .await?;
        if overlapping > 0 {
            tx.rollback().await?;
            return Ok(CheckedInsert::Overlap);
        }

        let booked = BookingRepo::count_overlapping(
            &mut *tx,
            &input.tenant_id,
            input.facility_id,
            &input.range,
        )
        .await?;
        if booked > 0 {
            tx.rollback().await?;
            return Ok(CheckedInsert::Booked);
        }

        let query = format!(
            "INSERT INTO maintenance_windows (id, tenant_id, facility_id, starts_at, ends_at, \
                                              kind, description, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, MaintenanceWindow>(&query)
            .bind(input.id)
            .bind(&input.tenant_id)
            .bind(input.facility_id)
            .bind(input.range.start)
            .bind(input.range.end)
            .bind(&input.kind)
            .bind(&input.description)
            .bind(input.created_at)
            .fetch_one(&mut *tx)
            .await;

        let window = match inserted {
            Ok(window) => window,
            Err(e) if is_exclusion_violation(&e) => return Ok(CheckedInsert::Overlap),
            Err(e) => return Err(e),
        };

        tx.commit().await?;
        Ok(CheckedInsert::Inserted(window))
    }

    /// Count non-cancelled windows on a facility intersecting `range`.
    pub async fn count_overlapping(
        conn: &mut PgConnection,
        tenant_id: &str,
        facility_id: DbId,
        range: &SlotRange,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*)::BIGINT FROM maintenance_windows
             WHERE tenant_id = $1 AND facility_id = $2
               AND status <> $3
               AND starts_at < $5 AND ends_at > $4",
        )
        .bind(tenant_id)
        .bind(facility_id)
        .bind(MaintenanceStatus::Cancelled.as_str())
        .bind(range.start)
        .bind(range.end)
        .fetch_one(conn)
        .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        tenant_id: &str,
        id: DbId,
    ) -> Result<Option<MaintenanceWindow>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM maintenance_windows WHERE tenant_id = $1 AND id = $2");
        sqlx::query_as::<_, MaintenanceWindow>(&query)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Non-cancelled windows on a facility intersecting `[from, to)`.
    pub async fn list_blocking_in_range(
        pool: &PgPool,
        tenant_id: &str,
        facility_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<MaintenanceWindow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM maintenance_windows
             WHERE tenant_id = $1 AND facility_id = $2
               AND status <> $3
               AND starts_at < $5 AND ends_at > $4
             ORDER BY starts_at"
        );
        sqlx::query_as::<_, MaintenanceWindow>(&query)
            .bind(tenant_id)
            .bind(facility_id)
            .bind(MaintenanceStatus::Cancelled.as_str())
            .bind(from)
            .bind(to)
            .fetch_all(pool)
            .await
    }

    /// Move a window from `from` to `to`, returning `None` if it was not in
    /// `from` (lost a race or already transitioned).
    pub async fn transition(
        conn: &mut PgConnection,
        tenant_id: &str,
        id: DbId,
        from: MaintenanceStatus,
        to: MaintenanceStatus,
    ) -> Result<Option<MaintenanceWindow>, sqlx::Error> {
        let query = format!(
            "UPDATE maintenance_windows SET status = $4, updated_at = now()
             WHERE tenant_id = $1 AND id = $2 AND status = $3
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MaintenanceWindow>(&query)
            .bind(tenant_id)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .fetch_optional(conn)
            .await
    }

    /// [`transition`](Self::transition) plus an optional facility status
    /// change, committed together.
    pub async fn transition_with_facility(
        pool: &PgPool,
        tenant_id: &str,
        id: DbId,
        from: MaintenanceStatus,
        to: MaintenanceStatus,
        facility_status: Option<FacilityStatus>,
    ) -> Result<Option<MaintenanceWindow>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let Some(window) = Self::transition(&mut *tx, tenant_id, id, from, to).await? else {
            tx.rollback().await?;
            return Ok(None);
        };

        if let Some(status) = facility_status {
            FacilityRepo::update_status(&mut *tx, tenant_id, window.facility_id, status).await?;
        }

        tx.commit().await?;
        Ok(Some(window))
    }

    /// Windows in `status` whose boundary (`starts_at` for scheduled,
    /// `ends_at` for in-progress) has passed. Spans all tenants.
    pub async fn list_due(
        pool: &PgPool,
        status: MaintenanceStatus,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<MaintenanceWindow>, sqlx::Error> {
        let boundary = match status {
            MaintenanceStatus::InProgress => "ends_at",
            _ => "starts_at",
        };
        let query = format!(
            "SELECT {COLUMNS} FROM maintenance_windows
             WHERE status = $1 AND {boundary} <= $2
             ORDER BY {boundary}
             LIMIT $3"
        );
        sqlx::query_as::<_, MaintenanceWindow>(&query)
            .bind(status.as_str())
            .bind(now)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
