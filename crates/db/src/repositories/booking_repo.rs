//! Repository for the `bookings` table.
//!
//! [`BookingRepo::insert_checked`] is the only way a booking row is created:
//! it runs the overlap probes and the insert inside one SERIALIZABLE
//! transaction, so two concurrent commits for intersecting ranges cannot
//! both succeed.

use clubpulse_core::booking::BookingStatus;
use clubpulse_core::slot::SlotRange;
use clubpulse_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::is_exclusion_violation;
use crate::models::booking::{Booking, CancelOutcome, CheckedInsert, NewBooking};
use crate::repositories::MaintenanceWindowRepo;

const COLUMNS: &str = "id, tenant_id, facility_id, owner_id, starts_at, ends_at, status, \
                       notes, created_at, updated_at";

pub struct BookingRepo;

impl BookingRepo {
    /// Insert a booking if its range is free of active bookings and
    /// non-cancelled maintenance windows.
    ///
    /// Serialization failures are returned as errors; callers classify them
    /// as conflicts.
    pub async fn insert_checked(
        pool: &PgPool,
        input: &NewBooking,
    ) -> Result<CheckedInsert<Booking>, sqlx::Error> {
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

        let blocked = MaintenanceWindowRepo::count_overlapping(
            &mut *tx,
            &input.tenant_id,
            input.facility_id,
            &input.range,
        )
        .await?;
        if blocked > 0 {
            tx.rollback().await?;
            return Ok(CheckedInsert::Maintenance);
        }

        let query = format!(
            "INSERT INTO bookings (id, tenant_id, facility_id, owner_id, starts_at, ends_at, \
                                   status, notes, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, Booking>(&query)
            .bind(input.id)
            .bind(&input.tenant_id)
            .bind(input.facility_id)
            .bind(input.owner_id)
            .bind(input.range.start)
            .bind(input.range.end)
            .bind(input.status.as_str())
            .bind(&input.notes)
            .bind(input.created_at)
            .fetch_one(&mut *tx)
            .await;

        let booking = match inserted {
            Ok(booking) => booking,
            Err(e) if is_exclusion_violation(&e) => return Ok(CheckedInsert::Overlap),
            Err(e) => return Err(e),
        };

        tx.commit().await?;
        Ok(CheckedInsert::Inserted(booking))
    }

    /// Count active bookings on a facility intersecting `range`.
    pub async fn count_overlapping(
        conn: &mut PgConnection,
        tenant_id: &str,
        facility_id: DbId,
        range: &SlotRange,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*)::BIGINT FROM bookings
             WHERE tenant_id = $1 AND facility_id = $2
               AND status = ANY($3)
               AND starts_at < $5 AND ends_at > $4",
        )
        .bind(tenant_id)
        .bind(facility_id)
        .bind(active_statuses())
        .bind(range.start)
        .bind(range.end)
        .fetch_one(conn)
        .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        tenant_id: &str,
        id: DbId,
    ) -> Result<Option<Booking>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM bookings WHERE tenant_id = $1 AND id = $2");
        sqlx::query_as::<_, Booking>(&query)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Flip a booking to `cancelled`.
    ///
    /// Returns `None` if the booking does not exist in this tenant. Cancelling
    /// an already-cancelled booking succeeds with `changed = false`.
    pub async fn cancel(
        pool: &PgPool,
        tenant_id: &str,
        id: DbId,
    ) -> Result<Option<CancelOutcome>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let select = format!(
            "SELECT {COLUMNS} FROM bookings WHERE tenant_id = $1 AND id = $2 FOR UPDATE"
        );
        let Some(current) = sqlx::query_as::<_, Booking>(&select)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            tx.rollback().await?;
            return Ok(None);
        };

        if current.status() == BookingStatus::Cancelled {
            tx.commit().await?;
            return Ok(Some(CancelOutcome {
                booking: current,
                changed: false,
            }));
        }

        let update = format!(
            "UPDATE bookings SET status = $3, updated_at = now()
             WHERE tenant_id = $1 AND id = $2
             RETURNING {COLUMNS}"
        );
        let booking = sqlx::query_as::<_, Booking>(&update)
            .bind(tenant_id)
            .bind(id)
            .bind(BookingStatus::Cancelled.as_str())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(CancelOutcome {
            booking,
            changed: true,
        }))
    }

    /// Active bookings on a facility intersecting `[from, to)`, by start time.
    pub async fn list_active_in_range(
        pool: &PgPool,
        tenant_id: &str,
        facility_id: DbId,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<Booking>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM bookings
             WHERE tenant_id = $1 AND facility_id = $2
               AND status = ANY($3)
               AND starts_at < $5 AND ends_at > $4
             ORDER BY starts_at"
        );
        sqlx::query_as::<_, Booking>(&query)
            .bind(tenant_id)
            .bind(facility_id)
            .bind(active_statuses())
            .bind(from)
            .bind(to)
            .fetch_all(pool)
            .await
    }
}

fn active_statuses() -> Vec<String> {
    BookingStatus::ACTIVE
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}
