//! Repository for the `facilities` table.

use clubpulse_core::facility::FacilityStatus;
use clubpulse_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::facility::{CreateFacility, Facility};

const COLUMNS: &str = "id, tenant_id, name, facility_type, status, capacity, \
                       hourly_rate_cents, hours_of_operation, created_at, updated_at";

pub struct FacilityRepo;

impl FacilityRepo {
    pub async fn create(
        pool: &PgPool,
        tenant_id: &str,
        id: DbId,
        input: &CreateFacility,
    ) -> Result<Facility, sqlx::Error> {
        let query = format!(
            "INSERT INTO facilities (id, tenant_id, name, facility_type, capacity, \
                                     hourly_rate_cents, hours_of_operation)
             VALUES ($1, $2, $3, $4, COALESCE($5, 1), COALESCE($6, 0), COALESCE($7, '{{}}'::jsonb))
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Facility>(&query)
            .bind(id)
            .bind(tenant_id)
            .bind(&input.name)
            .bind(&input.facility_type)
            .bind(input.capacity)
            .bind(input.hourly_rate_cents)
            .bind(&input.hours_of_operation)
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        tenant_id: &str,
        id: DbId,
    ) -> Result<Option<Facility>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM facilities WHERE tenant_id = $1 AND id = $2");
        sqlx::query_as::<_, Facility>(&query)
            .bind(tenant_id)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn list(pool: &PgPool, tenant_id: &str) -> Result<Vec<Facility>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM facilities WHERE tenant_id = $1 ORDER BY name");
        sqlx::query_as::<_, Facility>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    /// Set the operating status. Runs on a caller-owned connection so it can
    /// share a transaction with the maintenance status change.
    pub async fn update_status(
        conn: &mut PgConnection,
        tenant_id: &str,
        id: DbId,
        status: FacilityStatus,
    ) -> Result<Option<Facility>, sqlx::Error> {
        let query = format!(
            "UPDATE facilities SET status = $3, updated_at = now()
             WHERE tenant_id = $1 AND id = $2
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Facility>(&query)
            .bind(tenant_id)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(conn)
            .await
    }
}
