//! Repository for the `memberships` table.

use clubpulse_core::membership::MembershipStatus;
use clubpulse_core::types::DbId;
use sqlx::PgPool;

use crate::models::membership::{CreateMembership, Membership};

const COLUMNS: &str = "id, tenant_id, user_id, tier_id, status, outstanding_balance_cents, \
                       next_billing_at, created_at, updated_at";

pub struct MembershipRepo;

impl MembershipRepo {
    pub async fn create(
        pool: &PgPool,
        tenant_id: &str,
        id: DbId,
        input: &CreateMembership,
    ) -> Result<Membership, sqlx::Error> {
        let query = format!(
            "INSERT INTO memberships (id, tenant_id, user_id, tier_id, status, \
                                      outstanding_balance_cents, next_billing_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Membership>(&query)
            .bind(id)
            .bind(tenant_id)
            .bind(input.user_id)
            .bind(input.tier_id)
            .bind(
                input
                    .status
                    .as_deref()
                    .unwrap_or(MembershipStatus::Pending.as_str()),
            )
            .bind(input.outstanding_balance_cents.unwrap_or(0))
            .bind(input.next_billing_at)
            .fetch_one(pool)
            .await
    }

    /// All memberships of a user in this tenant, regardless of status.
    pub async fn list_for_user(
        pool: &PgPool,
        tenant_id: &str,
        user_id: DbId,
    ) -> Result<Vec<Membership>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM memberships
             WHERE tenant_id = $1 AND user_id = $2
             ORDER BY created_at"
        );
        sqlx::query_as::<_, Membership>(&query)
            .bind(tenant_id)
            .bind(user_id)
            .fetch_all(pool)
            .await
    }
}
