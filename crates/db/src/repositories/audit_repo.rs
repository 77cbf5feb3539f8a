//! Repository for the `audit_logs` table.

use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::models::audit::{AuditEntry, AuditQuery};

const COLUMNS: &str = "id, tenant_id, principal_id, action, resource, details_json, ip, \
                       user_agent, at";

/// Default and maximum page size for [`AuditLogRepo::query`].
const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

pub struct AuditLogRepo;

impl AuditLogRepo {
    /// Batch insert audit entries with a single multi-row INSERT.
    ///
    /// Returns the number of rows written.
    pub async fn batch_insert(pool: &PgPool, entries: &[AuditEntry]) -> Result<u64, sqlx::Error> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO audit_logs ({COLUMNS}) "));
        qb.push_values(entries, |mut row, entry| {
            row.push_bind(entry.id)
                .push_bind(&entry.tenant_id)
                .push_bind(entry.principal_id)
                .push_bind(&entry.action)
                .push_bind(&entry.resource)
                .push_bind(&entry.details_json)
                .push_bind(&entry.ip)
                .push_bind(&entry.user_agent)
                .push_bind(entry.at);
        });

        let result = qb.build().execute(pool).await?;
        Ok(result.rows_affected())
    }

    /// Query a tenant's audit entries with filtering and pagination.
    pub async fn query(
        pool: &PgPool,
        tenant_id: &str,
        params: &AuditQuery,
    ) -> Result<Vec<AuditEntry>, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {COLUMNS} FROM audit_logs"));
        push_filter(&mut qb, tenant_id, params);
        qb.push(" ORDER BY at DESC LIMIT ")
            .push_bind(params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT))
            .push(" OFFSET ")
            .push_bind(params.offset.unwrap_or(0).max(0));

        qb.build_query_as::<AuditEntry>().fetch_all(pool).await
    }

    /// Count entries matching the filter (for pagination metadata).
    pub async fn count(
        pool: &PgPool,
        tenant_id: &str,
        params: &AuditQuery,
    ) -> Result<i64, sqlx::Error> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT COUNT(*)::BIGINT FROM audit_logs");
        push_filter(&mut qb, tenant_id, params);
        qb.build_query_scalar::<i64>().fetch_one(pool).await
    }
}

fn push_filter<'a>(qb: &mut QueryBuilder<'a, Postgres>, tenant_id: &'a str, params: &'a AuditQuery) {
    qb.push(" WHERE tenant_id = ").push_bind(tenant_id);
    if let Some(principal_id) = params.principal_id {
        qb.push(" AND principal_id = ").push_bind(principal_id);
    }
    if let Some(action) = &params.action {
        qb.push(" AND action = ").push_bind(action);
    }
    if let Some(resource) = &params.resource {
        qb.push(" AND resource LIKE ").push_bind(format!("{resource}%"));
    }
    if let Some(from) = params.from {
        qb.push(" AND at >= ").push_bind(from);
    }
    if let Some(to) = params.to {
        qb.push(" AND at <= ").push_bind(to);
    }
}
