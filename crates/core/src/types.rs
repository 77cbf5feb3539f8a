/// All entity primary keys are UUIDs.
pub type DbId = uuid::Uuid;

/// Tenants (clubs) are identified by an opaque string slug.
pub type TenantId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
