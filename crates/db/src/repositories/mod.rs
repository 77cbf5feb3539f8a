//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` (or an open connection for transactional work) as the
//! first argument. Every query is scoped by `tenant_id` unless it is a
//! system sweep that returns the tenant with each row.

pub mod access_log_repo;
pub mod audit_repo;
pub mod booking_repo;
pub mod facility_repo;
pub mod maintenance_repo;
pub mod membership_repo;
pub mod user_repo;

pub use access_log_repo::AccessLogRepo;
pub use audit_repo::AuditLogRepo;
pub use booking_repo::BookingRepo;
pub use facility_repo::FacilityRepo;
pub use maintenance_repo::MaintenanceWindowRepo;
pub use membership_repo::MembershipRepo;
pub use user_repo::UserRepo;
