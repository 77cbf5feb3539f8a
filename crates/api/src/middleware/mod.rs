//! Request middleware and authorization extractors.
//!
//! - [`auth::AuthUser`] -- the authenticated principal and its tenant.
//! - [`rbac`] -- role-gated wrappers around [`auth::AuthUser`].
//! - [`audit::record_mutations`] -- audit ingest for mutating requests.

pub mod audit;
pub mod auth;
pub mod rbac;
