//! Well-known role name constants.
//!
//! These must match the values stored in `users.role` and embedded in
//! access-token claims.

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_STAFF: &str = "staff";
pub const ROLE_MEMBER: &str = "member";

/// Physical access controllers (turnstiles, door readers).
pub const ROLE_DEVICE: &str = "device";
