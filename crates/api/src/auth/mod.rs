//! Authentication primitives.
//!
//! Tokens are issued by the club's identity provider; this server only
//! validates them. [`jwt::generate_access_token`] exists for tooling and
//! tests.

pub mod jwt;
