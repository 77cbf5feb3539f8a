//! Request handlers for the `/api/v1` tree.
//!
//! Each submodule holds the async handlers for one resource. Handlers
//! authorize through the extractors in [`crate::middleware`], delegate to an
//! engine service with a request-scoped cancellation token, and map errors
//! via [`crate::error::AppError`].

pub mod access;
pub mod audit;
pub mod bookings;
pub mod facilities;
pub mod locks;
pub mod maintenance;
pub mod members;
