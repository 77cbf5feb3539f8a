//! Clubpulse API server library.
//!
//! Exposes configuration, state, error handling, routes, and the Event Hub
//! so integration tests and the binary entrypoint can both build the same
//! application.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod middleware;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
