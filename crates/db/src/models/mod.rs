//! Row models and insert DTOs, one module per table.

pub mod access_log;
pub mod audit;
pub mod booking;
pub mod facility;
pub mod maintenance;
pub mod membership;
pub mod user;
