//! Clubpulse domain core.
//!
//! Zero internal dependencies: everything here is pure data and rules that
//! the storage, engine, and API crates share.

pub mod access;
pub mod booking;
pub mod channels;
pub mod clock;
pub mod error;
pub mod facility;
pub mod maintenance;
pub mod membership;
pub mod roles;
pub mod slot;
pub mod tenant;
pub mod types;
