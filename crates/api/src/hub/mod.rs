//! Event Hub: real-time fan-out to WebSocket clients.
//!
//! One [`Hub`] loop per node owns the peer registry. Each connection runs a
//! reader and a writer task ([`peer`]), and the [`bridge`] feeds cluster
//! bus events into the hub.

pub mod bridge;
mod handler;
pub mod peer;
pub mod registry;

pub use handler::ws_handler;
pub use registry::{Broadcast, Hub, HubClosed, HubConfig, HubHandle, HubStats, Unicast};
