//! Outbound notification providers.
//!
//! Each provider implements one of the capability traits in
//! [`crate::dispatcher`]; the dispatcher holds them behind `Arc<dyn _>`.

pub mod email;
pub mod sms;
