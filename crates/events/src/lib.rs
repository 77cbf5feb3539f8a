//! Clubpulse events and notifications.
//!
//! - [`BusEvent`] / [`EventPublisher`]: the cluster-wide pub/sub envelope
//!   and the publisher that routes it onto the KV channels.
//! - [`HubFrame`]: the `{type, payload, timestamp}` frame sent to WebSocket
//!   clients.
//! - [`NotificationDispatcher`]: typed email/sms/push facade over the
//!   [`delivery`] providers.

pub mod bus;
pub mod delivery;
pub mod dispatcher;

pub use bus::{BusEvent, EventPublisher, HubFrame, PublishError, RoutedFrame};
pub use delivery::email::{EmailConfig, EmailDelivery};
pub use delivery::sms::{SmsConfig, SmsGateway};
pub use dispatcher::{
    EmailProvider, Notification, NotificationDispatcher, NotificationKind, NotifyError,
    SmsProvider,
};
