//! Notification dispatcher.
//!
//! [`NotificationDispatcher::send`] routes a [`Notification`] by kind to the
//! configured provider. Kinds without a provider are logged and reported as
//! delivered, so development setups need no SMTP server or SMS gateway.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::delivery::email::{EmailConfig, EmailDelivery, EmailError};
use crate::delivery::sms::{SmsConfig, SmsError, SmsGateway};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Email,
    Sms,
    Push,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Email address, phone number, or user id depending on `kind`.
    pub recipient: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub action_url: Option<String>,
}

impl Notification {
    /// Body with the action URL appended, for channels without links.
    fn text_body(&self) -> String {
        match &self.action_url {
            Some(url) => format!("{}\n\n{}", self.body, url),
            None => self.body.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error(transparent)]
    Email(#[from] EmailError),

    #[error(transparent)]
    Sms(#[from] SmsError),

    /// Failure reported by a provider outside this crate.
    #[error("Notification provider error: {0}")]
    Provider(String),
}

// ---------------------------------------------------------------------------
// Provider capabilities
// ---------------------------------------------------------------------------

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError>;
}

#[async_trait]
pub trait SmsProvider: Send + Sync {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), NotifyError>;
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    email: Option<Arc<dyn EmailProvider>>,
    sms: Option<Arc<dyn SmsProvider>>,
}

impl NotificationDispatcher {
    /// A dispatcher with no providers: every notification is only logged.
    pub fn logging_only() -> Self {
        Self::default()
    }

    /// Build providers from `SMTP_*` and `SMS_GATEWAY_*` variables.
    pub fn from_env() -> Self {
        let mut dispatcher = Self::default();

        if let Some(config) = EmailConfig::from_env() {
            let smtp_host = config.smtp_host.clone();
            match EmailDelivery::new(config) {
                Ok(delivery) => {
                    tracing::info!(%smtp_host, "Email provider configured");
                    dispatcher = dispatcher.with_email(Arc::new(delivery));
                }
                Err(e) => tracing::error!(error = %e, "Email provider disabled"),
            }
        }

        if let Some(config) = SmsConfig::from_env() {
            match SmsGateway::new(config) {
                Ok(gateway) => {
                    tracing::info!("SMS provider configured");
                    dispatcher = dispatcher.with_sms(Arc::new(gateway));
                }
                Err(e) => tracing::error!(error = %e, "SMS provider disabled"),
            }
        }

        dispatcher
    }

    pub fn with_email(mut self, provider: Arc<dyn EmailProvider>) -> Self {
        self.email = Some(provider);
        self
    }

    pub fn with_sms(mut self, provider: Arc<dyn SmsProvider>) -> Self {
        self.sms = Some(provider);
        self
    }

    /// Deliver one notification. Provider errors are returned unchanged.
    pub async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        match notification.kind {
            NotificationKind::Email => match &self.email {
                Some(provider) => {
                    provider
                        .send_email(
                            &notification.recipient,
                            &notification.title,
                            &notification.text_body(),
                        )
                        .await
                }
                None => {
                    log_undelivered(notification, "no email provider configured");
                    Ok(())
                }
            },
            NotificationKind::Sms => match &self.sms {
                Some(provider) => {
                    provider
                        .send_sms(&notification.recipient, &notification.text_body())
                        .await
                }
                None => {
                    log_undelivered(notification, "no SMS provider configured");
                    Ok(())
                }
            },
            NotificationKind::Push => {
                log_undelivered(notification, "push delivery not wired");
                Ok(())
            }
        }
    }
}

fn log_undelivered(notification: &Notification, why: &str) {
    tracing::info!(
        kind = ?notification.kind,
        recipient = %notification.recipient,
        title = %notification.title,
        why,
        "Notification logged only"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
