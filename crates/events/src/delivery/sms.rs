//! SMS delivery through an HTTP gateway, with exponential-backoff retry.
//!
//! The gateway accepts `POST {url}` with a JSON body `{"to", "body"}` and a
//! bearer token. Failed attempts are retried with delays of 1 s, 2 s, 4 s.

use std::time::Duration;

use async_trait::async_trait;

use crate::dispatcher::{NotifyError, SmsProvider};

const RETRY_DELAYS_SECS: [u64; 3] = [1, 2, 4];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    #[error("SMS gateway request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("SMS gateway returned HTTP {0}")]
    HttpStatus(u16),
}

#[derive(Debug, Clone)]
pub struct SmsConfig {
    pub gateway_url: String,
    pub token: Option<String>,
}

impl SmsConfig {
    /// `SMS_GATEWAY_URL` (required) and `SMS_GATEWAY_TOKEN` (optional).
    pub fn from_env() -> Option<Self> {
        Some(Self {
            gateway_url: std::env::var("SMS_GATEWAY_URL").ok()?,
            token: std::env::var("SMS_GATEWAY_TOKEN").ok(),
        })
    }
}

pub struct SmsGateway {
    client: reqwest::Client,
    config: SmsConfig,
}

impl SmsGateway {
    pub fn new(config: SmsConfig) -> Result<Self, SmsError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client, config })
    }

    /// Send one message, retrying up to three times before giving up.
    pub async fn deliver(&self, to: &str, body: &str) -> Result<(), SmsError> {
        let payload = serde_json::json!({ "to": to, "body": body });

        for (attempt, delay_secs) in RETRY_DELAYS_SECS.iter().enumerate() {
            match self.try_send(&payload).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        error = %e,
                        "SMS delivery attempt failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
                }
            }
        }

        self.try_send(&payload).await.inspect_err(|e| {
            tracing::error!(error = %e, "SMS delivery failed after all retries");
        })
    }

    async fn try_send(&self, payload: &serde_json::Value) -> Result<(), SmsError> {
        let mut request = self.client.post(&self.config.gateway_url).json(payload);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SmsError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl SmsProvider for SmsGateway {
    async fn send_sms(&self, to: &str, body: &str) -> Result<(), NotifyError> {
        Ok(self.deliver(to, body).await?)
    }
}
