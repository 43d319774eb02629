//! # SMS Providers
//!
//! The gateway that actually delivers a message.
//!
//! ## HTTP Gateway Exchange
//! ```text
//! POST {base_url}/messages
//! Authorization: Bearer {api_key}
//! { "to": "+996555123456", "sender": "Kassa", "text": "Hello ..." }
//!
//! 2xx          → { "message_id": "..." }         receipt
//! 429 / 5xx    → transient, retried with backoff
//! other 4xx    → rejected, not retried
//! no response  → transient, retried with backoff
//! ```

use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// What the gateway returned for an accepted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderReceipt {
    pub message_id: Option<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("SMS provider unreachable: {0}")]
    Unreachable(String),

    #[error("SMS provider rejected the message: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait SmsProvider: Send + Sync {
    async fn send(&self, to: &str, sender: &str, body: &str) -> Result<ProviderReceipt, ProviderError>;

    fn name(&self) -> &'static str;
}

// =============================================================================
// Log Provider
// =============================================================================

/// Logs messages instead of sending them.
#[derive(Debug, Default)]
pub struct LogSmsProvider;

#[async_trait]
impl SmsProvider for LogSmsProvider {
    async fn send(&self, to: &str, sender: &str, body: &str) -> Result<ProviderReceipt, ProviderError> {
        let message_id = format!("log-{}", Uuid::new_v4());
        info!(%to, %sender, %message_id, chars = body.chars().count(), "SMS (log provider)");
        debug!(%body, "SMS body");
        Ok(ProviderReceipt {
            message_id: Some(message_id),
        })
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

// =============================================================================
// HTTP Provider
// =============================================================================

#[derive(Serialize)]
struct SendRequest<'a> {
    to: &'a str,
    sender: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct SendResponse {
    message_id: Option<String>,
}

enum Attempt {
    Transient(ProviderError),
    Permanent(ProviderError),
}

/// JSON gateway client.
pub struct HttpSmsProvider {
    client: reqwest::Client,
    endpoint: Url,
    api_key: String,
    initial_backoff: Duration,
    max_elapsed: Duration,
}

impl HttpSmsProvider {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
        max_elapsed: Duration,
    ) -> Result<Self, ProviderError> {
        let endpoint = Url::parse(&format!("{}/messages", base_url.trim_end_matches('/')))
            .map_err(|e| ProviderError::Rejected(format!("invalid base URL: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Unreachable(e.to_string()))?;

        Ok(HttpSmsProvider {
            client,
            endpoint,
            api_key: api_key.into(),
            initial_backoff: Duration::from_millis(200),
            max_elapsed,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
            max_elapsed_time: Some(self.max_elapsed),
            ..Default::default()
        }
    }

    async fn attempt(&self, request: &SendRequest<'_>) -> Result<ProviderReceipt, Attempt> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| Attempt::Transient(ProviderError::Unreachable(e.to_string())))?;

        let status = response.status();
        if status.is_success() {
            // The message is out; an unreadable body only costs us the id.
            return match response.json::<SendResponse>().await {
                Ok(body) => Ok(ProviderReceipt {
                    message_id: body.message_id,
                }),
                Err(e) => {
                    warn!(error = %e, "SMS provider accepted message with unreadable body");
                    Ok(ProviderReceipt { message_id: None })
                }
            };
        }

        let detail = response.text().await.unwrap_or_default();
        let reason = format!("{} {}", status, detail.trim());

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            Err(Attempt::Transient(ProviderError::Unreachable(reason)))
        } else {
            Err(Attempt::Permanent(ProviderError::Rejected(reason)))
        }
    }
}

#[async_trait]
impl SmsProvider for HttpSmsProvider {
    async fn send(&self, to: &str, sender: &str, body: &str) -> Result<ProviderReceipt, ProviderError> {
        let request = SendRequest {
            to,
            sender,
            text: body,
        };

        let mut backoff = self.create_backoff();
        let mut attempt = 1u32;

        loop {
            match self.attempt(&request).await {
                Ok(receipt) => {
                    debug!(%to, attempt, message_id = ?receipt.message_id, "SMS accepted");
                    return Ok(receipt);
                }
                Err(Attempt::Permanent(e)) => return Err(e),
                Err(Attempt::Transient(e)) => match backoff.next_backoff() {
                    Some(duration) => {
                        warn!(error = %e, attempt, ?duration, "SMS send failed, retrying");
                        tokio::time::sleep(duration).await;
                        attempt += 1;
                    }
                    None => {
                        warn!(error = %e, attempt, "SMS send retries exhausted");
                        return Err(e);
                    }
                },
            }
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
