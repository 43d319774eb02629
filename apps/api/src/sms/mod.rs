//! # SMS
//!
//! Prepaid-credit SMS sending for shops, and debt reminders on top of it.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌─────────────────────────┐
//! │ POST /remind │────►│  SmsService  │────►│  SmsProvider            │
//! │ scheduler    │     │  debit/log   │     │  HttpSmsProvider (prod) │
//! └──────────────┘     └──────────────┘     │  LogSmsProvider  (dev)  │
//!                                           └─────────────────────────┘
//! ```

mod provider;
mod service;

use std::sync::Arc;
use std::time::Duration;

pub use provider::{HttpSmsProvider, LogSmsProvider, ProviderError, ProviderReceipt, SmsProvider};
pub use service::{SentReminder, SmsError, SmsService};

use crate::config::{ConfigError, SmsConfig, SmsProviderKind};

/// Builds the provider named in the configuration.
pub fn provider_from_config(config: &SmsConfig) -> Result<Arc<dyn SmsProvider>, ConfigError> {
    match config.provider {
        SmsProviderKind::Log => Ok(Arc::new(LogSmsProvider)),
        SmsProviderKind::Http => {
            let base_url = config
                .base_url
                .as_deref()
                .ok_or_else(|| ConfigError::MissingRequired("sms.base_url".to_string()))?;
            let api_key = config
                .api_key
                .as_deref()
                .ok_or_else(|| ConfigError::MissingRequired("sms.api_key".to_string()))?;

            let provider = HttpSmsProvider::new(
                base_url,
                api_key,
                Duration::from_secs(config.timeout_secs),
                Duration::from_secs(config.retry_max_elapsed_secs),
            )
            .map_err(|e| ConfigError::InvalidValue(format!("sms: {}", e)))?;

            Ok(Arc::new(provider))
        }
    }
}
