//! # API Configuration
//!
//! Layered configuration built with the `config` crate.
//!
//! ## Sources (later wins)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Defaults           (Default impls below)                            │
//! │  2. kassa.toml         (or the file named by KASSA_CONFIG, optional)    │
//! │  3. Environment        KASSA_HTTP_PORT=9000                             │
//! │                        KASSA_JWT__SECRET=...                            │
//! │                        KASSA_SMS__API_KEY=...   ("__" = nesting)        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Deserialize;
use url::Url;

/// Environment variable naming an alternative config file.
pub const CONFIG_FILE_ENV: &str = "KASSA_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "kassa.toml";

/// Minimum JWT secret length outside dev mode.
const MIN_SECRET_LEN: usize = 32;

/// API server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// HTTP listen port
    pub http_port: u16,

    /// SQLite database file
    pub database_path: String,

    /// Pool size. Checkouts serialize on the SQLite write lock either way.
    pub database_max_connections: u32,

    /// How long a write waits for the lock before failing.
    pub database_busy_timeout_ms: u64,

    /// Redis connection string. Without it responses are cached in memory.
    pub redis_url: Option<String>,

    /// Relaxes secret checks for local development.
    pub dev_mode: bool,

    pub jwt: JwtConfig,
    pub cache: CacheConfig,
    pub sms: SmsConfig,
    pub reminders: ReminderConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: String,

    /// Token and cookie lifetime in seconds
    pub lifetime_secs: i64,

    pub cookie_name: String,

    /// Sets the `Secure` attribute on the session cookie.
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmsProviderKind {
    /// Logs messages instead of sending them.
    Log,
    /// JSON HTTP gateway.
    Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    pub provider: SmsProviderKind,
    pub base_url: Option<String>,
    pub api_key: Option<String>,

    /// Used when a shop has not set its own sender name.
    pub default_sender: String,

    pub timeout_secs: u64,

    /// Give up retrying connection errors after this long.
    pub retry_max_elapsed_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    pub enabled: bool,
    pub interval_secs: u64,

    /// A debt is not reminded again within this many hours.
    pub cooldown_hours: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            http_port: 8080,
            database_path: "./kassa.db".to_string(),
            database_max_connections: 8,
            database_busy_timeout_ms: 5000,
            redis_url: None,
            dev_mode: false,
            jwt: JwtConfig::default(),
            cache: CacheConfig::default(),
            sms: SmsConfig::default(),
            reminders: ReminderConfig::default(),
        }
    }
}

impl Default for JwtConfig {
    fn default() -> Self {
        JwtConfig {
            secret: String::new(),
            lifetime_secs: 12 * 3600,
            cookie_name: "kassa_session".to_string(),
            cookie_secure: true,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            enabled: true,
            ttl_secs: 300,
        }
    }
}

impl Default for SmsConfig {
    fn default() -> Self {
        SmsConfig {
            provider: SmsProviderKind::Log,
            base_url: None,
            api_key: None,
            default_sender: "Kassa".to_string(),
            timeout_secs: 10,
            retry_max_elapsed_secs: 30,
        }
    }
}

impl Default for ReminderConfig {
    fn default() -> Self {
        ReminderConfig {
            enabled: true,
            interval_secs: 3600,
            cooldown_hours: 24,
        }
    }
}

impl ApiConfig {
    /// Loads defaults, the optional config file, then `KASSA_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        let file = std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let config: ApiConfig = config::Config::builder()
            .add_source(config::File::new(&file, config::FileFormat::Toml).required(false))
            .add_source(
                config::Environment::with_prefix("KASSA")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.is_empty() {
            return Err(ConfigError::MissingRequired("jwt.secret".to_string()));
        }
        if !self.dev_mode && self.jwt.secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::InvalidValue(format!(
                "jwt.secret must be at least {} characters",
                MIN_SECRET_LEN
            )));
        }
        if self.database_max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "database_max_connections must be at least 1".to_string(),
            ));
        }
        if self.jwt.lifetime_secs <= 0 {
            return Err(ConfigError::InvalidValue("jwt.lifetime_secs must be positive".to_string()));
        }
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(ConfigError::InvalidValue("cache.ttl_secs must be positive".to_string()));
        }
        if self.reminders.enabled && self.reminders.interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "reminders.interval_secs must be positive".to_string(),
            ));
        }
        if self.reminders.cooldown_hours < 0 {
            return Err(ConfigError::InvalidValue(
                "reminders.cooldown_hours cannot be negative".to_string(),
            ));
        }

        if self.sms.provider == SmsProviderKind::Http {
            let base_url = self
                .sms
                .base_url
                .as_deref()
                .ok_or_else(|| ConfigError::MissingRequired("sms.base_url".to_string()))?;
            Url::parse(base_url)
                .map_err(|e| ConfigError::InvalidValue(format!("sms.base_url: {}", e)))?;
            if self.sms.api_key.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::MissingRequired("sms.api_key".to_string()));
            }
        }

        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
