//! # Kassa API
//!
//! JSON REST server for the Kassa point-of-sale backend.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Kassa API Server                              │
//! │                                                                         │
//! │  ┌──────────────┐   ┌───────────────────┐   ┌────────────────────────┐ │
//! │  │  /api/auth   │   │  cache_responses  │   │  routes::*             │ │
//! │  │  login       │   │  GET /api/**      │──►│  Session extractor     │ │
//! │  │  logout, me  │   │  hit → cached     │   │  Scope from session    │ │
//! │  └──────────────┘   └───────────────────┘   └───────────┬────────────┘ │
//! │                                                         │              │
//! │  ┌──────────────────────────────────────────────────────▼───────────┐  │
//! │  │                      Infrastructure                               │  │
//! │  │                                                                   │  │
//! │  │  ┌──────────────┐  ┌──────────────────┐  ┌─────────────────────┐ │  │
//! │  │  │  SQLite      │  │  ResponseCache   │  │  SmsService         │ │  │
//! │  │  │  (kassa-db)  │  │  Redis / memory  │  │  + provider         │ │  │
//! │  │  └──────────────┘  └──────────────────┘  └─────────────────────┘ │  │
//! │  └───────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  ReminderScheduler (background task) ───► SmsService                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! See [`config::ApiConfig`]. Everything can be set through `KASSA_*`
//! environment variables, e.g. `KASSA_JWT__SECRET`, `KASSA_REDIS_URL`.

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod routes;
pub mod scheduler;
pub mod sms;

use std::sync::Arc;

// Re-exports
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::build_router;

use auth::JwtManager;
use cache::ResponseCache;
use kassa_db::Database;
use sms::SmsService;

/// Shared application state.
pub struct AppState {
    pub db: Database,
    pub config: ApiConfig,
    pub jwt: JwtManager,
    pub cache: Arc<ResponseCache>,
    pub sms: Arc<SmsService>,
}

impl AppState {
    pub fn new(
        db: Database,
        config: ApiConfig,
        cache: Arc<ResponseCache>,
        sms: Arc<SmsService>,
    ) -> Self {
        let jwt = JwtManager::new(&config.jwt.secret, config.jwt.lifetime_secs);
        AppState {
            db,
            config,
            jwt,
            cache,
            sms,
        }
    }
}
