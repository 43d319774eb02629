//! # Kassa API Server
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Kassa API Server                                │
//! │                                                                         │
//! │  POS / browser ───► HTTP (8080) ───► routes ───► SQLite                 │
//! │                                        │                                │
//! │                                        ├───► Redis (response cache)     │
//! │                                        └───► SMS gateway                │
//! │                                                                         │
//! │  ReminderScheduler ─── every interval_secs ───► SMS gateway             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kassa_api::cache::{CacheStore, MemoryCache, RedisCache, ResponseCache};
use kassa_api::scheduler::ReminderScheduler;
use kassa_api::sms::{provider_from_config, SmsService};
use kassa_api::{build_router, ApiConfig, AppState};
use kassa_db::{Database, DbConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("kassa_api=info,kassa_db=info")),
        )
        .with_target(true)
        .init();

    info!("Starting Kassa API server...");

    let config = ApiConfig::load().context("Failed to load configuration")?;
    info!(
        port = config.http_port,
        database = %config.database_path,
        redis = config.redis_url.is_some(),
        sms_provider = ?config.sms.provider,
        "Configuration loaded"
    );

    let db_config = DbConfig::new(&config.database_path)
        .max_connections(config.database_max_connections)
        .busy_timeout(Duration::from_millis(config.database_busy_timeout_ms));
    let db = Database::new(db_config)
        .await
        .context("Failed to open database")?;

    let store: Arc<dyn CacheStore> = match config.redis_url.as_deref() {
        Some(url) => match RedisCache::connect(url).await {
            Ok(redis) => Arc::new(redis),
            Err(e) => {
                warn!(error = %e, "Failed to connect to Redis, caching in memory");
                Arc::new(MemoryCache::new())
            }
        },
        None => Arc::new(MemoryCache::new()),
    };
    let cache = Arc::new(ResponseCache::new(
        store,
        Duration::from_secs(config.cache.ttl_secs),
        config.cache.enabled,
    ));
    info!(store = cache.store_name(), enabled = cache.is_enabled(), "Response cache ready");

    let provider = provider_from_config(&config.sms).context("Failed to set up SMS provider")?;
    let sms = Arc::new(SmsService::new(
        db.clone(),
        provider,
        cache.clone(),
        config.sms.default_sender.clone(),
    ));

    let scheduler = if config.reminders.enabled {
        let (scheduler, handle) = ReminderScheduler::new(db.clone(), sms.clone(), &config.reminders);
        tokio::spawn(scheduler.run());
        Some(handle)
    } else {
        info!("Debt reminders disabled");
        None
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let state = Arc::new(AppState::new(db.clone(), config, cache, sms));
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(handle) = scheduler {
        handle.shutdown().await;
    }
    db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
