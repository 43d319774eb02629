//! Liveness and dependency status.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthReport {
    /// `ok`, `degraded` (cache down) or `down` (database down)
    status: &'static str,
    database: bool,

    /// Every embedded migration has been applied.
    schema_current: bool,
    cache: CacheHealth,
    sms_provider: &'static str,
    server_time: String,
}

#[derive(Debug, Serialize)]
struct CacheHealth {
    store: &'static str,
    reachable: bool,
    bypassed: bool,
}

pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthReport>) {
    let database = state.db.health_check().await;
    let schema_current = database
        && match state.db.migration_status().await {
            Ok((embedded, applied)) => embedded == applied,
            Err(e) => {
                warn!(error = %e, "Failed to read migration status");
                false
            }
        };

    let reachable = match state.cache.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Cache ping failed");
            false
        }
    };
    if reachable {
        state.cache.recover().await;
    }
    let bypassed = state.cache.is_bypassed();

    let (code, status) = match (database, reachable && !bypassed) {
        (false, _) => (StatusCode::SERVICE_UNAVAILABLE, "down"),
        (true, false) => (StatusCode::OK, "degraded"),
        (true, true) => (StatusCode::OK, "ok"),
    };

    (
        code,
        Json(HealthReport {
            status,
            database,
            schema_current,
            cache: CacheHealth {
                store: state.cache.store_name(),
                reachable,
                bypassed,
            },
            sms_provider: state.sms.provider_name(),
            server_time: Utc::now().to_rfc3339(),
        }),
    )
}
