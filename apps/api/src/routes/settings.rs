//! Per-shop preferences.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use kassa_core::cache::Resource;
use kassa_core::{SettingsUpdate, ShopSettings};

use super::ShopParam;
use crate::auth::Session;
use crate::error::ApiResult;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/settings", get(fetch).put(update))
}

async fn fetch(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(q): Query<ShopParam>,
) -> ApiResult<Json<ShopSettings>> {
    session.principal.require_manager()?;
    let shop_id = session.write_shop(q.shop())?;

    Ok(Json(state.db.settings().get_or_default(&shop_id).await?))
}

async fn update(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(q): Query<ShopParam>,
    Json(body): Json<SettingsUpdate>,
) -> ApiResult<Json<ShopSettings>> {
    session.principal.require_manager()?;
    let shop_id = session.write_shop(q.shop())?;
    let body = body.validated()?;

    let current = state.db.settings().get_or_default(&shop_id).await?;
    let mut next = body.apply_to(current);
    next.updated_at = Utc::now();

    let saved = state.db.settings().upsert(&next).await?;
    state.cache.invalidate(&shop_id, Resource::Settings).await;

    Ok(Json(saved))
}
