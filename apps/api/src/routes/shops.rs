//! Shop lifecycle and SMS credit. Admin only, except that managers may
//! read their own shop.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use kassa_core::cache::Resource;
use kassa_core::{NewShop, Paginated, Shop, ShopUpdate, SmsCredit};

use super::page_request;
use crate::auth::Session;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/shops", get(list).post(create))
        .route("/api/shops/{id}", get(fetch).put(update).delete(deactivate))
        .route("/api/shops/{id}/sms-credit", post(credit))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    page: Option<i64>,
    per_page: Option<i64>,
}

async fn list(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<Paginated<Shop>>> {
    let page = page_request(q.page, q.per_page);

    if session.principal.is_admin() {
        return Ok(Json(state.db.shops().list(page).await?));
    }

    session.principal.require_manager()?;
    let shop_id = session.write_shop(None)?;
    let shop = state.db.shops().get(&shop_id).await?;
    Ok(Json(Paginated::new(vec![shop], 1, page)))
}

async fn create(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(body): Json<NewShop>,
) -> ApiResult<(StatusCode, Json<Shop>)> {
    session.principal.require_admin()?;

    let shop = state.db.shops().create(body.validated()?).await?;
    state.cache.invalidate(&shop.id, Resource::Shops).await;

    Ok((StatusCode::CREATED, Json(shop)))
}

async fn fetch(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
) -> ApiResult<Json<Shop>> {
    session.principal.require_manager()?;
    if !session.principal.can_access_shop(&id) {
        return Err(ApiError::not_found("Shop", &id));
    }

    Ok(Json(state.db.shops().get(&id).await?))
}

async fn update(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
    Json(body): Json<ShopUpdate>,
) -> ApiResult<Json<Shop>> {
    session.principal.require_admin()?;

    let shop = state.db.shops().update(&id, body.validated()?).await?;
    state.cache.invalidate(&shop.id, Resource::Shops).await;

    Ok(Json(shop))
}

/// Shops are never removed; they are switched off.
async fn deactivate(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
) -> ApiResult<Json<Shop>> {
    session.principal.require_admin()?;

    let shop = state.db.shops().set_active(&id, false).await?;
    state.cache.invalidate(&shop.id, Resource::Shops).await;

    Ok(Json(shop))
}

async fn credit(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
    Json(body): Json<SmsCredit>,
) -> ApiResult<Json<Shop>> {
    session.principal.require_admin()?;

    let body = body.validated()?;
    let shop = state.db.shops().credit_sms(&id, body.credits).await?;
    state.cache.invalidate(&shop.id, Resource::Sms).await;

    info!(shop_id = %id, credits = body.credits, by = %session.principal.user_id, "SMS credit granted");
    Ok(Json(shop))
}
