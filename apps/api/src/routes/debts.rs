//! Customer debt ledger.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use kassa_core::cache::Resource;
use kassa_core::{Debt, DebtStatus, DebtUpdate, NewDebt, Paginated};
use kassa_db::DebtFilter;

use super::{page_request, search_term, ShopParam};
use crate::auth::Session;
use crate::error::ApiResult;
use crate::sms::SentReminder;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/debts", get(list).post(create))
        .route("/api/debts/{id}", get(fetch).put(update).delete(remove))
        .route("/api/debts/{id}/pay", post(pay))
        .route("/api/debts/{id}/remind", post(remind))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    shop: Option<String>,
    status: Option<DebtStatus>,
    #[serde(default)]
    overdue: bool,
    search: Option<String>,
    page: Option<i64>,
    per_page: Option<i64>,
}

async fn list(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<Paginated<Debt>>> {
    let scope = session.scope(q.shop.as_deref())?;
    let filter = DebtFilter {
        status: q.status,
        overdue_only: q.overdue,
        search: search_term(q.search.as_deref())?,
    };

    let debts = state
        .db
        .debts()
        .list(
            &scope,
            &filter,
            Utc::now().date_naive(),
            page_request(q.page, q.per_page),
        )
        .await?;
    Ok(Json(debts))
}

async fn create(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(q): Query<ShopParam>,
    Json(body): Json<NewDebt>,
) -> ApiResult<(StatusCode, Json<Debt>)> {
    let shop_id = session.write_shop(q.shop())?;

    let debt = state.db.debts().create(&shop_id, body.validated()?).await?;
    state.cache.invalidate(&shop_id, Resource::Debts).await;

    Ok((StatusCode::CREATED, Json(debt)))
}

async fn fetch(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
    Query(q): Query<ShopParam>,
) -> ApiResult<Json<Debt>> {
    let scope = session.scope(q.shop())?;
    Ok(Json(state.db.debts().get(&scope, &id).await?))
}

/// The shop owning debt `id`, as visible to the caller.
async fn owning_shop(state: &AppState, session: &Session, id: &str, shop: Option<&str>) -> ApiResult<String> {
    let scope = session.scope(shop)?;
    Ok(state.db.debts().get(&scope, id).await?.shop_id)
}

async fn update(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
    Query(q): Query<ShopParam>,
    Json(body): Json<DebtUpdate>,
) -> ApiResult<Json<Debt>> {
    let body = body.validated()?;
    let shop_id = owning_shop(&state, &session, &id, q.shop()).await?;

    let debt = state.db.debts().update(&shop_id, &id, body).await?;
    state.cache.invalidate(&shop_id, Resource::Debts).await;

    Ok(Json(debt))
}

async fn remove(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
    Query(q): Query<ShopParam>,
) -> ApiResult<StatusCode> {
    session.principal.require_manager()?;
    let shop_id = owning_shop(&state, &session, &id, q.shop()).await?;

    state.db.debts().delete(&shop_id, &id).await?;
    state.cache.invalidate(&shop_id, Resource::Debts).await;

    Ok(StatusCode::NO_CONTENT)
}

async fn pay(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
    Query(q): Query<ShopParam>,
) -> ApiResult<Json<Debt>> {
    let shop_id = owning_shop(&state, &session, &id, q.shop()).await?;

    let debt = state.db.debts().mark_paid(&shop_id, &id, Utc::now()).await?;
    state.cache.invalidate(&shop_id, Resource::Debts).await;

    Ok(Json(debt))
}

/// Sends the shop's reminder text for one debt right now.
async fn remind(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
    Query(q): Query<ShopParam>,
) -> ApiResult<Json<SentReminder>> {
    let scope = session.scope(q.shop())?;
    let sent = state.sms.send_debt_reminder(&scope, &id, Utc::now()).await?;
    Ok(Json(sent))
}
