//! SMS balance and delivery log.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use kassa_core::{Paginated, SmsLog, SmsStatus};

use super::{page_request, ShopParam};
use crate::auth::Session;
use crate::error::ApiResult;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sms/balance", get(balance))
        .route("/api/sms/logs", get(logs))
}

#[derive(Debug, Serialize)]
struct Balance {
    shop_id: String,
    balance: i64,
    sms_enabled: bool,
}

#[derive(Debug, Default, Deserialize)]
struct LogQuery {
    shop: Option<String>,
    status: Option<SmsStatus>,
    page: Option<i64>,
    per_page: Option<i64>,
}

async fn balance(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(q): Query<ShopParam>,
) -> ApiResult<Json<Balance>> {
    let shop_id = session.write_shop(q.shop())?;

    let balance = state.db.shops().sms_balance(&shop_id).await?;
    let settings = state.db.settings().get_or_default(&shop_id).await?;

    Ok(Json(Balance {
        shop_id,
        balance,
        sms_enabled: settings.sms_enabled,
    }))
}

async fn logs(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(q): Query<LogQuery>,
) -> ApiResult<Json<Paginated<SmsLog>>> {
    session.principal.require_manager()?;
    let scope = session.scope(q.shop.as_deref())?;

    let logs = state
        .db
        .sms()
        .list(&scope, q.status, page_request(q.page, q.per_page))
        .await?;
    Ok(Json(logs))
}
