//! Checkout and sales history.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use kassa_core::cache::Resource;
use kassa_core::invoice::CheckoutRequest;
use kassa_core::{Invoice, InvoiceWithItems, Paginated, PaymentMethod};
use kassa_db::InvoiceFilter;

use super::{page_request, search_term, ShopParam};
use crate::auth::Session;
use crate::error::ApiResult;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/invoices", get(list).post(checkout))
        .route("/api/invoices/{id}", get(fetch))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    shop: Option<String>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    payment_method: Option<PaymentMethod>,
    cashier_id: Option<String>,
    search: Option<String>,
    page: Option<i64>,
    per_page: Option<i64>,
}

async fn list(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<Paginated<Invoice>>> {
    let scope = session.scope(q.shop.as_deref())?;
    let filter = InvoiceFilter {
        from: q.from,
        to: q.to,
        payment_method: q.payment_method,
        cashier_id: q.cashier_id,
        search: search_term(q.search.as_deref())?,
    };

    let invoices = state
        .db
        .invoices()
        .list(&scope, &filter, page_request(q.page, q.per_page))
        .await?;
    Ok(Json(invoices))
}

/// Records a sale. Stock, the invoice and any debt commit together or not
/// at all.
async fn checkout(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(q): Query<ShopParam>,
    Json(body): Json<CheckoutRequest>,
) -> ApiResult<(StatusCode, Json<InvoiceWithItems>)> {
    let shop_id = session.write_shop(q.shop())?;
    let request = body.validated()?;

    let invoice = state
        .db
        .invoices()
        .create(&shop_id, &session.principal.user_id, &request, Utc::now())
        .await?;
    state.cache.invalidate(&shop_id, Resource::Invoices).await;

    Ok((StatusCode::CREATED, Json(invoice)))
}

async fn fetch(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
    Query(q): Query<ShopParam>,
) -> ApiResult<Json<InvoiceWithItems>> {
    let scope = session.scope(q.shop())?;
    Ok(Json(state.db.invoices().get(&scope, &id).await?))
}
