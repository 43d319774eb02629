//! Sales and stock reports. Owners and admins only.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use kassa_core::{DailySales, DateRange, DebtSummary, Product, SalesSummary, Scope, TopProduct};

use crate::auth::Session;
use crate::error::ApiResult;
use crate::AppState;

const DEFAULT_TOP_PRODUCTS: i64 = 10;
const DEFAULT_LOW_STOCK: i64 = 50;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/reports/summary", get(summary))
        .route("/api/reports/daily", get(daily))
        .route("/api/reports/top-products", get(top_products))
        .route("/api/reports/low-stock", get(low_stock))
        .route("/api/reports/debts", get(debts))
}

#[derive(Debug, Default, Deserialize)]
struct ReportQuery {
    shop: Option<String>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    limit: Option<i64>,
}

impl ReportQuery {
    fn scope(&self, session: &Session) -> ApiResult<Scope> {
        session.principal.require_manager()?;
        session.scope(self.shop.as_deref())
    }

    fn range(&self) -> ApiResult<DateRange> {
        Ok(DateRange::resolve(self.from, self.to, Utc::now().date_naive())?)
    }
}

async fn summary(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(q): Query<ReportQuery>,
) -> ApiResult<Json<SalesSummary>> {
    let scope = q.scope(&session)?;
    Ok(Json(state.db.reports().summary(&scope, q.range()?).await?))
}

async fn daily(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(q): Query<ReportQuery>,
) -> ApiResult<Json<Vec<DailySales>>> {
    let scope = q.scope(&session)?;
    Ok(Json(state.db.reports().daily(&scope, q.range()?).await?))
}

async fn top_products(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(q): Query<ReportQuery>,
) -> ApiResult<Json<Vec<TopProduct>>> {
    let scope = q.scope(&session)?;
    let limit = q.limit.unwrap_or(DEFAULT_TOP_PRODUCTS);
    Ok(Json(
        state.db.reports().top_products(&scope, q.range()?, limit).await?,
    ))
}

async fn low_stock(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(q): Query<ReportQuery>,
) -> ApiResult<Json<Vec<Product>>> {
    let scope = q.scope(&session)?;
    let limit = q.limit.unwrap_or(DEFAULT_LOW_STOCK);
    Ok(Json(state.db.reports().low_stock(&scope, limit).await?))
}

async fn debts(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(q): Query<ReportQuery>,
) -> ApiResult<Json<DebtSummary>> {
    let scope = q.scope(&session)?;
    Ok(Json(
        state.db.reports().debts(&scope, Utc::now().date_naive()).await?,
    ))
}
