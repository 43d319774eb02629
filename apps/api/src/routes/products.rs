//! Catalog and stock.
//!
//! Everyone in a shop can look products up; only managers change them.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tracing::info;

use kassa_core::cache::Resource;
use kassa_core::{
    ImportSummary, NewProduct, Paginated, Product, ProductImportRow, ProductUpdate, StockAdjustment,
};
use kassa_db::ProductFilter;

use super::{page_request, search_term, ShopParam};
use crate::auth::Session;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Upper bound on rows in one import request.
const MAX_IMPORT_ROWS: usize = 5_000;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/products", get(list).post(create))
        .route("/api/products/import", post(import))
        .route("/api/products/barcode/{code}", get(by_barcode))
        .route("/api/products/{id}", get(fetch).put(update).delete(remove))
        .route("/api/products/{id}/stock", post(adjust_stock))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    shop: Option<String>,
    search: Option<String>,
    category: Option<String>,
    #[serde(default)]
    low_stock: bool,
    page: Option<i64>,
    per_page: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ImportRequest {
    rows: Vec<ProductImportRow>,
}

async fn list(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<Paginated<Product>>> {
    let scope = session.scope(q.shop.as_deref())?;
    let filter = ProductFilter {
        search: search_term(q.search.as_deref())?,
        category: q.category.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
        low_stock_only: q.low_stock,
    };

    let products = state
        .db
        .products()
        .list(&scope, &filter, page_request(q.page, q.per_page))
        .await?;
    Ok(Json(products))
}

async fn create(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(q): Query<ShopParam>,
    Json(body): Json<NewProduct>,
) -> ApiResult<(StatusCode, Json<Product>)> {
    session.principal.require_manager()?;
    let shop_id = session.write_shop(q.shop())?;

    let product = state.db.products().create(&shop_id, body.validated()?).await?;
    state.cache.invalidate(&shop_id, Resource::Products).await;

    Ok((StatusCode::CREATED, Json(product)))
}

async fn fetch(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
    Query(q): Query<ShopParam>,
) -> ApiResult<Json<Product>> {
    let scope = session.scope(q.shop())?;
    Ok(Json(state.db.products().get(&scope, &id).await?))
}

/// Scanner lookup. Barcodes are unique per shop, so admins must name one.
async fn by_barcode(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(code): Path<String>,
    Query(q): Query<ShopParam>,
) -> ApiResult<Json<Product>> {
    let shop_id = session.write_shop(q.shop())?;
    Ok(Json(
        state.db.products().find_by_barcode(&shop_id, code.trim()).await?,
    ))
}

/// The shop owning product `id`, as visible to the caller.
async fn owning_shop(state: &AppState, session: &Session, id: &str, shop: Option<&str>) -> ApiResult<String> {
    let scope = session.scope(shop)?;
    Ok(state.db.products().get(&scope, id).await?.shop_id)
}

async fn update(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
    Query(q): Query<ShopParam>,
    Json(body): Json<ProductUpdate>,
) -> ApiResult<Json<Product>> {
    session.principal.require_manager()?;
    let body = body.validated()?;
    let shop_id = owning_shop(&state, &session, &id, q.shop()).await?;

    let product = state.db.products().update(&shop_id, &id, body).await?;
    state.cache.invalidate(&shop_id, Resource::Products).await;

    Ok(Json(product))
}

async fn remove(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
    Query(q): Query<ShopParam>,
) -> ApiResult<StatusCode> {
    session.principal.require_manager()?;
    let shop_id = owning_shop(&state, &session, &id, q.shop()).await?;

    state.db.products().delete(&shop_id, &id).await?;
    state.cache.invalidate(&shop_id, Resource::Products).await;

    Ok(StatusCode::NO_CONTENT)
}

async fn adjust_stock(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
    Query(q): Query<ShopParam>,
    Json(body): Json<StockAdjustment>,
) -> ApiResult<Json<Product>> {
    session.principal.require_manager()?;
    let body = body.validated()?;
    let shop_id = owning_shop(&state, &session, &id, q.shop()).await?;

    let product = state.db.products().adjust_stock(&shop_id, &id, body.delta).await?;
    state.cache.invalidate(&shop_id, Resource::Products).await;

    info!(
        product_id = %id,
        delta = body.delta,
        stock = product.stock,
        reason = body.reason.as_deref().unwrap_or(""),
        by = %session.principal.user_id,
        "Stock adjusted"
    );
    Ok(Json(product))
}

async fn import(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(q): Query<ShopParam>,
    Json(body): Json<ImportRequest>,
) -> ApiResult<Json<ImportSummary>> {
    session.principal.require_manager()?;
    let shop_id = session.write_shop(q.shop())?;

    if body.rows.is_empty() {
        return Err(ApiError::validation("rows is required"));
    }
    if body.rows.len() > MAX_IMPORT_ROWS {
        return Err(ApiError::validation(format!(
            "at most {} rows per import",
            MAX_IMPORT_ROWS
        )));
    }

    let rows = body
        .rows
        .into_iter()
        .enumerate()
        .map(|(i, row)| {
            row.validated()
                .map_err(|e| ApiError::validation(format!("row {}: {}", i + 1, e)))
        })
        .collect::<ApiResult<Vec<_>>>()?;

    let summary = state.db.products().import(&shop_id, rows).await?;
    state.cache.invalidate(&shop_id, Resource::Products).await;

    Ok(Json(summary))
}
