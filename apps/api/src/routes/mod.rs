//! # HTTP Routes
//!
//! ```text
//! /health                         health::health
//! /api/auth/{login,logout,me}     auth        (never cached)
//! /api/shops/**                   shops       ┐
//! /api/users/**                   users       │
//! /api/products/**                products    │  GET   → cache_responses
//! /api/invoices/**                invoices    │  write → ResponseCache::invalidate
//! /api/debts/**                   debts       │          before the response
//! /api/reports/**                 reports     │
//! /api/settings                   settings    │
//! /api/sms/**                     sms         ┘
//! ```
//! Admins pass `?shop=<id>` to act on one tenant; everyone else is pinned
//! to the shop in their session.

mod auth;
mod debts;
mod health;
mod invoices;
mod products;
mod reports;
mod settings;
mod shops;
mod sms;
mod users;

use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use kassa_core::validation::validate_search_query;
use kassa_core::PageRequest;

use crate::cache::cache_responses;
use crate::error::ApiResult;
use crate::AppState;

pub use auth::LoginResponse;

/// Builds the full application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .merge(shops::router())
        .merge(users::router())
        .merge(products::router())
        .merge(invoices::router())
        .merge(debts::router())
        .merge(reports::router())
        .merge(settings::router())
        .merge(sms::router())
        .layer(middleware::from_fn_with_state(state.clone(), cache_responses));

    Router::new()
        .route("/health", get(health::health))
        .merge(auth::router())
        .merge(api)
        .with_state(state)
}

/// `?shop=<id>` on its own.
#[derive(Debug, Default, Deserialize)]
pub struct ShopParam {
    pub shop: Option<String>,
}

impl ShopParam {
    pub fn shop(&self) -> Option<&str> {
        self.shop.as_deref()
    }
}

/// Page selection from optional query values.
fn page_request(page: Option<i64>, per_page: Option<i64>) -> PageRequest {
    let defaults = PageRequest::default();
    PageRequest::new(
        page.unwrap_or(defaults.page),
        per_page.unwrap_or(defaults.per_page),
    )
}

/// Trimmed search text; blank means no filter.
fn search_term(query: Option<&str>) -> ApiResult<Option<String>> {
    match query {
        Some(q) => Ok(Some(validate_search_query(q)?).filter(|q| !q.is_empty())),
        None => Ok(None),
    }
}
