//! Staff accounts.
//!
//! Admins manage any account. Owners manage their own shop's staff and can
//! never create, promote or demote an admin.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use kassa_core::cache::Resource;
use kassa_core::{NewUser, Paginated, User, UserUpdate};

use super::{page_request, ShopParam};
use crate::auth::{hash_password, Session};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users", get(list).post(create))
        .route("/api/users/{id}", get(fetch).put(update).delete(remove))
}

#[derive(Debug, Default, Deserialize)]
struct ListQuery {
    shop: Option<String>,
    page: Option<i64>,
    per_page: Option<i64>,
}

async fn invalidate(state: &AppState, user: &User) {
    match &user.shop_id {
        Some(shop_id) => state.cache.invalidate(shop_id, Resource::Users).await,
        None => state.cache.invalidate_global(Resource::Users).await,
    }
}

async fn list(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<Paginated<User>>> {
    session.principal.require_manager()?;
    let scope = session.scope(q.shop.as_deref())?;

    let users = state
        .db
        .users()
        .list(&scope, page_request(q.page, q.per_page))
        .await?;
    Ok(Json(users))
}

async fn create(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(q): Query<ShopParam>,
    Json(body): Json<NewUser>,
) -> ApiResult<(StatusCode, Json<User>)> {
    session.principal.require_manager()?;
    let body = body.validated()?;

    let shop_id = if body.role.is_admin() {
        session.principal.require_admin()?;
        None
    } else {
        let requested = body.shop_id.as_deref().or(q.shop());
        let shop_id = session.write_shop(requested)?;
        state.db.shops().get(&shop_id).await?;
        Some(shop_id)
    };

    let hash = hash_password(&body.password)?;
    let user = state
        .db
        .users()
        .create(
            shop_id.as_deref(),
            &body.username,
            &body.display_name,
            body.role,
            &hash,
        )
        .await?;

    invalidate(&state, &user).await;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn fetch(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
    Query(q): Query<ShopParam>,
) -> ApiResult<Json<User>> {
    session.principal.require_manager()?;
    let scope = session.scope(q.shop())?;

    Ok(Json(state.db.users().get(&scope, &id).await?))
}

async fn update(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
    Query(q): Query<ShopParam>,
    Json(body): Json<UserUpdate>,
) -> ApiResult<Json<User>> {
    session.principal.require_manager()?;
    let scope = session.scope(q.shop())?;
    let body = body.validated()?;

    let target = state.db.users().get(&scope, &id).await?;

    if let Some(role) = body.role {
        if role.is_admin() != target.role.is_admin() {
            return Err(ApiError::forbidden("admin role cannot be granted or revoked"));
        }
    }
    if target.id == session.principal.user_id && body.is_active == Some(false) {
        return Err(ApiError::conflict("cannot deactivate your own account"));
    }

    let user = state
        .db
        .users()
        .update(
            &scope,
            &id,
            body.display_name.as_deref(),
            body.role,
            body.is_active,
        )
        .await?;

    if let Some(password) = &body.password {
        state
            .db
            .users()
            .set_password(&user.id, &hash_password(password)?)
            .await?;
    }

    invalidate(&state, &user).await;
    Ok(Json(user))
}

async fn remove(
    State(state): State<Arc<AppState>>,
    session: Session,
    Path(id): Path<String>,
    Query(q): Query<ShopParam>,
) -> ApiResult<StatusCode> {
    session.principal.require_manager()?;
    let scope = session.scope(q.shop())?;

    if id == session.principal.user_id {
        return Err(ApiError::conflict("cannot delete your own account"));
    }

    let user = state.db.users().get(&scope, &id).await?;
    state.db.users().delete(&scope, &id).await?;

    invalidate(&state, &user).await;
    Ok(StatusCode::NO_CONTENT)
}
