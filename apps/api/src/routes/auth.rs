//! Login, logout and the current session.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::{Cookie, SameSite};
use axum_extra::extract::CookieJar;
use serde::Serialize;
use tracing::{info, warn};

use kassa_core::{LoginRequest, Principal, Scope, Shop, User};

use crate::auth::{verify_password, Session};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: i64,
    pub user: User,
}

#[derive(Debug, Serialize)]
struct MeResponse {
    user: User,
    shop: Option<Shop>,
}

fn session_cookie(state: &AppState, value: String) -> Cookie<'static> {
    Cookie::build((state.config.jwt.cookie_name.clone(), value))
        .path("/")
        .http_only(true)
        .secure(state.config.jwt.cookie_secure)
        .same_site(SameSite::Lax)
        .build()
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> ApiResult<(CookieJar, Json<LoginResponse>)> {
    let invalid = || ApiError::unauthenticated("Invalid username or password");

    let creds = state
        .db
        .users()
        .find_by_username(&body.username)
        .await?
        .ok_or_else(invalid)?;

    if !verify_password(&body.password, &creds.password_hash) {
        warn!(username = %creds.user.username, "Failed login");
        return Err(invalid());
    }

    let user = creds.user;
    if !user.is_active {
        return Err(ApiError::forbidden("Account is disabled"));
    }
    if let Some(shop_id) = &user.shop_id {
        let shop = state.db.shops().get(shop_id).await?;
        if !shop.is_active {
            return Err(ApiError::forbidden("Shop is deactivated"));
        }
    }

    let principal = Principal::new(user.id.clone(), user.role, user.shop_id.clone());
    let token = state.jwt.issue(&principal)?;

    info!(user_id = %user.id, role = user.role.as_str(), "User logged in");

    let jar = jar.add(session_cookie(&state, token.clone()));
    Ok((
        jar,
        Json(LoginResponse {
            token,
            expires_in: state.jwt.lifetime_secs(),
            user,
        }),
    ))
}

async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (StatusCode, CookieJar) {
    let jar = jar.remove(session_cookie(&state, String::new()));
    (StatusCode::NO_CONTENT, jar)
}

async fn me(State(state): State<Arc<AppState>>, session: Session) -> ApiResult<Json<MeResponse>> {
    let user = state
        .db
        .users()
        .get(&Scope::All, &session.principal.user_id)
        .await?;

    let shop = match &user.shop_id {
        Some(id) => Some(state.db.shops().get(id).await?),
        None => None,
    };

    Ok(Json(MeResponse { user, shop }))
}
