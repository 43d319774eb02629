//! # Authentication
//!
//! JWT sessions, password hashing and the `Session` extractor.
//!
//! ## Request Authentication
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  request                                                                │
//! │     │                                                                   │
//! │     ├── Authorization: Bearer <jwt> ──┐                                 │
//! │     │                                 ├──► JwtManager::validate         │
//! │     └── Cookie: kassa_session=<jwt> ──┘          │                      │
//! │          (only if no header)                     ▼                      │
//! │                                     Claims { sub, role, shop_id, .. }   │
//! │                                                  │                      │
//! │                                                  ▼                      │
//! │                                   Session { principal, claims }         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Account and shop activity are checked at login; a token stays valid
//! until it expires.

use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum_extra::extract::CookieJar;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use kassa_core::{Principal, Role, Scope};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

// =============================================================================
// JWT
// =============================================================================

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: String,

    pub role: Role,

    /// `None` for admins
    pub shop_id: Option<String>,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// JWT ID (unique identifier for this token)
    pub jti: String,
}

impl Claims {
    pub fn principal(&self) -> Principal {
        Principal::new(self.sub.clone(), self.role, self.shop_id.clone())
    }
}

/// Issues and checks HS256 session tokens.
pub struct JwtManager {
    encoding: EncodingKey,
    decoding: DecodingKey,
    lifetime_secs: i64,
}

impl JwtManager {
    pub fn new(secret: &str, lifetime_secs: i64) -> Self {
        JwtManager {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            lifetime_secs,
        }
    }

    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime_secs
    }

    /// Signs a token for `principal`.
    pub fn issue(&self, principal: &Principal) -> ApiResult<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.lifetime_secs);

        let claims = Claims {
            sub: principal.user_id.clone(),
            role: principal.role,
            shop_id: principal.shop_id.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| ApiError::internal(format!("Failed to generate token: {}", e)))
    }

    /// Validates signature and expiry.
    pub fn validate(&self, token: &str) -> ApiResult<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| ApiError::unauthenticated(format!("Invalid token: {}", e)))
    }
}

// =============================================================================
// Passwords
// =============================================================================

/// Hashes a password for storage (argon2id, random salt).
pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))
}

/// Checks a password against a stored hash. Malformed hashes never match.
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

// =============================================================================
// Session Extractor
// =============================================================================

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct Session {
    pub principal: Principal,
    pub claims: Claims,
}

impl Session {
    /// Read scope; admins may name a shop with `?shop=`.
    pub fn scope(&self, requested: Option<&str>) -> ApiResult<Scope> {
        Ok(self.principal.resolve_scope(requested)?)
    }

    /// Shop a write goes to; admins must name it.
    pub fn write_shop(&self, requested: Option<&str>) -> ApiResult<String> {
        Ok(self.principal.resolve_write_shop(requested)?)
    }
}

/// Extract bearer token from authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
}

/// Finds the token in the `Authorization` header, then the session cookie.
pub fn token_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let from_header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer_token)
        .map(str::to_string);

    from_header.or_else(|| {
        CookieJar::from_headers(headers)
            .get(cookie_name)
            .map(|c| c.value().to_string())
    })
}

/// Authenticates a request from its headers.
pub fn authenticate(headers: &HeaderMap, state: &AppState) -> ApiResult<Session> {
    let token = token_from_headers(headers, &state.config.jwt.cookie_name)
        .ok_or_else(|| ApiError::unauthenticated("Missing session token"))?;

    let claims = state.jwt.validate(&token)?;
    Ok(Session {
        principal: claims.principal(),
        claims,
    })
}

impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        authenticate(&parts.headers, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_jwt_roundtrip() {
        let manager = JwtManager::new("test-secret", 3600);
        let principal = Principal::new("u1", Role::Cashier, Some("s1".into()));

        let token = manager.issue(&principal).unwrap();
        let claims = manager.validate(&token).unwrap();

        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.role, Role::Cashier);
        assert_eq!(claims.principal(), principal);
    }

    #[test]
    fn test_wrong_secret_and_expired_token() {
        let manager = JwtManager::new("test-secret", 3600);
        let token = manager.issue(&Principal::new("root", Role::Admin, None)).unwrap();

        assert!(JwtManager::new("other-secret", 3600).validate(&token).is_err());

        let expired = JwtManager::new("test-secret", -3600);
        let token = expired.issue(&Principal::new("root", Role::Admin, None)).unwrap();
        assert!(manager.validate(&token).is_err());
    }

    #[test]
    fn test_password_hashing() {
        let hash = hash_password("correct horse").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-hash"));
    }

    #[test]
    fn test_token_sources() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("kassa_session=from-cookie"));
        assert_eq!(
            token_from_headers(&headers, "kassa_session").as_deref(),
            Some("from-cookie")
        );

        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(
            token_from_headers(&headers, "kassa_session").as_deref(),
            Some("from-header")
        );

        assert_eq!(extract_bearer_token("Basic abc"), None);
        assert_eq!(token_from_headers(&HeaderMap::new(), "kassa_session"), None);
    }
}
