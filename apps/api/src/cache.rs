//! # Response Cache
//!
//! Caches JSON bodies of authenticated `GET /api/...` requests per tenant
//! and evicts them when a write touches the same resource.
//!
//! ## Read / Write Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  GET /api/products?page=2  (shop s1)                                    │
//! │     │                                                                   │
//! │     ├── cache_responses middleware                                      │
//! │     │     key = kassa:cache:s1:products:cashier:/api/products?page=2    │
//! │     │     hit  → body, x-cache: hit                                     │
//! │     │     miss → read gen → handler → 200 and gen unchanged?            │
//! │     │            store body + SADD index                                │
//! │                                                                         │
//! │  POST /api/invoices  (shop s1)                                          │
//! │     │                                                                   │
//! │     ├── handler writes                                                  │
//! │     ├── ResponseCache::invalidate("s1", Invoices)   ◄── before reply    │
//! │     │     for (scope, resource) in invalidation_targets:                │
//! │     │        INCR gen, SMEMBERS index, DEL keys, DEL index (atomic)    │
//! │     └── response                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Failure Handling
//! - A store error on read is a miss.
//! - A store error during invalidation may leave stale entries, so the
//!   cache switches to bypass (no reads served, nothing stored) until a
//!   full `clear` succeeds.
//! - `clear` keeps the generation counters, so a body rendered before the
//!   clear still cannot be stored after it.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use kassa_core::cache::{
    generation_key, index_key, invalidation_targets, CacheKey, Resource, CACHE_PREFIX,
    INDEX_PREFIX,
};
use kassa_core::Scope;

use crate::auth::authenticate;
use crate::AppState;

/// Response header telling clients whether the body came from the cache.
pub const CACHE_STATUS_HEADER: HeaderName = HeaderName::from_static("x-cache");

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

// =============================================================================
// Store Trait
// =============================================================================

/// Key/value storage behind the response cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError>;

    /// Eviction count of the key's `(scope, resource)`, 0 if never evicted.
    async fn generation(&self, key: &CacheKey) -> Result<u64, CacheError>;

    /// Stores `value` and records the key in its index set, but only while
    /// the key's generation still equals `generation`. Returns whether it
    /// stored.
    async fn put(
        &self,
        key: &CacheKey,
        value: &str,
        ttl: Duration,
        generation: u64,
    ) -> Result<bool, CacheError>;

    /// Bumps the generation and deletes every key recorded for
    /// `(scope, resource)` as one step. Returns how many keys.
    async fn invalidate(&self, scope: &Scope, resource: Resource) -> Result<usize, CacheError>;

    /// Deletes every cached body and index. Generations survive.
    async fn clear(&self) -> Result<(), CacheError>;

    async fn ping(&self) -> Result<(), CacheError>;

    fn name(&self) -> &'static str;
}

// =============================================================================
// Redis Store
// =============================================================================

/// KEYS: body, index, generation. ARGV: body, ttl secs, expected generation.
const PUT_SCRIPT: &str = r#"
if tonumber(redis.call('GET', KEYS[3]) or '0') ~= tonumber(ARGV[3]) then
    return 0
end
redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[2])
redis.call('SADD', KEYS[2], KEYS[1])
redis.call('EXPIRE', KEYS[2], tonumber(ARGV[2]) * 2)
return 1
"#;

/// KEYS: index, generation.
const EVICT_SCRIPT: &str = r#"
redis.call('INCR', KEYS[2])
local members = redis.call('SMEMBERS', KEYS[1])
for i = 1, #members, 500 do
    redis.call('DEL', unpack(members, i, math.min(i + 499, #members)))
end
redis.call('DEL', KEYS[1])
return #members
"#;

const SCAN_BATCH: usize = 500;

pub struct RedisCache {
    conn: ConnectionManager,
    put_script: redis::Script,
    evict_script: redis::Script,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to Redis");
        Ok(RedisCache {
            conn,
            put_script: redis::Script::new(PUT_SCRIPT),
            evict_script: redis::Script::new(EVICT_SCRIPT),
        })
    }

    /// Deletes keys matching `pattern` with SCAN so the server never blocks
    /// on one huge KEYS reply.
    async fn delete_matching(&self, pattern: &str) -> Result<usize, CacheError> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted = 0;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let _: () = conn.del(&keys).await?;
                deleted += keys.len();
            }
            if next == 0 {
                return Ok(deleted);
            }
            cursor = next;
        }
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key.key()).await?;
        Ok(value)
    }

    async fn generation(&self, key: &CacheKey) -> Result<u64, CacheError> {
        let mut conn = self.conn.clone();
        let generation: Option<u64> = conn.get(key.generation_key()).await?;
        Ok(generation.unwrap_or(0))
    }

    async fn put(
        &self,
        key: &CacheKey,
        value: &str,
        ttl: Duration,
        generation: u64,
    ) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let ttl_secs = ttl.as_secs().max(1);

        // The index outlives its members so eviction can still find them.
        let stored: i64 = self
            .put_script
            .key(key.key())
            .key(key.index_key())
            .key(key.generation_key())
            .arg(value)
            .arg(ttl_secs)
            .arg(generation)
            .invoke_async(&mut conn)
            .await?;
        Ok(stored == 1)
    }

    async fn invalidate(&self, scope: &Scope, resource: Resource) -> Result<usize, CacheError> {
        let mut conn = self.conn.clone();
        let evicted: usize = self
            .evict_script
            .key(index_key(scope, resource))
            .key(generation_key(scope, resource))
            .invoke_async(&mut conn)
            .await?;
        Ok(evicted)
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let bodies = self.delete_matching(&format!("{}:*", CACHE_PREFIX)).await?;
        let indexes = self.delete_matching(&format!("{}:*", INDEX_PREFIX)).await?;
        debug!(bodies, indexes, "Redis cache cleared");
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

// =============================================================================
// Memory Store
// =============================================================================

#[derive(Default)]
struct MemoryInner {
    entries: HashMap<String, (String, Instant)>,
    index: HashMap<String, HashSet<String>>,
    generations: HashMap<String, u64>,
}

impl MemoryInner {
    fn generation(&self, key: &str) -> u64 {
        self.generations.get(key).copied().unwrap_or(0)
    }

    /// Drops expired entries and the index members pointing at them.
    fn prune(&mut self, now: Instant) {
        let MemoryInner { entries, index, .. } = self;
        entries.retain(|_, (_, expires)| *expires > now);
        index.retain(|_, keys| {
            keys.retain(|key| entries.contains_key(key));
            !keys.is_empty()
        });
    }
}

/// In-process store for single-node setups and tests.
#[derive(Default)]
pub struct MemoryCache {
    inner: RwLock<MemoryInner>,
}

impl MemoryCache {
    pub fn new() -> Self {
        MemoryCache::default()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .read()
            .await
            .entries
            .values()
            .filter(|(_, expires)| *expires > now)
            .count()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
        let inner = self.inner.read().await;
        Ok(inner
            .entries
            .get(&key.key())
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn generation(&self, key: &CacheKey) -> Result<u64, CacheError> {
        Ok(self.inner.read().await.generation(&key.generation_key()))
    }

    async fn put(
        &self,
        key: &CacheKey,
        value: &str,
        ttl: Duration,
        generation: u64,
    ) -> Result<bool, CacheError> {
        let mut inner = self.inner.write().await;
        if inner.generation(&key.generation_key()) != generation {
            return Ok(false);
        }

        let now = Instant::now();
        inner.prune(now);
        inner
            .entries
            .insert(key.key(), (value.to_string(), now + ttl));
        inner
            .index
            .entry(key.index_key())
            .or_default()
            .insert(key.key());
        Ok(true)
    }

    async fn invalidate(&self, scope: &Scope, resource: Resource) -> Result<usize, CacheError> {
        let mut inner = self.inner.write().await;
        *inner
            .generations
            .entry(generation_key(scope, resource))
            .or_default() += 1;
        let members = inner
            .index
            .remove(&index_key(scope, resource))
            .unwrap_or_default();
        for key in &members {
            inner.entries.remove(key);
        }
        Ok(members.len())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.index.clear();
        Ok(())
    }

    async fn ping(&self) -> Result<(), CacheError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// =============================================================================
// Response Cache
// =============================================================================

/// The cache as handlers see it: errors are logged, never returned.
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    enabled: bool,
    bypass: AtomicBool,
}

impl ResponseCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration, enabled: bool) -> Self {
        ResponseCache {
            store,
            ttl,
            enabled,
            bypass: AtomicBool::new(false),
        }
    }

    pub fn store_name(&self) -> &'static str {
        self.store.name()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// `true` after a failed invalidation, until `clear` succeeds.
    pub fn is_bypassed(&self) -> bool {
        self.bypass.load(Ordering::Acquire)
    }

    fn serving(&self) -> bool {
        self.enabled && !self.is_bypassed()
    }

    pub async fn get_json(&self, key: &CacheKey) -> Option<String> {
        if !self.serving() {
            return None;
        }

        match self.store.get(key).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!(error = %e, key = %key.key(), "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Generation to hand back to [`put_json`](Self::put_json). Read it
    /// before computing the body; `None` means do not store.
    pub async fn generation(&self, key: &CacheKey) -> Option<u64> {
        if !self.serving() {
            return None;
        }

        match self.store.generation(key).await {
            Ok(generation) => Some(generation),
            Err(e) => {
                warn!(error = %e, key = %key.key(), "Cache generation read failed");
                None
            }
        }
    }

    /// Stores `body` unless the key was evicted after `generation` was read.
    pub async fn put_json(&self, key: &CacheKey, body: &str, generation: u64) {
        if !self.serving() {
            return;
        }

        match self.store.put(key, body, self.ttl, generation).await {
            Ok(true) => {}
            Ok(false) => debug!(key = %key.key(), "Evicted while rendering, not cached"),
            Err(e) => warn!(error = %e, key = %key.key(), "Cache write failed"),
        }
    }

    /// Evicts everything a write to `resource` in `shop_id` makes stale.
    pub async fn invalidate(&self, shop_id: &str, resource: Resource) {
        self.evict(invalidation_targets(shop_id, resource)).await;
        debug!(shop_id = %shop_id, resource = %resource, "Cache invalidated");
    }

    /// Evicts only the admin-wide reads, for rows that belong to no shop.
    pub async fn invalidate_global(&self, resource: Resource) {
        let targets = resource
            .invalidates()
            .iter()
            .map(|dependant| (Scope::All, *dependant))
            .collect();
        self.evict(targets).await;
        debug!(resource = %resource, "Global cache invalidated");
    }

    async fn evict(&self, targets: Vec<(Scope, Resource)>) {
        if !self.enabled {
            return;
        }

        for (scope, target) in targets {
            if let Err(e) = self.store.invalidate(&scope, target).await {
                error!(
                    error = %e,
                    scope = %scope,
                    resource = %target,
                    "Cache invalidation failed, bypassing cache"
                );
                self.bypass.store(true, Ordering::Release);
                self.recover().await;
                return;
            }
        }
    }

    /// Clears the whole store. Leaves bypass mode on success.
    pub async fn clear(&self) -> Result<(), CacheError> {
        self.store.clear().await?;
        if self.bypass.swap(false, Ordering::AcqRel) {
            info!("Cache cleared, leaving bypass mode");
        }
        Ok(())
    }

    /// Tries to leave bypass mode.
    pub async fn recover(&self) {
        if !self.is_bypassed() {
            return;
        }
        if let Err(e) = self.clear().await {
            warn!(error = %e, "Cache still unavailable, staying in bypass mode");
        }
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        self.store.ping().await
    }
}

// =============================================================================
// Middleware
// =============================================================================

/// Value of `?shop=` in a query string.
fn shop_param(query: Option<&str>) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(k, _)| k == "shop")
        .map(|(_, v)| v.into_owned())
}

/// Serves and fills the cache for authenticated `GET /api/...` requests.
///
/// Anything it cannot key (no session, forbidden scope, unknown resource)
/// goes straight to the handler, which produces the proper error.
pub async fn cache_responses(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET || !state.cache.is_enabled() {
        return next.run(request).await;
    }

    let Some(resource) = Resource::from_path(request.uri().path()) else {
        return next.run(request).await;
    };
    let Ok(session) = authenticate(request.headers(), &state) else {
        return next.run(request).await;
    };
    let requested = shop_param(request.uri().query());
    let Ok(scope) = session.principal.resolve_scope(requested.as_deref()) else {
        return next.run(request).await;
    };

    // Role is part of the key: owners and cashiers of one shop see
    // different endpoints.
    let uri = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| request.uri().path());
    let key = CacheKey::new(scope, resource, format!("{}:{}", session.principal.role.as_str(), uri));

    if let Some(body) = state.cache.get_json(&key).await {
        return (
            [
                (CONTENT_TYPE, HeaderValue::from_static("application/json")),
                (CACHE_STATUS_HEADER, HeaderValue::from_static("hit")),
            ],
            body,
        )
            .into_response();
    }

    // Read before the handler touches the database.
    let generation = state.cache.generation(&key).await;

    let response = next.run(request).await;
    if response.status() != StatusCode::OK {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "Failed to buffer response body");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    if let (Some(generation), Ok(text)) = (generation, std::str::from_utf8(&bytes)) {
        state.cache.put_json(&key, text, generation).await;
    }

    parts
        .headers
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("miss"));
    Response::from_parts(parts, Body::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A store whose invalidation can be switched to fail.
    struct FlakyStore {
        inner: MemoryCache,
        fail_invalidate: AtomicBool,
        fail_clear: AtomicBool,
    }

    #[async_trait]
    impl CacheStore for FlakyStore {
        async fn get(&self, key: &CacheKey) -> Result<Option<String>, CacheError> {
            self.inner.get(key).await
        }
        async fn generation(&self, key: &CacheKey) -> Result<u64, CacheError> {
            self.inner.generation(key).await
        }
        async fn put(
            &self,
            key: &CacheKey,
            value: &str,
            ttl: Duration,
            generation: u64,
        ) -> Result<bool, CacheError> {
            self.inner.put(key, value, ttl, generation).await
        }
        async fn invalidate(&self, scope: &Scope, resource: Resource) -> Result<usize, CacheError> {
            if self.fail_invalidate.load(Ordering::SeqCst) {
                return Err(CacheError::Redis(redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "connection reset",
                ))));
            }
            self.inner.invalidate(scope, resource).await
        }
        async fn clear(&self) -> Result<(), CacheError> {
            if self.fail_clear.load(Ordering::SeqCst) {
                return Err(CacheError::Redis(redis::RedisError::from((
                    redis::ErrorKind::IoError,
                    "connection reset",
                ))));
            }
            self.inner.clear().await
        }
        async fn ping(&self) -> Result<(), CacheError> {
            Ok(())
        }
        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn key(shop: &str, resource: Resource, uri: &str) -> CacheKey {
        CacheKey::new(Scope::Shop(shop.into()), resource, uri)
    }

    async fn fill(cache: &ResponseCache, key: &CacheKey, body: &str) {
        let generation = cache.generation(key).await.unwrap();
        cache.put_json(key, body, generation).await;
    }

    #[tokio::test]
    async fn test_invalidate_evicts_dependants_in_both_scopes() {
        let cache = ResponseCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(60), true);

        let products = key("s1", Resource::Products, "/api/products");
        let admin_reports = CacheKey::new(Scope::All, Resource::Reports, "/api/reports/summary");
        let users = key("s1", Resource::Users, "/api/users");
        let other_shop = key("s2", Resource::Products, "/api/products");

        for k in [&products, &admin_reports, &users, &other_shop] {
            fill(&cache, k, "[]").await;
        }

        cache.invalidate("s1", Resource::Invoices).await;

        assert!(cache.get_json(&products).await.is_none());
        assert!(cache.get_json(&admin_reports).await.is_none());
        assert_eq!(cache.get_json(&users).await.as_deref(), Some("[]"));
        assert_eq!(cache.get_json(&other_shop).await.as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_failed_invalidation_bypasses_until_clear() {
        let store = Arc::new(FlakyStore {
            inner: MemoryCache::new(),
            fail_invalidate: AtomicBool::new(true),
            fail_clear: AtomicBool::new(true),
        });
        let cache = ResponseCache::new(store.clone(), Duration::from_secs(60), true);

        let k = key("s1", Resource::Products, "/api/products");
        fill(&cache, &k, "[1]").await;

        cache.invalidate("s1", Resource::Products).await;
        assert!(cache.is_bypassed());
        assert!(cache.get_json(&k).await.is_none());

        store.fail_clear.store(false, Ordering::SeqCst);
        cache.recover().await;
        assert!(!cache.is_bypassed());
        assert!(cache.get_json(&k).await.is_none());
    }

    #[tokio::test]
    async fn test_body_rendered_before_eviction_is_not_stored() {
        let cache = ResponseCache::new(Arc::new(MemoryCache::new()), Duration::from_secs(60), true);
        let stock = key("s1", Resource::Products, "cashier:/api/products");

        // A GET misses and reads stock 5, then a checkout commits and evicts
        // before the GET stores its body.
        let before_checkout = cache.generation(&stock).await.unwrap();
        cache.invalidate("s1", Resource::Invoices).await;
        cache.put_json(&stock, r#"{"stock":5}"#, before_checkout).await;
        assert!(cache.get_json(&stock).await.is_none());

        // An admin-wide read of the same resource is guarded the same way.
        let admin = CacheKey::new(Scope::All, Resource::Products, "admin:/api/products");
        let stale_admin = cache.generation(&admin).await.unwrap();
        cache.invalidate("s2", Resource::Products).await;
        cache.put_json(&admin, "[]", stale_admin).await;
        assert!(cache.get_json(&admin).await.is_none());

        fill(&cache, &stock, r#"{"stock":4}"#).await;
        assert_eq!(cache.get_json(&stock).await.as_deref(), Some(r#"{"stock":4}"#));
    }

    #[tokio::test]
    async fn test_clear_keeps_generations() {
        let store = MemoryCache::new();
        let k = key("s1", Resource::Products, "/api/products");
        let stale = store.generation(&k).await.unwrap();

        store.invalidate(&k.scope, Resource::Products).await.unwrap();
        store.clear().await.unwrap();

        assert!(!store.put(&k, "[]", Duration::from_secs(60), stale).await.unwrap());
        assert_eq!(store.generation(&k).await.unwrap(), stale + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_prunes_expired_index_members() {
        let store = MemoryCache::new();
        let debts = key("s1", Resource::Debts, "/api/debts");
        let products = key("s1", Resource::Products, "/api/products");

        store.put(&debts, "{}", Duration::from_secs(5), 0).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        store.put(&products, "[]", Duration::from_secs(60), 0).await.unwrap();

        let inner = store.inner.read().await;
        assert!(!inner.entries.contains_key(&debts.key()));
        assert!(!inner.index.contains_key(&debts.index_key()));
        assert_eq!(inner.index[&products.index_key()].len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_entries_expire() {
        let store = MemoryCache::new();
        let k = key("s1", Resource::Debts, "/api/debts");
        store.put(&k, "{}", Duration::from_secs(5), 0).await.unwrap();
        assert_eq!(store.len().await, 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(store.get(&k).await.unwrap().is_none());
        assert_eq!(store.len().await, 0);
    }

    #[test]
    fn test_shop_param() {
        assert_eq!(shop_param(Some("page=2&shop=s1")).as_deref(), Some("s1"));
        assert_eq!(shop_param(Some("page=2")), None);
        assert_eq!(shop_param(None), None);
    }
}
