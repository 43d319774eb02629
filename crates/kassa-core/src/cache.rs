//! # Cache Key Scheme
//!
//! How cached GET responses are named and which of them a mutation makes
//! stale. The store itself (Redis or in-memory) lives in the API crate.
//!
//! ## Key Layout
//! ```text
//! kassa:cache:{scope}:{resource}:{request uri}   → cached JSON body
//! kassa:index:{scope}:{resource}                 → set of the keys above
//! kassa:gen:{scope}:{resource}                   → eviction counter
//!
//! kassa:cache:s1:products:/api/products?page=2
//! kassa:cache:all:reports:/api/reports/summary?from=2026-10-01
//! kassa:index:s1:products
//! ```
//!
//! ## Invalidation
//! ```text
//! POST /api/invoices for shop s1
//!      │
//!      ▼
//! Resource::Invoices.invalidates() = [Invoices, Products, Debts, Reports]
//!      │
//!      ▼
//! invalidation_targets("s1", Invoices)
//!   = (s1, invoices) (s1, products) (s1, debts) (s1, reports)
//!     (all, invoices) (all, products) (all, debts) (all, reports)
//!      │
//!      ▼
//! each target, in one atomic step:
//!   INCR gen → SMEMBERS index → DEL members → DEL index
//! ```
//! The admin `all` scope aggregates every shop, so any tenant's write
//! makes it stale too.
//!
//! A miss reads the generation before running the handler and stores the
//! body only if the generation is unchanged, so a response computed from
//! rows read before a write never lands in the cache after that write's
//! eviction.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::tenancy::Scope;

pub const CACHE_PREFIX: &str = "kassa:cache";
pub const INDEX_PREFIX: &str = "kassa:index";
pub const GENERATION_PREFIX: &str = "kassa:gen";

/// A family of cached API reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Products,
    Invoices,
    Debts,
    Shops,
    Users,
    Settings,
    Sms,
    Reports,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Products => "products",
            Resource::Invoices => "invoices",
            Resource::Debts => "debts",
            Resource::Shops => "shops",
            Resource::Users => "users",
            Resource::Settings => "settings",
            Resource::Sms => "sms",
            Resource::Reports => "reports",
        }
    }

    /// Maps a request path to the resource it reads, e.g.
    /// `/api/products/barcode/123` → `Products`.
    pub fn from_path(path: &str) -> Option<Resource> {
        let segment = path.strip_prefix("/api/")?.split('/').next()?;
        match segment {
            "products" => Some(Resource::Products),
            "invoices" => Some(Resource::Invoices),
            "debts" => Some(Resource::Debts),
            "shops" => Some(Resource::Shops),
            "users" => Some(Resource::Users),
            "settings" => Some(Resource::Settings),
            "sms" => Some(Resource::Sms),
            "reports" => Some(Resource::Reports),
            _ => None,
        }
    }

    /// Resources whose cached reads go stale when this one is written.
    ///
    /// Always includes `self`.
    pub fn invalidates(&self) -> &'static [Resource] {
        use Resource::*;
        match self {
            // A sale decrements stock and may open a debt.
            Invoices => &[Invoices, Products, Debts, Reports],
            Products => &[Products, Reports],
            Debts => &[Debts, Reports],
            // Shop rows carry the SMS balance.
            Sms => &[Sms, Shops],
            Shops => &[Shops, Sms],
            Users => &[Users],
            // Low-stock defaults feed the low-stock report.
            Settings => &[Settings, Reports],
            Reports => &[Reports],
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of one cached response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    pub scope: Scope,
    pub resource: Resource,
    pub uri: String,
}

impl CacheKey {
    pub fn new(scope: Scope, resource: Resource, uri: impl Into<String>) -> Self {
        CacheKey {
            scope,
            resource,
            uri: uri.into(),
        }
    }

    /// The storage key, `kassa:cache:{scope}:{resource}:{uri}`.
    pub fn key(&self) -> String {
        format!("{}:{}:{}:{}", CACHE_PREFIX, self.scope, self.resource, self.uri)
    }

    /// The index set this key is recorded in.
    pub fn index_key(&self) -> String {
        index_key(&self.scope, self.resource)
    }

    /// The eviction counter guarding this key.
    pub fn generation_key(&self) -> String {
        generation_key(&self.scope, self.resource)
    }
}

/// `kassa:index:{scope}:{resource}`.
pub fn index_key(scope: &Scope, resource: Resource) -> String {
    format!("{}:{}:{}", INDEX_PREFIX, scope, resource)
}

/// `kassa:gen:{scope}:{resource}`.
pub fn generation_key(scope: &Scope, resource: Resource) -> String {
    format!("{}:{}:{}", GENERATION_PREFIX, scope, resource)
}

/// Every (scope, resource) pair a write to `resource` in `shop_id` evicts.
pub fn invalidation_targets(shop_id: &str, resource: Resource) -> Vec<(Scope, Resource)> {
    let scopes = [Scope::Shop(shop_id.to_string()), Scope::All];
    let mut targets = Vec::with_capacity(scopes.len() * resource.invalidates().len());

    for scope in scopes {
        for dependant in resource.invalidates() {
            targets.push((scope.clone(), *dependant));
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        let key = CacheKey::new(
            Scope::Shop("s1".into()),
            Resource::Products,
            "/api/products?page=2",
        );
        assert_eq!(key.key(), "kassa:cache:s1:products:/api/products?page=2");
        assert_eq!(key.index_key(), "kassa:index:s1:products");
        assert_eq!(key.generation_key(), "kassa:gen:s1:products");

        let admin = CacheKey::new(Scope::All, Resource::Reports, "/api/reports/daily");
        assert_eq!(admin.key(), "kassa:cache:all:reports:/api/reports/daily");
    }

    #[test]
    fn test_from_path() {
        assert_eq!(Resource::from_path("/api/products"), Some(Resource::Products));
        assert_eq!(
            Resource::from_path("/api/products/barcode/123"),
            Some(Resource::Products)
        );
        assert_eq!(Resource::from_path("/api/reports/summary"), Some(Resource::Reports));
        assert_eq!(Resource::from_path("/api/auth/me"), None);
        assert_eq!(Resource::from_path("/health"), None);
    }

    #[test]
    fn test_every_resource_invalidates_itself() {
        use Resource::*;
        for r in [Products, Invoices, Debts, Shops, Users, Settings, Sms, Reports] {
            assert!(r.invalidates().contains(&r), "{} must invalidate itself", r);
        }
    }

    #[test]
    fn test_invoice_write_targets_tenant_and_admin_scopes() {
        let targets = invalidation_targets("s1", Resource::Invoices);

        assert_eq!(targets.len(), 8);
        assert!(targets.contains(&(Scope::Shop("s1".into()), Resource::Products)));
        assert!(targets.contains(&(Scope::All, Resource::Reports)));
        assert!(!targets.contains(&(Scope::Shop("s1".into()), Resource::Users)));
    }
}
