//! # Tenancy Module
//!
//! Decides which shop a request may see or change.
//!
//! ## Scope Resolution
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Principal (from session)      requested (?shop=)     Scope             │
//! │  ─────────────────────────     ──────────────────     ───────────────   │
//! │  admin                         none                   All               │
//! │  admin                         "s2"                   Shop("s2")        │
//! │  owner/cashier of "s1"         none or "s1"           Shop("s1")        │
//! │  owner/cashier of "s1"         "s2"                   Forbidden         │
//! │  owner/cashier, no shop        any                    Forbidden         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads take a `Scope`; writes need one concrete shop id
//! (`resolve_write_shop`), so an admin must name the target shop.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::Role;

/// The set of shops a query may touch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Shop(String),
    All,
}

impl Scope {
    /// The shop id, or `None` for `All`. Handy for `WHERE (? IS NULL OR shop_id = ?)`.
    pub fn shop_id(&self) -> Option<&str> {
        match self {
            Scope::Shop(id) => Some(id),
            Scope::All => None,
        }
    }
}

/// Rendered into cache keys: the shop id, or `all`.
impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Shop(id) => write!(f, "{}", id),
            Scope::All => write!(f, "all"),
        }
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
    pub shop_id: Option<String>,
}

impl Principal {
    pub fn new(user_id: impl Into<String>, role: Role, shop_id: Option<String>) -> Self {
        Principal {
            user_id: user_id.into(),
            role,
            shop_id,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    fn own_shop(&self) -> CoreResult<&str> {
        self.shop_id
            .as_deref()
            .ok_or_else(|| CoreError::forbidden("account is not bound to a shop"))
    }

    /// Scope for a read.
    ///
    /// ## Example
    /// ```rust
    /// use kassa_core::{Principal, Role, Scope};
    ///
    /// let cashier = Principal::new("u1", Role::Cashier, Some("s1".into()));
    /// assert_eq!(cashier.resolve_scope(None).unwrap(), Scope::Shop("s1".into()));
    /// assert!(cashier.resolve_scope(Some("s2")).is_err());
    ///
    /// let admin = Principal::new("root", Role::Admin, None);
    /// assert_eq!(admin.resolve_scope(None).unwrap(), Scope::All);
    /// ```
    pub fn resolve_scope(&self, requested: Option<&str>) -> CoreResult<Scope> {
        let requested = requested.filter(|s| !s.is_empty());

        if self.is_admin() {
            return Ok(match requested {
                Some(id) => Scope::Shop(id.to_string()),
                None => Scope::All,
            });
        }

        let own = self.own_shop()?;
        match requested {
            Some(id) if id != own => Err(CoreError::forbidden("cannot access another shop")),
            _ => Ok(Scope::Shop(own.to_string())),
        }
    }

    /// Shop id for a write. Admins must name the shop explicitly.
    pub fn resolve_write_shop(&self, requested: Option<&str>) -> CoreResult<String> {
        match self.resolve_scope(requested)? {
            Scope::Shop(id) => Ok(id),
            Scope::All => Err(CoreError::forbidden(
                "admin writes must target a shop (?shop=<id>)",
            )),
        }
    }

    /// Whether this caller may touch a record owned by `shop_id`.
    pub fn can_access_shop(&self, shop_id: &str) -> bool {
        self.is_admin() || self.shop_id.as_deref() == Some(shop_id)
    }

    pub fn require_admin(&self) -> CoreResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(CoreError::forbidden("admin role required"))
        }
    }

    /// Admin or owner.
    pub fn require_manager(&self) -> CoreResult<()> {
        if self.role.can_manage() {
            Ok(())
        } else {
            Err(CoreError::forbidden("owner or admin role required"))
        }
    }
}
