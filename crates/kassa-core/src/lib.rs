//! # kassa-core: Pure Business Logic for Kassa
//!
//! Domain types and rules for the Kassa point-of-sale backend, with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Kassa Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 Web frontend (checkout, ledger, reports)        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ JSON over HTTP                         │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 kassa-api (axum routes, cache, SMS)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ kassa-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐ ┌─────────┐  │   │
//! │  │   │  types  │ │  money  │ │ invoice │ │ tenancy │ │  cache  │  │   │
//! │  │   └─────────┘ └─────────┘ └─────────┘ └─────────┘ └─────────┘  │   │
//! │  │   ┌─────────┐ ┌────────────┐                                   │   │
//! │  │   │   sms   │ │ validation │   NO I/O • PURE FUNCTIONS          │   │
//! │  │   └─────────┘ └────────────┘                                   │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    kassa-db (SQLite repositories)               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Shop, Product, Invoice, Debt, ...)
//! - [`input`] - Validated request bodies
//! - [`money`] - Money type with integer arithmetic
//! - [`invoice`] - Checkout request validation and profit computation
//! - [`tenancy`] - Shop scoping and role checks
//! - [`cache`] - Cache key scheme and invalidation targets
//! - [`sms`] - Segment counting, cost, reminder templates
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use kassa_core::money::Money;
//!
//! let sale = Money::from_cents(1_500);
//! let bought = Money::from_cents(1_000);
//! let profit = (sale - bought).multiply_quantity(3);
//! assert_eq!(profit.cents(), 1_500);
//! ```

pub mod cache;
pub mod error;
pub mod input;
pub mod invoice;
pub mod money;
pub mod sms;
pub mod tenancy;
pub mod types;
pub mod validation;

pub use error::{CoreError, ValidationError};
pub use input::*;
pub use money::Money;
pub use tenancy::{Principal, Scope};
pub use types::*;

/// Maximum distinct product lines on a single invoice.
pub const MAX_INVOICE_ITEMS: usize = 200;

/// Maximum quantity of a single line.
///
/// Catches typos at the till (1000 instead of 10).
pub const MAX_ITEM_QUANTITY: i64 = 9_999;

/// Highest unit price in cents (10 million currency units).
///
/// Together with `MAX_ITEM_QUANTITY` and `MAX_INVOICE_ITEMS` this keeps
/// every invoice total well inside `i64`.
pub const MAX_PRICE_CENTS: i64 = 1_000_000_000;

/// Highest stock level a product may hold.
pub const MAX_STOCK: i64 = 1_000_000_000;

/// Largest debt amount in cents: the biggest invoice a till can produce.
pub const MAX_DEBT_CENTS: i64 = MAX_PRICE_CENTS * MAX_ITEM_QUANTITY * MAX_INVOICE_ITEMS as i64;

/// Largest single SMS credit grant.
pub const MAX_SMS_CREDIT: i64 = 1_000_000;

/// Highest SMS balance a shop may hold.
pub const MAX_SMS_BALANCE: i64 = 100_000_000;

/// Default page size for list endpoints.
pub const DEFAULT_PAGE_SIZE: i64 = 25;

/// Upper bound for a requested page size.
pub const MAX_PAGE_SIZE: i64 = 200;
