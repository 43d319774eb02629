//! # Repository Module
//!
//! One repository per aggregate. Each holds a clone of the pool and is
//! created on demand by the `Database` accessors.
//!
//! ## Tenant Scoping
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Scope::Shop("s1")  → bind Some("s1")                                  │
//! │  Scope::All         → bind None                                        │
//! │                                                                         │
//! │  WHERE (?1 IS NULL OR shop_id = ?1)                                    │
//! │                                                                         │
//! │  Reads filter by scope. Writes take a concrete shop_id and put it in   │
//! │  the WHERE clause, so a row from another shop is simply "not found".   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`ShopRepository`] - Tenants and the SMS balance
//! - [`UserRepository`] - Staff accounts and password hashes
//! - [`ProductRepository`] - Catalog, stock adjustments, bulk import
//! - [`InvoiceRepository`] - Checkout transaction and invoice history
//! - [`DebtRepository`] - Debt ledger and reminder bookkeeping
//! - [`SmsLogRepository`] - Send attempt log
//! - [`SettingsRepository`] - Per-shop settings
//! - [`ReportRepository`] - Sales and debt aggregates

pub mod debt;
pub mod invoice;
pub mod product;
pub mod report;
pub mod settings;
pub mod shop;
pub mod sms;
pub mod user;

pub use debt::{DebtFilter, DebtRepository};
pub use invoice::{InvoiceFilter, InvoiceRepository};
pub use product::{ProductFilter, ProductRepository};
pub use report::ReportRepository;
pub use settings::SettingsRepository;
pub use shop::ShopRepository;
pub use sms::{NewSmsLog, SmsLogRepository};
pub use user::{UserCredentials, UserRepository};

use uuid::Uuid;

/// Generates a new record id.
pub(crate) fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Escapes `%` and `_` for a `LIKE ... ESCAPE '\'` pattern and wraps it in `%`.
pub(crate) fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}
