//! # kassa-db: Database Layer for Kassa
//!
//! All persistence for the Kassa backend: a SQLite pool, embedded
//! migrations, and one repository per aggregate.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Kassa Data Flow                                  │
//! │                                                                         │
//! │  axum handler (POST /api/invoices)                                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     kassa-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ Shop  User    │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ Product       │    │ 0001_initial │  │   │
//! │  │   │ WAL, FKs on   │    │ Invoice Debt  │    │   _schema    │  │   │
//! │  │   │               │    │ Sms Settings  │    │              │  │   │
//! │  │   │               │    │ Report        │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (kassa.db)                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kassa_core::Scope;
//! use kassa_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("./kassa.db")).await?;
//!
//! let scope = Scope::Shop(shop_id);
//! let low = db.reports().low_stock(&scope, 20).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::{
    DebtFilter, DebtRepository, InvoiceFilter, InvoiceRepository, NewSmsLog, ProductFilter,
    ProductRepository, ReportRepository, SettingsRepository, ShopRepository, SmsLogRepository,
    UserCredentials, UserRepository,
};
