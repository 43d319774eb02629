//! # Domain Types
//!
//! Records stored by kassa-db and returned by the API.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │                       ┌─────────────────┐                               │
//! │                       │      Shop       │  tenant: sms_balance,         │
//! │                       │                 │  invoice_seq, settings        │
//! │                       └────────┬────────┘                               │
//! │        ┌──────────────┬────────┴─────┬──────────────┐                   │
//! │        ▼              ▼              ▼              ▼                   │
//! │  ┌──────────┐  ┌────────────┐  ┌──────────┐  ┌──────────┐              │
//! │  │   User   │  │  Product   │  │ Invoice  │  │   Debt   │              │
//! │  │  role    │  │ bought/sale│  │ total    │  │ amount   │              │
//! │  │          │  │ stock      │  │ profit   │──▶ due_date │              │
//! │  └──────────┘  └─────┬──────┘  └────┬─────┘  └────┬─────┘              │
//! │                      │    snapshot  ▼             ▼                     │
//! │                      └──────▶ InvoiceItem      SmsLog                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Conventions
//! - `id`: UUID v4 string, immutable
//! - Every monetary field is an `i64` in cents; the `Money` accessors are
//!   for arithmetic, never for storage
//! - Every tenant-owned record carries `shop_id`

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

// =============================================================================
// Role
// =============================================================================

/// What a user may do.
///
/// ```text
/// Admin   ─ all shops, SMS credit, shop lifecycle
/// Owner   ─ own shop: products, users, settings, reports
/// Cashier ─ own shop: checkout, debts, product lookup
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Owner,
    Cashier,
}

impl Role {
    #[inline]
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }

    /// Admins and owners manage catalog, staff, settings and reports.
    #[inline]
    pub fn can_manage(&self) -> bool {
        matches!(self, Role::Admin | Role::Owner)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Owner => "owner",
            Role::Cashier => "cashier",
        }
    }
}

// =============================================================================
// Shop
// =============================================================================

/// A tenant: one retail store.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Shop {
    pub id: String,
    pub name: String,
    pub owner_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,

    /// Prepaid SMS credits. One credit buys one message segment.
    pub sms_balance: i64,

    /// Last allocated invoice sequence number.
    pub invoice_seq: i64,

    /// Inactive shops cannot log in or send SMS.
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// User
// =============================================================================

/// A staff account. The password hash lives only in the database.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct User {
    pub id: String,

    /// `None` only for admins.
    pub shop_id: Option<String>,

    pub username: String,
    pub display_name: String,
    pub role: Role,
    pub is_active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Product
// =============================================================================

/// A product a shop sells.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub shop_id: String,
    pub name: String,

    /// Unique per shop when present.
    pub barcode: Option<String>,
    pub category: Option<String>,

    /// Purchase cost per unit in cents.
    pub bought_price: i64,

    /// Shelf price per unit in cents.
    pub sale_price: i64,

    /// Units on hand. Never negative.
    pub stock: i64,

    /// `stock <= low_stock_threshold` flags the product as low.
    pub low_stock_threshold: i64,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Product {
    #[inline]
    pub fn sale_price(&self) -> Money {
        Money::from_cents(self.sale_price)
    }

    #[inline]
    pub fn bought_price(&self) -> Money {
        Money::from_cents(self.bought_price)
    }

    /// Profit per unit sold. Negative when selling below cost.
    #[inline]
    pub fn unit_margin(&self) -> Money {
        self.sale_price() - self.bought_price()
    }

    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.low_stock_threshold
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    /// Card on the shop's bank terminal.
    Bank,
    /// Mobile or bank transfer.
    Transfer,
    /// Sold on credit; creates a linked debt record.
    Debt,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Bank => "bank",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Debt => "debt",
        }
    }
}

// =============================================================================
// Invoice
// =============================================================================

/// A completed sale. Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Invoice {
    pub id: String,
    pub shop_id: String,

    /// Human-readable number, `INV-20261018-000042`.
    pub invoice_number: String,
    pub cashier_id: String,
    pub payment_method: PaymentMethod,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,

    /// Σ line_total, cents.
    pub total: i64,

    /// Σ line_profit, cents.
    pub profit: i64,

    /// Σ quantity.
    pub item_count: i64,

    /// Set when `payment_method` is `Debt`.
    pub debt_id: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// One invoice line, with product data frozen at the time of sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct InvoiceItem {
    pub id: String,
    pub invoice_id: String,
    pub product_id: String,
    pub name: String,
    pub barcode: Option<String>,
    pub quantity: i64,
    pub unit_price: i64,
    pub unit_cost: i64,
    pub line_total: i64,
    pub line_profit: i64,
}

/// An invoice together with its lines.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InvoiceWithItems {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
}

// =============================================================================
// Debt
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum DebtStatus {
    Pending,
    Paid,
}

/// A customer IOU.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Debt {
    pub id: String,
    pub shop_id: String,
    pub customer_name: String,

    /// Normalized phone, see `validation::normalize_phone`.
    pub customer_phone: String,

    /// Cents.
    pub amount: i64,
    pub note: Option<String>,

    #[ts(as = "String")]
    pub due_date: NaiveDate,
    pub status: DebtStatus,

    /// The sale that created this debt, if any.
    pub invoice_id: Option<String>,

    pub reminder_count: i64,
    #[ts(as = "Option<String>")]
    pub last_reminded_at: Option<DateTime<Utc>>,
    #[ts(as = "Option<String>")]
    pub paid_at: Option<DateTime<Utc>>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Debt {
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount)
    }

    /// Pending and past its due date.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == DebtStatus::Pending && self.due_date < today
    }
}

// =============================================================================
// SMS Log
// =============================================================================

/// Outcome of one send attempt.
///
/// ```text
/// Sent    ─ provider accepted, balance stays debited
/// Failed  ─ provider rejected or unreachable, balance refunded
/// Blocked ─ never reached the provider (balance, disabled, bad phone)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SmsStatus {
    Sent,
    Failed,
    Blocked,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SmsLog {
    pub id: String,
    pub shop_id: String,
    pub debt_id: Option<String>,
    pub phone: String,
    pub message: String,
    pub segments: i64,

    /// Credits charged. Zero unless `status` is `Sent`.
    pub cost: i64,
    pub status: SmsStatus,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Shop Settings
// =============================================================================

/// Per-shop preferences. A shop without a row gets `ShopSettings::defaults`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct ShopSettings {
    pub shop_id: String,

    /// ISO 4217 code used when formatting amounts in SMS text.
    pub currency: String,
    pub sms_enabled: bool,
    pub sms_sender: String,
    pub reminders_enabled: bool,

    /// Remind this many days before the due date (0 = on the day).
    pub reminder_days_before: i64,
    pub reminder_template: String,
    pub default_low_stock_threshold: i64,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl ShopSettings {
    pub fn defaults(shop_id: &str, now: DateTime<Utc>) -> Self {
        ShopSettings {
            shop_id: shop_id.to_string(),
            currency: "USD".to_string(),
            sms_enabled: true,
            sms_sender: "Kassa".to_string(),
            reminders_enabled: false,
            reminder_days_before: 1,
            reminder_template: crate::sms::DEFAULT_REMINDER_TEMPLATE.to_string(),
            default_low_stock_threshold: 5,
            updated_at: now,
        }
    }
}

// =============================================================================
// Pagination
// =============================================================================

/// Page selection from a query string (`?page=2&per_page=50`).
///
/// Out-of-range values are clamped rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(default)]
#[ts(export)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl Default for PageRequest {
    fn default() -> Self {
        PageRequest {
            page: 1,
            per_page: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    pub fn new(page: i64, per_page: i64) -> Self {
        PageRequest { page, per_page }
    }

    /// 1-based page number.
    pub fn page(&self) -> i64 {
        self.page.max(1)
    }

    /// Rows per page, `1..=MAX_PAGE_SIZE`.
    pub fn limit(&self) -> i64 {
        self.per_page.clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }
}

/// One page of results plus the total row count.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

impl<T> Paginated<T> {
    pub fn new(data: Vec<T>, total: i64, request: PageRequest) -> Self {
        Paginated {
            data,
            total,
            page: request.page(),
            per_page: request.limit(),
        }
    }
}

// =============================================================================
// Date Range
// =============================================================================

/// Inclusive range of UTC calendar days used by reports and invoice lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DateRange {
    #[ts(as = "String")]
    pub from: NaiveDate,
    #[ts(as = "String")]
    pub to: NaiveDate,
}

impl DateRange {
    /// Builds a range from optional bounds.
    ///
    /// Missing `to` means today; missing `from` means 29 days before `to`
    /// (a 30-day window).
    pub fn resolve(
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Self, ValidationError> {
        let to = to.unwrap_or(today);
        let from = from.unwrap_or(to - Duration::days(29));

        if from > to {
            return Err(ValidationError::invalid("from", "must not be after 'to'"));
        }

        if (to - from).num_days() > 366 {
            return Err(ValidationError::invalid("from", "range cannot exceed 366 days"));
        }

        Ok(DateRange { from, to })
    }

    /// `YYYY-MM-DD` bounds, matching `substr(created_at, 1, 10)` in SQL.
    pub fn bounds(&self) -> (String, String) {
        (self.from.to_string(), self.to.to_string())
    }
}

// =============================================================================
// Reports
// =============================================================================

/// Revenue and payment split for one payment method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct PaymentBreakdown {
    pub payment_method: PaymentMethod,
    pub invoice_count: i64,
    pub revenue: i64,
}

/// Headline figures for a date range.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SalesSummary {
    pub range: DateRange,
    pub invoice_count: i64,
    pub revenue: i64,
    pub profit: i64,
    pub items_sold: i64,

    /// revenue / invoice_count, truncated; zero with no invoices.
    pub average_sale: i64,
    pub by_payment: Vec<PaymentBreakdown>,
}

/// One row of the daily chart. `day` is `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DailySales {
    pub day: String,
    pub invoice_count: i64,
    pub revenue: i64,
    pub profit: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TopProduct {
    pub product_id: String,
    pub name: String,
    pub quantity: i64,
    pub revenue: i64,
    pub profit: i64,
}

/// Outstanding and settled debt totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct DebtSummary {
    pub pending_count: i64,
    pub pending_amount: i64,
    pub overdue_count: i64,
    pub overdue_amount: i64,
    pub paid_count: i64,
    pub paid_amount: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_role_permissions() {
        assert!(Role::Admin.is_admin());
        assert!(Role::Admin.can_manage());
        assert!(Role::Owner.can_manage());
        assert!(!Role::Cashier.can_manage());
        assert_eq!(serde_json::to_string(&Role::Cashier).unwrap(), "\"cashier\"");
    }

    #[test]
    fn test_product_margin_and_low_stock() {
        let now = Utc::now();
        let product = Product {
            id: "p1".into(),
            shop_id: "s1".into(),
            name: "Tea".into(),
            barcode: None,
            category: None,
            bought_price: 80,
            sale_price: 120,
            stock: 5,
            low_stock_threshold: 5,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(product.unit_margin().cents(), 40);
        assert!(product.is_low_stock());
    }

    #[test]
    fn test_page_request_clamps() {
        let req = PageRequest::new(0, 10_000);
        assert_eq!(req.page(), 1);
        assert_eq!(req.limit(), MAX_PAGE_SIZE);
        assert_eq!(req.offset(), 0);

        let req = PageRequest::new(3, 20);
        assert_eq!(req.offset(), 40);

        let default: PageRequest = serde_json::from_str("{}").unwrap();
        assert_eq!(default, PageRequest::default());
    }

    #[test]
    fn test_date_range_resolve() {
        let today = day("2026-10-18");

        let range = DateRange::resolve(None, None, today).unwrap();
        assert_eq!(range.from, day("2026-09-19"));
        assert_eq!(range.to, today);

        let range = DateRange::resolve(Some(day("2026-10-01")), Some(day("2026-10-01")), today).unwrap();
        assert_eq!(range.bounds(), ("2026-10-01".to_string(), "2026-10-01".to_string()));

        assert!(DateRange::resolve(Some(day("2026-10-02")), Some(day("2026-10-01")), today).is_err());
        assert!(DateRange::resolve(Some(day("2024-01-01")), None, today).is_err());
    }

    #[test]
    fn test_invoice_with_items_flattens() {
        let invoice = Invoice {
            id: "i1".into(),
            shop_id: "s1".into(),
            invoice_number: "INV-20261018-000001".into(),
            cashier_id: "u1".into(),
            payment_method: PaymentMethod::Cash,
            customer_name: None,
            customer_phone: None,
            total: 100,
            profit: 20,
            item_count: 1,
            debt_id: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(InvoiceWithItems { invoice, items: vec![] }).unwrap();
        assert_eq!(json["invoice_number"], "INV-20261018-000001");
        assert_eq!(json["payment_method"], "cash");
        assert!(json["items"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_debt_overdue() {
        let now = Utc::now();
        let mut debt = Debt {
            id: "d1".into(),
            shop_id: "s1".into(),
            customer_name: "Aibek".into(),
            customer_phone: "+996555123456".into(),
            amount: 5000,
            note: None,
            due_date: day("2026-10-10"),
            status: DebtStatus::Pending,
            invoice_id: None,
            reminder_count: 0,
            last_reminded_at: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        assert!(debt.is_overdue(day("2026-10-11")));
        assert!(!debt.is_overdue(day("2026-10-10")));

        debt.status = DebtStatus::Paid;
        assert!(!debt.is_overdue(day("2026-10-11")));
    }
}
