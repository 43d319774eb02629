//! # Invoice Module
//!
//! Pure checkout math: what a cart costs, what it earns, and what the
//! resulting invoice is called. Stock checks and persistence live in
//! kassa-db; this module never sees a database.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  CheckoutRequest { lines: [(cola, 2), (bread, 1)], payment: cash }     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validated()          cart size, quantities, duplicates, debt fields   │
//! │       │                                                                 │
//! │       ▼   (kassa-db, inside one transaction)                            │
//! │  price_line(product, qty) for each line                                │
//! │       │   line_total  = sale_price × qty                                │
//! │       │   line_profit = (sale_price − bought_price) × qty               │
//! │       ▼                                                                 │
//! │  InvoiceTotals::from_lines  → total, profit, item_count                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  format_invoice_number(today, seq) → INV-20261018-000042               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{PaymentMethod, Product};
use crate::validation::{
    normalize_phone, validate_cart_size, validate_customer_name, validate_quantity,
    ValidationResult,
};

// =============================================================================
// Checkout Request
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutLine {
    pub product_id: String,
    pub quantity: i64,
}

/// Body of `POST /api/invoices`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutRequest {
    #[serde(alias = "items")]
    pub lines: Vec<CheckoutLine>,
    pub payment_method: PaymentMethod,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,

    /// Required for `Debt` payments.
    #[ts(as = "Option<String>")]
    pub due_date: Option<NaiveDate>,

    /// Stored on the debt for `Debt` payments.
    pub note: Option<String>,
}

impl CheckoutRequest {
    /// Checks the cart and payment details, normalizing customer fields.
    ///
    /// ## Rules
    /// - 1..=`MAX_INVOICE_ITEMS` lines, each product once
    /// - every quantity in 1..=`MAX_ITEM_QUANTITY`
    /// - `Debt` payments need customer name, phone and due date
    pub fn validated(self) -> ValidationResult<Self> {
        validate_cart_size(self.lines.iter().map(|l| l.product_id.as_str()))?;
        for line in &self.lines {
            if line.product_id.trim().is_empty() {
                return Err(ValidationError::required("product_id"));
            }
            validate_quantity(line.quantity)?;
        }

        let customer_name = self
            .customer_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let customer_phone = self
            .customer_phone
            .filter(|p| !p.trim().is_empty())
            .map(|p| normalize_phone(&p))
            .transpose()?;

        if let Some(name) = &customer_name {
            validate_customer_name(name)?;
        }

        if self.payment_method == PaymentMethod::Debt {
            if customer_name.is_none() {
                return Err(ValidationError::required("customer_name"));
            }
            if customer_phone.is_none() {
                return Err(ValidationError::required("customer_phone"));
            }
            if self.due_date.is_none() {
                return Err(ValidationError::required("due_date"));
            }
        }

        Ok(CheckoutRequest {
            customer_name,
            customer_phone,
            note: self.note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            ..self
        })
    }
}

// =============================================================================
// Pricing
// =============================================================================

/// A cart line with product data frozen at the moment of sale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub product_id: String,
    pub name: String,
    pub barcode: Option<String>,
    pub quantity: i64,
    pub unit_price: Money,
    pub unit_cost: Money,
    pub line_total: Money,
    pub line_profit: Money,
}

/// Prices one line from the current product row.
///
/// Arithmetic is checked: a line that does not fit in `i64` cents is a
/// validation error, which rolls the checkout back.
///
/// ## Example
/// ```rust,ignore
/// // sale 1.20, bought 0.80, qty 3
/// let line = price_line(&tea, 3)?;
/// assert_eq!(line.line_total.cents(), 360);
/// assert_eq!(line.line_profit.cents(), 120);
/// ```
pub fn price_line(product: &Product, quantity: i64) -> CoreResult<PricedLine> {
    let unit_price = product.sale_price();
    let unit_cost = product.bought_price();

    let line_total = unit_price
        .checked_multiply(quantity)
        .ok_or_else(|| out_of_range("line_total"))?;
    let line_profit = unit_price
        .checked_sub(unit_cost)
        .and_then(|margin| margin.checked_multiply(quantity))
        .ok_or_else(|| out_of_range("line_profit"))?;

    Ok(PricedLine {
        product_id: product.id.clone(),
        name: product.name.clone(),
        barcode: product.barcode.clone(),
        quantity,
        unit_price,
        unit_cost,
        line_total,
        line_profit,
    })
}

fn out_of_range(field: &str) -> CoreError {
    ValidationError::invalid(field, "exceeds the largest supported amount").into()
}

/// Invoice-level sums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvoiceTotals {
    pub total: Money,
    pub profit: Money,
    pub item_count: i64,
}

impl InvoiceTotals {
    pub fn from_lines(lines: &[PricedLine]) -> CoreResult<Self> {
        lines.iter().try_fold(InvoiceTotals::default(), |acc, line| {
            Ok(InvoiceTotals {
                total: acc
                    .total
                    .checked_add(line.line_total)
                    .ok_or_else(|| out_of_range("total"))?,
                profit: acc
                    .profit
                    .checked_add(line.line_profit)
                    .ok_or_else(|| out_of_range("profit"))?,
                item_count: acc
                    .item_count
                    .checked_add(line.quantity)
                    .ok_or_else(|| out_of_range("item_count"))?,
            })
        })
    }
}

/// Formats the human-readable invoice number.
///
/// The sequence is per shop and never resets.
///
/// ```rust
/// use chrono::NaiveDate;
/// use kassa_core::invoice::format_invoice_number;
///
/// let date = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
/// assert_eq!(format_invoice_number(date, 42), "INV-20261018-000042");
/// ```
pub fn format_invoice_number(date: NaiveDate, seq: i64) -> String {
    format!("INV-{}-{:06}", date.format("%Y%m%d"), seq)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn product(id: &str, bought: i64, sale: i64) -> Product {
        let now = Utc::now();
        Product {
            id: id.to_string(),
            shop_id: "shop-1".to_string(),
            name: format!("Product {}", id),
            barcode: Some(format!("BC-{}", id)),
            category: None,
            bought_price: bought,
            sale_price: sale,
            stock: 100,
            low_stock_threshold: 5,
            created_at: now,
            updated_at: now,
        }
    }

    fn line(id: &str, qty: i64) -> CheckoutLine {
        CheckoutLine {
            product_id: id.to_string(),
            quantity: qty,
        }
    }

    fn request(lines: Vec<CheckoutLine>, method: PaymentMethod) -> CheckoutRequest {
        CheckoutRequest {
            lines,
            payment_method: method,
            customer_name: None,
            customer_phone: None,
            due_date: None,
            note: None,
        }
    }

    #[test]
    fn test_price_line_freezes_product_data() {
        let tea = product("tea", 80, 120);
        let priced = price_line(&tea, 3).unwrap();

        assert_eq!(priced.name, "Product tea");
        assert_eq!(priced.barcode.as_deref(), Some("BC-tea"));
        assert_eq!(priced.unit_price.cents(), 120);
        assert_eq!(priced.unit_cost.cents(), 80);
        assert_eq!(priced.line_total.cents(), 360);
        assert_eq!(priced.line_profit.cents(), 120);
    }

    #[test]
    fn test_totals_sum_lines() {
        let lines = vec![
            price_line(&product("a", 100, 150), 2).unwrap(), // total 300, profit 100
            price_line(&product("b", 500, 450), 1).unwrap(), // total 450, profit -50
        ];
        let totals = InvoiceTotals::from_lines(&lines).unwrap();

        assert_eq!(totals.total.cents(), 750);
        assert_eq!(totals.profit.cents(), 50);
        assert_eq!(totals.item_count, 3);
    }

    #[test]
    fn test_overflowing_line_is_an_error() {
        // Stored rows are not re-validated at checkout.
        let err = price_line(&product("gold", 1, i64::MAX / 2), 3).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let err = price_line(&product("loss", i64::MAX, -1), 1).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let big = price_line(&product("a", 0, i64::MAX / 2), 1).unwrap();
        assert!(InvoiceTotals::from_lines(&[big.clone(), big.clone(), big]).is_err());
    }

    #[test]
    fn test_validated_rejects_empty_and_duplicate_carts() {
        assert!(request(vec![], PaymentMethod::Cash).validated().is_err());
        assert!(request(vec![line("a", 1), line("a", 2)], PaymentMethod::Cash)
            .validated()
            .is_err());
        assert!(request(vec![line("a", 0)], PaymentMethod::Cash)
            .validated()
            .is_err());
        assert!(request(vec![line("a", 1)], PaymentMethod::Cash)
            .validated()
            .is_ok());
    }

    #[test]
    fn test_debt_payment_requires_customer() {
        let mut req = request(vec![line("a", 1)], PaymentMethod::Debt);
        assert_eq!(
            req.clone().validated().unwrap_err(),
            ValidationError::required("customer_name")
        );

        req.customer_name = Some(" Aibek ".into());
        req.customer_phone = Some("0555 123 456".into());
        assert_eq!(
            req.clone().validated().unwrap_err(),
            ValidationError::required("due_date")
        );

        req.due_date = NaiveDate::from_ymd_opt(2026, 11, 1);
        let ok = req.validated().unwrap();
        assert_eq!(ok.customer_name.as_deref(), Some("Aibek"));
        assert_eq!(ok.customer_phone.as_deref(), Some("0555123456"));
    }

    #[test]
    fn test_request_accepts_items_alias() {
        let json = r#"{"items":[{"product_id":"a","quantity":2}],"payment_method":"bank"}"#;
        let req: CheckoutRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.lines, vec![line("a", 2)]);
        assert_eq!(req.payment_method, PaymentMethod::Bank);
    }

    #[test]
    fn test_invoice_number_format() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        assert_eq!(format_invoice_number(date, 1), "INV-20260105-000001");
        assert_eq!(format_invoice_number(date, 1_234_567), "INV-20260105-1234567");
    }
}
