//! # Validation Module
//!
//! Input validation for everything that crosses the HTTP boundary.
//!
//! ## Where Validation Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  JSON body                                                              │
//! │     │  serde: shape and types                                           │
//! │     ▼                                                                   │
//! │  THIS MODULE: business rules (lengths, ranges, phone format)           │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  SQLite: NOT NULL, UNIQUE(shop_id, barcode), CHECK(stock >= 0)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validators that clean up their input (`normalize_phone`,
//! `validate_search_query`) return the cleaned value; the rest return `()`.
//!
//! ## Usage
//! ```rust
//! use kassa_core::validation::{normalize_phone, validate_quantity};
//!
//! assert_eq!(normalize_phone("+996 (555) 12-34-56").unwrap(), "+996555123456");
//! assert!(validate_quantity(0).is_err());
//! ```

use std::collections::HashSet;

use crate::error::ValidationError;
use crate::{MAX_DEBT_CENTS, MAX_INVOICE_ITEMS, MAX_ITEM_QUANTITY, MAX_PRICE_CENTS, MAX_STOCK};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn too_long(field: &str, max: usize) -> ValidationError {
    ValidationError::TooLong {
        field: field.to_string(),
        max,
    }
}

/// Shared check for free-text names: trimmed, non-empty, bounded.
fn validate_text(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.chars().count() > max {
        return Err(too_long(field, max));
    }

    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a product name (1-120 characters after trimming).
pub fn validate_product_name(name: &str) -> ValidationResult<()> {
    validate_text("name", name, 120)
}

/// Validates a shop name (1-100 characters).
pub fn validate_shop_name(name: &str) -> ValidationResult<()> {
    validate_text("shop name", name, 100)
}

/// Validates a customer name on a debt or invoice (1-100 characters).
pub fn validate_customer_name(name: &str) -> ValidationResult<()> {
    validate_text("customer_name", name, 100)
}

/// Validates a product category label (1-60 characters).
pub fn validate_category(category: &str) -> ValidationResult<()> {
    validate_text("category", category, 60)
}

/// Validates a barcode.
///
/// ## Rules
/// - 1 to 64 characters
/// - Letters, digits, hyphens and underscores only (EAN-13, UPC-A and
///   shop-internal codes like `TEA-GREEN-50`)
///
/// ## Example
/// ```rust
/// use kassa_core::validation::validate_barcode;
///
/// assert!(validate_barcode("4870001234567").is_ok());
/// assert!(validate_barcode("has space").is_err());
/// ```
pub fn validate_barcode(barcode: &str) -> ValidationResult<()> {
    if barcode.is_empty() {
        return Err(ValidationError::required("barcode"));
    }

    if barcode.len() > 64 {
        return Err(too_long("barcode", 64));
    }

    if !barcode
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::invalid(
            "barcode",
            "must contain only letters, numbers, hyphens, and underscores",
        ));
    }

    Ok(())
}

/// Validates a login name: 3-32 characters of `a-z 0-9 . _ -`.
///
/// Usernames are stored lowercase, so uppercase input is rejected rather
/// than silently folded.
pub fn validate_username(username: &str) -> ValidationResult<()> {
    if username.len() < 3 {
        return Err(ValidationError::TooShort {
            field: "username".to_string(),
            min: 3,
        });
    }

    if username.len() > 32 {
        return Err(too_long("username", 32));
    }

    if !username
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
    {
        return Err(ValidationError::invalid(
            "username",
            "must contain only lowercase letters, digits, '.', '_' or '-'",
        ));
    }

    Ok(())
}

/// Validates a password: 8-128 characters.
pub fn validate_password(password: &str) -> ValidationResult<()> {
    let len = password.chars().count();

    if len < 8 {
        return Err(ValidationError::TooShort {
            field: "password".to_string(),
            min: 8,
        });
    }

    if len > 128 {
        return Err(too_long("password", 128));
    }

    Ok(())
}

/// Normalizes a phone number to `+<digits>` or `<digits>`.
///
/// ## Rules
/// - Spaces, dashes, dots and parentheses are stripped
/// - An optional single leading `+` is kept
/// - 7 to 15 digits remain (E.164 upper bound)
///
/// ## Example
/// ```rust
/// use kassa_core::validation::normalize_phone;
///
/// assert_eq!(normalize_phone("0555 12-34-56").unwrap(), "0555123456");
/// assert!(normalize_phone("12-34").is_err());
/// assert!(normalize_phone("+1 555 CALL NOW").is_err());
/// ```
pub fn normalize_phone(phone: &str) -> ValidationResult<String> {
    let phone = phone.trim();

    if phone.is_empty() {
        return Err(ValidationError::required("phone"));
    }

    let (plus, rest) = match phone.strip_prefix('+') {
        Some(rest) => ("+", rest),
        None => ("", phone),
    };

    let mut digits = String::with_capacity(rest.len());
    for c in rest.chars() {
        match c {
            '0'..='9' => digits.push(c),
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => {
                return Err(ValidationError::invalid(
                    "phone",
                    "may contain only digits, spaces, dashes and parentheses",
                ))
            }
        }
    }

    if !(7..=15).contains(&digits.len()) {
        return Err(ValidationError::invalid("phone", "must have 7 to 15 digits"));
    }

    Ok(format!("{}{}", plus, digits))
}

/// Validates an ISO 4217 currency code (`USD`, `KGS`, ...).
pub fn validate_currency(code: &str) -> ValidationResult<()> {
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
        return Err(ValidationError::invalid(
            "currency",
            "must be a 3-letter uppercase ISO code",
        ));
    }

    Ok(())
}

/// Validates an SMS sender name (1-11 alphanumeric characters).
///
/// Eleven characters is the carrier limit for alphanumeric sender IDs.
pub fn validate_sms_sender(sender: &str) -> ValidationResult<()> {
    if sender.is_empty() {
        return Err(ValidationError::required("sms_sender"));
    }

    if sender.len() > 11 {
        return Err(too_long("sms_sender", 11));
    }

    if !sender.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::invalid(
            "sms_sender",
            "must contain only letters and digits",
        ));
    }

    Ok(())
}

/// Validates a search query. Returns the trimmed query.
pub fn validate_search_query(query: &str) -> ValidationResult<String> {
    let query = query.trim();

    if query.chars().count() > 100 {
        return Err(too_long("query", 100));
    }

    Ok(query.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity: `1..=MAX_ITEM_QUANTITY`.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_ITEM_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price in cents. Zero is allowed (free samples).
///
/// ## Example
/// ```rust
/// use kassa_core::validation::validate_price;
///
/// assert!(validate_price("sale_price", 0).is_ok());
/// assert!(validate_price("sale_price", -1).is_err());
/// ```
pub fn validate_price(field: &str, cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }

    if cents > MAX_PRICE_CENTS {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_PRICE_CENTS,
        });
    }

    Ok(())
}

/// Validates a stock level or threshold: `0..=MAX_STOCK`.
pub fn validate_stock(field: &str, stock: i64) -> ValidationResult<()> {
    if stock < 0 {
        return Err(ValidationError::Negative {
            field: field.to_string(),
        });
    }

    if stock > MAX_STOCK {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_STOCK,
        });
    }

    Ok(())
}

/// Validates a signed stock change. Non-zero, and no bigger than the
/// largest stock level in either direction.
pub fn validate_stock_delta(delta: i64) -> ValidationResult<()> {
    if delta == 0 {
        return Err(ValidationError::invalid("delta", "must not be zero"));
    }

    if !(-MAX_STOCK..=MAX_STOCK).contains(&delta) {
        return Err(ValidationError::OutOfRange {
            field: "delta".to_string(),
            min: -MAX_STOCK,
            max: MAX_STOCK,
        });
    }

    Ok(())
}

/// Validates a debt amount: `1..=MAX_DEBT_CENTS`.
pub fn validate_amount(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    if cents > MAX_DEBT_CENTS {
        return Err(ValidationError::OutOfRange {
            field: "amount".to_string(),
            min: 1,
            max: MAX_DEBT_CENTS,
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates the product lines of a checkout.
///
/// ## Rules
/// - At least one line, at most `MAX_INVOICE_ITEMS`
/// - Each product appears on one line only (quantities are summed by the
///   cashier UI, so a repeat means a client bug)
pub fn validate_cart_size<'a, I>(product_ids: I) -> ValidationResult<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();

    for id in product_ids {
        if !seen.insert(id) {
            return Err(ValidationError::Duplicate {
                field: "product_id".to_string(),
                value: id.to_string(),
            });
        }
    }

    if seen.is_empty() {
        return Err(ValidationError::required("items"));
    }

    if seen.len() > MAX_INVOICE_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "items".to_string(),
            min: 1,
            max: MAX_INVOICE_ITEMS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_barcode() {
        assert!(validate_barcode("4870001234567").is_ok());
        assert!(validate_barcode("TEA-GREEN_50").is_ok());

        assert!(validate_barcode("").is_err());
        assert!(validate_barcode("has space").is_err());
        assert!(validate_barcode(&"1".repeat(65)).is_err());
    }

    #[test]
    fn test_validate_names() {
        assert!(validate_product_name("Coca-Cola 330ml").is_ok());
        assert!(validate_product_name("   ").is_err());
        assert!(validate_product_name(&"A".repeat(121)).is_err());

        assert!(validate_customer_name("Aibek").is_ok());
        assert!(validate_customer_name("").is_err());
    }

    #[test]
    fn test_validate_username() {
        assert!(validate_username("cashier.1").is_ok());
        assert!(validate_username("ab").is_err());
        assert!(validate_username("Admin").is_err());
        assert!(validate_username("with space").is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("correct horse").is_ok());
        assert_eq!(
            validate_password("short"),
            Err(ValidationError::TooShort {
                field: "password".to_string(),
                min: 8
            })
        );
    }

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+996 (555) 12-34-56").unwrap(), "+996555123456");
        assert_eq!(normalize_phone(" 0555.123.456 ").unwrap(), "0555123456");

        assert!(normalize_phone("").is_err());
        assert!(normalize_phone("123456").is_err());
        assert!(normalize_phone("1234567890123456").is_err());
        assert!(normalize_phone("++9965551234").is_err());
        assert!(normalize_phone("0555-abc-123").is_err());
    }

    #[test]
    fn test_validate_currency_and_sender() {
        assert!(validate_currency("KGS").is_ok());
        assert!(validate_currency("kgs").is_err());
        assert!(validate_currency("SOMS").is_err());

        assert!(validate_sms_sender("KassaShop").is_ok());
        assert!(validate_sms_sender("Kassa Shop").is_err());
        assert!(validate_sms_sender("ABCDEFGHIJKL").is_err());
    }

    #[test]
    fn test_numeric_validators() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(MAX_ITEM_QUANTITY).is_ok());
        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(MAX_ITEM_QUANTITY + 1).is_err());

        assert!(validate_price("bought_price", 0).is_ok());
        assert!(validate_price("bought_price", -5).is_err());
        assert!(validate_stock("stock", 0).is_ok());
        assert!(validate_stock("stock", -1).is_err());

        assert!(validate_amount(1).is_ok());
        assert!(validate_amount(0).is_err());
    }

    #[test]
    fn test_numeric_upper_bounds() {
        assert!(validate_price("sale_price", MAX_PRICE_CENTS).is_ok());
        assert!(matches!(
            validate_price("sale_price", MAX_PRICE_CENTS + 1),
            Err(ValidationError::OutOfRange { .. })
        ));
        assert!(validate_price("sale_price", i64::MAX / 2).is_err());

        assert!(validate_stock("stock", MAX_STOCK).is_ok());
        assert!(validate_stock("stock", MAX_STOCK + 1).is_err());
        assert!(validate_stock("stock", i64::MAX - 1).is_err());

        assert!(validate_stock_delta(-MAX_STOCK).is_ok());
        assert!(validate_stock_delta(MAX_STOCK + 1).is_err());
        assert!(validate_stock_delta(i64::MIN).is_err());
        assert!(validate_stock_delta(0).is_err());

        assert!(validate_amount(MAX_DEBT_CENTS).is_ok());
        assert!(validate_amount(MAX_DEBT_CENTS + 1).is_err());
    }

    #[test]
    fn test_validate_cart_size() {
        assert!(validate_cart_size(["a", "b"]).is_ok());
        assert_eq!(
            validate_cart_size(Vec::<&str>::new()),
            Err(ValidationError::required("items"))
        );
        assert!(matches!(
            validate_cart_size(["a", "b", "a"]),
            Err(ValidationError::Duplicate { .. })
        ));

        let ids: Vec<String> = (0..=MAX_INVOICE_ITEMS).map(|i| i.to_string()).collect();
        assert!(validate_cart_size(ids.iter().map(String::as_str)).is_err());
    }
}
