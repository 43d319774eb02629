//! # Input Types
//!
//! Request bodies accepted by the API. Each one has a `validated` method that
//! checks business rules and returns the cleaned value (trimmed names,
//! normalized phones), so repositories only ever see validated input.
//!
//! Update types use `Option` fields: `None` leaves the column unchanged.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::ValidationError;
use crate::types::{Role, ShopSettings};
use crate::validation::{
    normalize_phone, validate_amount, validate_barcode, validate_category, validate_currency,
    validate_customer_name, validate_password, validate_price, validate_product_name,
    validate_shop_name, validate_sms_sender, validate_stock, validate_stock_delta, validate_username,
    ValidationResult,
};
use crate::MAX_SMS_CREDIT;

fn trimmed(value: String) -> String {
    value.trim().to_string()
}

/// Trims an optional text field; blank becomes `None`.
fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_note(note: &Option<String>) -> ValidationResult<()> {
    match note {
        Some(n) if n.chars().count() > 500 => Err(ValidationError::TooLong {
            field: "note".to_string(),
            max: 500,
        }),
        _ => Ok(()),
    }
}

// =============================================================================
// Shops
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewShop {
    pub name: String,
    pub owner_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
}

impl NewShop {
    pub fn validated(self) -> ValidationResult<Self> {
        validate_shop_name(&self.name)?;
        validate_customer_name(&self.owner_name).map_err(|_| ValidationError::required("owner_name"))?;

        Ok(NewShop {
            name: trimmed(self.name),
            owner_name: trimmed(self.owner_name),
            phone: optional_text(self.phone).map(|p| normalize_phone(&p)).transpose()?,
            address: optional_text(self.address),
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ShopUpdate {
    pub name: Option<String>,
    pub owner_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub is_active: Option<bool>,
}

impl ShopUpdate {
    pub fn validated(self) -> ValidationResult<Self> {
        if let Some(name) = &self.name {
            validate_shop_name(name)?;
        }
        if let Some(owner) = &self.owner_name {
            validate_customer_name(owner).map_err(|_| ValidationError::required("owner_name"))?;
        }

        Ok(ShopUpdate {
            name: self.name.map(trimmed),
            owner_name: self.owner_name.map(trimmed),
            phone: optional_text(self.phone).map(|p| normalize_phone(&p)).transpose()?,
            address: optional_text(self.address),
            is_active: self.is_active,
        })
    }
}

/// Body of `POST /api/shops/{id}/sms-credit`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SmsCredit {
    pub credits: i64,
}

impl SmsCredit {
    pub fn validated(self) -> ValidationResult<Self> {
        if self.credits <= 0 {
            return Err(ValidationError::MustBePositive {
                field: "credits".to_string(),
            });
        }
        if self.credits > MAX_SMS_CREDIT {
            return Err(ValidationError::OutOfRange {
                field: "credits".to_string(),
                min: 1,
                max: MAX_SMS_CREDIT,
            });
        }
        Ok(self)
    }
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewUser {
    /// Required unless `role` is `Admin`. Owners creating staff may omit
    /// it; their own shop is used.
    pub shop_id: Option<String>,
    pub username: String,
    pub display_name: String,
    pub password: String,
    pub role: Role,
}

impl NewUser {
    pub fn validated(self) -> ValidationResult<Self> {
        let username = self.username.trim().to_string();
        validate_username(&username)?;
        validate_customer_name(&self.display_name)
            .map_err(|_| ValidationError::required("display_name"))?;
        validate_password(&self.password)?;

        if self.role.is_admin() && self.shop_id.is_some() {
            return Err(ValidationError::invalid("shop_id", "admins are not bound to a shop"));
        }

        Ok(NewUser {
            username,
            display_name: trimmed(self.display_name),
            ..self
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UserUpdate {
    pub display_name: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
    pub password: Option<String>,
}

impl UserUpdate {
    pub fn validated(self) -> ValidationResult<Self> {
        if let Some(name) = &self.display_name {
            validate_customer_name(name).map_err(|_| ValidationError::required("display_name"))?;
        }
        if let Some(password) = &self.password {
            validate_password(password)?;
        }

        Ok(UserUpdate {
            display_name: self.display_name.map(trimmed),
            ..self
        })
    }
}

/// Body of `POST /api/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

// =============================================================================
// Products
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewProduct {
    pub name: String,
    pub barcode: Option<String>,
    pub category: Option<String>,
    pub bought_price: i64,
    pub sale_price: i64,
    #[serde(default)]
    pub stock: i64,

    /// Falls back to the shop's `default_low_stock_threshold`.
    pub low_stock_threshold: Option<i64>,
}

impl NewProduct {
    pub fn validated(self) -> ValidationResult<Self> {
        validate_product_name(&self.name)?;
        validate_price("bought_price", self.bought_price)?;
        validate_price("sale_price", self.sale_price)?;
        validate_stock("stock", self.stock)?;
        if let Some(threshold) = self.low_stock_threshold {
            validate_stock("low_stock_threshold", threshold)?;
        }

        let barcode = optional_text(self.barcode);
        if let Some(code) = &barcode {
            validate_barcode(code)?;
        }
        let category = optional_text(self.category);
        if let Some(c) = &category {
            validate_category(c)?;
        }

        Ok(NewProduct {
            name: trimmed(self.name),
            barcode,
            category,
            ..self
        })
    }
}

/// Partial product update.
///
/// `barcode` and `category` accept an empty string to clear the value.
#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub barcode: Option<String>,
    pub category: Option<String>,
    pub bought_price: Option<i64>,
    pub sale_price: Option<i64>,
    pub low_stock_threshold: Option<i64>,
}

impl ProductUpdate {
    pub fn validated(self) -> ValidationResult<Self> {
        if let Some(name) = &self.name {
            validate_product_name(name)?;
        }
        if let Some(price) = self.bought_price {
            validate_price("bought_price", price)?;
        }
        if let Some(price) = self.sale_price {
            validate_price("sale_price", price)?;
        }
        if let Some(threshold) = self.low_stock_threshold {
            validate_stock("low_stock_threshold", threshold)?;
        }

        let barcode = self.barcode.map(trimmed);
        if let Some(code) = barcode.as_deref().filter(|c| !c.is_empty()) {
            validate_barcode(code)?;
        }
        let category = self.category.map(trimmed);
        if let Some(c) = category.as_deref().filter(|c| !c.is_empty()) {
            validate_category(c)?;
        }

        Ok(ProductUpdate {
            name: self.name.map(trimmed),
            barcode,
            category,
            ..self
        })
    }
}

/// Body of `POST /api/products/{id}/stock`: a signed delta (restock or
/// write-off).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockAdjustment {
    pub delta: i64,
    pub reason: Option<String>,
}

impl StockAdjustment {
    pub fn validated(self) -> ValidationResult<Self> {
        validate_stock_delta(self.delta)?;
        validate_note(&self.reason)?;
        Ok(self)
    }
}

/// One row of a bulk import. Rows are matched to existing products by
/// barcode; unmatched rows create new products.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductImportRow {
    pub name: String,
    pub barcode: String,
    pub category: Option<String>,
    pub bought_price: i64,
    pub sale_price: i64,
    #[serde(default)]
    pub stock: i64,
}

impl ProductImportRow {
    pub fn validated(self) -> ValidationResult<Self> {
        let barcode = trimmed(self.barcode);
        validate_barcode(&barcode)?;
        validate_product_name(&self.name)?;
        validate_price("bought_price", self.bought_price)?;
        validate_price("sale_price", self.sale_price)?;
        validate_stock("stock", self.stock)?;

        Ok(ProductImportRow {
            name: trimmed(self.name),
            barcode,
            category: optional_text(self.category),
            ..self
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ImportSummary {
    pub created: i64,
    pub updated: i64,
}

// =============================================================================
// Debts
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewDebt {
    pub customer_name: String,
    pub customer_phone: String,
    pub amount: i64,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub due_date: NaiveDate,
}

impl NewDebt {
    pub fn validated(self) -> ValidationResult<Self> {
        validate_customer_name(&self.customer_name)?;
        validate_amount(self.amount)?;
        let note = optional_text(self.note);
        validate_note(&note)?;

        Ok(NewDebt {
            customer_name: trimmed(self.customer_name),
            customer_phone: normalize_phone(&self.customer_phone)?,
            note,
            ..self
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DebtUpdate {
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub amount: Option<i64>,
    pub note: Option<String>,
    #[ts(as = "Option<String>")]
    pub due_date: Option<NaiveDate>,
}

impl DebtUpdate {
    pub fn validated(self) -> ValidationResult<Self> {
        if let Some(name) = &self.customer_name {
            validate_customer_name(name)?;
        }
        if let Some(amount) = self.amount {
            validate_amount(amount)?;
        }
        validate_note(&self.note)?;

        Ok(DebtUpdate {
            customer_name: self.customer_name.map(trimmed),
            customer_phone: self
                .customer_phone
                .map(|p| normalize_phone(&p))
                .transpose()?,
            ..self
        })
    }
}

// =============================================================================
// Settings
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SettingsUpdate {
    pub currency: Option<String>,
    pub sms_enabled: Option<bool>,
    pub sms_sender: Option<String>,
    pub reminders_enabled: Option<bool>,
    pub reminder_days_before: Option<i64>,
    pub reminder_template: Option<String>,
    pub default_low_stock_threshold: Option<i64>,
}

impl SettingsUpdate {
    pub fn validated(self) -> ValidationResult<Self> {
        if let Some(currency) = &self.currency {
            validate_currency(currency)?;
        }
        if let Some(sender) = &self.sms_sender {
            validate_sms_sender(sender)?;
        }
        if let Some(days) = self.reminder_days_before {
            if !(0..=30).contains(&days) {
                return Err(ValidationError::OutOfRange {
                    field: "reminder_days_before".to_string(),
                    min: 0,
                    max: 30,
                });
            }
        }
        if let Some(template) = &self.reminder_template {
            crate::sms::validate_template(template)?;
        }
        if let Some(threshold) = self.default_low_stock_threshold {
            validate_stock("default_low_stock_threshold", threshold)?;
        }
        Ok(self)
    }

    /// Applies the set fields on top of `current`.
    pub fn apply_to(self, mut current: ShopSettings) -> ShopSettings {
        if let Some(v) = self.currency {
            current.currency = v;
        }
        if let Some(v) = self.sms_enabled {
            current.sms_enabled = v;
        }
        if let Some(v) = self.sms_sender {
            current.sms_sender = v;
        }
        if let Some(v) = self.reminders_enabled {
            current.reminders_enabled = v;
        }
        if let Some(v) = self.reminder_days_before {
            current.reminder_days_before = v;
        }
        if let Some(v) = self.reminder_template {
            current.reminder_template = v;
        }
        if let Some(v) = self.default_low_stock_threshold {
            current.default_low_stock_threshold = v;
        }
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_new_debt_normalizes_phone_and_trims() {
        let debt = NewDebt {
            customer_name: "  Aibek ".into(),
            customer_phone: "+996 555 12-34-56".into(),
            amount: 2500,
            note: Some("   ".into()),
            due_date: NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(),
        }
        .validated()
        .unwrap();

        assert_eq!(debt.customer_name, "Aibek");
        assert_eq!(debt.customer_phone, "+996555123456");
        assert_eq!(debt.note, None);
    }

    #[test]
    fn test_new_debt_rejects_zero_amount() {
        let result = NewDebt {
            customer_name: "Aibek".into(),
            customer_phone: "0555123456".into(),
            amount: 0,
            note: None,
            due_date: NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(),
        }
        .validated();
        assert!(result.is_err());
    }

    #[test]
    fn test_new_product_blank_barcode_becomes_none() {
        let product = NewProduct {
            name: "Bread".into(),
            barcode: Some("".into()),
            category: None,
            bought_price: 30,
            sale_price: 45,
            stock: 10,
            low_stock_threshold: None,
        }
        .validated()
        .unwrap();
        assert_eq!(product.barcode, None);

        let bad = NewProduct {
            name: "Bread".into(),
            barcode: None,
            category: None,
            bought_price: 30,
            sale_price: -1,
            stock: 10,
            low_stock_threshold: None,
        }
        .validated();
        assert!(bad.is_err());
    }

    #[test]
    fn test_new_user_admin_cannot_have_shop() {
        let user = NewUser {
            shop_id: Some("s1".into()),
            username: "root".into(),
            display_name: "Root".into(),
            password: "password123".into(),
            role: Role::Admin,
        };
        assert!(user.validated().is_err());
    }

    #[test]
    fn test_stock_adjustment_rejects_zero() {
        let adj = StockAdjustment {
            delta: 0,
            reason: None,
        };
        assert!(adj.validated().is_err());

        let adj = StockAdjustment {
            delta: i64::MIN,
            reason: None,
        };
        assert!(adj.validated().is_err());
    }

    #[test]
    fn test_huge_values_are_rejected() {
        let product = NewProduct {
            name: "Gold bar".into(),
            barcode: None,
            category: None,
            bought_price: 1,
            sale_price: i64::MAX / 2,
            stock: 1,
            low_stock_threshold: None,
        };
        assert!(matches!(
            product.validated(),
            Err(ValidationError::OutOfRange { .. })
        ));

        assert!(SmsCredit { credits: MAX_SMS_CREDIT }.validated().is_ok());
        assert!(SmsCredit { credits: MAX_SMS_CREDIT + 1 }.validated().is_err());
    }

    #[test]
    fn test_settings_update_applies_only_set_fields() {
        let current = ShopSettings::defaults("s1", Utc::now());
        let update = SettingsUpdate {
            currency: Some("KGS".into()),
            reminders_enabled: Some(true),
            ..Default::default()
        }
        .validated()
        .unwrap();

        let next = update.apply_to(current.clone());
        assert_eq!(next.currency, "KGS");
        assert!(next.reminders_enabled);
        assert_eq!(next.sms_sender, current.sms_sender);
        assert_eq!(next.reminder_template, current.reminder_template);
    }

    #[test]
    fn test_settings_update_rejects_bad_values() {
        let update = SettingsUpdate {
            reminder_days_before: Some(90),
            ..Default::default()
        };
        assert!(update.validated().is_err());

        let update = SettingsUpdate {
            sms_sender: Some("Way Too Long Sender".into()),
            ..Default::default()
        };
        assert!(update.validated().is_err());
    }
}
