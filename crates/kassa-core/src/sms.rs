//! # SMS Module
//!
//! Segment counting, pricing and reminder text. Sending lives in the API
//! crate; this module only decides what a message is and what it costs.
//!
//! ## Segments
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Encoding   Single SMS    Per segment when split                       │
//! │  ────────   ──────────    ──────────────────────                       │
//! │  GSM-7      160 chars     153 chars  (7 chars of UDH header)           │
//! │  UCS-2       70 chars      67 chars                                    │
//! │                                                                         │
//! │  One character outside the GSM-7 alphabet (ё, ң, emoji) switches the   │
//! │  whole message to UCS-2. GSM-7 extension chars ({ } [ ] ~ \ | ^ €)     │
//! │  take two septets.                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One credit of `Shop::sms_balance` buys one segment.

use chrono::NaiveDate;

use crate::error::ValidationError;
use crate::money::Money;
use crate::validation::ValidationResult;

/// Used when a shop has not customised its reminder text.
pub const DEFAULT_REMINDER_TEMPLATE: &str =
    "Hello {customer}, a reminder from {shop}: your balance of {amount} is due on {due_date}. Thank you!";

/// Placeholders a reminder template may use.
pub const TEMPLATE_PLACEHOLDERS: [&str; 4] = ["customer", "amount", "due_date", "shop"];

/// Upper bound for a rendered message (3 GSM-7 segments).
pub const MAX_MESSAGE_CHARS: usize = 459;

const GSM7_BASIC: &str = "@£$¥èéùìòÇ\nØø\rÅåΔ_ΦΓΛΩΠΨΣΘΞÆæßÉ !\"#¤%&'()*+,-./0123456789:;<=>?\
¡ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÑÜ§¿abcdefghijklmnopqrstuvwxyzäöñüà";

const GSM7_EXTENSION: &str = "\u{000C}^{}\\[~]|€";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Gsm7,
    Ucs2,
}

impl Encoding {
    /// Picks the cheapest encoding that can carry `text`.
    pub fn detect(text: &str) -> Self {
        if text
            .chars()
            .all(|c| GSM7_BASIC.contains(c) || GSM7_EXTENSION.contains(c))
        {
            Encoding::Gsm7
        } else {
            Encoding::Ucs2
        }
    }

    fn limits(&self) -> (usize, usize) {
        match self {
            Encoding::Gsm7 => (160, 153),
            Encoding::Ucs2 => (70, 67),
        }
    }
}

/// Length in encoding units: septets for GSM-7, UTF-16 code units for UCS-2.
fn encoded_len(text: &str, encoding: Encoding) -> usize {
    match encoding {
        Encoding::Gsm7 => text
            .chars()
            .map(|c| if GSM7_EXTENSION.contains(c) { 2 } else { 1 })
            .sum(),
        Encoding::Ucs2 => text.encode_utf16().count(),
    }
}

/// Number of segments the message is billed as. Zero for empty text.
///
/// ## Example
/// ```rust
/// use kassa_core::sms::segment_count;
///
/// assert_eq!(segment_count(&"a".repeat(160)), 1);
/// assert_eq!(segment_count(&"a".repeat(161)), 2);
/// assert_eq!(segment_count("Қарыз"), 1);
/// ```
pub fn segment_count(text: &str) -> i64 {
    let encoding = Encoding::detect(text);
    let len = encoded_len(text, encoding);
    let (single, multi) = encoding.limits();

    let segments = match len {
        0 => 0,
        n if n <= single => 1,
        n => n.div_ceil(multi),
    };
    segments as i64
}

/// Credits charged for sending `text`.
pub fn cost_for(text: &str) -> i64 {
    segment_count(text)
}

/// Values substituted into a reminder template.
#[derive(Debug, Clone)]
pub struct ReminderContext<'a> {
    pub customer: &'a str,
    pub amount: Money,
    pub currency: &'a str,
    pub due_date: NaiveDate,
    pub shop: &'a str,
}

/// Renders a reminder: `{customer}`, `{amount}`, `{due_date}`, `{shop}`.
///
/// ```rust
/// use chrono::NaiveDate;
/// use kassa_core::money::Money;
/// use kassa_core::sms::{render_reminder, ReminderContext};
///
/// let ctx = ReminderContext {
///     customer: "Aibek",
///     amount: Money::from_cents(150_000),
///     currency: "KGS",
///     due_date: NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(),
///     shop: "Corner Shop",
/// };
/// assert_eq!(
///     render_reminder("{customer}: {amount} by {due_date}", &ctx),
///     "Aibek: 1500.00 KGS by 2026-11-01"
/// );
/// ```
pub fn render_reminder(template: &str, ctx: &ReminderContext<'_>) -> String {
    template
        .replace("{customer}", ctx.customer)
        .replace("{amount}", &ctx.amount.format_with(ctx.currency))
        .replace("{due_date}", &ctx.due_date.format("%Y-%m-%d").to_string())
        .replace("{shop}", ctx.shop)
}

/// Checks a shop-supplied template: non-empty, bounded, known placeholders only.
pub fn validate_template(template: &str) -> ValidationResult<()> {
    if template.trim().is_empty() {
        return Err(ValidationError::required("reminder_template"));
    }

    if template.chars().count() > MAX_MESSAGE_CHARS {
        return Err(ValidationError::TooLong {
            field: "reminder_template".to_string(),
            max: MAX_MESSAGE_CHARS,
        });
    }

    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| {
            ValidationError::invalid("reminder_template", "unclosed '{' placeholder")
        })?;
        let name = &after[..end];
        if !TEMPLATE_PLACEHOLDERS.contains(&name) {
            return Err(ValidationError::invalid(
                "reminder_template",
                format!("unknown placeholder {{{}}}", name),
            ));
        }
        rest = &after[end + 1..];
    }

    Ok(())
}
