//! # SMS Service
//!
//! Every send goes through one debit flow so a shop is never charged for a
//! message that did not leave, and every attempt leaves a log row.
//!
//! ## Send Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  send(shop, debt?, phone, text)                                         │
//! │     │                                                                   │
//! │     ├── shop inactive / SMS off / bad phone ──► log Blocked, error      │
//! │     │                                                                   │
//! │     ├── cost = segments(text)                                           │
//! │     ├── reserve_sms(shop, cost)                                         │
//! │     │     UPDATE shops SET sms_balance = sms_balance - cost             │
//! │     │     WHERE id = ? AND sms_balance >= cost                          │
//! │     │     0 rows ─────────────────────────────► log Blocked, 402        │
//! │     │                                                                   │
//! │     ├── provider.send(..)                                               │
//! │     │     Err ──► refund_sms(shop, cost) ─────► log Failed, 502         │
//! │     │     Ok  ────────────────────────────────► log Sent                │
//! │     │                                                                   │
//! │     └── invalidate Sms + Shops cache (every outcome)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use kassa_core::cache::Resource;
use kassa_core::sms::{cost_for, render_reminder, segment_count, ReminderContext, MAX_MESSAGE_CHARS};
use kassa_core::validation::normalize_phone;
use kassa_core::{CoreError, Debt, DebtStatus, Scope, SmsLog, SmsStatus, ValidationError};
use kassa_db::{Database, DbError, NewSmsLog};

use super::provider::{ProviderError, SmsProvider};
use crate::cache::ResponseCache;
use crate::error::{ApiError, ErrorCode};

#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    #[error("SMS unavailable: {0}")]
    Disabled(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("Insufficient SMS balance: cost {cost}, balance {balance}")]
    InsufficientBalance { cost: i64, balance: i64 },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl From<SmsError> for ApiError {
    fn from(err: SmsError) -> Self {
        match err {
            SmsError::Disabled(reason) => ApiError::forbidden(reason),
            SmsError::Invalid(e) => ApiError::from(e),
            SmsError::InsufficientBalance { cost, balance } => {
                ApiError::from(CoreError::InsufficientSmsBalance { cost, balance })
            }
            SmsError::Provider(e) => ApiError::new(ErrorCode::SmsFailed, e.to_string()),
            SmsError::Db(e) => ApiError::from(e),
        }
    }
}

/// A reminder that went out, with the debt as it is after recording it.
#[derive(Debug, Clone, Serialize)]
pub struct SentReminder {
    pub log: SmsLog,
    pub debt: Debt,
}

pub struct SmsService {
    db: Database,
    provider: Arc<dyn SmsProvider>,
    cache: Arc<ResponseCache>,
    default_sender: String,
}

impl SmsService {
    pub fn new(
        db: Database,
        provider: Arc<dyn SmsProvider>,
        cache: Arc<ResponseCache>,
        default_sender: impl Into<String>,
    ) -> Self {
        SmsService {
            db,
            provider,
            cache,
            default_sender: default_sender.into(),
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Sends `message` to `phone` on behalf of `shop_id`.
    pub async fn send(
        &self,
        shop_id: &str,
        debt_id: Option<&str>,
        phone: &str,
        message: &str,
    ) -> Result<SmsLog, SmsError> {
        let result = self.deliver(shop_id, debt_id, phone, message).await;
        self.cache.invalidate(shop_id, Resource::Sms).await;
        result
    }

    async fn deliver(
        &self,
        shop_id: &str,
        debt_id: Option<&str>,
        phone: &str,
        message: &str,
    ) -> Result<SmsLog, SmsError> {
        let shop = self.db.shops().get(shop_id).await?;
        let settings = self.db.settings().get_or_default(shop_id).await?;

        let entry = |phone: &str, status: SmsStatus| NewSmsLog {
            shop_id: shop_id.to_string(),
            debt_id: debt_id.map(str::to_string),
            phone: phone.to_string(),
            message: message.to_string(),
            segments: segment_count(message),
            cost: 0,
            status,
            provider_message_id: None,
            error: None,
        };

        let blocked = if !shop.is_active {
            Some(SmsError::Disabled("shop is inactive".to_string()))
        } else if !settings.sms_enabled {
            Some(SmsError::Disabled("SMS is disabled for this shop".to_string()))
        } else if message.trim().is_empty() {
            Some(SmsError::Invalid(ValidationError::required("message")))
        } else if message.chars().count() > MAX_MESSAGE_CHARS {
            Some(SmsError::Invalid(ValidationError::TooLong {
                field: "message".to_string(),
                max: MAX_MESSAGE_CHARS,
            }))
        } else {
            None
        };

        let normalized = match (blocked, normalize_phone(phone)) {
            (Some(err), _) => return Err(self.block(entry(phone, SmsStatus::Blocked), err).await),
            (None, Err(e)) => {
                return Err(self
                    .block(entry(phone, SmsStatus::Blocked), SmsError::Invalid(e))
                    .await)
            }
            (None, Ok(p)) => p,
        };

        let cost = cost_for(message);
        if !self.db.shops().reserve_sms(shop_id, cost).await? {
            let balance = self.db.shops().sms_balance(shop_id).await?;
            return Err(self
                .block(
                    entry(&normalized, SmsStatus::Blocked),
                    SmsError::InsufficientBalance { cost, balance },
                )
                .await);
        }

        let sender = if settings.sms_sender.trim().is_empty() {
            self.default_sender.as_str()
        } else {
            settings.sms_sender.as_str()
        };

        match self.provider.send(&normalized, sender, message).await {
            Ok(receipt) => {
                let sent = NewSmsLog {
                    cost,
                    provider_message_id: receipt.message_id,
                    ..entry(&normalized, SmsStatus::Sent)
                };

                // The provider accepted and the credit is spent; a missing
                // log row must not turn that into a failure.
                let log = match self.db.sms().log(sent.clone()).await {
                    Ok(log) => log,
                    Err(e) => {
                        error!(
                            shop_id = %shop_id,
                            cost,
                            provider_message_id = ?sent.provider_message_id,
                            error = %e,
                            "SMS sent but not logged"
                        );
                        unsaved_log(sent)
                    }
                };

                info!(shop_id = %shop_id, sms_id = %log.id, cost, "SMS sent");
                Ok(log)
            }
            Err(e) => {
                if let Err(refund) = self.db.shops().refund_sms(shop_id, cost).await {
                    error!(shop_id = %shop_id, cost, error = %refund, "SMS refund failed");
                }

                warn!(shop_id = %shop_id, provider = self.provider.name(), error = %e, "SMS send failed");
                self.db
                    .sms()
                    .log(NewSmsLog {
                        error: Some(e.to_string()),
                        ..entry(&normalized, SmsStatus::Failed)
                    })
                    .await?;

                Err(SmsError::Provider(e))
            }
        }
    }

    /// Logs a blocked attempt and hands back the reason.
    async fn block(&self, entry: NewSmsLog, reason: SmsError) -> SmsError {
        let shop_id = entry.shop_id.clone();
        info!(shop_id = %shop_id, reason = %reason, "SMS blocked");

        match self
            .db
            .sms()
            .log(NewSmsLog {
                error: Some(reason.to_string()),
                ..entry
            })
            .await
        {
            Ok(_) => reason,
            Err(e) => SmsError::Db(e),
        }
    }

    /// Renders the shop's reminder template for a pending debt, sends it and
    /// records the reminder on the debt.
    pub async fn send_debt_reminder(
        &self,
        scope: &Scope,
        debt_id: &str,
        now: DateTime<Utc>,
    ) -> Result<SentReminder, SmsError> {
        let debt = self.db.debts().get(scope, debt_id).await?;
        if debt.status == DebtStatus::Paid {
            return Err(SmsError::Db(DbError::conflict("debt is already paid")));
        }

        let shop = self.db.shops().get(&debt.shop_id).await?;
        let settings = self.db.settings().get_or_default(&debt.shop_id).await?;

        let message = render_reminder(
            &settings.reminder_template,
            &ReminderContext {
                customer: &debt.customer_name,
                amount: debt.amount(),
                currency: &settings.currency,
                due_date: debt.due_date,
                shop: &shop.name,
            },
        );

        let log = self
            .send(&debt.shop_id, Some(&debt.id), &debt.customer_phone, &message)
            .await?;

        let debt = self.db.debts().record_reminder(&debt.id, now).await?;
        self.cache.invalidate(&debt.shop_id, Resource::Debts).await;

        Ok(SentReminder { log, debt })
    }
}

/// The log entry as it would have been stored. Its `id` is empty.
fn unsaved_log(entry: NewSmsLog) -> SmsLog {
    SmsLog {
        id: String::new(),
        shop_id: entry.shop_id,
        debt_id: entry.debt_id,
        phone: entry.phone,
        message: entry.message,
        segments: entry.segments,
        cost: entry.cost,
        status: entry.status,
        provider_message_id: entry.provider_message_id,
        error: entry.error,
        created_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use kassa_core::{NewDebt, NewShop, PageRequest, Shop, ShopSettings};
    use kassa_db::DbConfig;

    use crate::cache::MemoryCache;
    use crate::sms::ProviderReceipt;

    /// Provider that pops scripted outcomes and remembers recipients.
    #[derive(Default)]
    struct Scripted {
        fail: Mutex<bool>,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SmsProvider for Scripted {
        async fn send(&self, to: &str, _sender: &str, _body: &str) -> Result<ProviderReceipt, ProviderError> {
            if *self.fail.lock().unwrap() {
                return Err(ProviderError::Unreachable("timeout".into()));
            }
            self.sent.lock().unwrap().push(to.to_string());
            Ok(ProviderReceipt {
                message_id: Some("m-1".into()),
            })
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    async fn setup(balance: i64) -> (Database, Shop, Arc<Scripted>, SmsService) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let shop = db
            .shops()
            .create(NewShop {
                name: "Corner".into(),
                owner_name: "Aida".into(),
                phone: None,
                address: None,
            })
            .await
            .unwrap();
        if balance > 0 {
            db.shops().credit_sms(&shop.id, balance).await.unwrap();
        }

        let provider = Arc::new(Scripted::default());
        let cache = Arc::new(ResponseCache::new(
            Arc::new(MemoryCache::new()),
            Duration::from_secs(60),
            true,
        ));
        let service = SmsService::new(db.clone(), provider.clone(), cache, "Kassa");
        (db, shop, provider, service)
    }

    async fn logs(db: &Database, shop: &Shop) -> Vec<SmsLog> {
        db.sms()
            .list(&Scope::Shop(shop.id.clone()), None, PageRequest::default())
            .await
            .unwrap()
            .data
    }

    #[tokio::test]
    async fn test_sent_debits_balance() {
        let (db, shop, provider, service) = setup(5).await;

        let log = service.send(&shop.id, None, "0555 12-34-56", "Hello").await.unwrap();

        assert_eq!(log.status, SmsStatus::Sent);
        assert_eq!(log.cost, 1);
        assert_eq!(log.phone, "0555123456");
        assert_eq!(log.provider_message_id.as_deref(), Some("m-1"));
        assert_eq!(db.shops().sms_balance(&shop.id).await.unwrap(), 4);
        assert_eq!(provider.sent.lock().unwrap().as_slice(), ["0555123456"]);
    }

    #[tokio::test]
    async fn test_sent_without_log_row_still_succeeds() {
        let (db, shop, provider, service) = setup(5).await;
        sqlx::query("DROP TABLE sms_logs")
            .execute(db.pool())
            .await
            .unwrap();

        let log = service.send(&shop.id, None, "0555123456", "Hello").await.unwrap();

        assert_eq!(log.status, SmsStatus::Sent);
        assert!(log.id.is_empty());
        assert_eq!(log.provider_message_id.as_deref(), Some("m-1"));
        assert_eq!(db.shops().sms_balance(&shop.id).await.unwrap(), 4);
        assert_eq!(provider.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_provider_failure_refunds() {
        let (db, shop, provider, service) = setup(5).await;
        *provider.fail.lock().unwrap() = true;

        let err = service.send(&shop.id, None, "0555123456", "Hello").await.unwrap_err();

        assert!(matches!(err, SmsError::Provider(_)));
        assert_eq!(ApiError::from(err).code, ErrorCode::SmsFailed);
        assert_eq!(db.shops().sms_balance(&shop.id).await.unwrap(), 5);

        let logs = logs(&db, &shop).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, SmsStatus::Failed);
        assert_eq!(logs[0].cost, 0);
    }

    #[tokio::test]
    async fn test_insufficient_balance_is_blocked() {
        let (db, shop, provider, service) = setup(1).await;
        let long = "x".repeat(200); // two segments

        let err = service.send(&shop.id, None, "0555123456", &long).await.unwrap_err();

        assert!(matches!(err, SmsError::InsufficientBalance { cost: 2, balance: 1 }));
        assert_eq!(db.shops().sms_balance(&shop.id).await.unwrap(), 1);
        assert!(provider.sent.lock().unwrap().is_empty());
        assert_eq!(logs(&db, &shop).await[0].status, SmsStatus::Blocked);
    }

    #[tokio::test]
    async fn test_disabled_shop_and_bad_phone_are_blocked() {
        let (db, shop, _provider, service) = setup(5).await;

        let err = service.send(&shop.id, None, "12", "Hello").await.unwrap_err();
        assert!(matches!(err, SmsError::Invalid(_)));

        let settings = ShopSettings {
            sms_enabled: false,
            ..ShopSettings::defaults(&shop.id, Utc::now())
        };
        db.settings().upsert(&settings).await.unwrap();

        let err = service.send(&shop.id, None, "0555123456", "Hello").await.unwrap_err();
        assert!(matches!(err, SmsError::Disabled(_)));

        let logs = logs(&db, &shop).await;
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.status == SmsStatus::Blocked));
        assert_eq!(db.shops().sms_balance(&shop.id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_debt_reminder_renders_and_records() {
        let (db, shop, _provider, service) = setup(5).await;
        let debt = db
            .debts()
            .create(
                &shop.id,
                NewDebt {
                    customer_name: "Bolot".into(),
                    customer_phone: "+996555123456".into(),
                    amount: 150_000,
                    note: None,
                    due_date: NaiveDate::from_ymd_opt(2026, 11, 1).unwrap(),
                },
            )
            .await
            .unwrap();

        let now = Utc::now();
        let sent = service
            .send_debt_reminder(&Scope::Shop(shop.id.clone()), &debt.id, now)
            .await
            .unwrap();

        assert!(sent.log.message.contains("Bolot"));
        assert!(sent.log.message.contains("1500.00 USD"));
        assert!(sent.log.message.contains("Corner"));
        assert_eq!(sent.log.debt_id.as_deref(), Some(debt.id.as_str()));
        assert_eq!(sent.debt.reminder_count, 1);
        assert!(sent.debt.last_reminded_at.is_some());

        let other = service
            .send_debt_reminder(&Scope::Shop("elsewhere".into()), &debt.id, now)
            .await
            .unwrap_err();
        assert!(matches!(other, SmsError::Db(DbError::NotFound { .. })));
    }
}
