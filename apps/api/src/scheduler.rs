//! # Reminder Scheduler
//!
//! Background task that texts customers whose debts are coming due.
//!
//! ## Tick
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  every interval_secs                                                    │
//! │     │                                                                   │
//! │     ├── shops with reminders + SMS enabled, active                      │
//! │     │                                                                   │
//! │     └── per shop:                                                       │
//! │           due = pending debts                                           │
//! │                 due_date <= today + reminder_days_before                │
//! │                 last_reminded_at IS NULL OR < now - cooldown_hours      │
//! │           for debt in due:                                              │
//! │              SmsService::send_debt_reminder                             │
//! │              InsufficientBalance → stop this shop                       │
//! │              other failure       → count, next debt                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! A debt that fails to send keeps its old `last_reminded_at`, so the next
//! tick picks it up again.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use kassa_core::Scope;
use kassa_db::{Database, DbResult};

use crate::config::ReminderConfig;
use crate::sms::{SmsError, SmsService};

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReminderRun {
    pub shops: usize,
    pub due: usize,
    pub sent: usize,
    pub failed: usize,

    /// Shops that ran out of SMS credit mid-pass.
    pub exhausted: usize,
}

pub struct ReminderScheduler {
    db: Database,
    sms: Arc<SmsService>,
    interval: Duration,
    cooldown: chrono::Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping the scheduler.
#[derive(Clone)]
pub struct ReminderSchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl ReminderSchedulerHandle {
    /// Triggers graceful shutdown. A no-op if the scheduler already stopped.
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send(()).await.is_err() {
            debug!("Reminder scheduler already stopped");
        }
    }
}

impl ReminderScheduler {
    pub fn new(
        db: Database,
        sms: Arc<SmsService>,
        config: &ReminderConfig,
    ) -> (Self, ReminderSchedulerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let scheduler = ReminderScheduler {
            db,
            sms,
            interval: Duration::from_secs(config.interval_secs.max(1)),
            cooldown: chrono::Duration::hours(config.cooldown_hours),
            shutdown_rx,
        };

        (scheduler, ReminderSchedulerHandle { shutdown_tx })
    }

    /// Runs until shutdown. Spawn it as a background task.
    pub async fn run(mut self) {
        info!(interval_secs = self.interval.as_secs(), "Reminder scheduler starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_once(Utc::now()).await {
                        error!(error = %e, "Reminder pass failed");
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Reminder scheduler shutting down");
                    break;
                }
            }
        }

        info!("Reminder scheduler stopped");
    }

    /// One pass over every reminder-enabled shop, as of `now`.
    pub async fn run_once(&self, now: DateTime<Utc>) -> DbResult<ReminderRun> {
        let today = now.date_naive();
        let cutoff = now - self.cooldown;
        let shops = self.db.settings().reminder_enabled_shops().await?;

        let mut run = ReminderRun {
            shops: shops.len(),
            ..Default::default()
        };

        for settings in shops {
            let shop_id = settings.shop_id;
            let scope = Scope::Shop(shop_id.clone());

            let due = match self
                .db
                .debts()
                .due_for_reminder(&shop_id, today, settings.reminder_days_before, cutoff)
                .await
            {
                Ok(due) => due,
                Err(e) => {
                    error!(shop_id = %shop_id, error = %e, "Failed to load due debts");
                    continue;
                }
            };
            run.due += due.len();

            for debt in due {
                match self.sms.send_debt_reminder(&scope, &debt.id, now).await {
                    Ok(_) => run.sent += 1,
                    Err(SmsError::InsufficientBalance { cost, balance }) => {
                        warn!(shop_id = %shop_id, cost, balance, "SMS credit exhausted, skipping shop");
                        run.exhausted += 1;
                        break;
                    }
                    Err(SmsError::Disabled(reason)) => {
                        warn!(shop_id = %shop_id, %reason, "SMS unavailable, skipping shop");
                        run.failed += 1;
                        break;
                    }
                    Err(e) => {
                        warn!(shop_id = %shop_id, debt_id = %debt.id, error = %e, "Reminder failed");
                        run.failed += 1;
                    }
                }
            }
        }

        info!(
            shops = run.shops,
            due = run.due,
            sent = run.sent,
            failed = run.failed,
            exhausted = run.exhausted,
            "Reminder pass complete"
        );
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration as ChronoDuration, TimeZone};
    use kassa_core::{NewDebt, NewShop, Shop, ShopSettings};
    use kassa_db::DbConfig;

    use crate::cache::{MemoryCache, ResponseCache};
    use crate::sms::LogSmsProvider;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap()
    }

    async fn shop(db: &Database, name: &str, credits: i64, reminders: bool) -> Shop {
        let shop = db
            .shops()
            .create(NewShop {
                name: name.into(),
                owner_name: "Owner".into(),
                phone: None,
                address: None,
            })
            .await
            .unwrap();
        db.shops().credit_sms(&shop.id, credits).await.unwrap();
        db.settings()
            .upsert(&ShopSettings {
                reminders_enabled: reminders,
                reminder_days_before: 2,
                ..ShopSettings::defaults(&shop.id, now())
            })
            .await
            .unwrap();
        shop
    }

    async fn debt(db: &Database, shop: &Shop, due_in_days: i64) -> String {
        db.debts()
            .create(
                &shop.id,
                NewDebt {
                    customer_name: "Customer".into(),
                    customer_phone: "0555123456".into(),
                    amount: 10_00,
                    note: None,
                    due_date: now().date_naive() + ChronoDuration::days(due_in_days),
                },
            )
            .await
            .unwrap()
            .id
    }

    fn scheduler(db: &Database) -> (ReminderScheduler, ReminderSchedulerHandle) {
        let cache = Arc::new(ResponseCache::new(
            Arc::new(MemoryCache::new()),
            Duration::from_secs(60),
            true,
        ));
        let sms = Arc::new(SmsService::new(db.clone(), Arc::new(LogSmsProvider), cache, "Kassa"));
        ReminderScheduler::new(db.clone(), sms, &ReminderConfig::default())
    }

    #[tokio::test]
    async fn test_reminds_due_debts_once_per_cooldown() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let s = shop(&db, "Corner", 10, true).await;
        let overdue = debt(&db, &s, -3).await;
        let soon = debt(&db, &s, 2).await;
        let _later = debt(&db, &s, 10).await;

        let quiet = shop(&db, "Quiet", 10, false).await;
        debt(&db, &quiet, 0).await;

        let (scheduler, _handle) = scheduler(&db);
        let run = scheduler.run_once(now()).await.unwrap();
        assert_eq!(run.shops, 1);
        assert_eq!(run.due, 2);
        assert_eq!(run.sent, 2);

        let scope = Scope::Shop(s.id.clone());
        assert_eq!(db.debts().get(&scope, &overdue).await.unwrap().reminder_count, 1);
        assert_eq!(db.debts().get(&scope, &soon).await.unwrap().reminder_count, 1);

        // Inside the cooldown nothing is due again.
        let run = scheduler.run_once(now() + ChronoDuration::hours(1)).await.unwrap();
        assert_eq!(run.due, 0);

        let run = scheduler.run_once(now() + ChronoDuration::hours(25)).await.unwrap();
        assert_eq!(run.sent, 2);
    }

    #[tokio::test]
    async fn test_stops_shop_when_credit_runs_out() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let s = shop(&db, "Corner", 1, true).await;
        debt(&db, &s, 0).await;
        debt(&db, &s, 1).await;
        debt(&db, &s, -1).await;

        let (scheduler, _handle) = scheduler(&db);
        let run = scheduler.run_once(now()).await.unwrap();

        assert_eq!(run.due, 3);
        assert_eq!(run.sent, 1);
        assert_eq!(run.exhausted, 1);
        assert_eq!(db.shops().sms_balance(&s.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let (scheduler, handle) = scheduler(&db);

        let task = tokio::spawn(scheduler.run());
        handle.shutdown().await;

        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
