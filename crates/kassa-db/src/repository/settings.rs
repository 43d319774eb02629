//! # Settings Repository
//!
//! One `shop_settings` row per shop, created on first write. Reads for a
//! shop that never saved settings return `ShopSettings::defaults`.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use kassa_core::ShopSettings;

use crate::error::{DbError, DbResult};

#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    /// Stored settings, or the defaults when the shop has none yet.
    pub async fn get_or_default(&self, shop_id: &str) -> DbResult<ShopSettings> {
        let stored = sqlx::query_as::<_, ShopSettings>(
            "SELECT * FROM shop_settings WHERE shop_id = ?1",
        )
        .bind(shop_id)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(settings) = stored {
            return Ok(settings);
        }

        let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM shops WHERE id = ?1")
            .bind(shop_id)
            .fetch_optional(&self.pool)
            .await?;

        if exists.is_none() {
            return Err(DbError::not_found("Shop", shop_id));
        }

        debug!(shop_id = %shop_id, "No stored settings, using defaults");
        Ok(ShopSettings::defaults(shop_id, Utc::now()))
    }

    /// Writes the full settings row.
    pub async fn upsert(&self, settings: &ShopSettings) -> DbResult<ShopSettings> {
        let saved = sqlx::query_as::<_, ShopSettings>(
            r#"
            INSERT INTO shop_settings (
                shop_id, currency, sms_enabled, sms_sender, reminders_enabled,
                reminder_days_before, reminder_template, default_low_stock_threshold,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (shop_id) DO UPDATE SET
                currency                    = excluded.currency,
                sms_enabled                 = excluded.sms_enabled,
                sms_sender                  = excluded.sms_sender,
                reminders_enabled           = excluded.reminders_enabled,
                reminder_days_before        = excluded.reminder_days_before,
                reminder_template           = excluded.reminder_template,
                default_low_stock_threshold = excluded.default_low_stock_threshold,
                updated_at                  = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(&settings.shop_id)
        .bind(&settings.currency)
        .bind(settings.sms_enabled)
        .bind(&settings.sms_sender)
        .bind(settings.reminders_enabled)
        .bind(settings.reminder_days_before)
        .bind(&settings.reminder_template)
        .bind(settings.default_low_stock_threshold)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        info!(shop_id = %saved.shop_id, "Settings saved");
        Ok(saved)
    }

    /// Active shops that want automatic reminders and allow SMS.
    pub async fn reminder_enabled_shops(&self) -> DbResult<Vec<ShopSettings>> {
        let rows = sqlx::query_as::<_, ShopSettings>(
            r#"
            SELECT s.* FROM shop_settings s
            JOIN shops ON shops.id = s.shop_id
            WHERE shops.is_active = 1
              AND s.reminders_enabled = 1
              AND s.sms_enabled = 1
            ORDER BY s.shop_id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use crate::repository::testing;
    use crate::DbError;

    #[tokio::test]
    async fn test_defaults_until_saved() {
        let db = testing::db().await;
        let shop = testing::shop(&db, "Corner").await;

        let settings = db.settings().get_or_default(&shop.id).await.unwrap();
        assert_eq!(settings.currency, "USD");
        assert!(!settings.reminders_enabled);

        let mut changed = settings.clone();
        changed.currency = "KGS".into();
        db.settings().upsert(&changed).await.unwrap();

        let stored = db.settings().get_or_default(&shop.id).await.unwrap();
        assert_eq!(stored.currency, "KGS");

        changed.currency = "EUR".into();
        db.settings().upsert(&changed).await.unwrap();
        assert_eq!(db.settings().get_or_default(&shop.id).await.unwrap().currency, "EUR");
    }

    #[tokio::test]
    async fn test_unknown_shop_is_not_found() {
        let db = testing::db().await;
        assert!(matches!(
            db.settings().get_or_default("missing").await,
            Err(DbError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_reminder_enabled_shops_skips_inactive() {
        let db = testing::db().await;
        let a = testing::shop(&db, "A").await;
        let b = testing::shop(&db, "B").await;
        let c = testing::shop(&db, "C").await;

        for shop in [&a, &b, &c] {
            let mut s = db.settings().get_or_default(&shop.id).await.unwrap();
            s.reminders_enabled = true;
            if shop.id == c.id {
                s.sms_enabled = false;
            }
            db.settings().upsert(&s).await.unwrap();
        }
        db.shops().set_active(&b.id, false).await.unwrap();

        let shops = db.settings().reminder_enabled_shops().await.unwrap();
        assert_eq!(shops.len(), 1);
        assert_eq!(shops[0].shop_id, a.id);
    }
}
