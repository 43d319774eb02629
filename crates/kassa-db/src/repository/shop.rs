//! # Shop Repository
//!
//! Tenants and their prepaid SMS balance.
//!
//! ## SMS Balance
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  reserve_sms(shop, 2)                                                  │
//! │                                                                         │
//! │  UPDATE shops SET sms_balance = sms_balance - 2                        │
//! │  WHERE id = ? AND is_active = 1 AND sms_balance >= 2                   │
//! │       │                                                                 │
//! │       ├── 1 row  → reserved, go call the provider                      │
//! │       └── 0 rows → not enough credit (or shop inactive): nothing       │
//! │                    changed, no provider call                           │
//! │                                                                         │
//! │  The check and the decrement are one statement, so two concurrent     │
//! │  reminders can never both spend the last credit.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use kassa_core::{
    CoreError, NewShop, PageRequest, Paginated, Shop, ShopUpdate, ValidationError, MAX_SMS_BALANCE,
};

use super::new_id;
use crate::error::{DbError, DbResult};

#[derive(Debug, Clone)]
pub struct ShopRepository {
    pool: SqlitePool,
}

impl ShopRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ShopRepository { pool }
    }

    /// Creates an active shop with zero SMS balance.
    pub async fn create(&self, shop: NewShop) -> DbResult<Shop> {
        let id = new_id();
        let now = Utc::now();

        debug!(id = %id, name = %shop.name, "Creating shop");

        let created = sqlx::query_as::<_, Shop>(
            r#"
            INSERT INTO shops (
                id, name, owner_name, phone, address,
                sms_balance, invoice_seq, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, 0, 0, 1, ?6, ?6)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(&shop.name)
        .bind(&shop.owner_name)
        .bind(&shop.phone)
        .bind(&shop.address)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        info!(shop_id = %created.id, "Shop created");
        Ok(created)
    }

    pub async fn get(&self, id: &str) -> DbResult<Shop> {
        sqlx::query_as::<_, Shop>("SELECT * FROM shops WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Shop", id))
    }

    pub async fn list(&self, page: PageRequest) -> DbResult<Paginated<Shop>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shops")
            .fetch_one(&self.pool)
            .await?;

        let shops = sqlx::query_as::<_, Shop>(
            "SELECT * FROM shops ORDER BY name COLLATE NOCASE LIMIT ?1 OFFSET ?2",
        )
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Paginated::new(shops, total, page))
    }

    /// Applies the set fields of `update`.
    pub async fn update(&self, id: &str, update: ShopUpdate) -> DbResult<Shop> {
        sqlx::query_as::<_, Shop>(
            r#"
            UPDATE shops SET
                name       = COALESCE(?2, name),
                owner_name = COALESCE(?3, owner_name),
                phone      = COALESCE(?4, phone),
                address    = COALESCE(?5, address),
                is_active  = COALESCE(?6, is_active),
                updated_at = ?7
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&update.name)
        .bind(&update.owner_name)
        .bind(&update.phone)
        .bind(&update.address)
        .bind(update.is_active)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Shop", id))
    }

    /// Activates or deactivates a shop. Deactivation is the only "delete".
    pub async fn set_active(&self, id: &str, active: bool) -> DbResult<Shop> {
        let shop = sqlx::query_as::<_, Shop>(
            "UPDATE shops SET is_active = ?2, updated_at = ?3 WHERE id = ?1 RETURNING *",
        )
        .bind(id)
        .bind(active)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Shop", id))?;

        info!(shop_id = %id, active, "Shop activation changed");
        Ok(shop)
    }

    // =========================================================================
    // SMS balance
    // =========================================================================

    /// Adds prepaid credits. Returns the updated shop.
    pub async fn credit_sms(&self, id: &str, credits: i64) -> DbResult<Shop> {
        let credited = sqlx::query_as::<_, Shop>(
            r#"
            UPDATE shops SET sms_balance = sms_balance + ?2, updated_at = ?3
            WHERE id = ?1 AND ?2 > 0 AND ?2 <= ?4 - sms_balance
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(credits)
        .bind(Utc::now())
        .bind(MAX_SMS_BALANCE)
        .fetch_optional(&self.pool)
        .await?;

        let Some(shop) = credited else {
            // Distinguish a missing shop from a balance that would overflow.
            self.get(id).await?;
            return Err(CoreError::from(ValidationError::OutOfRange {
                field: "sms_balance".to_string(),
                min: 0,
                max: MAX_SMS_BALANCE,
            })
            .into());
        };

        info!(shop_id = %id, credits, balance = shop.sms_balance, "SMS credit added");
        Ok(shop)
    }

    /// Atomically takes `cost` credits if the shop is active and can afford it.
    ///
    /// ## Returns
    /// * `Ok(true)` - credits taken
    /// * `Ok(false)` - balance too low or shop inactive; nothing changed
    pub async fn reserve_sms(&self, id: &str, cost: i64) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE shops SET sms_balance = sms_balance - ?2, updated_at = ?3
            WHERE id = ?1 AND is_active = 1 AND sms_balance >= ?2
            "#,
        )
        .bind(id)
        .bind(cost)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let reserved = result.rows_affected() == 1;
        debug!(shop_id = %id, cost, reserved, "SMS credit reservation");
        Ok(reserved)
    }

    /// Returns credits taken by `reserve_sms` after a failed send.
    pub async fn refund_sms(&self, id: &str, cost: i64) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE shops SET sms_balance = sms_balance + ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id)
        .bind(cost)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Shop", id));
        }

        debug!(shop_id = %id, cost, "SMS credit refunded");
        Ok(())
    }

    pub async fn sms_balance(&self, id: &str) -> DbResult<i64> {
        sqlx::query_scalar("SELECT sms_balance FROM shops WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Shop", id))
    }
}
