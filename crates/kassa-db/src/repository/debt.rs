//! # Debt Repository
//!
//! The customer debt ledger and the bookkeeping the reminder scheduler
//! needs.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   create / checkout(Debt)                                               │
//! │            │                                                            │
//! │            ▼                                                            │
//! │      ┌───────────┐  record_reminder   ┌───────────┐                     │
//! │      │  PENDING  │ ─────────────────▶ │  PENDING  │  reminder_count++   │
//! │      └─────┬─────┘                    └─────┬─────┘                     │
//! │            │ mark_paid                      │ mark_paid                 │
//! │            ▼                                ▼                           │
//! │      ┌───────────┐                                                      │
//! │      │   PAID    │  final: no update, no reminders, no second payment   │
//! │      └───────────┘                                                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use kassa_core::{
    Debt, DebtStatus, DebtSummary, DebtUpdate, NewDebt, PageRequest, Paginated, Scope,
};

use super::{like_pattern, new_id};
use crate::error::{DbError, DbResult};

/// Filters for [`DebtRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct DebtFilter {
    pub status: Option<DebtStatus>,
    /// Pending debts whose due date has passed.
    pub overdue_only: bool,
    /// Substring of customer name or phone.
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DebtRepository {
    pool: SqlitePool,
}

impl DebtRepository {
    pub fn new(pool: SqlitePool) -> Self {
        DebtRepository { pool }
    }

    /// Records a manual debt. `debt` must already be validated.
    pub async fn create(&self, shop_id: &str, debt: NewDebt) -> DbResult<Debt> {
        let id = new_id();
        let now = Utc::now();

        debug!(id = %id, shop_id = %shop_id, amount = debt.amount, "Creating debt");

        let created = sqlx::query_as::<_, Debt>(
            r#"
            INSERT INTO debts (
                id, shop_id, customer_name, customer_phone, amount, note,
                due_date, status, invoice_id, reminder_count, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', NULL, 0, ?8, ?8)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(shop_id)
        .bind(&debt.customer_name)
        .bind(&debt.customer_phone)
        .bind(debt.amount)
        .bind(&debt.note)
        .bind(debt.due_date)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        info!(debt_id = %created.id, shop_id = %shop_id, "Debt created");
        Ok(created)
    }

    pub async fn get(&self, scope: &Scope, id: &str) -> DbResult<Debt> {
        sqlx::query_as::<_, Debt>(
            "SELECT * FROM debts WHERE id = ?1 AND (?2 IS NULL OR shop_id = ?2)",
        )
        .bind(id)
        .bind(scope.shop_id())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Debt", id))
    }

    /// Lists debts, soonest due first. `today` decides what is overdue.
    pub async fn list(
        &self,
        scope: &Scope,
        filter: &DebtFilter,
        today: NaiveDate,
        page: PageRequest,
    ) -> DbResult<Paginated<Debt>> {
        const WHERE: &str = r#"
            WHERE (?1 IS NULL OR shop_id = ?1)
              AND (?2 IS NULL OR status = ?2)
              AND (?3 = 0 OR (status = 'pending' AND due_date < ?4))
              AND (?5 IS NULL OR customer_name LIKE ?5 ESCAPE '\'
                              OR customer_phone LIKE ?5 ESCAPE '\')
        "#;

        let search = filter
            .search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(like_pattern);

        let count_sql = format!("SELECT COUNT(*) FROM debts {}", WHERE);
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(scope.shop_id())
            .bind(filter.status)
            .bind(filter.overdue_only)
            .bind(today)
            .bind(&search)
            .fetch_one(&self.pool)
            .await?;

        let list_sql = format!(
            "SELECT * FROM debts {} ORDER BY status, due_date, created_at LIMIT ?6 OFFSET ?7",
            WHERE
        );
        let debts = sqlx::query_as::<_, Debt>(&list_sql)
            .bind(scope.shop_id())
            .bind(filter.status)
            .bind(filter.overdue_only)
            .bind(today)
            .bind(&search)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(Paginated::new(debts, total, page))
    }

    /// Edits a pending debt. Paid debts are final.
    pub async fn update(&self, shop_id: &str, id: &str, update: DebtUpdate) -> DbResult<Debt> {
        let current = self.get(&Scope::Shop(shop_id.to_string()), id).await?;
        if current.status == DebtStatus::Paid {
            return Err(DbError::conflict("debt is already paid"));
        }

        sqlx::query_as::<_, Debt>(
            r#"
            UPDATE debts SET
                customer_name  = COALESCE(?3, customer_name),
                customer_phone = COALESCE(?4, customer_phone),
                amount         = COALESCE(?5, amount),
                note           = COALESCE(?6, note),
                due_date       = COALESCE(?7, due_date),
                updated_at     = ?8
            WHERE id = ?1 AND shop_id = ?2 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(shop_id)
        .bind(&update.customer_name)
        .bind(&update.customer_phone)
        .bind(update.amount)
        .bind(&update.note)
        .bind(update.due_date)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::conflict("debt is already paid"))
    }

    /// Settles a debt.
    ///
    /// ## Errors
    /// * `NotFound` - no such debt in this shop
    /// * `Conflict` - already paid
    pub async fn mark_paid(&self, shop_id: &str, id: &str, at: DateTime<Utc>) -> DbResult<Debt> {
        let paid = sqlx::query_as::<_, Debt>(
            r#"
            UPDATE debts SET status = 'paid', paid_at = ?3, updated_at = ?3
            WHERE id = ?1 AND shop_id = ?2 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(shop_id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        match paid {
            Some(debt) => {
                info!(debt_id = %id, shop_id = %shop_id, amount = debt.amount, "Debt paid");
                Ok(debt)
            }
            None => {
                // Distinguish a missing row from a second payment.
                self.get(&Scope::Shop(shop_id.to_string()), id).await?;
                Err(DbError::conflict("debt is already paid"))
            }
        }
    }

    /// Deletes a manual debt. Debts created by a sale belong to the invoice
    /// and can only be paid.
    pub async fn delete(&self, shop_id: &str, id: &str) -> DbResult<()> {
        let debt = self.get(&Scope::Shop(shop_id.to_string()), id).await?;
        if debt.invoice_id.is_some() {
            return Err(DbError::conflict("debt was created by an invoice"));
        }

        sqlx::query("DELETE FROM debts WHERE id = ?1 AND shop_id = ?2")
            .bind(id)
            .bind(shop_id)
            .execute(&self.pool)
            .await?;

        info!(debt_id = %id, shop_id = %shop_id, "Debt deleted");
        Ok(())
    }

    // =========================================================================
    // Reminders
    // =========================================================================

    /// Pending debts due on or before `today + days_before` (overdue ones
    /// included) that were not reminded after `cooldown_cutoff`.
    pub async fn due_for_reminder(
        &self,
        shop_id: &str,
        today: NaiveDate,
        days_before: i64,
        cooldown_cutoff: DateTime<Utc>,
    ) -> DbResult<Vec<Debt>> {
        let horizon = today + Duration::days(days_before.max(0));

        let debts = sqlx::query_as::<_, Debt>(
            r#"
            SELECT * FROM debts
            WHERE shop_id = ?1
              AND status = 'pending'
              AND due_date <= ?2
              AND (last_reminded_at IS NULL OR last_reminded_at < ?3)
            ORDER BY due_date, created_at
            "#,
        )
        .bind(shop_id)
        .bind(horizon)
        .bind(cooldown_cutoff)
        .fetch_all(&self.pool)
        .await?;

        debug!(shop_id = %shop_id, count = debts.len(), "Debts due for reminder");
        Ok(debts)
    }

    pub async fn record_reminder(&self, id: &str, at: DateTime<Utc>) -> DbResult<Debt> {
        sqlx::query_as::<_, Debt>(
            r#"
            UPDATE debts SET
                reminder_count   = reminder_count + 1,
                last_reminded_at = ?2,
                updated_at       = ?2
            WHERE id = ?1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Debt", id))
    }

    /// Pending, overdue and paid totals.
    pub async fn summary(&self, scope: &Scope, today: NaiveDate) -> DbResult<DebtSummary> {
        let summary = sqlx::query_as::<_, DebtSummary>(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END), 0)      AS pending_count,
                COALESCE(SUM(CASE WHEN status = 'pending' THEN amount ELSE 0 END), 0) AS pending_amount,
                COALESCE(SUM(CASE WHEN status = 'pending' AND due_date < ?2
                                  THEN 1 ELSE 0 END), 0)                            AS overdue_count,
                COALESCE(SUM(CASE WHEN status = 'pending' AND due_date < ?2
                                  THEN amount ELSE 0 END), 0)                       AS overdue_amount,
                COALESCE(SUM(CASE WHEN status = 'paid' THEN 1 ELSE 0 END), 0)         AS paid_count,
                COALESCE(SUM(CASE WHEN status = 'paid' THEN amount ELSE 0 END), 0)    AS paid_amount
            FROM debts
            WHERE (?1 IS NULL OR shop_id = ?1)
            "#,
        )
        .bind(scope.shop_id())
        .bind(today)
        .fetch_one(&self.pool)
        .await?;

        Ok(summary)
    }
}
