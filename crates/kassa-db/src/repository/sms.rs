//! # SMS Log Repository
//!
//! Append-only record of every send attempt, including ones blocked
//! before reaching the provider.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use kassa_core::{PageRequest, Paginated, Scope, SmsLog, SmsStatus};

use super::new_id;
use crate::error::DbResult;

/// A log entry to append.
#[derive(Debug, Clone)]
pub struct NewSmsLog {
    pub shop_id: String,
    pub debt_id: Option<String>,
    pub phone: String,
    pub message: String,
    pub segments: i64,
    pub cost: i64,
    pub status: SmsStatus,
    pub provider_message_id: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SmsLogRepository {
    pool: SqlitePool,
}

impl SmsLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SmsLogRepository { pool }
    }

    pub async fn log(&self, entry: NewSmsLog) -> DbResult<SmsLog> {
        let log = sqlx::query_as::<_, SmsLog>(
            r#"
            INSERT INTO sms_logs (
                id, shop_id, debt_id, phone, message, segments, cost,
                status, provider_message_id, error, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            RETURNING *
            "#,
        )
        .bind(new_id())
        .bind(&entry.shop_id)
        .bind(&entry.debt_id)
        .bind(&entry.phone)
        .bind(&entry.message)
        .bind(entry.segments)
        .bind(entry.cost)
        .bind(entry.status)
        .bind(&entry.provider_message_id)
        .bind(&entry.error)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        debug!(shop_id = %log.shop_id, status = ?log.status, cost = log.cost, "SMS logged");
        Ok(log)
    }

    /// Lists log entries newest first, optionally by status.
    pub async fn list(
        &self,
        scope: &Scope,
        status: Option<SmsStatus>,
        page: PageRequest,
    ) -> DbResult<Paginated<SmsLog>> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM sms_logs
            WHERE (?1 IS NULL OR shop_id = ?1) AND (?2 IS NULL OR status = ?2)
            "#,
        )
        .bind(scope.shop_id())
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let logs = sqlx::query_as::<_, SmsLog>(
            r#"
            SELECT * FROM sms_logs
            WHERE (?1 IS NULL OR shop_id = ?1) AND (?2 IS NULL OR status = ?2)
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?3 OFFSET ?4
            "#,
        )
        .bind(scope.shop_id())
        .bind(status)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Paginated::new(logs, total, page))
    }
}
