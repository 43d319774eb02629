//! # Report Repository
//!
//! Read-only aggregates over invoices and stock. Days are UTC calendar
//! days taken from the stored timestamp, so
//! `substr(created_at, 1, 10) BETWEEN from AND to` is an inclusive range.

use chrono::NaiveDate;
use sqlx::SqlitePool;
use tracing::debug;

use kassa_core::{
    DailySales, DateRange, DebtSummary, PaymentBreakdown, Product, SalesSummary, Scope,
    TopProduct,
};

use crate::error::DbResult;

#[derive(Debug, Clone)]
pub struct ReportRepository {
    pool: SqlitePool,
}

impl ReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ReportRepository { pool }
    }

    /// Headline figures plus the payment method split.
    pub async fn summary(&self, scope: &Scope, range: DateRange) -> DbResult<SalesSummary> {
        let (from, to) = range.bounds();

        let (invoice_count, revenue, profit, items_sold): (i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(total), 0),
                COALESCE(SUM(profit), 0),
                COALESCE(SUM(item_count), 0)
            FROM invoices
            WHERE (?1 IS NULL OR shop_id = ?1)
              AND substr(created_at, 1, 10) BETWEEN ?2 AND ?3
            "#,
        )
        .bind(scope.shop_id())
        .bind(&from)
        .bind(&to)
        .fetch_one(&self.pool)
        .await?;

        let by_payment = sqlx::query_as::<_, PaymentBreakdown>(
            r#"
            SELECT payment_method, COUNT(*) AS invoice_count, SUM(total) AS revenue
            FROM invoices
            WHERE (?1 IS NULL OR shop_id = ?1)
              AND substr(created_at, 1, 10) BETWEEN ?2 AND ?3
            GROUP BY payment_method
            ORDER BY revenue DESC
            "#,
        )
        .bind(scope.shop_id())
        .bind(&from)
        .bind(&to)
        .fetch_all(&self.pool)
        .await?;

        let average_sale = if invoice_count > 0 {
            revenue / invoice_count
        } else {
            0
        };

        debug!(scope = %scope, from = %from, to = %to, invoice_count, "Sales summary");

        Ok(SalesSummary {
            range,
            invoice_count,
            revenue,
            profit,
            items_sold,
            average_sale,
            by_payment,
        })
    }

    /// One row per day that has sales, oldest first.
    pub async fn daily(&self, scope: &Scope, range: DateRange) -> DbResult<Vec<DailySales>> {
        let (from, to) = range.bounds();

        let rows = sqlx::query_as::<_, DailySales>(
            r#"
            SELECT
                substr(created_at, 1, 10) AS day,
                COUNT(*)                  AS invoice_count,
                SUM(total)                AS revenue,
                SUM(profit)               AS profit
            FROM invoices
            WHERE (?1 IS NULL OR shop_id = ?1)
              AND substr(created_at, 1, 10) BETWEEN ?2 AND ?3
            GROUP BY day
            ORDER BY day
            "#,
        )
        .bind(scope.shop_id())
        .bind(&from)
        .bind(&to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Best sellers by units sold.
    pub async fn top_products(
        &self,
        scope: &Scope,
        range: DateRange,
        limit: i64,
    ) -> DbResult<Vec<TopProduct>> {
        let (from, to) = range.bounds();

        let rows = sqlx::query_as::<_, TopProduct>(
            r#"
            SELECT
                ii.product_id,
                MAX(ii.name)         AS name,
                SUM(ii.quantity)     AS quantity,
                SUM(ii.line_total)   AS revenue,
                SUM(ii.line_profit)  AS profit
            FROM invoice_items ii
            JOIN invoices i ON i.id = ii.invoice_id
            WHERE (?1 IS NULL OR i.shop_id = ?1)
              AND substr(i.created_at, 1, 10) BETWEEN ?2 AND ?3
            GROUP BY ii.product_id
            ORDER BY quantity DESC, revenue DESC
            LIMIT ?4
            "#,
        )
        .bind(scope.shop_id())
        .bind(&from)
        .bind(&to)
        .bind(limit.clamp(1, 100))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Products at or below their threshold, emptiest first.
    pub async fn low_stock(&self, scope: &Scope, limit: i64) -> DbResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, Product>(
            r#"
            SELECT * FROM products
            WHERE (?1 IS NULL OR shop_id = ?1)
              AND stock <= low_stock_threshold
            ORDER BY stock, name COLLATE NOCASE
            LIMIT ?2
            "#,
        )
        .bind(scope.shop_id())
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn debts(&self, scope: &Scope, today: NaiveDate) -> DbResult<DebtSummary> {
        super::DebtRepository::new(self.pool.clone())
            .summary(scope, today)
            .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::repository::testing;
    use kassa_core::invoice::{CheckoutLine, CheckoutRequest};
    use kassa_core::PaymentMethod;

    fn sale(product_id: &str, quantity: i64, method: PaymentMethod) -> CheckoutRequest {
        CheckoutRequest {
            lines: vec![CheckoutLine {
                product_id: product_id.to_string(),
                quantity,
            }],
            payment_method: method,
            customer_name: None,
            customer_phone: None,
            due_date: None,
            note: None,
        }
    }

    #[tokio::test]
    async fn test_summary_daily_and_top_products() {
        let db = testing::db().await;
        let shop = testing::shop(&db, "Corner").await;
        let cashier = testing::cashier(&db, &shop, "kassir").await;
        let cola = testing::product(&db, &shop, "Cola", 50, 80, 20).await;
        let bread = testing::product(&db, &shop, "Bread", 20, 30, 20).await;

        let now = Utc::now();
        for req in [
            sale(&cola.id, 3, PaymentMethod::Cash),
            sale(&bread.id, 1, PaymentMethod::Cash),
            sale(&cola.id, 1, PaymentMethod::Bank),
        ] {
            db.invoices().create(&shop.id, &cashier.id, &req, now).await.unwrap();
        }

        let today = now.date_naive();
        let range = DateRange::resolve(None, None, today).unwrap();
        let scope = Scope::Shop(shop.id.clone());

        let summary = db.reports().summary(&scope, range).await.unwrap();
        assert_eq!(summary.invoice_count, 3);
        assert_eq!(summary.revenue, 240 + 30 + 80);
        assert_eq!(summary.profit, 90 + 10 + 30);
        assert_eq!(summary.items_sold, 5);
        assert_eq!(summary.average_sale, 350 / 3);
        assert_eq!(summary.by_payment.len(), 2);
        assert_eq!(summary.by_payment[0].payment_method, PaymentMethod::Cash);
        assert_eq!(summary.by_payment[0].invoice_count, 2);

        let daily = db.reports().daily(&scope, range).await.unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].day, today.to_string());
        assert_eq!(daily[0].revenue, 350);

        let top = db.reports().top_products(&scope, range, 10).await.unwrap();
        assert_eq!(top[0].name, "Cola");
        assert_eq!(top[0].quantity, 4);
        assert_eq!(top[0].profit, 120);
    }

    #[tokio::test]
    async fn test_empty_range_and_other_scope() {
        let db = testing::db().await;
        let a = testing::shop(&db, "A").await;
        let b = testing::shop(&db, "B").await;
        let cashier = testing::cashier(&db, &a, "kassir").await;
        let cola = testing::product(&db, &a, "Cola", 50, 80, 20).await;
        db.invoices()
            .create(&a.id, &cashier.id, &sale(&cola.id, 1, PaymentMethod::Cash), Utc::now())
            .await
            .unwrap();

        let range = DateRange::resolve(None, None, Utc::now().date_naive()).unwrap();
        let summary = db.reports().summary(&Scope::Shop(b.id.clone()), range).await.unwrap();
        assert_eq!(summary.invoice_count, 0);
        assert_eq!(summary.average_sale, 0);
        assert!(summary.by_payment.is_empty());

        let all = db.reports().summary(&Scope::All, range).await.unwrap();
        assert_eq!(all.invoice_count, 1);
    }

    #[tokio::test]
    async fn test_low_stock() {
        let db = testing::db().await;
        let shop = testing::shop(&db, "Corner").await;
        testing::product(&db, &shop, "Plenty", 10, 20, 50).await;
        testing::product(&db, &shop, "Few", 10, 20, 2).await;
        testing::product(&db, &shop, "None", 10, 20, 0).await;

        let low = db
            .reports()
            .low_stock(&Scope::Shop(shop.id.clone()), 50)
            .await
            .unwrap();
        let names: Vec<_> = low.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["None", "Few"]);
    }
}
