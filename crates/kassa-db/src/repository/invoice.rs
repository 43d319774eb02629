//! # Invoice Repository
//!
//! The checkout transaction and invoice history.
//!
//! ## Checkout Transaction
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   │                                                                     │
//! │   ├─ UPDATE shops SET invoice_seq = invoice_seq + 1   (takes the write  │
//! │   │     WHERE id = ? AND is_active = 1                 lock first)      │
//! │   │                                                                     │
//! │   ├─ for each line:                                                     │
//! │   │    UPDATE products SET stock = stock - qty                          │
//! │   │    WHERE id = ? AND shop_id = ? AND stock >= qty                    │
//! │   │    RETURNING *                                                      │
//! │   │      ├── row  → price_line(row, qty)                                │
//! │   │      └── none → InsufficientStock / ProductNotFound ──► ROLLBACK   │
//! │   │                                                                     │
//! │   ├─ INSERT invoices (total, profit, item_count)                        │
//! │   ├─ INSERT invoice_items (frozen name, barcode, price, cost)           │
//! │   └─ payment = debt?  INSERT debts (amount = total, invoice_id)         │
//! │                                                                         │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! Either every line is decremented and the invoice exists, or nothing
//! changed at all.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use kassa_core::invoice::{format_invoice_number, price_line, CheckoutRequest, InvoiceTotals};
use kassa_core::{
    CoreError, Invoice, InvoiceItem, InvoiceWithItems, PageRequest, Paginated, PaymentMethod,
    Product, Scope, ValidationError,
};

use super::{like_pattern, new_id};
use crate::error::{DbError, DbResult};

/// Filters for [`InvoiceRepository::list`]. Dates are inclusive UTC days.
#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub payment_method: Option<PaymentMethod>,
    pub cashier_id: Option<String>,
    /// Substring of invoice number or customer name.
    pub search: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    /// Records a sale. `request` must already be validated.
    ///
    /// ## Errors
    /// * `Domain(InsufficientStock)` - a line asks for more than is on hand
    /// * `Domain(ProductNotFound)` - a product id is not in this shop
    /// * `NotFound(Shop)` - shop missing or inactive
    ///
    /// On any error no stock, sequence or debt change is kept.
    pub async fn create(
        &self,
        shop_id: &str,
        cashier_id: &str,
        request: &CheckoutRequest,
        now: DateTime<Utc>,
    ) -> DbResult<InvoiceWithItems> {
        debug!(
            shop_id = %shop_id,
            lines = request.lines.len(),
            payment = request.payment_method.as_str(),
            "Creating invoice"
        );

        let mut tx = self.pool.begin().await?;

        let seq: i64 = sqlx::query_scalar(
            r#"
            UPDATE shops SET invoice_seq = invoice_seq + 1
            WHERE id = ?1 AND is_active = 1
            RETURNING invoice_seq
            "#,
        )
        .bind(shop_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::not_found("Shop", shop_id))?;

        let mut priced = Vec::with_capacity(request.lines.len());
        for line in &request.lines {
            let product = sqlx::query_as::<_, Product>(
                r#"
                UPDATE products SET stock = stock - ?3, updated_at = ?4
                WHERE id = ?1 AND shop_id = ?2 AND stock >= ?3
                RETURNING *
                "#,
            )
            .bind(&line.product_id)
            .bind(shop_id)
            .bind(line.quantity)
            .bind(now)
            .fetch_optional(&mut *tx)
            .await?;

            let product = match product {
                Some(p) => p,
                None => {
                    let current: Option<(String, i64)> = sqlx::query_as(
                        "SELECT name, stock FROM products WHERE id = ?1 AND shop_id = ?2",
                    )
                    .bind(&line.product_id)
                    .bind(shop_id)
                    .fetch_optional(&mut *tx)
                    .await?;

                    let err = match current {
                        Some((name, stock)) => CoreError::InsufficientStock {
                            product: name,
                            available: stock,
                            requested: line.quantity,
                        },
                        None => CoreError::ProductNotFound(line.product_id.clone()),
                    };
                    warn!(shop_id = %shop_id, error = %err, "Checkout rejected");
                    return Err(err.into());
                }
            };

            priced.push(price_line(&product, line.quantity)?);
        }

        let totals = InvoiceTotals::from_lines(&priced)?;
        let is_debt = request.payment_method == PaymentMethod::Debt;

        if is_debt && !totals.total.is_positive() {
            return Err(CoreError::from(ValidationError::MustBePositive {
                field: "total".to_string(),
            })
            .into());
        }

        let invoice_id = new_id();
        let debt_id = is_debt.then(new_id);
        let invoice_number = format_invoice_number(now.date_naive(), seq);

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (
                id, shop_id, invoice_number, cashier_id, payment_method,
                customer_name, customer_phone, total, profit, item_count,
                debt_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            RETURNING *
            "#,
        )
        .bind(&invoice_id)
        .bind(shop_id)
        .bind(&invoice_number)
        .bind(cashier_id)
        .bind(request.payment_method)
        .bind(&request.customer_name)
        .bind(&request.customer_phone)
        .bind(totals.total.cents())
        .bind(totals.profit.cents())
        .bind(totals.item_count)
        .bind(&debt_id)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let mut items = Vec::with_capacity(priced.len());
        for line in &priced {
            let item = sqlx::query_as::<_, InvoiceItem>(
                r#"
                INSERT INTO invoice_items (
                    id, invoice_id, product_id, name, barcode, quantity,
                    unit_price, unit_cost, line_total, line_profit
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                RETURNING *
                "#,
            )
            .bind(new_id())
            .bind(&invoice_id)
            .bind(&line.product_id)
            .bind(&line.name)
            .bind(&line.barcode)
            .bind(line.quantity)
            .bind(line.unit_price.cents())
            .bind(line.unit_cost.cents())
            .bind(line.line_total.cents())
            .bind(line.line_profit.cents())
            .fetch_one(&mut *tx)
            .await?;
            items.push(item);
        }

        if let Some(debt_id) = &debt_id {
            sqlx::query(
                r#"
                INSERT INTO debts (
                    id, shop_id, customer_name, customer_phone, amount, note,
                    due_date, status, invoice_id, reminder_count, created_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'pending', ?8, 0, ?9, ?9)
                "#,
            )
            .bind(debt_id)
            .bind(shop_id)
            .bind(request.customer_name.as_deref().unwrap_or_default())
            .bind(request.customer_phone.as_deref().unwrap_or_default())
            .bind(totals.total.cents())
            .bind(&request.note)
            .bind(request.due_date.unwrap_or_else(|| now.date_naive()))
            .bind(&invoice_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        info!(
            shop_id = %shop_id,
            invoice = %invoice.invoice_number,
            total = invoice.total,
            profit = invoice.profit,
            debt = debt_id.is_some(),
            "Invoice created"
        );

        Ok(InvoiceWithItems { invoice, items })
    }

    /// Gets an invoice with its lines.
    pub async fn get(&self, scope: &Scope, id: &str) -> DbResult<InvoiceWithItems> {
        let invoice = sqlx::query_as::<_, Invoice>(
            "SELECT * FROM invoices WHERE id = ?1 AND (?2 IS NULL OR shop_id = ?2)",
        )
        .bind(id)
        .bind(scope.shop_id())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Invoice", id))?;

        let items = sqlx::query_as::<_, InvoiceItem>(
            "SELECT * FROM invoice_items WHERE invoice_id = ?1 ORDER BY rowid",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(InvoiceWithItems { invoice, items })
    }

    /// Lists invoices newest first.
    pub async fn list(
        &self,
        scope: &Scope,
        filter: &InvoiceFilter,
        page: PageRequest,
    ) -> DbResult<Paginated<Invoice>> {
        const WHERE: &str = r#"
            WHERE (?1 IS NULL OR shop_id = ?1)
              AND (?2 IS NULL OR substr(created_at, 1, 10) >= ?2)
              AND (?3 IS NULL OR substr(created_at, 1, 10) <= ?3)
              AND (?4 IS NULL OR payment_method = ?4)
              AND (?5 IS NULL OR cashier_id = ?5)
              AND (?6 IS NULL OR invoice_number LIKE ?6 ESCAPE '\'
                              OR customer_name LIKE ?6 ESCAPE '\')
        "#;

        let search = filter
            .search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(like_pattern);

        let count_sql = format!("SELECT COUNT(*) FROM invoices {}", WHERE);
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(scope.shop_id())
            .bind(filter.from)
            .bind(filter.to)
            .bind(filter.payment_method)
            .bind(&filter.cashier_id)
            .bind(&search)
            .fetch_one(&self.pool)
            .await?;

        let list_sql = format!(
            "SELECT * FROM invoices {} ORDER BY created_at DESC, invoice_number DESC LIMIT ?7 OFFSET ?8",
            WHERE
        );
        let invoices = sqlx::query_as::<_, Invoice>(&list_sql)
            .bind(scope.shop_id())
            .bind(filter.from)
            .bind(filter.to)
            .bind(filter.payment_method)
            .bind(&filter.cashier_id)
            .bind(&search)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(Paginated::new(invoices, total, page))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing;
    use kassa_core::invoice::CheckoutLine;
    use kassa_core::DebtStatus;

    fn checkout(lines: Vec<(&str, i64)>, method: PaymentMethod) -> CheckoutRequest {
        CheckoutRequest {
            lines: lines
                .into_iter()
                .map(|(id, quantity)| CheckoutLine {
                    product_id: id.to_string(),
                    quantity,
                })
                .collect(),
            payment_method: method,
            customer_name: None,
            customer_phone: None,
            due_date: None,
            note: None,
        }
    }

    #[tokio::test]
    async fn test_create_decrements_stock_and_computes_profit() {
        let db = testing::db().await;
        let shop = testing::shop(&db, "Corner").await;
        let cashier = testing::cashier(&db, &shop, "kassir").await;
        let cola = testing::product(&db, &shop, "Cola", 50, 80, 10).await;
        let bread = testing::product(&db, &shop, "Bread", 20, 30, 5).await;

        let req = checkout(vec![(&cola.id, 3), (&bread.id, 2)], PaymentMethod::Cash);
        let created = db
            .invoices()
            .create(&shop.id, &cashier.id, &req, Utc::now())
            .await
            .unwrap();

        assert_eq!(created.invoice.total, 3 * 80 + 2 * 30);
        assert_eq!(created.invoice.profit, 3 * 30 + 2 * 10);
        assert_eq!(created.invoice.item_count, 5);
        assert!(created.invoice.invoice_number.ends_with("-000001"));
        assert_eq!(created.items.len(), 2);
        assert_eq!(created.items[0].unit_cost, 50);

        let scope = Scope::Shop(shop.id.clone());
        assert_eq!(db.products().get(&scope, &cola.id).await.unwrap().stock, 7);
        assert_eq!(db.products().get(&scope, &bread.id).await.unwrap().stock, 3);

        let again = db
            .invoices()
            .create(&shop.id, &cashier.id, &checkout(vec![(&cola.id, 1)], PaymentMethod::Bank), Utc::now())
            .await
            .unwrap();
        assert!(again.invoice.invoice_number.ends_with("-000002"));
    }

    #[tokio::test]
    async fn test_sequence_continues_across_days() {
        let db = testing::db().await;
        let shop = testing::shop(&db, "Corner").await;
        let cashier = testing::cashier(&db, &shop, "kassir").await;
        let cola = testing::product(&db, &shop, "Cola", 50, 80, 10).await;
        let req = checkout(vec![(&cola.id, 1)], PaymentMethod::Cash);

        let monday = "2026-10-12T23:59:00Z".parse::<DateTime<Utc>>().unwrap();
        let tuesday = "2026-10-13T00:01:00Z".parse::<DateTime<Utc>>().unwrap();

        let first = db.invoices().create(&shop.id, &cashier.id, &req, monday).await.unwrap();
        let second = db.invoices().create(&shop.id, &cashier.id, &req, tuesday).await.unwrap();

        assert_eq!(first.invoice.invoice_number, "INV-20261012-000001");
        assert_eq!(second.invoice.invoice_number, "INV-20261013-000002");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_checkouts_sell_last_unit_once() {
        let (db, path) = testing::file_db().await;
        let shop = testing::shop(&db, "Corner").await;
        let first = testing::cashier(&db, &shop, "first").await;
        let second = testing::cashier(&db, &shop, "second").await;
        let cola = testing::product(&db, &shop, "Cola", 50, 80, 1).await;

        let req = checkout(vec![(&cola.id, 1)], PaymentMethod::Cash);
        let invoices = db.invoices();
        let (a, b) = tokio::join!(
            invoices.create(&shop.id, &first.id, &req, Utc::now()),
            invoices.create(&shop.id, &second.id, &req, Utc::now()),
        );

        let (sold, refused): (Vec<_>, Vec<_>) = [a, b].into_iter().partition(|r| r.is_ok());
        assert_eq!(sold.len(), 1);
        assert!(matches!(
            refused[0],
            Err(DbError::Domain(CoreError::InsufficientStock { .. }))
        ));

        let scope = Scope::Shop(shop.id.clone());
        assert_eq!(db.products().get(&scope, &cola.id).await.unwrap().stock, 0);
        let history = db
            .invoices()
            .list(&scope, &InvoiceFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(history.total, 1);

        testing::remove_file_db(db, path).await;
    }

    #[tokio::test]
    async fn test_shortfall_rolls_back_every_line() {
        let db = testing::db().await;
        let shop = testing::shop(&db, "Corner").await;
        let cashier = testing::cashier(&db, &shop, "kassir").await;
        let cola = testing::product(&db, &shop, "Cola", 50, 80, 10).await;
        let bread = testing::product(&db, &shop, "Bread", 20, 30, 1).await;

        let req = checkout(vec![(&cola.id, 3), (&bread.id, 2)], PaymentMethod::Cash);
        let err = db
            .invoices()
            .create(&shop.id, &cashier.id, &req, Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DbError::Domain(CoreError::InsufficientStock { available: 1, requested: 2, .. })
        ));

        let scope = Scope::Shop(shop.id.clone());
        assert_eq!(db.products().get(&scope, &cola.id).await.unwrap().stock, 10);
        assert_eq!(db.shops().get(&shop.id).await.unwrap().invoice_seq, 0);
        let list = db
            .invoices()
            .list(&scope, &InvoiceFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(list.total, 0);
    }

    #[tokio::test]
    async fn test_product_from_other_shop_is_not_sold() {
        let db = testing::db().await;
        let a = testing::shop(&db, "A").await;
        let b = testing::shop(&db, "B").await;
        let cashier = testing::cashier(&db, &a, "kassir").await;
        let foreign = testing::product(&db, &b, "Cola", 50, 80, 10).await;

        let err = db
            .invoices()
            .create(&a.id, &cashier.id, &checkout(vec![(&foreign.id, 1)], PaymentMethod::Cash), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::ProductNotFound(_))));

        let stock = db.products().get(&Scope::All, &foreign.id).await.unwrap().stock;
        assert_eq!(stock, 10);
    }

    #[tokio::test]
    async fn test_debt_payment_creates_linked_debt() {
        let db = testing::db().await;
        let shop = testing::shop(&db, "Corner").await;
        let cashier = testing::cashier(&db, &shop, "kassir").await;
        let cola = testing::product(&db, &shop, "Cola", 50, 80, 10).await;

        let mut req = checkout(vec![(&cola.id, 2)], PaymentMethod::Debt);
        req.customer_name = Some("Aibek".into());
        req.customer_phone = Some("+996555123456".into());
        req.due_date = NaiveDate::from_ymd_opt(2026, 11, 1);

        let created = db
            .invoices()
            .create(&shop.id, &cashier.id, &req, Utc::now())
            .await
            .unwrap();
        let debt_id = created.invoice.debt_id.clone().unwrap();

        let debt = db.debts().get(&Scope::Shop(shop.id.clone()), &debt_id).await.unwrap();
        assert_eq!(debt.amount, 160);
        assert_eq!(debt.status, DebtStatus::Pending);
        assert_eq!(debt.invoice_id.as_deref(), Some(created.invoice.id.as_str()));
        assert_eq!(debt.customer_name, "Aibek");
    }

    #[tokio::test]
    async fn test_get_and_list_respect_scope() {
        let db = testing::db().await;
        let a = testing::shop(&db, "A").await;
        let b = testing::shop(&db, "B").await;
        let cashier = testing::cashier(&db, &a, "kassir").await;
        let cola = testing::product(&db, &a, "Cola", 50, 80, 10).await;

        let created = db
            .invoices()
            .create(&a.id, &cashier.id, &checkout(vec![(&cola.id, 1)], PaymentMethod::Transfer), Utc::now())
            .await
            .unwrap();

        let scope_b = Scope::Shop(b.id.clone());
        assert!(db.invoices().get(&scope_b, &created.invoice.id).await.is_err());

        let fetched = db.invoices().get(&Scope::All, &created.invoice.id).await.unwrap();
        assert_eq!(fetched.items.len(), 1);

        let filter = InvoiceFilter {
            payment_method: Some(PaymentMethod::Cash),
            ..Default::default()
        };
        let none = db.invoices().list(&Scope::All, &filter, PageRequest::default()).await.unwrap();
        assert_eq!(none.total, 0);

        let today = Utc::now().date_naive();
        let filter = InvoiceFilter {
            from: Some(today),
            to: Some(today),
            ..Default::default()
        };
        let page = db.invoices().list(&Scope::All, &filter, PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 1);
    }
}
