//! # Product Repository
//!
//! Catalog CRUD, manual stock adjustments and bulk import.
//!
//! Sales never touch stock through this repository; the checkout
//! decrement happens inside the invoice transaction
//! (see [`InvoiceRepository::create`](super::InvoiceRepository::create)).
//!
//! ## Search
//! ```text
//! GET /api/products?search=cola&category=drinks&low_stock=true
//!      │
//!      ▼
//! WHERE shop scope
//!   AND (name LIKE '%cola%' OR barcode LIKE '%cola%')
//!   AND category = 'drinks'
//!   AND stock <= low_stock_threshold
//! ORDER BY name
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use kassa_core::validation::validate_stock;
use kassa_core::{
    CoreError, ImportSummary, NewProduct, PageRequest, Paginated, Product, ProductImportRow,
    ProductUpdate, Scope, ValidationError, MAX_STOCK,
};

use super::{like_pattern, new_id};
use crate::error::{DbError, DbResult};

/// Used when neither the request nor the shop settings give a threshold.
const FALLBACK_LOW_STOCK_THRESHOLD: i64 = 5;

/// Filters for [`ProductRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    /// Substring of name or barcode.
    pub search: Option<String>,
    pub category: Option<String>,
    pub low_stock_only: bool,
}

#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Creates a product. A missing threshold falls back to the shop's
    /// `default_low_stock_threshold`.
    pub async fn create(&self, shop_id: &str, product: NewProduct) -> DbResult<Product> {
        let id = new_id();
        let now = Utc::now();

        debug!(shop_id = %shop_id, name = %product.name, "Creating product");

        let created = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (
                id, shop_id, name, barcode, category,
                bought_price, sale_price, stock, low_stock_threshold,
                created_at, updated_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
                COALESCE(
                    ?9,
                    (SELECT default_low_stock_threshold FROM shop_settings WHERE shop_id = ?2),
                    ?10
                ),
                ?11, ?11
            )
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(shop_id)
        .bind(&product.name)
        .bind(&product.barcode)
        .bind(&product.category)
        .bind(product.bought_price)
        .bind(product.sale_price)
        .bind(product.stock)
        .bind(product.low_stock_threshold)
        .bind(FALLBACK_LOW_STOCK_THRESHOLD)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::from(e).with_value(product.barcode.clone().unwrap_or_default()))?;

        info!(shop_id = %shop_id, product_id = %created.id, "Product created");
        Ok(created)
    }

    /// Gets a product visible in `scope`.
    pub async fn get(&self, scope: &Scope, id: &str) -> DbResult<Product> {
        sqlx::query_as::<_, Product>(
            "SELECT * FROM products WHERE id = ?1 AND (?2 IS NULL OR shop_id = ?2)",
        )
        .bind(id)
        .bind(scope.shop_id())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Barcode lookup for the checkout scanner. Barcodes are unique per
    /// shop, so a concrete shop is required.
    pub async fn find_by_barcode(&self, shop_id: &str, barcode: &str) -> DbResult<Product> {
        sqlx::query_as::<_, Product>("SELECT * FROM products WHERE shop_id = ?1 AND barcode = ?2")
            .bind(shop_id)
            .bind(barcode)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::not_found("Product", barcode))
    }

    pub async fn list(
        &self,
        scope: &Scope,
        filter: &ProductFilter,
        page: PageRequest,
    ) -> DbResult<Paginated<Product>> {
        const WHERE: &str = r#"
            WHERE (?1 IS NULL OR shop_id = ?1)
              AND (?2 IS NULL OR name LIKE ?2 ESCAPE '\' OR barcode LIKE ?2 ESCAPE '\')
              AND (?3 IS NULL OR category = ?3)
              AND (?4 = 0 OR stock <= low_stock_threshold)
        "#;

        let shop_id = scope.shop_id();
        let search = filter
            .search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(like_pattern);
        let category = filter.category.as_deref().filter(|c| !c.is_empty());

        let count_sql = format!("SELECT COUNT(*) FROM products {}", WHERE);
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(shop_id)
            .bind(&search)
            .bind(category)
            .bind(filter.low_stock_only)
            .fetch_one(&self.pool)
            .await?;

        let list_sql = format!(
            "SELECT * FROM products {} ORDER BY name COLLATE NOCASE, id LIMIT ?5 OFFSET ?6",
            WHERE
        );
        let products = sqlx::query_as::<_, Product>(&list_sql)
            .bind(shop_id)
            .bind(&search)
            .bind(category)
            .bind(filter.low_stock_only)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        debug!(count = products.len(), total, "Listed products");
        Ok(Paginated::new(products, total, page))
    }

    /// Applies a partial update. An empty `barcode` or `category` clears it.
    pub async fn update(&self, shop_id: &str, id: &str, update: ProductUpdate) -> DbResult<Product> {
        let barcode_value = update.barcode.clone().unwrap_or_default();

        sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET
                name                = COALESCE(?3, name),
                barcode             = CASE WHEN ?4 IS NULL THEN barcode
                                           WHEN ?4 = '' THEN NULL ELSE ?4 END,
                category            = CASE WHEN ?5 IS NULL THEN category
                                           WHEN ?5 = '' THEN NULL ELSE ?5 END,
                bought_price        = COALESCE(?6, bought_price),
                sale_price          = COALESCE(?7, sale_price),
                low_stock_threshold = COALESCE(?8, low_stock_threshold),
                updated_at          = ?9
            WHERE id = ?1 AND shop_id = ?2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(shop_id)
        .bind(&update.name)
        .bind(&update.barcode)
        .bind(&update.category)
        .bind(update.bought_price)
        .bind(update.sale_price)
        .bind(update.low_stock_threshold)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DbError::from(e).with_value(barcode_value))?
        .ok_or_else(|| DbError::not_found("Product", id))
    }

    /// Deletes a product that has never been sold.
    ///
    /// Sold products are referenced by invoice lines and stay in the
    /// catalog (set stock to zero instead).
    pub async fn delete(&self, shop_id: &str, id: &str) -> DbResult<()> {
        let sold: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM invoice_items ii
            JOIN products p ON p.id = ii.product_id
            WHERE p.id = ?1 AND p.shop_id = ?2
            "#,
        )
        .bind(id)
        .bind(shop_id)
        .fetch_one(&self.pool)
        .await?;

        if sold > 0 {
            return Err(DbError::conflict("product appears on invoices and cannot be deleted"));
        }

        let result = sqlx::query("DELETE FROM products WHERE id = ?1 AND shop_id = ?2")
            .bind(id)
            .bind(shop_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        info!(shop_id = %shop_id, product_id = %id, "Product deleted");
        Ok(())
    }

    /// Adds `delta` (negative for write-offs) to stock. The result stays
    /// within `0..=MAX_STOCK`.
    ///
    /// The bounds are checked as `-stock <= delta <= MAX_STOCK - stock` so
    /// SQLite never evaluates an overflowing `stock + delta`.
    pub async fn adjust_stock(&self, shop_id: &str, id: &str, delta: i64) -> DbResult<Product> {
        let updated = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products SET stock = stock + ?3, updated_at = ?4
            WHERE id = ?1 AND shop_id = ?2
              AND ?3 >= -stock AND ?3 <= ?5 - stock
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(shop_id)
        .bind(delta)
        .bind(Utc::now())
        .bind(MAX_STOCK)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(product) = updated {
            info!(product_id = %id, delta, stock = product.stock, "Stock adjusted");
            return Ok(product);
        }

        let current = self.get(&Scope::Shop(shop_id.to_string()), id).await?;
        let err = if delta > 0 {
            CoreError::from(ValidationError::OutOfRange {
                field: "stock".to_string(),
                min: 0,
                max: MAX_STOCK,
            })
        } else {
            CoreError::InsufficientStock {
                product: current.name,
                available: current.stock,
                requested: delta.saturating_neg(),
            }
        };
        Err(err.into())
    }

    /// Upserts rows by barcode in one transaction.
    ///
    /// A row whose barcode exists in the shop overwrites that product's
    /// name, category, prices and stock; other rows create products. Any
    /// failing row rolls back the whole import.
    pub async fn import(&self, shop_id: &str, rows: Vec<ProductImportRow>) -> DbResult<ImportSummary> {
        let now = Utc::now();
        let mut summary = ImportSummary::default();
        let mut tx = self.pool.begin().await?;

        for row in &rows {
            validate_stock("stock", row.stock).map_err(CoreError::from)?;

            let updated = sqlx::query(
                r#"
                UPDATE products SET
                    name = ?3, category = ?4, bought_price = ?5,
                    sale_price = ?6, stock = ?7, updated_at = ?8
                WHERE shop_id = ?1 AND barcode = ?2
                "#,
            )
            .bind(shop_id)
            .bind(&row.barcode)
            .bind(&row.name)
            .bind(&row.category)
            .bind(row.bought_price)
            .bind(row.sale_price)
            .bind(row.stock)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() > 0 {
                summary.updated += 1;
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO products (
                    id, shop_id, name, barcode, category,
                    bought_price, sale_price, stock, low_stock_threshold,
                    created_at, updated_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8,
                    COALESCE(
                        (SELECT default_low_stock_threshold FROM shop_settings WHERE shop_id = ?2),
                        ?9
                    ),
                    ?10, ?10
                )
                "#,
            )
            .bind(new_id())
            .bind(shop_id)
            .bind(&row.name)
            .bind(&row.barcode)
            .bind(&row.category)
            .bind(row.bought_price)
            .bind(row.sale_price)
            .bind(row.stock)
            .bind(FALLBACK_LOW_STOCK_THRESHOLD)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| DbError::from(e).with_value(row.barcode.clone()))?;

            summary.created += 1;
        }

        tx.commit().await?;

        info!(
            shop_id = %shop_id,
            created = summary.created,
            updated = summary.updated,
            "Products imported"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing;

    fn import_row(barcode: &str, name: &str, stock: i64) -> ProductImportRow {
        ProductImportRow {
            name: name.to_string(),
            barcode: barcode.to_string(),
            category: Some("drinks".to_string()),
            bought_price: 50,
            sale_price: 80,
            stock,
        }
    }

    #[tokio::test]
    async fn test_create_uses_shop_default_threshold() {
        let db = testing::db().await;
        let shop = testing::shop(&db, "Corner").await;
        let mut settings = db.settings().get_or_default(&shop.id).await.unwrap();
        settings.default_low_stock_threshold = 12;
        db.settings().upsert(&settings).await.unwrap();

        let product = db
            .products()
            .create(
                &shop.id,
                NewProduct {
                    name: "Milk".into(),
                    barcode: Some("MILK-1".into()),
                    category: None,
                    bought_price: 60,
                    sale_price: 90,
                    stock: 3,
                    low_stock_threshold: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(product.low_stock_threshold, 12);

        let found = db.products().find_by_barcode(&shop.id, "MILK-1").await.unwrap();
        assert_eq!(found.id, product.id);
    }

    #[tokio::test]
    async fn test_barcode_unique_per_shop_only() {
        let db = testing::db().await;
        let a = testing::shop(&db, "A").await;
        let b = testing::shop(&db, "B").await;
        let new = |code: &str| NewProduct {
            name: "Cola".into(),
            barcode: Some(code.into()),
            category: None,
            bought_price: 1,
            sale_price: 2,
            stock: 0,
            low_stock_threshold: None,
        };

        db.products().create(&a.id, new("123")).await.unwrap();
        db.products().create(&b.id, new("123")).await.unwrap();

        let err = db.products().create(&a.id, new("123")).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref field, .. } if field == "barcode"));
    }

    #[tokio::test]
    async fn test_list_filters_and_scope() {
        let db = testing::db().await;
        let a = testing::shop(&db, "A").await;
        let b = testing::shop(&db, "B").await;
        testing::product(&db, &a, "Cola", 50, 80, 10).await;
        testing::product(&db, &a, "Cola Zero", 50, 80, 1).await;
        testing::product(&db, &a, "Bread", 20, 30, 10).await;
        testing::product(&db, &b, "Cola", 50, 80, 10).await;

        let scope_a = Scope::Shop(a.id.clone());
        let filter = ProductFilter {
            search: Some("cola".into()),
            ..Default::default()
        };
        let page = db.products().list(&scope_a, &filter, PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 2);

        let low = ProductFilter {
            low_stock_only: true,
            ..Default::default()
        };
        let page = db.products().list(&scope_a, &low, PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].name, "Cola Zero");

        let all = db
            .products()
            .list(&Scope::All, &ProductFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(all.total, 4);
    }

    #[tokio::test]
    async fn test_update_clears_barcode() {
        let db = testing::db().await;
        let shop = testing::shop(&db, "Corner").await;
        let product = db
            .products()
            .create(
                &shop.id,
                NewProduct {
                    name: "Tea".into(),
                    barcode: Some("TEA".into()),
                    category: Some("hot".into()),
                    bought_price: 10,
                    sale_price: 20,
                    stock: 1,
                    low_stock_threshold: None,
                },
            )
            .await
            .unwrap();

        let updated = db
            .products()
            .update(
                &shop.id,
                &product.id,
                ProductUpdate {
                    barcode: Some(String::new()),
                    sale_price: Some(25),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.barcode, None);
        assert_eq!(updated.category.as_deref(), Some("hot"));
        assert_eq!(updated.sale_price, 25);
    }

    #[tokio::test]
    async fn test_update_in_other_shop_is_not_found() {
        let db = testing::db().await;
        let a = testing::shop(&db, "A").await;
        let b = testing::shop(&db, "B").await;
        let product = testing::product(&db, &a, "Tea", 1, 2, 1).await;

        let err = db
            .products()
            .update(&b.id, &product.id, ProductUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_adjust_stock_never_negative() {
        let db = testing::db().await;
        let shop = testing::shop(&db, "Corner").await;
        let product = testing::product(&db, &shop, "Tea", 1, 2, 3).await;

        let p = db.products().adjust_stock(&shop.id, &product.id, 7).await.unwrap();
        assert_eq!(p.stock, 10);

        let err = db.products().adjust_stock(&shop.id, &product.id, -11).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::InsufficientStock { available: 10, requested: 11, .. })
        ));
    }

    #[tokio::test]
    async fn test_adjust_stock_respects_upper_bound() {
        let db = testing::db().await;
        let shop = testing::shop(&db, "Corner").await;
        let product = testing::product(&db, &shop, "Tea", 1, 2, MAX_STOCK - 1).await;

        let p = db.products().adjust_stock(&shop.id, &product.id, 1).await.unwrap();
        assert_eq!(p.stock, MAX_STOCK);

        let err = db.products().adjust_stock(&shop.id, &product.id, 10).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Domain(CoreError::Validation(ValidationError::OutOfRange { .. }))
        ));

        let err = db
            .products()
            .adjust_stock(&shop.id, &product.id, i64::MAX)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));

        let err = db
            .products()
            .adjust_stock(&shop.id, &product.id, i64::MIN)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::InsufficientStock { .. })));

        // The row is still readable and unchanged.
        let scope = Scope::Shop(shop.id.clone());
        let fresh = db.products().get(&scope, &product.id).await.unwrap();
        assert_eq!(fresh.stock, MAX_STOCK);
    }

    #[tokio::test]
    async fn test_import_upserts_by_barcode() {
        let db = testing::db().await;
        let shop = testing::shop(&db, "Corner").await;

        let first = db
            .products()
            .import(&shop.id, vec![import_row("A1", "Cola", 10), import_row("B2", "Fanta", 5)])
            .await
            .unwrap();
        assert_eq!(first, ImportSummary { created: 2, updated: 0 });

        let second = db
            .products()
            .import(&shop.id, vec![import_row("A1", "Cola 0.5", 7), import_row("C3", "Sprite", 1)])
            .await
            .unwrap();
        assert_eq!(second, ImportSummary { created: 1, updated: 1 });

        let cola = db.products().find_by_barcode(&shop.id, "A1").await.unwrap();
        assert_eq!(cola.name, "Cola 0.5");
        assert_eq!(cola.stock, 7);
    }

    #[tokio::test]
    async fn test_import_out_of_range_stock_rolls_back() {
        let db = testing::db().await;
        let shop = testing::shop(&db, "Corner").await;

        let err = db
            .products()
            .import(&shop.id, vec![import_row("A1", "Cola", 10), import_row("B2", "Fanta", MAX_STOCK + 1)])
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Domain(CoreError::Validation(_))));
        assert!(db.products().find_by_barcode(&shop.id, "A1").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_unsold_product() {
        let db = testing::db().await;
        let shop = testing::shop(&db, "Corner").await;
        let product = testing::product(&db, &shop, "Tea", 1, 2, 3).await;

        db.products().delete(&shop.id, &product.id).await.unwrap();
        assert!(db
            .products()
            .get(&Scope::Shop(shop.id.clone()), &product.id)
            .await
            .is_err());
    }
}
