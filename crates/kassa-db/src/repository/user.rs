//! # User Repository
//!
//! Staff accounts. Password hashes are written and read here but never
//! leave the crate inside a `User`; only login sees `UserCredentials`.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};

use kassa_core::{PageRequest, Paginated, Role, Scope, User};

use super::new_id;
use crate::error::{DbError, DbResult};

/// A user plus their password hash, for login only.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserCredentials {
    #[sqlx(flatten)]
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Inserts a user. `shop_id` must be `None` exactly when `role` is admin.
    pub async fn create(
        &self,
        shop_id: Option<&str>,
        username: &str,
        display_name: &str,
        role: Role,
        password_hash: &str,
    ) -> DbResult<User> {
        let id = new_id();
        let now = Utc::now();

        debug!(id = %id, username = %username, role = role.as_str(), "Creating user");

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (
                id, shop_id, username, display_name, password_hash,
                role, is_active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, ?7)
            RETURNING *
            "#,
        )
        .bind(&id)
        .bind(shop_id)
        .bind(username)
        .bind(display_name)
        .bind(password_hash)
        .bind(role)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::from(e).with_value(username))?;

        info!(user_id = %user.id, shop_id = ?user.shop_id, "User created");
        Ok(user)
    }

    /// Gets a user visible in `scope`.
    pub async fn get(&self, scope: &Scope, id: &str) -> DbResult<User> {
        sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE id = ?1 AND (?2 IS NULL OR shop_id = ?2)",
        )
        .bind(id)
        .bind(scope.shop_id())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("User", id))
    }

    /// Looks up a login. Usernames are stored lowercase.
    pub async fn find_by_username(&self, username: &str) -> DbResult<Option<UserCredentials>> {
        let creds = sqlx::query_as::<_, UserCredentials>(
            "SELECT * FROM users WHERE username = ?1",
        )
        .bind(username.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(creds)
    }

    pub async fn list(&self, scope: &Scope, page: PageRequest) -> DbResult<Paginated<User>> {
        let shop_id = scope.shop_id();

        let total: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE (?1 IS NULL OR shop_id = ?1)")
                .bind(shop_id)
                .fetch_one(&self.pool)
                .await?;

        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT * FROM users
            WHERE (?1 IS NULL OR shop_id = ?1)
            ORDER BY username
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(shop_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(Paginated::new(users, total, page))
    }

    /// Updates profile fields. `None` leaves a field unchanged.
    pub async fn update(
        &self,
        scope: &Scope,
        id: &str,
        display_name: Option<&str>,
        role: Option<Role>,
        is_active: Option<bool>,
    ) -> DbResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                display_name = COALESCE(?3, display_name),
                role         = COALESCE(?4, role),
                is_active    = COALESCE(?5, is_active),
                updated_at   = ?6
            WHERE id = ?1 AND (?2 IS NULL OR shop_id = ?2)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(scope.shop_id())
        .bind(display_name)
        .bind(role)
        .bind(is_active)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::not_found("User", id))
    }

    pub async fn set_password(&self, id: &str, password_hash: &str) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE users SET password_hash = ?2, updated_at = ?3 WHERE id = ?1")
                .bind(id)
                .bind(password_hash)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", id));
        }

        info!(user_id = %id, "Password changed");
        Ok(())
    }

    /// Deletes a user who never rang up a sale. Users with invoices can
    /// only be deactivated.
    pub async fn delete(&self, scope: &Scope, id: &str) -> DbResult<()> {
        let user = self.get(scope, id).await?;

        let invoices: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices WHERE cashier_id = ?1")
            .bind(&user.id)
            .fetch_one(&self.pool)
            .await?;

        if invoices > 0 {
            return Err(DbError::conflict(
                "user has recorded invoices; deactivate the account instead",
            ));
        }

        sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(&user.id)
            .execute(&self.pool)
            .await?;

        info!(user_id = %id, "User deleted");
        Ok(())
    }

    /// Number of active admins. The seed binary uses it to stay idempotent.
    pub async fn count_admins(&self) -> DbResult<i64> {
        let count = sqlx::query_scalar(
            "SELECT COUNT(*) FROM users WHERE role = 'admin' AND is_active = 1",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::testing;

    #[tokio::test]
    async fn test_create_and_find_by_username() {
        let db = testing::db().await;
        let shop = testing::shop(&db, "Corner").await;
        let user = testing::cashier(&db, &shop, "kassir").await;

        let creds = db.users().find_by_username(" KASSIR ").await.unwrap().unwrap();
        assert_eq!(creds.user.id, user.id);
        assert_eq!(creds.password_hash, "hash");
        assert_eq!(creds.user.role, Role::Cashier);

        assert!(db.users().find_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_is_unique_violation() {
        let db = testing::db().await;
        let shop = testing::shop(&db, "Corner").await;
        testing::cashier(&db, &shop, "kassir").await;

        let err = db
            .users()
            .create(Some(&shop.id), "kassir", "Other", Role::Cashier, "h")
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { ref value, .. } if value == "kassir"));
    }

    #[tokio::test]
    async fn test_scope_hides_other_shops() {
        let db = testing::db().await;
        let a = testing::shop(&db, "A").await;
        let b = testing::shop(&db, "B").await;
        let user = testing::cashier(&db, &a, "kassir").await;

        let other = Scope::Shop(b.id.clone());
        assert!(db.users().get(&other, &user.id).await.is_err());
        assert!(db.users().get(&Scope::All, &user.id).await.is_ok());
        assert_eq!(db.users().list(&other, PageRequest::default()).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let db = testing::db().await;
        let shop = testing::shop(&db, "Corner").await;
        let user = testing::cashier(&db, &shop, "kassir").await;
        let scope = Scope::Shop(shop.id.clone());

        let updated = db
            .users()
            .update(&scope, &user.id, Some("Head Cashier"), None, Some(false))
            .await
            .unwrap();
        assert_eq!(updated.display_name, "Head Cashier");
        assert!(!updated.is_active);
        assert_eq!(updated.role, Role::Cashier);

        db.users().delete(&scope, &user.id).await.unwrap();
        assert!(db.users().get(&scope, &user.id).await.is_err());
    }

    #[tokio::test]
    async fn test_admin_has_no_shop() {
        let db = testing::db().await;
        db.users()
            .create(None, "root", "Root", Role::Admin, "h")
            .await
            .unwrap();
        assert_eq!(db.users().count_admins().await.unwrap(), 1);

        let shop = testing::shop(&db, "Corner").await;
        let bad = db
            .users()
            .create(Some(&shop.id), "root2", "Root", Role::Admin, "h")
            .await;
        assert!(bad.is_err());
    }
}
