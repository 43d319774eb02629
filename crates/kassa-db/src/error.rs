//! # Database Error Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  sqlx::Error                         Business rule hit mid-transaction  │
//! │       │                                    (CoreError)                  │
//! │       ▼                                        │                        │
//! │  DbError ◄─────────────────────────────────────┘                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ApiError (kassa-api) → HTTP status + { code, message }                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use kassa_core::CoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found, or not visible in the caller's scope.
    ///
    /// A record in another shop reports `NotFound`, never `Forbidden`, so
    /// ids cannot be enumerated across tenants.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// A UNIQUE index rejected the write (barcode per shop, username).
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// A business rule failed inside a repository operation
    /// (insufficient stock, deleting a product that was sold, ...).
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// The pool could not hand out a connection: closed, timed out, or the
    /// file could not be opened.
    #[error("Database unavailable: {0}")]
    Unavailable(String),

    /// The write lock was still held when `busy_timeout` ran out.
    #[error("Database is locked")]
    Locked,

    #[error("Migration failed: {0}")]
    Migration(String),

    /// Any other statement failure. The message may contain SQL and must
    /// not reach clients.
    #[error("Statement failed: {0}")]
    Statement(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            field: field.into(),
            value: value.into(),
        }
    }

    /// A `CoreError::Conflict` raised from storage.
    pub fn conflict(reason: impl Into<String>) -> Self {
        DbError::Domain(CoreError::Conflict(reason.into()))
    }

    /// Fills in the offending value of a `UniqueViolation`; SQLite only
    /// names the columns.
    pub fn with_value(self, value: impl Into<String>) -> Self {
        match self {
            DbError::UniqueViolation { field, .. } => DbError::UniqueViolation {
                field,
                value: value.into(),
            },
            other => other,
        }
    }

    /// Whether retrying later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, DbError::Unavailable(_) | DbError::Locked)
    }
}

/// Last column named in "UNIQUE constraint failed: products.shop_id, products.barcode".
fn unique_column(columns: &str) -> String {
    columns
        .rsplit(", ")
        .next()
        .and_then(|c| c.rsplit('.').next())
        .unwrap_or(columns)
        .to_string()
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                if let Some(columns) = msg.strip_prefix("UNIQUE constraint failed: ") {
                    DbError::duplicate(unique_column(columns), "unknown")
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("database is locked") {
                    DbError::Locked
                } else {
                    DbError::Statement(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::Unavailable("timed out waiting for a connection".into()),
            sqlx::Error::PoolClosed => DbError::Unavailable("pool is closed".into()),
            sqlx::Error::Io(e) => DbError::Unavailable(e.to_string()),

            other => DbError::Statement(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::Migration(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;
