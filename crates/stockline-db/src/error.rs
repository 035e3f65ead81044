//! # Storage Errors
//!
//! `DbError` sorts sqlx failures into the few cases the ledger reacts to
//! differently. Everything else is opaque and surfaces as a persistence
//! error.
//!
//! ```text
//! sqlx::Error
//!   ├── RowNotFound ──────────────────────────► NotFound
//!   ├── Database(UNIQUE …) ──────────────────► UniqueViolation ─► aggregate upsert re-runs
//!   ├── Database(FOREIGN KEY …) ─────────────► ForeignKeyViolation
//!   ├── Database(code 5 / 6 / 517) ──────────► Busy ─┐
//!   │                                                 ├─► unit of work retries
//!   │   versioned UPDATE touched 0 rows ─────► Conflict ┘
//!   ├── PoolTimedOut ─────────────────────────► PoolExhausted
//!   └── anything else ───────────────────────► QueryFailed / Internal
//! ```

use thiserror::Error;

/// Result type for repository functions.
pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    /// No row with this id in the caller's organization (or it is inactive).
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// `constraint` is what SQLite reports, e.g.
    /// `product_variant_stocks.variant_id, product_variant_stocks.location_id`.
    #[error("Unique constraint failed: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("Foreign key constraint failed: {message}")]
    ForeignKeyViolation { message: String },

    /// A versioned update matched no row.
    ///
    /// ```text
    /// sale A reads batch v3          sale B reads batch v3
    /// sale A: UPDATE … version = 3   → v4
    ///                                sale B: UPDATE … version = 3 → 0 rows
    /// ```
    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: String, id: String },

    /// The write lock was not granted within the busy timeout.
    #[error("Database busy: {0}")]
    Busy(String),

    /// A stored TEXT value did not parse (decimal, enum, JSON).
    #[error("Unreadable value in {column}: '{value}'")]
    Decode { column: String, value: String },

    #[error("Cannot open database: {0}")]
    ConnectionFailed(String),

    #[error("Schema migration failed: {0}")]
    MigrationFailed(String),

    #[error("Statement failed: {0}")]
    QueryFailed(String),

    #[error("No database connection available")]
    PoolExhausted,

    #[error("Database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// A stale versioned update.
    pub fn conflict(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::Conflict {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }

    /// Lost update or lock contention: re-running the whole operation may succeed.
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(self, DbError::Conflict { .. } | DbError::Busy(_))
    }
}

// SQLite result codes for lock contention
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";
const SQLITE_BUSY_SNAPSHOT: &str = "517";

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        let db_err = match err {
            sqlx::Error::RowNotFound => return DbError::not_found("Row", "?"),
            sqlx::Error::PoolTimedOut => return DbError::PoolExhausted,
            sqlx::Error::PoolClosed => {
                return DbError::ConnectionFailed("pool is closed".to_string())
            }
            sqlx::Error::Database(db_err) => db_err,
            other => return DbError::Internal(other.to_string()),
        };

        let message = db_err.message().to_string();
        let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();

        match db_err.kind() {
            sqlx::error::ErrorKind::UniqueViolation => DbError::UniqueViolation {
                constraint: message
                    .strip_prefix("UNIQUE constraint failed: ")
                    .unwrap_or(&message)
                    .to_string(),
            },
            sqlx::error::ErrorKind::ForeignKeyViolation => {
                DbError::ForeignKeyViolation { message }
            }
            _ if matches!(code.as_str(), SQLITE_BUSY | SQLITE_LOCKED | SQLITE_BUSY_SNAPSHOT) => {
                DbError::Busy(message)
            }
            _ => DbError::QueryFailed(message),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[test]
    fn test_concurrency_classification() {
        assert!(DbError::conflict("StockBatch", "b-1").is_concurrency_conflict());
        assert!(DbError::Busy("database is locked".into()).is_concurrency_conflict());
        assert!(!DbError::not_found("StockBatch", "b-1").is_concurrency_conflict());
        assert!(!DbError::QueryFailed("syntax error".into()).is_concurrency_conflict());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_unique_violation_names_the_constraint() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();

        let insert = "INSERT INTO locations (id, organization_id, name) VALUES ('loc-1', 'org', 'Shop')";
        sqlx::query(insert).execute(&mut *conn).await.unwrap();
        let err: DbError = sqlx::query(insert).execute(&mut *conn).await.unwrap_err().into();

        match err {
            DbError::UniqueViolation { constraint } => assert_eq!(constraint, "locations.id"),
            other => panic!("expected unique violation, got {other:?}"),
        }
    }
}
