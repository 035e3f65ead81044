//! # Unit of Work
//!
//! The explicit transaction boundary every ledger mutation runs inside.
//!
//! ## Attempt Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  attempt 1                                                              │
//! │    begin ──► work(tx) ──► Ok  ──► commit ──► done                       │
//! │                      └──► Err ──► rollback                              │
//! │                                     │                                   │
//! │                   ConcurrencyConflict and attempts left?                │
//! │                       │ yes                    │ no                     │
//! │                       ▼                        ▼                        │
//! │  attempt 2 (from scratch: re-read, re-select)  surface the error        │
//! │                                                                         │
//! │  deadline hit at any point ──► future dropped ──► tx dropped ──►        │
//! │                                rolled back ──► LedgerError::Timeout     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The work closure owns the transaction for the duration of the attempt
//! and hands it back with its result, so the boundary (commit or rollback)
//! is decided here and nowhere else.

use std::future::Future;

use sqlx::{Sqlite, Transaction};
use stockline_db::Database;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};

/// A transaction handed to one attempt.
pub type Tx = Transaction<'static, Sqlite>;

/// Runs `work` in a transaction, committing on `Ok` and rolling back on `Err`.
///
/// A [`ConcurrencyConflict`](crate::ErrorKind::ConcurrencyConflict) re-runs
/// the whole closure until `config.max_attempts` is reached. Each attempt is
/// bounded by `config.operation_timeout`.
///
/// ## Example
/// ```rust,ignore
/// let sale = unit_of_work::run(&db, &config, "sale", |tx| async move {
///     let mut tx = tx;
///     let result = record_sale(&mut tx, &request).await;
///     (tx, result)
/// })
/// .await?;
/// ```
pub async fn run<T, F, Fut>(
    db: &Database,
    config: &LedgerConfig,
    operation: &'static str,
    mut work: F,
) -> LedgerResult<T>
where
    F: FnMut(Tx) -> Fut,
    Fut: Future<Output = (Tx, LedgerResult<T>)>,
{
    let mut attempt = 1;

    loop {
        let result = match timeout(config.operation_timeout, attempt_once(db, &mut work)).await {
            Ok(result) => result,
            Err(_) => Err(LedgerError::Timeout {
                operation,
                after: config.operation_timeout,
            }),
        };

        match result {
            Err(err) if err.is_retryable() && attempt < config.max_attempts => {
                warn!(
                    operation,
                    attempt,
                    error = %err,
                    "Concurrency conflict, retrying unit of work"
                );
                attempt += 1;
            }
            other => return other,
        }
    }
}

async fn attempt_once<T, F, Fut>(db: &Database, work: &mut F) -> LedgerResult<T>
where
    F: FnMut(Tx) -> Fut,
    Fut: Future<Output = (Tx, LedgerResult<T>)>,
{
    let tx = db.begin().await?;
    let (tx, result) = work(tx).await;

    match result {
        Ok(value) => {
            tx.commit().await.map_err(stockline_db::DbError::from)?;
            debug!("Unit of work committed");
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use stockline_db::{DbConfig, DbError};

    async fn setup() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn location_count(db: &Database) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM locations")
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    async fn insert_location(tx: &mut Tx, id: &str) -> LedgerResult<()> {
        sqlx::query("INSERT INTO locations (id, organization_id, name) VALUES (?1, 'org', 'Shop')")
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(DbError::from)?;
        Ok(())
    }

    #[tokio::test]
    async fn test_commits_on_success() {
        let db = setup().await;
        run(&db, &LedgerConfig::default(), "test", |tx| async move {
            let mut tx = tx;
            let result = insert_location(&mut tx, "loc-1").await;
            (tx, result)
        })
        .await
        .unwrap();

        assert_eq!(location_count(&db).await, 1);
    }

    #[tokio::test]
    async fn test_rolls_back_on_error() {
        let db = setup().await;
        let result: LedgerResult<()> = run(&db, &LedgerConfig::default(), "test", |tx| async move {
            let mut tx = tx;
            let result = match insert_location(&mut tx, "loc-1").await {
                Ok(()) => Err(LedgerError::not_found("Product", "p-1")),
                Err(e) => Err(e),
            };
            (tx, result)
        })
        .await;

        assert!(matches!(result, Err(LedgerError::Db(DbError::NotFound { .. }))));
        assert_eq!(location_count(&db).await, 0);
    }

    #[tokio::test]
    async fn test_retries_once_on_conflict() {
        let db = setup().await;
        let calls = AtomicU32::new(0);

        let result: LedgerResult<()> = run(&db, &LedgerConfig::default(), "test", |tx| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                let result = if call == 0 {
                    Err(LedgerError::Db(DbError::conflict("StockBatch", "b-1")))
                } else {
                    Ok(())
                };
                (tx, result)
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let db = setup().await;
        let calls = AtomicU32::new(0);

        let result: LedgerResult<()> = run(&db, &LedgerConfig::default(), "test", |tx| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { (tx, Err(LedgerError::Db(DbError::conflict("StockBatch", "b-1")))) }
        })
        .await;

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_timeout_rolls_back() {
        let db = setup().await;
        let config = LedgerConfig::default().operation_timeout(Duration::from_millis(50));

        let result: LedgerResult<()> = run(&db, &config, "slow", |tx| async move {
            let mut tx = tx;
            let result = insert_location(&mut tx, "loc-1").await;
            tokio::time::sleep(Duration::from_secs(5)).await;
            (tx, result)
        })
        .await;

        assert!(matches!(result, Err(LedgerError::Timeout { operation: "slow", .. })));
        assert_eq!(location_count(&db).await, 0);
    }
}
