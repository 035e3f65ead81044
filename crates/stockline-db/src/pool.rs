//! # Ledger Database Handle
//!
//! One SQLite file per deployment, shared by every organization.
//!
//! ## Who Uses Which Door
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Database (Clone)                               │
//! │                                                                         │
//! │   unit of work ──► begin()   ──► Transaction ──► commit / rollback      │
//! │      (sale, restock, adjust, write-off: every ledger mutation)          │
//! │                                                                         │
//! │   reports ───────► acquire() ──► PoolConnection (no transaction)        │
//! │      (reconciliation, low stock, receipt URL after commit)              │
//! │                                                                         │
//! │   `stockline migrate` ──► migration_report()                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! WAL lets reports read while a sale is writing. Writers serialize on the
//! SQLite write lock, taken up front by `BEGIN IMMEDIATE`:
//!
//! ```text
//! sale A: BEGIN IMMEDIATE ── lock ── read batches ── write ── COMMIT
//! sale B: BEGIN IMMEDIATE ·········· waits (busy_timeout) ········ lock ── read ── …
//! ```
//!
//! B reads only after A committed, so it never plans against a stale
//! snapshot. A deferred `BEGIN` would take the lock on B's first write and
//! SQLite refuses that upgrade at once, without honoring `busy_timeout`.
//! Waiting longer than `busy_timeout` fails as [`DbError::Busy`] and the
//! unit of work retries it.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations::{self, MigrationReport};

const IN_MEMORY_PATH: &str = ":memory:";

// =============================================================================
// Configuration
// =============================================================================

/// Where the ledger lives and how hard writers wait for it.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use stockline_db::DbConfig;
///
/// let config = DbConfig::new("/var/lib/stockline/ledger.db")
///     .max_connections(8)
///     .busy_timeout(Duration::from_secs(2));
/// assert_eq!(config.max_connections, 8);
/// assert!(!config.is_in_memory());
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// SQLite file, created on first open.
    pub database_path: PathBuf,

    /// Concurrent units of work plus report readers. Default: 5
    pub max_connections: u32,

    /// How long a caller waits for a free connection. Default: 30s
    pub acquire_timeout: Duration,

    /// How long a writer waits on the write lock before `Busy`. Default: 5s
    pub busy_timeout: Duration,

    /// Apply pending migrations when opening. Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 5,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Private database for tests.
    ///
    /// The pool holds exactly one connection: an in-memory database lives
    /// and dies with it, so callers must release a connection before the
    /// next `begin()` or `acquire()`.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(IN_MEMORY_PATH),
            max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(1),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY_PATH
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let url = format!("sqlite://{}?mode=rwc", self.database_path.display());

        Ok(SqliteConnectOptions::from_str(&url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // batches, aggregates and journals reference the catalog
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout)
            .create_if_missing(true))
    }
}

// =============================================================================
// Database
// =============================================================================

/// Shared handle to the ledger. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (or creates) the ledger and applies pending migrations.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening ledger database");

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .acquire_timeout(config.acquire_timeout);
        if config.is_in_memory() {
            // Recycling the only connection would drop the data
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;
        debug!(max_connections = config.max_connections, "Ledger pool ready");

        if config.run_migrations {
            migrations::run_migrations(&pool).await?;
        }

        Ok(Database { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Starts the write transaction a unit of work runs in.
    ///
    /// Holds the write lock from the first statement on. Dropping it
    /// without `commit()` rolls back.
    pub async fn begin(&self) -> DbResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin_with("BEGIN IMMEDIATE").await?)
    }

    /// A plain connection for reads outside any transaction.
    pub async fn acquire(&self) -> DbResult<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    /// Embedded vs. applied migrations.
    pub async fn migration_report(&self) -> DbResult<MigrationReport> {
        migrations::report(&self.pool).await
    }
}
