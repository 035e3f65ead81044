//! # Schema Migrations
//!
//! The ledger schema is compiled into the binary from `migrations/sqlite/`
//! and applied when a [`Database`](crate::Database) opens.
//!
//! ```text
//! 001_initial_schema.sql
//!   catalog ........ units_of_measure, products, product_variants,
//!                    locations, suppliers, product_suppliers, customers
//!   ledger ......... stock_batches ──► product_variant_stocks (cache)
//!   journals ....... stock_adjustments, stock_movements, audit_entries
//!   sales .......... sales, sale_items, loyalty_transactions
//!   tenancy ........ organization_settings
//! ```
//!
//! Quantities, factors and unit costs are TEXT decimals, never REAL.
//! Applied files are never edited; schema changes ship as a new `NNN_*.sql`.

use serde::Serialize;
use sqlx::SqlitePool;
use tracing::info;

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// What `stockline migrate` reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub embedded: usize,
    pub applied: usize,
    pub latest_version: Option<i64>,
}

impl MigrationReport {
    pub fn is_current(&self) -> bool {
        self.embedded == self.applied
    }
}

/// Applies pending migrations in filename order. Safe to call repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    MIGRATOR.run(pool).await?;
    info!(embedded = MIGRATOR.migrations.len(), "Ledger schema is current");
    Ok(())
}

pub async fn report(pool: &SqlitePool) -> DbResult<MigrationReport> {
    let tracked: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations'",
    )
    .fetch_one(pool)
    .await?;

    let (applied, latest_version) = if tracked == 0 {
        (0, None)
    } else {
        let (count, latest): (i64, Option<i64>) = sqlx::query_as(
            "SELECT COUNT(*), MAX(version) FROM _sqlx_migrations WHERE success = 1",
        )
        .fetch_one(pool)
        .await?;
        (usize::try_from(count).unwrap_or_default(), latest)
    };

    Ok(MigrationReport {
        embedded: MIGRATOR.migrations.len(),
        applied,
        latest_version,
    })
}
