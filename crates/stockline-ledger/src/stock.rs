//! # Ledger Writes
//!
//! Applies staged deltas to the batch ledger and its aggregate cache. Only
//! code running inside a unit of work calls these.
//!
//! ## Aggregate Upsert
//! ```text
//! find (variant, location)
//!   ├── row exists ──► versioned update (current += Δ, available += Δ)
//!   └── missing ────► insert (current = available = Δ)
//!                        └── UNIQUE (variant, location) lost the race?
//!                              └── re-run the upsert once
//! ```

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use stockline_core::{ProductVariantStock, StockBatch, StockKey};
use stockline_db::{
    new_id,
    repository::{batch, stock},
};
use tracing::{debug, warn};

use crate::error::LedgerResult;

/// Upsert attempts for a racing aggregate insert.
const AGGREGATE_UPSERT_ATTEMPTS: u32 = 2;

/// Moves a batch by `delta`, guarded by the version it was read at.
///
/// Returns the batch as written.
pub async fn apply_batch_delta(
    conn: &mut SqliteConnection,
    snapshot: &StockBatch,
    delta: Decimal,
) -> LedgerResult<StockBatch> {
    let current_quantity = snapshot.current_quantity + delta;
    let version = batch::update_quantity(conn, &snapshot.id, snapshot.version, current_quantity).await?;

    Ok(StockBatch {
        current_quantity,
        version,
        updated_at: Utc::now(),
        ..snapshot.clone()
    })
}

/// Moves the `(variant, location)` aggregate by `delta`, creating it if needed.
///
/// A missing row is created with `delta` as its starting level, which is
/// negative when a sale is the first ledger touch under negative stock.
pub async fn apply_aggregate_delta(
    conn: &mut SqliteConnection,
    organization_id: &str,
    key: &StockKey,
    delta: Decimal,
) -> LedgerResult<ProductVariantStock> {
    let mut attempt = 1;
    loop {
        match upsert_aggregate(conn, organization_id, key, delta).await {
            Err(err) if err.is_unique_violation() && attempt < AGGREGATE_UPSERT_ATTEMPTS => {
                warn!(
                    variant_id = %key.variant_id,
                    location_id = %key.location_id,
                    "Aggregate row created concurrently, re-running upsert"
                );
                attempt += 1;
            }
            result => return Ok(result?),
        }
    }
}

async fn upsert_aggregate(
    conn: &mut SqliteConnection,
    organization_id: &str,
    key: &StockKey,
    delta: Decimal,
) -> stockline_db::DbResult<ProductVariantStock> {
    match stock::find(conn, organization_id, key).await? {
        Some(row) => {
            let current_stock = row.current_stock + delta;
            let available_stock = row.available_stock + delta;
            let version =
                stock::update_levels(conn, &row.id, row.version, current_stock, available_stock)
                    .await?;
            Ok(ProductVariantStock {
                current_stock,
                available_stock,
                version,
                updated_at: Utc::now(),
                ..row
            })
        }
        None => {
            let now = Utc::now();
            let row = ProductVariantStock {
                id: new_id(),
                organization_id: organization_id.to_string(),
                variant_id: key.variant_id.clone(),
                location_id: key.location_id.clone(),
                current_stock: delta,
                reserved_stock: Decimal::ZERO,
                available_stock: delta,
                version: 0,
                created_at: now,
                updated_at: now,
            };
            stock::insert(conn, &row).await?;
            debug!(
                variant_id = %key.variant_id,
                location_id = %key.location_id,
                current_stock = %delta,
                "Stock aggregate created"
            );
            Ok(row)
        }
    }
}
