//! # Stock Batch Repository
//!
//! The lot-level ledger.
//!
//! ## Versioned Writes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  read:   SELECT ... version = 7                                         │
//! │  write:  UPDATE stock_batches                                           │
//! │          SET current_quantity = ?, version = version + 1                │
//! │          WHERE id = ? AND version = 7                                   │
//! │                                                                         │
//! │  rows_affected == 1 → ok                                                │
//! │  rows_affected == 0 → DbError::Conflict (someone wrote in between)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Batches are never deleted: a consumed batch stays as a zero-quantity
//! history row that can still serve as a cost basis.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use stockline_core::{StockBatch, StockKey};
use tracing::debug;

use super::{decimal_text, parse_decimal};
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct BatchRow {
    id: String,
    organization_id: String,
    variant_id: String,
    location_id: String,
    batch_number: String,
    initial_quantity: String,
    current_quantity: String,
    purchase_price: String,
    expiry_date: Option<NaiveDate>,
    received_date: DateTime<Utc>,
    supplier_id: Option<String>,
    purchase_order_item_id: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BatchRow> for StockBatch {
    type Error = DbError;

    fn try_from(row: BatchRow) -> DbResult<Self> {
        Ok(StockBatch {
            initial_quantity: parse_decimal("stock_batches.initial_quantity", &row.initial_quantity)?,
            current_quantity: parse_decimal("stock_batches.current_quantity", &row.current_quantity)?,
            purchase_price: parse_decimal("stock_batches.purchase_price", &row.purchase_price)?,
            id: row.id,
            organization_id: row.organization_id,
            variant_id: row.variant_id,
            location_id: row.location_id,
            batch_number: row.batch_number,
            expiry_date: row.expiry_date,
            received_date: row.received_date,
            supplier_id: row.supplier_id,
            purchase_order_item_id: row.purchase_order_item_id,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const BATCH_COLUMNS: &str = r#"
    id, organization_id, variant_id, location_id, batch_number,
    initial_quantity, current_quantity, purchase_price,
    expiry_date, received_date, supplier_id, purchase_order_item_id,
    version, created_at, updated_at
"#;

pub async fn insert(conn: &mut SqliteConnection, batch: &StockBatch) -> DbResult<()> {
    debug!(
        id = %batch.id,
        batch_number = %batch.batch_number,
        quantity = %batch.initial_quantity,
        "Inserting stock batch"
    );

    sqlx::query(
        r#"
        INSERT INTO stock_batches (
            id, organization_id, variant_id, location_id, batch_number,
            initial_quantity, current_quantity, purchase_price,
            expiry_date, received_date, supplier_id, purchase_order_item_id,
            version, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8,
            ?9, ?10, ?11, ?12,
            ?13, ?14, ?15
        )
        "#,
    )
    .bind(&batch.id)
    .bind(&batch.organization_id)
    .bind(&batch.variant_id)
    .bind(&batch.location_id)
    .bind(&batch.batch_number)
    .bind(decimal_text(batch.initial_quantity))
    .bind(decimal_text(batch.current_quantity))
    .bind(decimal_text(batch.purchase_price))
    .bind(batch.expiry_date)
    .bind(batch.received_date)
    .bind(&batch.supplier_id)
    .bind(&batch.purchase_order_item_id)
    .bind(batch.version)
    .bind(batch.created_at)
    .bind(batch.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Loads a batch of the organization.
pub async fn find(
    conn: &mut SqliteConnection,
    organization_id: &str,
    batch_id: &str,
) -> DbResult<Option<StockBatch>> {
    let sql = format!(
        "SELECT {BATCH_COLUMNS} FROM stock_batches WHERE id = ?1 AND organization_id = ?2"
    );
    let row: Option<BatchRow> = sqlx::query_as(&sql)
        .bind(batch_id)
        .bind(organization_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(StockBatch::try_from).transpose()
}

/// Every batch ever received for a (variant, location), oldest first.
///
/// Includes empty and expired batches; the selection policy decides.
pub async fn list_for_pair(
    conn: &mut SqliteConnection,
    organization_id: &str,
    key: &StockKey,
) -> DbResult<Vec<StockBatch>> {
    let sql = format!(
        "SELECT {BATCH_COLUMNS} FROM stock_batches \
         WHERE organization_id = ?1 AND variant_id = ?2 AND location_id = ?3 \
         ORDER BY received_date ASC, id ASC"
    );
    let rows: Vec<BatchRow> = sqlx::query_as(&sql)
        .bind(organization_id)
        .bind(&key.variant_id)
        .bind(&key.location_id)
        .fetch_all(&mut *conn)
        .await?;

    rows.into_iter().map(StockBatch::try_from).collect()
}

/// Batches whose expiry date is before `today` and that still hold stock.
pub async fn list_expired_with_stock(
    conn: &mut SqliteConnection,
    organization_id: &str,
    today: NaiveDate,
    location_id: Option<&str>,
) -> DbResult<Vec<StockBatch>> {
    let sql = format!(
        "SELECT {BATCH_COLUMNS} FROM stock_batches \
         WHERE organization_id = ?1 AND expiry_date IS NOT NULL AND expiry_date < ?2 \
         AND (?3 IS NULL OR location_id = ?3) \
         ORDER BY expiry_date ASC, id ASC"
    );
    let rows: Vec<BatchRow> = sqlx::query_as(&sql)
        .bind(organization_id)
        .bind(today)
        .bind(location_id)
        .fetch_all(&mut *conn)
        .await?;

    // Quantities are TEXT, so the positivity filter happens after parsing
    let mut batches = Vec::with_capacity(rows.len());
    for row in rows {
        let batch = StockBatch::try_from(row)?;
        if batch.current_quantity > Decimal::ZERO {
            batches.push(batch);
        }
    }
    Ok(batches)
}

/// Writes a new `current_quantity` if the batch is still at `expected_version`.
///
/// Returns the new version.
pub async fn update_quantity(
    conn: &mut SqliteConnection,
    batch_id: &str,
    expected_version: i64,
    current_quantity: Decimal,
) -> DbResult<i64> {
    debug!(
        id = %batch_id,
        version = expected_version,
        current_quantity = %current_quantity,
        "Updating batch quantity"
    );

    let result = sqlx::query(
        r#"
        UPDATE stock_batches SET
            current_quantity = ?3,
            version = version + 1,
            updated_at = ?4
        WHERE id = ?1 AND version = ?2
        "#,
    )
    .bind(batch_id)
    .bind(expected_version)
    .bind(decimal_text(current_quantity))
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::conflict("StockBatch", batch_id));
    }

    Ok(expected_version + 1)
}

/// Sum of `current_quantity` per (variant, location) across all batches.
pub async fn totals_by_pair(
    conn: &mut SqliteConnection,
    organization_id: &str,
) -> DbResult<BTreeMap<StockKey, Decimal>> {
    let rows: Vec<(String, String, String)> = sqlx::query_as(
        r#"
        SELECT variant_id, location_id, current_quantity
        FROM stock_batches
        WHERE organization_id = ?1
        "#,
    )
    .bind(organization_id)
    .fetch_all(&mut *conn)
    .await?;

    let mut totals: BTreeMap<StockKey, Decimal> = BTreeMap::new();
    for (variant_id, location_id, quantity) in rows {
        let quantity = parse_decimal("stock_batches.current_quantity", &quantity)?;
        *totals
            .entry(StockKey::new(variant_id, location_id))
            .or_insert(Decimal::ZERO) += quantity;
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::fixtures::{seed_catalog, ORG};
    use rust_decimal_macros::dec;

    fn batch(id: &str, variant: &str, location: &str, qty: Decimal, expiry: Option<NaiveDate>) -> StockBatch {
        let now = Utc::now();
        StockBatch {
            id: id.into(),
            organization_id: ORG.into(),
            variant_id: variant.into(),
            location_id: location.into(),
            batch_number: format!("B-{}", id),
            initial_quantity: qty,
            current_quantity: qty,
            purchase_price: dec!(2),
            expiry_date: expiry,
            received_date: now,
            supplier_id: None,
            purchase_order_item_id: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_versioned_update_detects_stale_writer() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let (variant, location) = seed_catalog(&mut conn).await;

        insert(&mut conn, &batch("b1", &variant.id, &location.id, dec!(10), None))
            .await
            .unwrap();

        let version = update_quantity(&mut conn, "b1", 0, dec!(7)).await.unwrap();
        assert_eq!(version, 1);

        // A second writer still holding version 0 loses
        let stale = update_quantity(&mut conn, "b1", 0, dec!(5)).await;
        assert!(matches!(stale, Err(DbError::Conflict { .. })));

        let stored = find(&mut conn, ORG, "b1").await.unwrap().unwrap();
        assert_eq!(stored.current_quantity, dec!(7));
        assert_eq!(stored.initial_quantity, dec!(10));
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_expired_listing_and_totals() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let (variant, location) = seed_catalog(&mut conn).await;
        let today = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        let expired = batch("old", &variant.id, &location.id, dec!(4), today.pred_opt());
        let mut empty_expired = batch("empty", &variant.id, &location.id, dec!(0), today.pred_opt());
        empty_expired.initial_quantity = dec!(3);
        let fresh = batch("new", &variant.id, &location.id, dec!(6), Some(today));
        for b in [&expired, &empty_expired, &fresh] {
            insert(&mut conn, b).await.unwrap();
        }

        let found = list_expired_with_stock(&mut conn, ORG, today, None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "old");

        let totals = totals_by_pair(&mut conn, ORG).await.unwrap();
        assert_eq!(totals[&StockKey::new(&variant.id, &location.id)], dec!(10));

        let pair = list_for_pair(&mut conn, ORG, &StockKey::new(&variant.id, &location.id))
            .await
            .unwrap();
        assert_eq!(pair.len(), 3);
    }
}
