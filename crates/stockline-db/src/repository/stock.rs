//! # Variant Stock Aggregate Repository
//!
//! One row per (variant, location) caching `current_stock`,
//! `reserved_stock` and `available_stock = current - reserved`.
//!
//! The row is created lazily on the first stock event for a pair. Two
//! writers may race to create it; the loser gets a
//! [`DbError::UniqueViolation`] on `(variant_id, location_id)` and is
//! expected to re-run its upsert.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::SqliteConnection;
use stockline_core::{ProductVariantStock, StockKey};
use tracing::debug;

use super::{decimal_text, parse_decimal};
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct StockRow {
    id: String,
    organization_id: String,
    variant_id: String,
    location_id: String,
    current_stock: String,
    reserved_stock: String,
    available_stock: String,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StockRow> for ProductVariantStock {
    type Error = DbError;

    fn try_from(row: StockRow) -> DbResult<Self> {
        Ok(ProductVariantStock {
            current_stock: parse_decimal("product_variant_stocks.current_stock", &row.current_stock)?,
            reserved_stock: parse_decimal(
                "product_variant_stocks.reserved_stock",
                &row.reserved_stock,
            )?,
            available_stock: parse_decimal(
                "product_variant_stocks.available_stock",
                &row.available_stock,
            )?,
            id: row.id,
            organization_id: row.organization_id,
            variant_id: row.variant_id,
            location_id: row.location_id,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const STOCK_COLUMNS: &str = r#"
    id, organization_id, variant_id, location_id,
    current_stock, reserved_stock, available_stock,
    version, created_at, updated_at
"#;

/// Loads the aggregate row of a pair, if it exists.
pub async fn find(
    conn: &mut SqliteConnection,
    organization_id: &str,
    key: &StockKey,
) -> DbResult<Option<ProductVariantStock>> {
    let sql = format!(
        "SELECT {STOCK_COLUMNS} FROM product_variant_stocks \
         WHERE variant_id = ?1 AND location_id = ?2 AND organization_id = ?3"
    );
    let row: Option<StockRow> = sqlx::query_as(&sql)
        .bind(&key.variant_id)
        .bind(&key.location_id)
        .bind(organization_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(ProductVariantStock::try_from).transpose()
}

/// Inserts a new aggregate row.
///
/// Fails with [`DbError::UniqueViolation`] if another writer created the
/// pair first.
pub async fn insert(conn: &mut SqliteConnection, stock: &ProductVariantStock) -> DbResult<()> {
    debug!(
        variant_id = %stock.variant_id,
        location_id = %stock.location_id,
        current_stock = %stock.current_stock,
        "Creating stock aggregate"
    );

    sqlx::query(
        r#"
        INSERT INTO product_variant_stocks (
            id, organization_id, variant_id, location_id,
            current_stock, reserved_stock, available_stock,
            version, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&stock.id)
    .bind(&stock.organization_id)
    .bind(&stock.variant_id)
    .bind(&stock.location_id)
    .bind(decimal_text(stock.current_stock))
    .bind(decimal_text(stock.reserved_stock))
    .bind(decimal_text(stock.available_stock))
    .bind(stock.version)
    .bind(stock.created_at)
    .bind(stock.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Writes new stock levels if the row is still at `expected_version`.
pub async fn update_levels(
    conn: &mut SqliteConnection,
    stock_id: &str,
    expected_version: i64,
    current_stock: Decimal,
    available_stock: Decimal,
) -> DbResult<i64> {
    debug!(
        id = %stock_id,
        version = expected_version,
        current_stock = %current_stock,
        "Updating stock aggregate"
    );

    let result = sqlx::query(
        r#"
        UPDATE product_variant_stocks SET
            current_stock = ?3,
            available_stock = ?4,
            version = version + 1,
            updated_at = ?5
        WHERE id = ?1 AND version = ?2
        "#,
    )
    .bind(stock_id)
    .bind(expected_version)
    .bind(decimal_text(current_stock))
    .bind(decimal_text(available_stock))
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::conflict("ProductVariantStock", stock_id));
    }

    Ok(expected_version + 1)
}

/// Every aggregate row of the organization, optionally for one location.
pub async fn list_for_organization(
    conn: &mut SqliteConnection,
    organization_id: &str,
    location_id: Option<&str>,
) -> DbResult<Vec<ProductVariantStock>> {
    let sql = format!(
        "SELECT {STOCK_COLUMNS} FROM product_variant_stocks \
         WHERE organization_id = ?1 AND (?2 IS NULL OR location_id = ?2) \
         ORDER BY variant_id, location_id"
    );
    let rows: Vec<StockRow> = sqlx::query_as(&sql)
        .bind(organization_id)
        .bind(location_id)
        .fetch_all(&mut *conn)
        .await?;

    rows.into_iter().map(ProductVariantStock::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::fixtures::{seed_catalog, ORG};
    use crate::repository::new_id;
    use rust_decimal_macros::dec;

    fn aggregate(variant: &str, location: &str, qty: Decimal) -> ProductVariantStock {
        let now = Utc::now();
        ProductVariantStock {
            id: new_id(),
            organization_id: ORG.into(),
            variant_id: variant.into(),
            location_id: location.into(),
            current_stock: qty,
            reserved_stock: Decimal::ZERO,
            available_stock: qty,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_second_insert_for_pair_is_unique_violation() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let (variant, location) = seed_catalog(&mut conn).await;

        insert(&mut conn, &aggregate(&variant.id, &location.id, dec!(5)))
            .await
            .unwrap();
        let err = insert(&mut conn, &aggregate(&variant.id, &location.id, dec!(1)))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_update_levels_allows_negative_stock() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let (variant, location) = seed_catalog(&mut conn).await;
        let key = StockKey::new(&variant.id, &location.id);

        let row = aggregate(&variant.id, &location.id, dec!(2));
        insert(&mut conn, &row).await.unwrap();
        update_levels(&mut conn, &row.id, 0, dec!(-3), dec!(-3)).await.unwrap();

        let stored = find(&mut conn, ORG, &key).await.unwrap().unwrap();
        assert_eq!(stored.current_stock, dec!(-3));
        assert_eq!(stored.available_stock, dec!(-3));
        assert_eq!(stored.version, 1);

        assert!(matches!(
            update_levels(&mut conn, &row.id, 0, dec!(0), dec!(0)).await,
            Err(DbError::Conflict { .. })
        ));
        assert_eq!(list_for_organization(&mut conn, ORG, None).await.unwrap().len(), 1);
        assert!(list_for_organization(&mut conn, ORG, Some("elsewhere"))
            .await
            .unwrap()
            .is_empty());
    }
}
