//! # Consistency Checks
//!
//! Out-of-band reads over the ledger. Neither function opens a transaction;
//! results may trail an in-flight sale by one commit.
//!
//! ```text
//! check_consistency:  Σ batch.current_quantity  vs  aggregate.current_stock
//!                     per (variant, location)   →   Vec<StockDiscrepancy>
//!                     + quantity still held in expired batches
//!
//! low_stock:          aggregate.available_stock ≤ variant.reorder_point
//! ```

use std::collections::HashMap;

use stockline_core::{ledger::find_discrepancies, StockDiscrepancy, StockKey};
use stockline_db::{
    repository::{batch, catalog, stock},
    Database,
};
use tracing::{info, warn};

use crate::context::today;
use crate::dto::LowStockItem;
use crate::error::LedgerResult;

/// Lists every (variant, location) whose aggregate disagrees with its
/// batches, or that still counts stock from batches past their expiry.
///
/// Expired stock alone is not drift: the aggregate matches the batches but
/// overstates what can be sold until the batches are written off.
pub async fn check_consistency(
    db: &Database,
    organization_id: &str,
) -> LedgerResult<Vec<StockDiscrepancy>> {
    let mut conn = db.acquire().await?;

    let aggregates = stock::list_for_organization(&mut conn, organization_id, None).await?;
    let batch_totals = batch::totals_by_pair(&mut conn, organization_id).await?;
    let expired = batch::list_expired_with_stock(&mut conn, organization_id, today(), None).await?;
    let pairs = aggregates.len();

    let discrepancies = find_discrepancies(
        aggregates.into_iter().map(|row| {
            (
                StockKey::new(row.variant_id, row.location_id),
                row.current_stock,
            )
        }),
        batch_totals,
        expired.into_iter().map(|b| {
            (
                StockKey::new(b.variant_id, b.location_id),
                b.current_quantity,
            )
        }),
    );

    for d in &discrepancies {
        if d.is_drift() {
            warn!(
                variant_id = %d.variant_id,
                location_id = %d.location_id,
                batch_total = %d.batch_total,
                difference = %d.difference,
                "Stock aggregate out of step with batches"
            );
        } else {
            warn!(
                variant_id = %d.variant_id,
                location_id = %d.location_id,
                expired_quantity = %d.expired_quantity,
                "Expired stock not written off"
            );
        }
    }
    info!(
        organization_id,
        pairs,
        drifted = discrepancies.iter().filter(|d| d.is_drift()).count(),
        discrepancies = discrepancies.len(),
        "Consistency check finished"
    );

    Ok(discrepancies)
}

/// Aggregates at or below their variant's reorder point, lowest stock first.
pub async fn low_stock(
    db: &Database,
    organization_id: &str,
    location_id: Option<&str>,
) -> LedgerResult<Vec<LowStockItem>> {
    let mut conn = db.acquire().await?;

    let variants: HashMap<String, _> = catalog::list_variants_for_organization(&mut conn, organization_id)
        .await?
        .into_iter()
        .filter(|v| v.is_active)
        .map(|v| (v.id.clone(), v))
        .collect();

    let mut items: Vec<LowStockItem> =
        stock::list_for_organization(&mut conn, organization_id, location_id)
            .await?
            .into_iter()
            .filter_map(|row| {
                let variant = variants.get(&row.variant_id)?;
                (row.available_stock <= variant.reorder_point).then(|| LowStockItem {
                    variant_id: variant.id.clone(),
                    sku: variant.sku.clone(),
                    name: variant.name.clone(),
                    location_id: row.location_id,
                    available_stock: row.available_stock,
                    reorder_point: variant.reorder_point,
                    reorder_qty: variant.reorder_qty,
                })
            })
            .collect();

    items.sort_by(|a, b| {
        a.available_stock
            .cmp(&b.available_stock)
            .then_with(|| a.sku.cmp(&b.sku))
    });
    Ok(items)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use stockline_core::{AdjustmentReason, Money, PaymentMethod};

    use crate::adjustment::AdjustmentService;
    use crate::dto::{AdjustmentRequest, CartItem, RestockRequest, SaleRequest};
    use crate::restock::RestockService;
    use crate::sale::SaleService;
    use crate::testing::{self, LOCATION, ORG, PRODUCT, VARIANT};

    fn sale(quantity: Decimal) -> SaleRequest {
        SaleRequest {
            cart_items: vec![CartItem {
                product_id: PRODUCT.into(),
                variant_id: None,
                quantity,
            }],
            location_id: LOCATION.into(),
            customer_id: None,
            payment_method: PaymentMethod::Card,
            discount_amount: Money::zero(),
            notes: None,
        }
    }

    fn restock(cases: Decimal) -> RestockRequest {
        RestockRequest {
            product_id: PRODUCT.into(),
            variant_id: Some(VARIANT.into()),
            unit: "case".into(),
            unit_quantity: cases,
            location_id: LOCATION.into(),
            supplier_id: None,
            purchase_price: Some(dec!(30)),
            expiry_date: None,
            purchase_order_item_id: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_ledger_stays_consistent_across_operations() {
        let db = testing::database().await;
        let ctx = testing::context(&db, testing::fifo());

        let received = RestockService::new(ctx.clone()).execute(restock(dec!(2))).await.unwrap();
        RestockService::new(ctx.clone()).execute(restock(dec!(1))).await.unwrap();
        SaleService::new(ctx.clone()).execute(sale(dec!(30))).await.unwrap();
        AdjustmentService::new(ctx.clone())
            .adjust(AdjustmentRequest {
                stock_batch_id: received.stock_batch.id,
                quantity_change: dec!(-3),
                reason: AdjustmentReason::Damaged,
                notes: None,
            })
            .await
            .unwrap();

        let discrepancies = check_consistency(&db, ORG).await.unwrap();
        assert!(discrepancies.is_empty(), "{discrepancies:?}");
        // 48 + 24 - 30 - 3
        assert_eq!(testing::aggregate(&db).await.unwrap().current_stock, dec!(39));
    }

    #[tokio::test]
    async fn test_drifted_aggregate_is_reported() {
        let db = testing::database().await;
        {
            let mut conn = db.pool().acquire().await.unwrap();
            testing::receive(&mut conn, "A", dec!(10), 1, None).await;
        }
        sqlx::query("UPDATE product_variant_stocks SET current_stock = '12'")
            .execute(db.pool())
            .await
            .unwrap();

        let discrepancies = check_consistency(&db, ORG).await.unwrap();

        assert_eq!(discrepancies.len(), 1);
        assert_eq!(discrepancies[0].variant_id, VARIANT);
        assert_eq!(discrepancies[0].batch_total, dec!(10));
        assert_eq!(discrepancies[0].difference, dec!(2));
        assert!(discrepancies[0].is_drift());
    }

    #[tokio::test]
    async fn test_expired_stock_is_reported_until_written_off() {
        let db = testing::database().await;
        {
            let mut conn = db.pool().acquire().await.unwrap();
            testing::receive(&mut conn, "A", dec!(4), 1, Some(testing::days_from_today(-2))).await;
            testing::receive(&mut conn, "B", dec!(10), 2, Some(testing::days_from_today(30))).await;
        }

        let discrepancies = check_consistency(&db, ORG).await.unwrap();

        assert_eq!(discrepancies.len(), 1);
        let found = &discrepancies[0];
        assert!(!found.is_drift());
        assert_eq!(found.aggregate_stock, Some(dec!(14)));
        assert_eq!(found.batch_total, dec!(14));
        assert_eq!(found.expired_quantity, dec!(4));
        assert_eq!(found.sellable_total(), dec!(10));

        AdjustmentService::new(testing::context(&db, testing::fifo()))
            .write_off_expired(None)
            .await
            .unwrap();
        assert!(check_consistency(&db, ORG).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_low_stock_uses_reorder_point() {
        let db = testing::database().await;
        {
            let mut conn = db.pool().acquire().await.unwrap();
            testing::receive(&mut conn, "A", dec!(10), 1, None).await;
        }
        assert!(low_stock(&db, ORG, None).await.unwrap().is_empty());

        SaleService::new(testing::context(&db, testing::fifo()))
            .execute(sale(dec!(5)))
            .await
            .unwrap();

        let items = low_stock(&db, ORG, Some(LOCATION)).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].available_stock, dec!(5));
        assert_eq!(items[0].reorder_qty, dec!(48));
        assert!(low_stock(&db, ORG, Some("elsewhere")).await.unwrap().is_empty());
    }
}
