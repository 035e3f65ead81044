//! # Restock Orchestrator
//!
//! Receives stock in any unit, converts it to the variant's base unit and
//! records a new batch with its full paper trail.
//!
//! ```text
//! RestockRequest (2 Case @ 48.00, supplier sup-1)
//!      │
//!      ▼ unit graph: Case → Piece ×24       (any failure: nothing written)
//! 48 Piece @ 2.00
//!      │
//!      ├──► StockBatch          B-20250115-1A2B3C4D, initial = current = 48
//!      ├──► ProductVariantStock +48 (created if missing)
//!      ├──► StockAdjustment     RECEIVED_PURCHASE | INVENTORY_COUNT
//!      ├──► StockMovement       RECEIPT, from: external, to: location
//!      ├──► ProductSupplier     cost 48.00 per Case (only with a supplier)
//!      └──► AuditEntry          STOCK_BATCH / RESTOCK, conversion details
//! ```

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::SqliteConnection;
use stockline_core::{
    AdjustmentReason, AuditEntityType, AuditEntry, AuthContext, MovementType, ProductSupplier,
    StockAdjustment, StockBatch, StockKey, StockMovement, UnitGraph,
};
use stockline_db::{
    new_id,
    repository::{batch, catalog, journal, supplier, unit},
};
use tracing::{debug, error, info};

use crate::context::{LedgerContext, StockEvent};
use crate::dto::{RestockRequest, RestockResponse, RestockResult};
use crate::error::LedgerResult;
use crate::numbering;
use crate::stock::apply_aggregate_delta;
use crate::unit_of_work;
use crate::variant;

/// Movement reference for stock received against a purchase order line.
const PURCHASE_ORDER_ITEM: &str = "PURCHASE_ORDER_ITEM";

/// Records incoming stock as new batches.
#[derive(Clone)]
pub struct RestockService {
    ctx: LedgerContext,
}

impl RestockService {
    pub fn new(ctx: LedgerContext) -> Self {
        RestockService { ctx }
    }

    pub async fn handle(&self, request: RestockRequest) -> RestockResponse {
        match self.execute(request).await {
            Ok(result) => RestockResponse::received(result),
            Err(err) => {
                error!(error = %err, kind = ?err.kind(), "Restock failed");
                RestockResponse::failed(&err)
            }
        }
    }

    pub async fn execute(&self, request: RestockRequest) -> LedgerResult<RestockResult> {
        let auth = self.ctx.authenticate().await?;
        request.validate()?;

        let (auth_ref, request_ref) = (&auth, &request);
        let result = unit_of_work::run(&self.ctx.db, &self.ctx.config, "restock", move |tx| {
            async move {
                let mut tx = tx;
                let result = record_restock(&mut tx, auth_ref, request_ref).await;
                (tx, result)
            }
        })
        .await?;

        info!(
            stock_batch_id = %result.stock_batch.id,
            batch_number = %result.stock_batch.batch_number,
            variant_id = %result.stock_batch.variant_id,
            base_quantity = %result.unit_conversion.base_quantity,
            "Stock received"
        );

        self.ctx.events.publish(StockEvent::StockReceived {
            organization_id: result.stock_batch.organization_id.clone(),
            variant_id: result.stock_batch.variant_id.clone(),
            location_id: result.stock_batch.location_id.clone(),
            stock_batch_id: result.stock_batch.id.clone(),
            quantity: result.stock_batch.initial_quantity,
        });

        Ok(result)
    }
}

async fn record_restock(
    conn: &mut SqliteConnection,
    auth: &AuthContext,
    request: &RestockRequest,
) -> LedgerResult<RestockResult> {
    let org = auth.organization_id.as_str();
    let variant = variant::resolve(conn, org, &request.product_id, request.variant_id.as_deref())
        .await?
        .into_variant()?;
    let location = catalog::find_active_location(conn, org, &request.location_id).await?;
    let supplier = match request.supplier_id.as_deref() {
        Some(id) => Some(supplier::find_active(conn, org, id).await?),
        None => None,
    };

    // Conversion first: an unresolvable unit aborts before any write
    let units = UnitGraph::new(unit::list_for_organization(conn, org).await?);
    let supplied_unit = units.find(&request.unit)?.id.clone();
    let conversion = units.resolve(request.unit_quantity, &supplied_unit, &variant.base_unit_id)?;
    let price_per_base = match request.purchase_price {
        Some(price) => {
            units.convert_price_per_unit_to_base(price, &supplied_unit, &variant.base_unit_id)?
        }
        None => variant.buying_price.unwrap_or(Decimal::ZERO),
    };
    debug!(
        unit = %conversion.unit_id,
        factor = %conversion.factor,
        base_quantity = %conversion.base_quantity,
        price_per_base = %price_per_base,
        "Restock quantity converted"
    );

    let now = Utc::now();
    let stock_batch = StockBatch {
        id: new_id(),
        organization_id: org.to_string(),
        variant_id: variant.id.clone(),
        location_id: location.id.clone(),
        batch_number: numbering::batch_number(now),
        initial_quantity: conversion.base_quantity,
        current_quantity: conversion.base_quantity,
        purchase_price: price_per_base,
        expiry_date: request.expiry_date,
        received_date: now,
        supplier_id: supplier.as_ref().map(|s| s.id.clone()),
        purchase_order_item_id: request.purchase_order_item_id.clone(),
        version: 0,
        created_at: now,
        updated_at: now,
    };
    batch::insert(conn, &stock_batch).await?;

    let key = StockKey::new(variant.id.clone(), location.id.clone());
    let stock_aggregate = apply_aggregate_delta(conn, org, &key, conversion.base_quantity).await?;

    let reason = if request.is_purchase() {
        AdjustmentReason::ReceivedPurchase
    } else {
        AdjustmentReason::InventoryCount
    };
    let adjustment = StockAdjustment {
        id: new_id(),
        organization_id: org.to_string(),
        stock_batch_id: stock_batch.id.clone(),
        variant_id: variant.id.clone(),
        location_id: location.id.clone(),
        quantity_change: conversion.base_quantity,
        reason,
        notes: request.notes.clone(),
        member_id: auth.member_id.clone(),
        created_at: now,
    };
    journal::insert_adjustment(conn, &adjustment).await?;

    let movement = StockMovement {
        id: new_id(),
        organization_id: org.to_string(),
        stock_batch_id: stock_batch.id.clone(),
        variant_id: variant.id.clone(),
        adjustment_id: Some(adjustment.id.clone()),
        movement_type: MovementType::Receipt,
        quantity: conversion.base_quantity,
        from_location_id: None,
        to_location_id: Some(location.id.clone()),
        reference_type: request
            .purchase_order_item_id
            .as_ref()
            .map(|_| PURCHASE_ORDER_ITEM.to_string()),
        reference_id: request.purchase_order_item_id.clone(),
        member_id: auth.member_id.clone(),
        created_at: now,
    };
    journal::insert_movement(conn, &movement).await?;

    if let Some(supplier) = &supplier {
        let is_preferred = !supplier::has_preferred(conn, &variant.id).await?;
        let link = supplier::upsert_link(
            conn,
            &ProductSupplier {
                id: new_id(),
                organization_id: org.to_string(),
                variant_id: variant.id.clone(),
                supplier_id: supplier.id.clone(),
                cost_price: request.purchase_price.unwrap_or(price_per_base * conversion.factor),
                packaging_unit_id: Some(supplied_unit.clone()),
                is_preferred,
                created_at: now,
                updated_at: now,
            },
        )
        .await?;
        debug!(
            supplier_id = %link.supplier_id,
            is_preferred = link.is_preferred,
            "Supplier link refreshed"
        );
    }

    journal::insert_audit(
        conn,
        &AuditEntry {
            id: new_id(),
            organization_id: org.to_string(),
            entity_type: AuditEntityType::StockBatch,
            entity_id: stock_batch.id.clone(),
            action: "RESTOCK".to_string(),
            previous_status: None,
            new_status: None,
            details: json!({
                "stockBatchId": stock_batch.id,
                "batchNumber": stock_batch.batch_number,
                "unitConversion": conversion,
                "purchasePrice": request.purchase_price,
                "purchasePricePerBaseUnit": price_per_base,
                "reason": reason,
                "supplierId": stock_batch.supplier_id,
            }),
            member_id: auth.member_id.clone(),
            created_at: now,
        },
    )
    .await?;

    Ok(RestockResult {
        stock_batch,
        stock_aggregate,
        adjustment,
        movement,
        unit_conversion: conversion,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================
