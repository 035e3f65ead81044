//! # Manual Adjustments
//!
//! Corrections to a single batch (damage, counts, returns) and the
//! write-off of expired lots. Both keep the aggregate in step inside the
//! same unit of work as the batch change.
//!
//! ```text
//! adjust(batch, ±Δ)                    write_off_expired(location?)
//!   batch.current += Δ                   for each expired batch with stock:
//!   aggregate    += Δ                      batch.current = 0
//!   StockAdjustment (reason)               StockAdjustment (EXPIRED)
//!   StockMovement   ADJUSTMENT             StockMovement   WRITE_OFF
//!   AuditEntry      STOCK_ADJUSTMENT       AuditEntry      STOCK_ADJUSTMENT
//!                                        aggregates −= staged sums
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::SqliteConnection;
use stockline_core::{
    AdjustmentReason, AuditEntityType, AuditEntry, AuthContext, CoreError, MovementType,
    OrganizationSettings, StockAdjustment, StockBatch, StockDeltas, StockKey, StockMovement,
};
use stockline_db::{
    new_id,
    repository::{batch, catalog, journal},
};
use tracing::{debug, info};

use crate::context::{today, LedgerContext, StockEvent};
use crate::dto::{AdjustmentRequest, AdjustmentResult, WriteOffSummary};
use crate::error::{LedgerError, LedgerResult};
use crate::stock::{apply_aggregate_delta, apply_batch_delta};
use crate::unit_of_work;

/// Applies manual corrections and expired write-offs.
#[derive(Clone)]
pub struct AdjustmentService {
    ctx: LedgerContext,
}

impl AdjustmentService {
    pub fn new(ctx: LedgerContext) -> Self {
        AdjustmentService { ctx }
    }

    /// Changes one batch by a signed quantity of base units.
    pub async fn adjust(&self, request: AdjustmentRequest) -> LedgerResult<AdjustmentResult> {
        let auth = self.ctx.authenticate().await?;
        request.validate()?;
        let settings = self.ctx.settings.settings(&auth.organization_id).await?;

        let (auth_ref, settings_ref, request_ref) = (&auth, &settings, &request);
        let result = unit_of_work::run(&self.ctx.db, &self.ctx.config, "adjust", move |tx| {
            async move {
                let mut tx = tx;
                let result = record_adjustment(&mut tx, auth_ref, settings_ref, request_ref).await;
                (tx, result)
            }
        })
        .await?;

        info!(
            stock_batch_id = %result.stock_batch.id,
            quantity_change = %result.adjustment.quantity_change,
            reason = %result.adjustment.reason,
            "Stock adjusted"
        );

        self.ctx.events.publish(StockEvent::StockAdjusted {
            organization_id: result.stock_batch.organization_id.clone(),
            variant_id: result.stock_batch.variant_id.clone(),
            location_id: result.stock_batch.location_id.clone(),
            stock_batch_id: result.stock_batch.id.clone(),
            quantity_change: result.adjustment.quantity_change,
        });

        Ok(result)
    }

    /// Zeroes every batch past its expiry date that still holds stock.
    ///
    /// `location_id` narrows the sweep to one location.
    pub async fn write_off_expired(&self, location_id: Option<&str>) -> LedgerResult<WriteOffSummary> {
        let auth = self.ctx.authenticate().await?;
        let today = today();

        let auth_ref = &auth;
        let summary = unit_of_work::run(&self.ctx.db, &self.ctx.config, "write_off_expired", move |tx| {
            async move {
                let mut tx = tx;
                let result = record_write_off(&mut tx, auth_ref, location_id, today).await;
                (tx, result)
            }
        })
        .await?;

        info!(
            batches = summary.adjustments.len(),
            total_quantity = %summary.total_quantity,
            "Expired stock written off"
        );

        if !summary.adjustments.is_empty() {
            self.ctx.events.publish(StockEvent::ExpiredWrittenOff {
                organization_id: auth.organization_id.clone(),
                stock_batch_ids: summary
                    .adjustments
                    .iter()
                    .map(|a| a.stock_batch_id.clone())
                    .collect(),
            });
        }

        Ok(summary)
    }
}

// =============================================================================
// Inside the Unit of Work
// =============================================================================

async fn record_adjustment(
    conn: &mut SqliteConnection,
    auth: &AuthContext,
    settings: &OrganizationSettings,
    request: &AdjustmentRequest,
) -> LedgerResult<AdjustmentResult> {
    let org = auth.organization_id.as_str();
    let snapshot = batch::find(conn, org, &request.stock_batch_id)
        .await?
        .ok_or_else(|| LedgerError::not_found("StockBatch", request.stock_batch_id.clone()))?;

    let resulting = snapshot.current_quantity + request.quantity_change;
    if resulting < Decimal::ZERO && !settings.negative_stock_allowed {
        return Err(CoreError::InsufficientStock {
            variant_id: snapshot.variant_id.clone(),
            location_id: snapshot.location_id.clone(),
            required: -request.quantity_change,
            available: snapshot.current_quantity,
        }
        .into());
    }

    let stock_batch = apply_batch_delta(conn, &snapshot, request.quantity_change).await?;
    let key = StockKey::new(snapshot.variant_id.clone(), snapshot.location_id.clone());
    let stock_aggregate = apply_aggregate_delta(conn, org, &key, request.quantity_change).await?;

    let now = Utc::now();
    let (adjustment, movement) = journal_change(
        conn,
        auth,
        &snapshot,
        request.quantity_change,
        request.reason,
        request.notes.clone(),
        MovementType::Adjustment,
        now,
    )
    .await?;

    journal::insert_audit(
        conn,
        &AuditEntry {
            id: new_id(),
            organization_id: org.to_string(),
            entity_type: AuditEntityType::StockAdjustment,
            entity_id: adjustment.id.clone(),
            action: "ADJUST".to_string(),
            previous_status: None,
            new_status: None,
            details: json!({
                "stockBatchId": snapshot.id,
                "quantityChange": request.quantity_change,
                "previousQuantity": snapshot.current_quantity,
                "newQuantity": stock_batch.current_quantity,
                "reason": request.reason,
            }),
            member_id: auth.member_id.clone(),
            created_at: now,
        },
    )
    .await?;

    Ok(AdjustmentResult {
        stock_batch,
        stock_aggregate,
        adjustment,
        movement,
    })
}

async fn record_write_off(
    conn: &mut SqliteConnection,
    auth: &AuthContext,
    location_id: Option<&str>,
    today: NaiveDate,
) -> LedgerResult<WriteOffSummary> {
    let org = auth.organization_id.as_str();
    if let Some(id) = location_id {
        catalog::find_active_location(conn, org, id).await?;
    }

    let expired = batch::list_expired_with_stock(conn, org, today, location_id).await?;
    let now = Utc::now();
    let mut staged = StockDeltas::new();
    let mut adjustments = Vec::with_capacity(expired.len());
    let mut total_quantity = Decimal::ZERO;

    for snapshot in &expired {
        let change = -snapshot.current_quantity;
        let key = StockKey::new(snapshot.variant_id.clone(), snapshot.location_id.clone());
        staged.stage(&snapshot.id, &key, change);
        apply_batch_delta(conn, snapshot, change).await?;

        let (adjustment, _) = journal_change(
            conn,
            auth,
            snapshot,
            change,
            AdjustmentReason::Expired,
            None,
            MovementType::WriteOff,
            now,
        )
        .await?;

        journal::insert_audit(
            conn,
            &AuditEntry {
                id: new_id(),
                organization_id: org.to_string(),
                entity_type: AuditEntityType::StockAdjustment,
                entity_id: adjustment.id.clone(),
                action: "WRITE_OFF".to_string(),
                previous_status: None,
                new_status: None,
                details: json!({
                    "stockBatchId": snapshot.id,
                    "batchNumber": snapshot.batch_number,
                    "expiryDate": snapshot.expiry_date,
                    "quantity": snapshot.current_quantity,
                }),
                member_id: auth.member_id.clone(),
                created_at: now,
            },
        )
        .await?;

        debug!(
            stock_batch_id = %snapshot.id,
            quantity = %snapshot.current_quantity,
            "Expired batch written off"
        );
        total_quantity += snapshot.current_quantity;
        adjustments.push(adjustment);
    }

    for (key, delta) in staged.aggregates() {
        apply_aggregate_delta(conn, org, key, *delta).await?;
    }

    Ok(WriteOffSummary {
        adjustments,
        total_quantity,
    })
}

/// Writes the adjustment row and its movement for a signed batch change.
#[allow(clippy::too_many_arguments)]
async fn journal_change(
    conn: &mut SqliteConnection,
    auth: &AuthContext,
    batch: &StockBatch,
    quantity_change: Decimal,
    reason: AdjustmentReason,
    notes: Option<String>,
    movement_type: MovementType,
    now: DateTime<Utc>,
) -> LedgerResult<(StockAdjustment, StockMovement)> {
    let adjustment = StockAdjustment {
        id: new_id(),
        organization_id: auth.organization_id.clone(),
        stock_batch_id: batch.id.clone(),
        variant_id: batch.variant_id.clone(),
        location_id: batch.location_id.clone(),
        quantity_change,
        reason,
        notes,
        member_id: auth.member_id.clone(),
        created_at: now,
    };
    journal::insert_adjustment(conn, &adjustment).await?;

    // Inbound changes arrive at the location, outbound ones leave it
    let (from_location_id, to_location_id) = if quantity_change > Decimal::ZERO {
        (None, Some(batch.location_id.clone()))
    } else {
        (Some(batch.location_id.clone()), None)
    };
    let movement = StockMovement {
        id: new_id(),
        organization_id: auth.organization_id.clone(),
        stock_batch_id: batch.id.clone(),
        variant_id: batch.variant_id.clone(),
        adjustment_id: Some(adjustment.id.clone()),
        movement_type,
        quantity: quantity_change.abs(),
        from_location_id,
        to_location_id,
        reference_type: None,
        reference_id: None,
        member_id: auth.member_id.clone(),
        created_at: now,
    };
    journal::insert_movement(conn, &movement).await?;

    Ok((adjustment, movement))
}

// =============================================================================
// Unit Tests
// =============================================================================
