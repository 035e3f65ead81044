//! # Journal Repository
//!
//! Append-only records written next to every ledger change:
//!
//! ```text
//! ┌──────────────────┐     ┌──────────────────┐     ┌──────────────────┐
//! │ StockAdjustment  │◄────│  StockMovement   │     │   AuditEntry     │
//! │ reason, notes    │     │ type, from → to  │     │ entity, action,  │
//! │ quantity_change  │     │ reference (sale) │     │ details (JSON)   │
//! └──────────────────┘     └──────────────────┘     └──────────────────┘
//! ```
//!
//! Nothing here is ever updated or deleted.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use stockline_core::{
    AdjustmentReason, AuditEntityType, AuditEntry, MovementType, StockAdjustment, StockMovement,
};
use tracing::debug;

use super::{decimal_text, parse_decimal};
use crate::error::{DbError, DbResult};

// =============================================================================
// Adjustments
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct AdjustmentRow {
    id: String,
    organization_id: String,
    stock_batch_id: String,
    variant_id: String,
    location_id: String,
    quantity_change: String,
    reason: AdjustmentReason,
    notes: Option<String>,
    member_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AdjustmentRow> for StockAdjustment {
    type Error = DbError;

    fn try_from(row: AdjustmentRow) -> DbResult<Self> {
        Ok(StockAdjustment {
            quantity_change: parse_decimal(
                "stock_adjustments.quantity_change",
                &row.quantity_change,
            )?,
            id: row.id,
            organization_id: row.organization_id,
            stock_batch_id: row.stock_batch_id,
            variant_id: row.variant_id,
            location_id: row.location_id,
            reason: row.reason,
            notes: row.notes,
            member_id: row.member_id,
            created_at: row.created_at,
        })
    }
}

pub async fn insert_adjustment(
    conn: &mut SqliteConnection,
    adjustment: &StockAdjustment,
) -> DbResult<()> {
    debug!(
        stock_batch_id = %adjustment.stock_batch_id,
        reason = %adjustment.reason,
        quantity_change = %adjustment.quantity_change,
        "Recording stock adjustment"
    );

    sqlx::query(
        r#"
        INSERT INTO stock_adjustments (
            id, organization_id, stock_batch_id, variant_id, location_id,
            quantity_change, reason, notes, member_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&adjustment.id)
    .bind(&adjustment.organization_id)
    .bind(&adjustment.stock_batch_id)
    .bind(&adjustment.variant_id)
    .bind(&adjustment.location_id)
    .bind(decimal_text(adjustment.quantity_change))
    .bind(adjustment.reason)
    .bind(&adjustment.notes)
    .bind(&adjustment.member_id)
    .bind(adjustment.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn list_adjustments_for_batch(
    conn: &mut SqliteConnection,
    stock_batch_id: &str,
) -> DbResult<Vec<StockAdjustment>> {
    let rows: Vec<AdjustmentRow> = sqlx::query_as(
        r#"
        SELECT
            id, organization_id, stock_batch_id, variant_id, location_id,
            quantity_change, reason, notes, member_id, created_at
        FROM stock_adjustments
        WHERE stock_batch_id = ?1
        ORDER BY rowid
        "#,
    )
    .bind(stock_batch_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(StockAdjustment::try_from).collect()
}

// =============================================================================
// Movements
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct MovementRow {
    id: String,
    organization_id: String,
    stock_batch_id: String,
    variant_id: String,
    adjustment_id: Option<String>,
    movement_type: MovementType,
    quantity: String,
    from_location_id: Option<String>,
    to_location_id: Option<String>,
    reference_type: Option<String>,
    reference_id: Option<String>,
    member_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = DbError;

    fn try_from(row: MovementRow) -> DbResult<Self> {
        Ok(StockMovement {
            quantity: parse_decimal("stock_movements.quantity", &row.quantity)?,
            id: row.id,
            organization_id: row.organization_id,
            stock_batch_id: row.stock_batch_id,
            variant_id: row.variant_id,
            adjustment_id: row.adjustment_id,
            movement_type: row.movement_type,
            from_location_id: row.from_location_id,
            to_location_id: row.to_location_id,
            reference_type: row.reference_type,
            reference_id: row.reference_id,
            member_id: row.member_id,
            created_at: row.created_at,
        })
    }
}

pub async fn insert_movement(conn: &mut SqliteConnection, movement: &StockMovement) -> DbResult<()> {
    debug!(
        stock_batch_id = %movement.stock_batch_id,
        movement_type = %movement.movement_type,
        quantity = %movement.quantity,
        "Recording stock movement"
    );

    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, organization_id, stock_batch_id, variant_id, adjustment_id,
            movement_type, quantity, from_location_id, to_location_id,
            reference_type, reference_id, member_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
        "#,
    )
    .bind(&movement.id)
    .bind(&movement.organization_id)
    .bind(&movement.stock_batch_id)
    .bind(&movement.variant_id)
    .bind(&movement.adjustment_id)
    .bind(movement.movement_type)
    .bind(decimal_text(movement.quantity))
    .bind(&movement.from_location_id)
    .bind(&movement.to_location_id)
    .bind(&movement.reference_type)
    .bind(&movement.reference_id)
    .bind(&movement.member_id)
    .bind(movement.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn list_movements_for_batch(
    conn: &mut SqliteConnection,
    stock_batch_id: &str,
) -> DbResult<Vec<StockMovement>> {
    let rows: Vec<MovementRow> = sqlx::query_as(
        r#"
        SELECT
            id, organization_id, stock_batch_id, variant_id, adjustment_id,
            movement_type, quantity, from_location_id, to_location_id,
            reference_type, reference_id, member_id, created_at
        FROM stock_movements
        WHERE stock_batch_id = ?1
        ORDER BY rowid
        "#,
    )
    .bind(stock_batch_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(StockMovement::try_from).collect()
}

// =============================================================================
// Audit Trail
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct AuditRow {
    id: String,
    organization_id: String,
    entity_type: AuditEntityType,
    entity_id: String,
    action: String,
    previous_status: Option<String>,
    new_status: Option<String>,
    details: String,
    member_id: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditEntry {
    type Error = DbError;

    fn try_from(row: AuditRow) -> DbResult<Self> {
        let details = serde_json::from_str(&row.details).map_err(|_| DbError::Decode {
            column: "audit_entries.details".to_string(),
            value: row.details.clone(),
        })?;
        Ok(AuditEntry {
            id: row.id,
            organization_id: row.organization_id,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            action: row.action,
            previous_status: row.previous_status,
            new_status: row.new_status,
            details,
            member_id: row.member_id,
            created_at: row.created_at,
        })
    }
}

pub async fn insert_audit(conn: &mut SqliteConnection, entry: &AuditEntry) -> DbResult<()> {
    debug!(
        entity_type = %entry.entity_type,
        entity_id = %entry.entity_id,
        action = %entry.action,
        "Writing audit entry"
    );

    sqlx::query(
        r#"
        INSERT INTO audit_entries (
            id, organization_id, entity_type, entity_id, action,
            previous_status, new_status, details, member_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
    )
    .bind(&entry.id)
    .bind(&entry.organization_id)
    .bind(entry.entity_type)
    .bind(&entry.entity_id)
    .bind(&entry.action)
    .bind(&entry.previous_status)
    .bind(&entry.new_status)
    .bind(entry.details.to_string())
    .bind(&entry.member_id)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

pub async fn list_audit_for_entity(
    conn: &mut SqliteConnection,
    entity_type: AuditEntityType,
    entity_id: &str,
) -> DbResult<Vec<AuditEntry>> {
    let rows: Vec<AuditRow> = sqlx::query_as(
        r#"
        SELECT
            id, organization_id, entity_type, entity_id, action,
            previous_status, new_status, details, member_id, created_at
        FROM audit_entries
        WHERE entity_type = ?1 AND entity_id = ?2
        ORDER BY rowid
        "#,
    )
    .bind(entity_type)
    .bind(entity_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(AuditEntry::try_from).collect()
}
