//! # Sale Repository
//!
//! Sale headers and their line items.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. INSIDE the sale transaction                                         │
//! │     └── insert_sale()  → Sale { status: completed }                     │
//! │     └── insert_item()  → SaleItem (one per cart line, with batch id)    │
//! │                                                                         │
//! │  2. AFTER commit, best-effort                                           │
//! │     └── set_receipt_url() → Sale.receipt_url                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use stockline_core::{PaymentMethod, Sale, SaleItem, SaleStatus};
use tracing::debug;

use super::{decimal_text, parse_decimal};
use crate::error::{DbError, DbResult};

// =============================================================================
// Sales
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct SaleRow {
    id: String,
    organization_id: String,
    sale_number: String,
    location_id: String,
    customer_id: Option<String>,
    member_id: String,
    status: SaleStatus,
    payment_method: PaymentMethod,
    subtotal_cents: i64,
    discount_cents: i64,
    tax_cents: i64,
    final_amount_cents: i64,
    notes: Option<String>,
    receipt_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SaleRow> for Sale {
    fn from(row: SaleRow) -> Self {
        Sale {
            id: row.id,
            organization_id: row.organization_id,
            sale_number: row.sale_number,
            location_id: row.location_id,
            customer_id: row.customer_id,
            member_id: row.member_id,
            status: row.status,
            payment_method: row.payment_method,
            subtotal_cents: row.subtotal_cents,
            discount_cents: row.discount_cents,
            tax_cents: row.tax_cents,
            final_amount_cents: row.final_amount_cents,
            notes: row.notes,
            receipt_url: row.receipt_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub async fn insert_sale(conn: &mut SqliteConnection, sale: &Sale) -> DbResult<()> {
    debug!(id = %sale.id, sale_number = %sale.sale_number, "Inserting sale");

    sqlx::query(
        r#"
        INSERT INTO sales (
            id, organization_id, sale_number, location_id, customer_id, member_id,
            status, payment_method,
            subtotal_cents, discount_cents, tax_cents, final_amount_cents,
            notes, receipt_url, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6,
            ?7, ?8,
            ?9, ?10, ?11, ?12,
            ?13, ?14, ?15, ?16
        )
        "#,
    )
    .bind(&sale.id)
    .bind(&sale.organization_id)
    .bind(&sale.sale_number)
    .bind(&sale.location_id)
    .bind(&sale.customer_id)
    .bind(&sale.member_id)
    .bind(sale.status)
    .bind(sale.payment_method)
    .bind(sale.subtotal_cents)
    .bind(sale.discount_cents)
    .bind(sale.tax_cents)
    .bind(sale.final_amount_cents)
    .bind(&sale.notes)
    .bind(&sale.receipt_url)
    .bind(sale.created_at)
    .bind(sale.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Loads a sale of the organization.
pub async fn find_sale(
    conn: &mut SqliteConnection,
    organization_id: &str,
    sale_id: &str,
) -> DbResult<Option<Sale>> {
    let row: Option<SaleRow> = sqlx::query_as(
        r#"
        SELECT
            id, organization_id, sale_number, location_id, customer_id, member_id,
            status, payment_method,
            subtotal_cents, discount_cents, tax_cents, final_amount_cents,
            notes, receipt_url, created_at, updated_at
        FROM sales
        WHERE id = ?1 AND organization_id = ?2
        "#,
    )
    .bind(sale_id)
    .bind(organization_id)
    .fetch_optional(&mut *conn)
    .await?;

    Ok(row.map(Sale::from))
}

/// Stores the receipt reference produced after commit.
pub async fn set_receipt_url(
    conn: &mut SqliteConnection,
    sale_id: &str,
    receipt_url: &str,
) -> DbResult<()> {
    let result = sqlx::query("UPDATE sales SET receipt_url = ?2, updated_at = ?3 WHERE id = ?1")
        .bind(sale_id)
        .bind(receipt_url)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("Sale", sale_id));
    }

    Ok(())
}

// =============================================================================
// Sale Items
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct SaleItemRow {
    id: String,
    sale_id: String,
    product_id: String,
    variant_id: String,
    stock_batch_id: String,
    quantity: String,
    base_quantity: String,
    unit_price_cents: i64,
    unit_cost: String,
    line_total_cents: i64,
    created_at: DateTime<Utc>,
}

impl TryFrom<SaleItemRow> for SaleItem {
    type Error = DbError;

    fn try_from(row: SaleItemRow) -> DbResult<Self> {
        Ok(SaleItem {
            quantity: parse_decimal("sale_items.quantity", &row.quantity)?,
            base_quantity: parse_decimal("sale_items.base_quantity", &row.base_quantity)?,
            unit_cost: parse_decimal("sale_items.unit_cost", &row.unit_cost)?,
            id: row.id,
            sale_id: row.sale_id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            stock_batch_id: row.stock_batch_id,
            unit_price_cents: row.unit_price_cents,
            line_total_cents: row.line_total_cents,
            created_at: row.created_at,
        })
    }
}

pub async fn insert_item(conn: &mut SqliteConnection, item: &SaleItem) -> DbResult<()> {
    debug!(
        sale_id = %item.sale_id,
        variant_id = %item.variant_id,
        stock_batch_id = %item.stock_batch_id,
        "Inserting sale item"
    );

    sqlx::query(
        r#"
        INSERT INTO sale_items (
            id, sale_id, product_id, variant_id, stock_batch_id,
            quantity, base_quantity, unit_price_cents, unit_cost, line_total_cents,
            created_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8, ?9, ?10,
            ?11
        )
        "#,
    )
    .bind(&item.id)
    .bind(&item.sale_id)
    .bind(&item.product_id)
    .bind(&item.variant_id)
    .bind(&item.stock_batch_id)
    .bind(decimal_text(item.quantity))
    .bind(decimal_text(item.base_quantity))
    .bind(item.unit_price_cents)
    .bind(decimal_text(item.unit_cost))
    .bind(item.line_total_cents)
    .bind(item.created_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Items of a sale in insertion (cart) order.
pub async fn list_items(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleItem>> {
    let rows: Vec<SaleItemRow> = sqlx::query_as(
        r#"
        SELECT
            id, sale_id, product_id, variant_id, stock_batch_id,
            quantity, base_quantity, unit_price_cents, unit_cost, line_total_cents,
            created_at
        FROM sale_items
        WHERE sale_id = ?1
        ORDER BY rowid
        "#,
    )
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    rows.into_iter().map(SaleItem::try_from).collect()
}
