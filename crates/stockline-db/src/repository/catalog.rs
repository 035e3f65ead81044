//! # Catalog Repository
//!
//! Products, their variants, and stock-holding locations.
//!
//! ## Variant Ordering
//! ```text
//! list_active_variants(product) returns:
//!   is_default DESC  → the default variant first
//!   created_at ASC   → then the oldest ("first") variant
//!   id ASC           → stable tie-break
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use stockline_core::{Location, Product, ProductVariant};
use tracing::debug;

use super::{decimal_text, parse_decimal, parse_optional_decimal};
use crate::error::{DbError, DbResult};

// =============================================================================
// Products
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: String,
    organization_id: String,
    sku: String,
    name: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            organization_id: row.organization_id,
            sku: row.sku,
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Loads an active product of the organization.
pub async fn find_active_product(
    conn: &mut SqliteConnection,
    organization_id: &str,
    product_id: &str,
) -> DbResult<Product> {
    let row: Option<ProductRow> = sqlx::query_as(
        r#"
        SELECT id, organization_id, sku, name, description, is_active, created_at, updated_at
        FROM products
        WHERE id = ?1 AND organization_id = ?2 AND is_active = 1
        "#,
    )
    .bind(product_id)
    .bind(organization_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Product::from)
        .ok_or_else(|| DbError::not_found("Product", product_id))
}

pub async fn insert_product(conn: &mut SqliteConnection, product: &Product) -> DbResult<()> {
    debug!(id = %product.id, sku = %product.sku, "Inserting product");

    sqlx::query(
        r#"
        INSERT INTO products (
            id, organization_id, sku, name, description, is_active, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&product.id)
    .bind(&product.organization_id)
    .bind(&product.sku)
    .bind(&product.name)
    .bind(&product.description)
    .bind(product.is_active)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Variants
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    id: String,
    organization_id: String,
    product_id: String,
    sku: String,
    name: String,
    base_unit_id: String,
    stocking_unit_id: String,
    selling_unit_id: String,
    retail_price_cents: i64,
    price_modifier_cents: i64,
    wholesale_price_cents: Option<i64>,
    buying_price: Option<String>,
    reorder_point: String,
    reorder_qty: String,
    is_default: bool,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<VariantRow> for ProductVariant {
    type Error = DbError;

    fn try_from(row: VariantRow) -> DbResult<Self> {
        Ok(ProductVariant {
            buying_price: parse_optional_decimal(
                "product_variants.buying_price",
                row.buying_price.as_deref(),
            )?,
            reorder_point: parse_decimal("product_variants.reorder_point", &row.reorder_point)?,
            reorder_qty: parse_decimal("product_variants.reorder_qty", &row.reorder_qty)?,
            id: row.id,
            organization_id: row.organization_id,
            product_id: row.product_id,
            sku: row.sku,
            name: row.name,
            base_unit_id: row.base_unit_id,
            stocking_unit_id: row.stocking_unit_id,
            selling_unit_id: row.selling_unit_id,
            retail_price_cents: row.retail_price_cents,
            price_modifier_cents: row.price_modifier_cents,
            wholesale_price_cents: row.wholesale_price_cents,
            is_default: row.is_default,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const VARIANT_COLUMNS: &str = r#"
    id, organization_id, product_id, sku, name,
    base_unit_id, stocking_unit_id, selling_unit_id,
    retail_price_cents, price_modifier_cents, wholesale_price_cents, buying_price,
    reorder_point, reorder_qty, is_default, is_active, created_at, updated_at
"#;

/// Loads an active variant by id, if it belongs to the organization.
pub async fn find_active_variant(
    conn: &mut SqliteConnection,
    organization_id: &str,
    variant_id: &str,
) -> DbResult<Option<ProductVariant>> {
    let sql = format!(
        "SELECT {VARIANT_COLUMNS} FROM product_variants \
         WHERE id = ?1 AND organization_id = ?2 AND is_active = 1"
    );
    let row: Option<VariantRow> = sqlx::query_as(&sql)
        .bind(variant_id)
        .bind(organization_id)
        .fetch_optional(&mut *conn)
        .await?;

    row.map(ProductVariant::try_from).transpose()
}

/// Active variants of a product, default first.
pub async fn list_active_variants(
    conn: &mut SqliteConnection,
    organization_id: &str,
    product_id: &str,
) -> DbResult<Vec<ProductVariant>> {
    let sql = format!(
        "SELECT {VARIANT_COLUMNS} FROM product_variants \
         WHERE product_id = ?1 AND organization_id = ?2 AND is_active = 1 \
         ORDER BY is_default DESC, created_at ASC, id ASC"
    );
    let rows: Vec<VariantRow> = sqlx::query_as(&sql)
        .bind(product_id)
        .bind(organization_id)
        .fetch_all(&mut *conn)
        .await?;

    rows.into_iter().map(ProductVariant::try_from).collect()
}

/// Every variant of the organization (active or not), for reports.
pub async fn list_variants_for_organization(
    conn: &mut SqliteConnection,
    organization_id: &str,
) -> DbResult<Vec<ProductVariant>> {
    let sql = format!(
        "SELECT {VARIANT_COLUMNS} FROM product_variants \
         WHERE organization_id = ?1 ORDER BY sku"
    );
    let rows: Vec<VariantRow> = sqlx::query_as(&sql)
        .bind(organization_id)
        .fetch_all(&mut *conn)
        .await?;

    rows.into_iter().map(ProductVariant::try_from).collect()
}

pub async fn insert_variant(conn: &mut SqliteConnection, variant: &ProductVariant) -> DbResult<()> {
    debug!(id = %variant.id, sku = %variant.sku, "Inserting product variant");

    sqlx::query(
        r#"
        INSERT INTO product_variants (
            id, organization_id, product_id, sku, name,
            base_unit_id, stocking_unit_id, selling_unit_id,
            retail_price_cents, price_modifier_cents, wholesale_price_cents, buying_price,
            reorder_point, reorder_qty, is_default, is_active, created_at, updated_at
        ) VALUES (
            ?1, ?2, ?3, ?4, ?5,
            ?6, ?7, ?8,
            ?9, ?10, ?11, ?12,
            ?13, ?14, ?15, ?16, ?17, ?18
        )
        "#,
    )
    .bind(&variant.id)
    .bind(&variant.organization_id)
    .bind(&variant.product_id)
    .bind(&variant.sku)
    .bind(&variant.name)
    .bind(&variant.base_unit_id)
    .bind(&variant.stocking_unit_id)
    .bind(&variant.selling_unit_id)
    .bind(variant.retail_price_cents)
    .bind(variant.price_modifier_cents)
    .bind(variant.wholesale_price_cents)
    .bind(variant.buying_price.map(decimal_text))
    .bind(decimal_text(variant.reorder_point))
    .bind(decimal_text(variant.reorder_qty))
    .bind(variant.is_default)
    .bind(variant.is_active)
    .bind(variant.created_at)
    .bind(variant.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Locations
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct LocationRow {
    id: String,
    organization_id: String,
    name: String,
    is_active: bool,
}

/// Loads an active location of the organization.
pub async fn find_active_location(
    conn: &mut SqliteConnection,
    organization_id: &str,
    location_id: &str,
) -> DbResult<Location> {
    let row: Option<LocationRow> = sqlx::query_as(
        r#"
        SELECT id, organization_id, name, is_active
        FROM locations
        WHERE id = ?1 AND organization_id = ?2 AND is_active = 1
        "#,
    )
    .bind(location_id)
    .bind(organization_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|r| Location {
        id: r.id,
        organization_id: r.organization_id,
        name: r.name,
        is_active: r.is_active,
    })
    .ok_or_else(|| DbError::not_found("Location", location_id))
}

pub async fn insert_location(conn: &mut SqliteConnection, location: &Location) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO locations (id, organization_id, name, is_active) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(&location.id)
    .bind(&location.organization_id)
    .bind(&location.name)
    .bind(location.is_active)
    .execute(&mut *conn)
    .await?;

    Ok(())
}
