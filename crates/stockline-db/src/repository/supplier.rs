//! # Supplier Repository
//!
//! Suppliers and the (variant, supplier) link that remembers the last
//! purchase price and packaging unit.
//!
//! ## Link Upsert
//! ```text
//! INSERT ... ON CONFLICT (variant_id, supplier_id) DO UPDATE
//!   cost_price, packaging_unit_id, updated_at  ← refreshed
//!   is_preferred                               ← kept as stored
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use stockline_core::{ProductSupplier, Supplier};
use tracing::debug;

use super::{decimal_text, parse_decimal};
use crate::error::{DbError, DbResult};

#[derive(Debug, sqlx::FromRow)]
struct SupplierRow {
    id: String,
    organization_id: String,
    name: String,
    is_active: bool,
}

/// Loads an active supplier of the organization.
pub async fn find_active(
    conn: &mut SqliteConnection,
    organization_id: &str,
    supplier_id: &str,
) -> DbResult<Supplier> {
    let row: Option<SupplierRow> = sqlx::query_as(
        r#"
        SELECT id, organization_id, name, is_active
        FROM suppliers
        WHERE id = ?1 AND organization_id = ?2 AND is_active = 1
        "#,
    )
    .bind(supplier_id)
    .bind(organization_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(|r| Supplier {
        id: r.id,
        organization_id: r.organization_id,
        name: r.name,
        is_active: r.is_active,
    })
    .ok_or_else(|| DbError::not_found("Supplier", supplier_id))
}

pub async fn insert(conn: &mut SqliteConnection, supplier: &Supplier) -> DbResult<()> {
    sqlx::query(
        "INSERT INTO suppliers (id, organization_id, name, is_active) VALUES (?1, ?2, ?3, ?4)",
    )
    .bind(&supplier.id)
    .bind(&supplier.organization_id)
    .bind(&supplier.name)
    .bind(supplier.is_active)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

// =============================================================================
// Variant / Supplier Links
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct LinkRow {
    id: String,
    organization_id: String,
    variant_id: String,
    supplier_id: String,
    cost_price: String,
    packaging_unit_id: Option<String>,
    is_preferred: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LinkRow> for ProductSupplier {
    type Error = DbError;

    fn try_from(row: LinkRow) -> DbResult<Self> {
        Ok(ProductSupplier {
            cost_price: parse_decimal("product_suppliers.cost_price", &row.cost_price)?,
            id: row.id,
            organization_id: row.organization_id,
            variant_id: row.variant_id,
            supplier_id: row.supplier_id,
            packaging_unit_id: row.packaging_unit_id,
            is_preferred: row.is_preferred,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Whether any supplier is already marked preferred for the variant.
pub async fn has_preferred(conn: &mut SqliteConnection, variant_id: &str) -> DbResult<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM product_suppliers WHERE variant_id = ?1 AND is_preferred = 1",
    )
    .bind(variant_id)
    .fetch_one(&mut *conn)
    .await?;

    Ok(count > 0)
}

pub async fn find_link(
    conn: &mut SqliteConnection,
    variant_id: &str,
    supplier_id: &str,
) -> DbResult<Option<ProductSupplier>> {
    let row: Option<LinkRow> = sqlx::query_as(
        r#"
        SELECT
            id, organization_id, variant_id, supplier_id, cost_price,
            packaging_unit_id, is_preferred, created_at, updated_at
        FROM product_suppliers
        WHERE variant_id = ?1 AND supplier_id = ?2
        "#,
    )
    .bind(variant_id)
    .bind(supplier_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(ProductSupplier::try_from).transpose()
}

/// Creates or refreshes the link and returns the stored row.
///
/// `link.is_preferred` only applies when the link is created.
pub async fn upsert_link(
    conn: &mut SqliteConnection,
    link: &ProductSupplier,
) -> DbResult<ProductSupplier> {
    debug!(
        variant_id = %link.variant_id,
        supplier_id = %link.supplier_id,
        cost_price = %link.cost_price,
        "Upserting product supplier link"
    );

    sqlx::query(
        r#"
        INSERT INTO product_suppliers (
            id, organization_id, variant_id, supplier_id, cost_price,
            packaging_unit_id, is_preferred, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ON CONFLICT (variant_id, supplier_id) DO UPDATE SET
            cost_price = excluded.cost_price,
            packaging_unit_id = excluded.packaging_unit_id,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&link.id)
    .bind(&link.organization_id)
    .bind(&link.variant_id)
    .bind(&link.supplier_id)
    .bind(decimal_text(link.cost_price))
    .bind(&link.packaging_unit_id)
    .bind(link.is_preferred)
    .bind(link.created_at)
    .bind(link.updated_at)
    .execute(&mut *conn)
    .await?;

    find_link(conn, &link.variant_id, &link.supplier_id)
        .await?
        .ok_or_else(|| DbError::not_found("ProductSupplier", &link.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::fixtures::{seed_catalog, ORG};
    use crate::repository::new_id;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_upsert_refreshes_price_and_keeps_preference() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        let (variant, _) = seed_catalog(&mut conn).await;
        insert(
            &mut conn,
            &Supplier {
                id: "sup-1".into(),
                organization_id: ORG.into(),
                name: "Acme".into(),
                is_active: true,
            },
        )
        .await
        .unwrap();

        let now = Utc::now();
        let mut link = ProductSupplier {
            id: new_id(),
            organization_id: ORG.into(),
            variant_id: variant.id.clone(),
            supplier_id: "sup-1".into(),
            cost_price: dec!(48),
            packaging_unit_id: Some("case".into()),
            is_preferred: true,
            created_at: now,
            updated_at: now,
        };
        let stored = upsert_link(&mut conn, &link).await.unwrap();
        assert!(stored.is_preferred);
        assert!(has_preferred(&mut conn, &variant.id).await.unwrap());

        link.id = new_id();
        link.cost_price = dec!(50);
        link.is_preferred = false;
        let stored = upsert_link(&mut conn, &link).await.unwrap();
        assert_eq!(stored.cost_price, dec!(50));
        assert!(stored.is_preferred);
    }
}
