//! # Variant Resolution
//!
//! Every stock movement needs a concrete variant. A request may name one,
//! or name only the product and rely on its default.
//!
//! ```text
//! (product_id, variant_id?)
//!        │
//!        ├── variant_id given ──► Explicit(variant)   (must belong to product)
//!        │
//!        └── none ──► active variants, default first
//!                        ├── at least one ──► Default(first)
//!                        └── none ──────────► Missing ──► MissingVariantForStockTracking
//! ```

use sqlx::SqliteConnection;
use stockline_core::{CoreError, CoreResult, ProductVariant};
use stockline_db::repository::catalog;
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};

/// Outcome of looking up the variant a line or restock applies to.
#[derive(Debug, Clone)]
pub enum VariantResolution {
    /// The caller named the variant.
    Explicit(ProductVariant),
    /// The product's default (or first) active variant.
    Default(ProductVariant),
    /// The product has no variant that can hold stock.
    Missing { product_id: String },
}

impl VariantResolution {
    /// Picks the default from candidates already ordered default-first.
    pub fn from_candidates(product_id: &str, candidates: Vec<ProductVariant>) -> Self {
        match candidates.into_iter().next() {
            Some(variant) => VariantResolution::Default(variant),
            None => VariantResolution::Missing {
                product_id: product_id.to_string(),
            },
        }
    }

    pub fn into_variant(self) -> CoreResult<ProductVariant> {
        match self {
            VariantResolution::Explicit(v) | VariantResolution::Default(v) => Ok(v),
            VariantResolution::Missing { product_id } => {
                Err(CoreError::MissingVariantForStockTracking { product_id })
            }
        }
    }
}

/// Resolves the variant for `(product_id, variant_id)`.
///
/// The product must be active. A named variant that is inactive, unknown,
/// or belongs to another product is reported as not found.
pub async fn resolve(
    conn: &mut SqliteConnection,
    organization_id: &str,
    product_id: &str,
    variant_id: Option<&str>,
) -> LedgerResult<VariantResolution> {
    catalog::find_active_product(conn, organization_id, product_id).await?;

    let resolution = match variant_id {
        Some(id) => match catalog::find_active_variant(conn, organization_id, id).await? {
            Some(variant) if variant.product_id == product_id => {
                VariantResolution::Explicit(variant)
            }
            _ => return Err(LedgerError::not_found("ProductVariant", id)),
        },
        None => {
            let candidates = catalog::list_active_variants(conn, organization_id, product_id).await?;
            VariantResolution::from_candidates(product_id, candidates)
        }
    };

    debug!(product_id = %product_id, resolution = resolution_label(&resolution), "Variant resolved");
    Ok(resolution)
}

fn resolution_label(resolution: &VariantResolution) -> &'static str {
    match resolution {
        VariantResolution::Explicit(_) => "explicit",
        VariantResolution::Default(_) => "default",
        VariantResolution::Missing { .. } => "missing",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, PRODUCT, VARIANT};

    #[tokio::test]
    async fn test_explicit_and_default_resolution() {
        let db = testing::database().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let explicit = resolve(&mut conn, testing::ORG, PRODUCT, Some(VARIANT)).await.unwrap();
        assert!(matches!(explicit, VariantResolution::Explicit(ref v) if v.id == VARIANT));

        let default = resolve(&mut conn, testing::ORG, PRODUCT, None).await.unwrap();
        assert!(matches!(default, VariantResolution::Default(ref v) if v.id == VARIANT));
    }

    #[tokio::test]
    async fn test_product_without_variants_is_missing() {
        let db = testing::database().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let resolution = resolve(&mut conn, testing::ORG, testing::BARE_PRODUCT, None)
            .await
            .unwrap();
        assert!(matches!(
            resolution.into_variant(),
            Err(CoreError::MissingVariantForStockTracking { .. })
        ));
    }

    #[tokio::test]
    async fn test_variant_of_another_product_is_not_found() {
        let db = testing::database().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let err = resolve(&mut conn, testing::ORG, testing::BARE_PRODUCT, Some(VARIANT))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
    }
}
