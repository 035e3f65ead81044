//! # Demo Catalog
//!
//! Populates an empty organization with units, products, one location, a
//! customer and a supplier so every command has something to act on.
//!
//! ## Generated Catalog
//! ```text
//! Units:     Piece (root) ◄── 6-Pack ×6
//!                         ◄── Case   ×24
//!            Kilogram (root) ◄── Gram ×0.001
//!
//! Products:  BEV-*  sold by the Piece, stocked by the Case
//!            PRD-*  sold and stocked by the Kilogram
//!            one variant per size, the first one is the default
//! ```
//!
//! IDs are readable slugs (`var-bev-cola-330`) so they can be typed on the
//! command line. Seeding an organization that already has units is a no-op.

use anyhow::Context;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use stockline_core::{
    validation::validate_sku, Customer, Location, OrganizationSettings, Product, ProductVariant,
    Supplier, UnitGraph, UnitOfMeasure, UnitType,
};
use stockline_db::{
    repository::{catalog, customer, settings, supplier, unit},
    Database, DbError,
};
use stockline_ledger::SettingsDefaults;
use tracing::info;

pub const LOCATION_ID: &str = "loc-main";
pub const CUSTOMER_ID: &str = "cust-demo";
pub const SUPPLIER_ID: &str = "sup-demo";

const PIECE: &str = "unit-piece";
const SIX_PACK: &str = "unit-6pack";
const CASE: &str = "unit-case";
const KILOGRAM: &str = "unit-kg";
const GRAM: &str = "unit-g";

/// (code, unit sold by, unit stocked by, products)
///
/// Product: (name, retail cents, buying price per base unit)
const CATEGORIES: &[(&str, &str, &str, &[(&str, i64, &str)])] = &[
    (
        "BEV",
        PIECE,
        CASE,
        &[
            ("Cola", 150, "0.80"),
            ("Orange Soda", 140, "0.75"),
            ("Sparkling Water", 100, "0.40"),
            ("Iced Tea", 180, "0.95"),
            ("Energy Drink", 350, "1.90"),
        ],
    ),
    (
        "PRD",
        KILOGRAM,
        KILOGRAM,
        &[
            ("Apples", 420, "2.10"),
            ("Bananas", 260, "1.20"),
            ("Tomatoes", 380, "1.75"),
        ],
    ),
];

/// Size variants: (label, price addon in cents). Produce has no sizes.
const SIZES: &[(&str, i64)] = &[("330", 0), ("500", 60)];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSummary {
    pub organization_id: String,
    pub skipped: bool,
    pub units: usize,
    pub products: usize,
    pub variants: Vec<String>,
    pub location_id: String,
    pub customer_id: String,
    pub supplier_id: String,
}

pub async fn run(
    db: &Database,
    organization_id: &str,
    defaults: SettingsDefaults,
) -> anyhow::Result<SeedSummary> {
    let mut tx = db.begin().await?;

    let mut summary = SeedSummary {
        organization_id: organization_id.to_string(),
        skipped: false,
        units: 0,
        products: 0,
        variants: Vec::new(),
        location_id: LOCATION_ID.to_string(),
        customer_id: CUSTOMER_ID.to_string(),
        supplier_id: SUPPLIER_ID.to_string(),
    };

    if !unit::list_for_organization(&mut tx, organization_id).await?.is_empty() {
        info!(organization_id, "Organization already has units, skipping seed");
        summary.skipped = true;
        return Ok(summary);
    }

    let units = [
        uom(organization_id, PIECE, "Piece", "pc", UnitType::Count, None),
        uom(organization_id, SIX_PACK, "6-Pack", "6pk", UnitType::Count, Some((PIECE, Decimal::from(6)))),
        uom(organization_id, CASE, "Case", "cs", UnitType::Count, Some((PIECE, Decimal::from(24)))),
        uom(organization_id, KILOGRAM, "Kilogram", "kg", UnitType::Weight, None),
        uom(organization_id, GRAM, "Gram", "g", UnitType::Weight, Some((KILOGRAM, Decimal::new(1, 3)))),
    ];
    UnitGraph::new(units.clone())
        .validate()
        .context("demo unit hierarchy")?;
    for u in &units {
        unit::insert(&mut tx, u).await?;
    }
    summary.units = units.len();

    let now = Utc::now();
    for (code, selling_unit, stocking_unit, products) in CATEGORIES {
        for (name, price_cents, buying) in products.iter() {
            let slug = name.to_lowercase().replace(' ', "-");
            let sku = format!("{}-{}", code, slug.to_uppercase());
            validate_sku(&sku)?;
            let product = Product {
                id: format!("prod-{}-{}", code.to_lowercase(), slug),
                organization_id: organization_id.to_string(),
                sku: sku.clone(),
                name: name.to_string(),
                description: None,
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            catalog::insert_product(&mut tx, &product).await?;
            summary.products += 1;

            let buying_price: Decimal = buying
                .parse()
                .with_context(|| format!("buying price of {name}"))?;
            let sizes: &[(&str, i64)] = if *selling_unit == PIECE { SIZES } else { &[("", 0)] };

            for (index, (size, addon)) in sizes.iter().enumerate() {
                let (variant_id, variant_sku, variant_name) = if size.is_empty() {
                    (format!("var-{}-{}", code.to_lowercase(), slug), sku.clone(), name.to_string())
                } else {
                    (
                        format!("var-{}-{}-{}", code.to_lowercase(), slug, size),
                        format!("{sku}-{size}"),
                        format!("{name} {size}ml"),
                    )
                };
                validate_sku(&variant_sku)?;
                let variant = ProductVariant {
                    id: variant_id,
                    organization_id: organization_id.to_string(),
                    product_id: product.id.clone(),
                    sku: variant_sku,
                    name: variant_name,
                    base_unit_id: selling_unit.to_string(),
                    stocking_unit_id: stocking_unit.to_string(),
                    selling_unit_id: selling_unit.to_string(),
                    retail_price_cents: price_cents + addon,
                    price_modifier_cents: 0,
                    wholesale_price_cents: None,
                    buying_price: Some(buying_price),
                    reorder_point: Decimal::from(12),
                    reorder_qty: Decimal::from(48),
                    is_default: index == 0,
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                };
                catalog::insert_variant(&mut tx, &variant).await?;
                summary.variants.push(variant.id);
            }
        }
    }

    catalog::insert_location(
        &mut tx,
        &Location {
            id: LOCATION_ID.to_string(),
            organization_id: organization_id.to_string(),
            name: "Main Store".to_string(),
            is_active: true,
        },
    )
    .await?;
    customer::insert(
        &mut tx,
        &Customer {
            id: CUSTOMER_ID.to_string(),
            organization_id: organization_id.to_string(),
            name: "Walk-in Regular".to_string(),
            loyalty_points: 0,
            is_active: true,
        },
    )
    .await?;
    supplier::insert(
        &mut tx,
        &Supplier {
            id: SUPPLIER_ID.to_string(),
            organization_id: organization_id.to_string(),
            name: "Demo Wholesale".to_string(),
            is_active: true,
        },
    )
    .await?;
    settings::upsert(
        &mut tx,
        &OrganizationSettings {
            organization_id: organization_id.to_string(),
            default_tax_rate: defaults.default_tax_rate,
            negative_stock_allowed: defaults.negative_stock_allowed,
            inventory_policy: defaults.inventory_policy,
        },
    )
    .await?;

    tx.commit().await.map_err(DbError::from)?;

    info!(
        organization_id,
        units = summary.units,
        products = summary.products,
        variants = summary.variants.len(),
        "Demo catalog seeded"
    );
    Ok(summary)
}

fn uom(
    organization_id: &str,
    id: &str,
    name: &str,
    symbol: &str,
    unit_type: UnitType,
    base: Option<(&str, Decimal)>,
) -> UnitOfMeasure {
    UnitOfMeasure {
        id: id.to_string(),
        organization_id: organization_id.to_string(),
        name: name.to_string(),
        symbol: symbol.to_string(),
        unit_type,
        base_unit_id: base.map(|(b, _)| b.to_string()),
        conversion_factor: base.map(|(_, f)| f),
    }
}
