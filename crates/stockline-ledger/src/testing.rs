//! Shared fixtures for ledger tests: a database with one organization's
//! catalog already in place. In memory by default; [`file_database`] when a
//! test needs several connections writing at once.

use std::sync::Arc;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::SqliteConnection;
use stockline_core::{
    Customer, InventoryPolicy, Location, Product, ProductVariant, ProductVariantStock, StockBatch,
    StockKey, Supplier, TaxRate, UnitOfMeasure, UnitType,
};
use stockline_db::{
    repository::{batch, catalog, customer, stock as stock_repo, supplier, unit},
    Database, DbConfig,
};

use crate::context::{DbSettingsProvider, LedgerContext, SettingsDefaults, StaticAuthContext};
use crate::stock::apply_aggregate_delta;

pub const ORG: &str = "org-1";
pub const MEMBER: &str = "member-1";
pub const LOCATION: &str = "loc-1";
pub const PRODUCT: &str = "prod-1";
pub const VARIANT: &str = "var-1";
pub const BARE_PRODUCT: &str = "prod-bare";
pub const CUSTOMER: &str = "cust-1";
pub const SUPPLIER: &str = "sup-1";

/// 25.00 per piece.
pub const UNIT_PRICE_CENTS: i64 = 2_500;

fn unit_of_measure(id: &str, symbol: &str, base: Option<(&str, Decimal)>) -> UnitOfMeasure {
    UnitOfMeasure {
        id: id.into(),
        organization_id: ORG.into(),
        name: id.into(),
        symbol: symbol.into(),
        unit_type: UnitType::Count,
        base_unit_id: base.map(|(b, _)| b.to_string()),
        conversion_factor: base.map(|(_, f)| f),
    }
}

fn product(id: &str, sku: &str) -> Product {
    let now = Utc::now();
    Product {
        id: id.into(),
        organization_id: ORG.into(),
        sku: sku.into(),
        name: sku.into(),
        description: None,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

pub async fn database() -> Database {
    database_with(DbConfig::in_memory()).await
}

/// A seeded ledger in a fresh file with a real connection pool. The file
/// goes away with the returned directory.
pub async fn file_database(max_connections: u32) -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let config = DbConfig::new(dir.path().join("ledger.db"))
        .max_connections(max_connections)
        .busy_timeout(std::time::Duration::from_secs(10));
    let db = database_with(config).await;
    (dir, db)
}

/// Piece (base) and Case (24 pieces), a product with one variant sold by
/// the piece, a product with no variants, a location, a customer and a
/// supplier.
pub async fn database_with(config: DbConfig) -> Database {
    let db = Database::new(config).await.unwrap();
    let mut conn = db.pool().acquire().await.unwrap();

    unit::insert(&mut conn, &unit_of_measure("piece", "pc", None)).await.unwrap();
    unit::insert(&mut conn, &unit_of_measure("case", "cs", Some(("piece", dec!(24)))))
        .await
        .unwrap();

    catalog::insert_product(&mut conn, &product(PRODUCT, "COLA")).await.unwrap();
    catalog::insert_product(&mut conn, &product(BARE_PRODUCT, "SERVICE")).await.unwrap();

    let now = Utc::now();
    catalog::insert_variant(
        &mut conn,
        &ProductVariant {
            id: VARIANT.into(),
            organization_id: ORG.into(),
            product_id: PRODUCT.into(),
            sku: "COLA-330".into(),
            name: "Cola 330ml".into(),
            base_unit_id: "piece".into(),
            stocking_unit_id: "case".into(),
            selling_unit_id: "piece".into(),
            retail_price_cents: UNIT_PRICE_CENTS,
            price_modifier_cents: 0,
            wholesale_price_cents: None,
            buying_price: Some(dec!(1.25)),
            reorder_point: dec!(5),
            reorder_qty: dec!(48),
            is_default: true,
            is_active: true,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .unwrap();

    catalog::insert_location(
        &mut conn,
        &Location {
            id: LOCATION.into(),
            organization_id: ORG.into(),
            name: "Main Store".into(),
            is_active: true,
        },
    )
    .await
    .unwrap();

    customer::insert(
        &mut conn,
        &Customer {
            id: CUSTOMER.into(),
            organization_id: ORG.into(),
            name: "Amina".into(),
            loyalty_points: 0,
            is_active: true,
        },
    )
    .await
    .unwrap();

    supplier::insert(
        &mut conn,
        &Supplier {
            id: SUPPLIER.into(),
            organization_id: ORG.into(),
            name: "Acme Beverages".into(),
            is_active: true,
        },
    )
    .await
    .unwrap();

    drop(conn);
    db
}

/// Ledger context acting as [`MEMBER`] of [`ORG`].
pub fn context(db: &Database, defaults: SettingsDefaults) -> LedgerContext {
    LedgerContext::new(db.clone(), Arc::new(StaticAuthContext::new(MEMBER, ORG))).with_settings(
        Arc::new(DbSettingsProvider::new(db.clone()).with_defaults(defaults)),
    )
}

pub fn fifo() -> SettingsDefaults {
    SettingsDefaults::default()
}

pub fn fefo() -> SettingsDefaults {
    SettingsDefaults {
        inventory_policy: InventoryPolicy::Fefo,
        ..SettingsDefaults::default()
    }
}

pub fn negative_stock() -> SettingsDefaults {
    SettingsDefaults {
        negative_stock_allowed: true,
        ..SettingsDefaults::default()
    }
}

pub fn taxed(rate: Decimal) -> SettingsDefaults {
    SettingsDefaults {
        default_tax_rate: TaxRate::new(rate).unwrap(),
        ..SettingsDefaults::default()
    }
}

pub fn days_from_today(days: i64) -> NaiveDate {
    Utc::now().date_naive() + Duration::days(days)
}

/// Receives `quantity` pieces of [`VARIANT`] at [`LOCATION`] on Jan `day`
/// 2025, keeping the aggregate in step.
pub async fn receive(
    conn: &mut SqliteConnection,
    id: &str,
    quantity: Decimal,
    day: u32,
    expiry_date: Option<NaiveDate>,
) -> StockBatch {
    let received = Utc.with_ymd_and_hms(2025, 1, day, 9, 0, 0).unwrap();
    let row = StockBatch {
        id: id.into(),
        organization_id: ORG.into(),
        variant_id: VARIANT.into(),
        location_id: LOCATION.into(),
        batch_number: format!("B-TEST-{id}"),
        initial_quantity: quantity,
        current_quantity: quantity,
        purchase_price: dec!(1.25),
        expiry_date,
        received_date: received,
        supplier_id: None,
        purchase_order_item_id: None,
        version: 0,
        created_at: received,
        updated_at: received,
    };
    batch::insert(conn, &row).await.unwrap();
    apply_aggregate_delta(conn, ORG, &key(), quantity).await.unwrap();
    row
}

pub fn key() -> StockKey {
    StockKey::new(VARIANT, LOCATION)
}

pub async fn batch_quantity(db: &Database, id: &str) -> Decimal {
    let mut conn = db.pool().acquire().await.unwrap();
    batch::find(&mut conn, ORG, id).await.unwrap().unwrap().current_quantity
}

pub async fn aggregate(db: &Database) -> Option<ProductVariantStock> {
    let mut conn = db.pool().acquire().await.unwrap();
    stock_repo::find(&mut conn, ORG, &key()).await.unwrap()
}

pub async fn count(db: &Database, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(db.pool())
        .await
        .unwrap()
}
