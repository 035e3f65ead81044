//! # Domain Types
//!
//! Core domain types used throughout Stockline.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │ UnitOfMeasure   │   │ ProductVariant  │   │ StockBatch (lot)    │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  base_unit_id ──┼─┐ │  base_unit_id   │   │  variant_id         │   │
//! │  │  factor         │ │ │  stocking_unit  │   │  location_id        │   │
//! │  └────────▲────────┘ │ │  selling_unit   │   │  current_quantity   │   │
//! │           └──────────┘ └─────────────────┘   │  purchase_price     │   │
//! │          (forest)                            └──────────┬──────────┘   │
//! │                                                         │ Σ            │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌──────────▼──────────┐   │
//! │  │      Sale       │──►│    SaleItem     │   │ ProductVariantStock │   │
//! │  │  sale_number    │   │  stock_batch_id │   │  (aggregate cache)  │   │
//! │  │  final_amount   │   │  unit_cost      │   │  current_stock      │   │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────────┘   │
//! │                                                                         │
//! │  Append-only: StockAdjustment, StockMovement, LoyaltyTransaction,      │
//! │               AuditEntry                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quantities
//! Every stock quantity and every per-unit cost on a batch or aggregate is
//! expressed in the variant's **base unit** and held as an exact `Decimal`.
//! Amounts paid at the till are integer cents ([`Money`]).

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate as an exact decimal fraction (`0.16` = 16%).
///
/// ## Why a Fraction?
/// Organization settings carry arbitrary rates such as `0.075` or `0.1625`.
/// Basis points are still accepted through [`TaxRate::from_bps`]
/// (825 bps = 0.0825).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaxRate(#[ts(type = "string")] Decimal);

impl TaxRate {
    /// Creates a tax rate from a fraction in `0..=1`.
    pub fn new(fraction: Decimal) -> Result<Self, ValidationError> {
        if fraction < Decimal::ZERO || fraction > Decimal::ONE {
            return Err(ValidationError::OutOfRange {
                field: "taxRate".to_string(),
                min: 0,
                max: 1,
            });
        }
        Ok(TaxRate(fraction))
    }

    /// Creates a tax rate from basis points (1 bps = 0.01%).
    #[inline]
    pub fn from_bps(bps: u32) -> Self {
        TaxRate(Decimal::new(i64::from(bps), 4))
    }

    /// Returns the rate as a fraction.
    #[inline]
    pub fn fraction(&self) -> Decimal {
        self.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(Decimal::ZERO)
    }

    /// Checks if tax rate is zero.
    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

impl fmt::Display for TaxRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", (self.0 * Decimal::ONE_HUNDRED).normalize())
    }
}

// =============================================================================
// Enumerations
// =============================================================================

/// Implements `as_str`, `Display` and `FromStr` for a text-coded enum.
///
/// `FromStr` is case-insensitive so config files and CLI flags may use
/// `fefo` or `FEFO` alike.
macro_rules! text_enum {
    ($name:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The canonical stored/serialized text for this value.
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
                    .ok_or_else(|| ValidationError::NotAllowed {
                        field: $field.to_string(),
                        allowed: $name::ALL.iter().map(|v| v.as_str().to_string()).collect(),
                    })
            }
        }
    };
}

/// Physical dimension a unit measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    Count,
    Weight,
    Volume,
    Length,
}

text_enum!(UnitType, "unitType", {
    Count => "count",
    Weight => "weight",
    Volume => "volume",
    Length => "length",
});

/// Order in which batches are consumed by sales.
///
/// ```text
/// FIFO: received_date ASC                      (oldest lot first)
/// FEFO: expiry_date ASC NULLS LAST, then received_date ASC
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[ts(export)]
#[serde(rename_all = "UPPERCASE")]
pub enum InventoryPolicy {
    /// First-In-First-Out (by receipt date).
    Fifo,
    /// First-Expired-First-Out (by expiry date).
    Fefo,
}

impl Default for InventoryPolicy {
    fn default() -> Self {
        InventoryPolicy::Fifo
    }
}

text_enum!(InventoryPolicy, "inventoryPolicy", {
    Fifo => "FIFO",
    Fefo => "FEFO",
});

/// Why a batch quantity changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdjustmentReason {
    /// Stock received against a supplier or purchase order.
    ReceivedPurchase,
    /// Stock found during a count (restock without supplier link).
    InventoryCount,
    Damaged,
    Expired,
    Correction,
    /// Customer return put back on the shelf.
    Returned,
}

text_enum!(AdjustmentReason, "reason", {
    ReceivedPurchase => "RECEIVED_PURCHASE",
    InventoryCount => "INVENTORY_COUNT",
    Damaged => "DAMAGED",
    Expired => "EXPIRED",
    Correction => "CORRECTION",
    Returned => "RETURNED",
});

/// Kind of quantity change recorded on the movement ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    Receipt,
    Sale,
    Adjustment,
    WriteOff,
}

text_enum!(MovementType, "movementType", {
    Receipt => "RECEIPT",
    Sale => "SALE",
    Adjustment => "ADJUSTMENT",
    WriteOff => "WRITE_OFF",
});

/// Entity an audit entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "SCREAMING_SNAKE_CASE"))]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEntityType {
    Sale,
    StockBatch,
    StockAdjustment,
}

text_enum!(AuditEntityType, "entityType", {
    Sale => "SALE",
    StockBatch => "STOCK_BATCH",
    StockAdjustment => "STOCK_ADJUSTMENT",
});

/// The status of a sale transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Sale has been paid and finalized.
    Completed,
    /// Sale was cancelled/refunded.
    Voided,
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Completed
    }
}

text_enum!(SaleStatus, "status", {
    Completed => "completed",
    Voided => "voided",
});

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    MobileMoney,
    BankTransfer,
    StoreCredit,
}

text_enum!(PaymentMethod, "paymentMethod", {
    Cash => "cash",
    Card => "card",
    MobileMoney => "mobile_money",
    BankTransfer => "bank_transfer",
    StoreCredit => "store_credit",
});

// =============================================================================
// Unit of Measure
// =============================================================================

/// A node of the unit-of-measure forest.
///
/// `conversion_factor` says how many of the parent unit make one of this
/// unit: "Case" → "Piece" with factor 24 means 1 Case = 24 Piece.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct UnitOfMeasure {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub symbol: String,
    pub unit_type: UnitType,
    /// Parent unit. `None` for a root.
    pub base_unit_id: Option<String>,
    #[ts(as = "Option<String>")]
    pub conversion_factor: Option<Decimal>,
}

impl UnitOfMeasure {
    /// Roots have no parent.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.base_unit_id.is_none()
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// A product. Stock is never held on the product itself, only on variants.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub organization_id: String,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// A sellable SKU of a product.
///
/// ## The Three Units
/// ```text
/// stocking_unit  (what suppliers deliver)   e.g. Case
/// selling_unit   (what the till sells)      e.g. Piece
/// base_unit      (what the ledger stores)   e.g. Piece
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductVariant {
    pub id: String,
    pub organization_id: String,
    pub product_id: String,
    pub sku: String,
    pub name: String,
    pub base_unit_id: String,
    pub stocking_unit_id: String,
    pub selling_unit_id: String,
    /// Retail price per selling unit, in cents.
    pub retail_price_cents: i64,
    /// Signed modifier added to the retail price (e.g. "Large" +50).
    pub price_modifier_cents: i64,
    pub wholesale_price_cents: Option<i64>,
    /// Default cost per base unit, used when a restock carries no price.
    #[ts(as = "Option<String>")]
    pub buying_price: Option<Decimal>,
    /// Base units at or below which the variant is reported as low stock.
    #[ts(type = "string")]
    pub reorder_point: Decimal,
    #[ts(type = "string")]
    pub reorder_qty: Decimal,
    /// The variant a product defaults to when a request names none.
    pub is_default: bool,
    pub is_active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl ProductVariant {
    /// Price charged per selling unit: retail price plus modifier.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.retail_price_cents) + Money::from_cents(self.price_modifier_cents)
    }
}

/// A stock-holding location (store, warehouse, van).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Location {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Supplier {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Customer {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    /// Running balance, always the sum of the customer's loyalty transactions.
    pub loyalty_points: i64,
    pub is_active: bool,
}

/// Link between a variant and a supplier that delivers it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductSupplier {
    pub id: String,
    pub organization_id: String,
    pub variant_id: String,
    pub supplier_id: String,
    /// Last purchase price per packaging unit.
    #[ts(type = "string")]
    pub cost_price: Decimal,
    pub packaging_unit_id: Option<String>,
    pub is_preferred: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Stock Ledger
// =============================================================================

/// A received lot of a variant at a location.
///
/// ## Lifecycle
/// ```text
/// restock ──► current = initial ──► sales / adjustments ──► 0 (history)
///                                   (may go negative only under the
///                                    negative-stock policy)
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockBatch {
    pub id: String,
    pub organization_id: String,
    pub variant_id: String,
    pub location_id: String,
    pub batch_number: String,
    #[ts(type = "string")]
    pub initial_quantity: Decimal,
    #[ts(type = "string")]
    pub current_quantity: Decimal,
    /// Cost per base unit.
    #[ts(type = "string")]
    pub purchase_price: Decimal,
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    #[ts(as = "String")]
    pub received_date: DateTime<Utc>,
    pub supplier_id: Option<String>,
    pub purchase_order_item_id: Option<String>,
    /// Optimistic concurrency token, bumped on every write.
    pub version: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl StockBatch {
    /// A batch is expired once its expiry date is strictly before `today`.
    #[inline]
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.is_some_and(|expiry| expiry < today)
    }
}

/// The per-(variant, location) stock aggregate.
///
/// A cache of the batch ledger: `current_stock` equals the sum of the batch
/// quantities for the pair at every quiescent point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ProductVariantStock {
    pub id: String,
    pub organization_id: String,
    pub variant_id: String,
    pub location_id: String,
    #[ts(type = "string")]
    pub current_stock: Decimal,
    #[ts(type = "string")]
    pub reserved_stock: Decimal,
    /// Always `current_stock - reserved_stock`.
    #[ts(type = "string")]
    pub available_stock: Decimal,
    pub version: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockAdjustment {
    pub id: String,
    pub organization_id: String,
    pub stock_batch_id: String,
    pub variant_id: String,
    pub location_id: String,
    /// Signed change in base units.
    #[ts(type = "string")]
    pub quantity_change: Decimal,
    pub reason: AdjustmentReason,
    pub notes: Option<String>,
    pub member_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// One row of the movement ledger.
///
/// `from_location_id = None` means stock came from outside (a supplier);
/// `to_location_id = None` means it left (a sale or write-off).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockMovement {
    pub id: String,
    pub organization_id: String,
    pub stock_batch_id: String,
    pub variant_id: String,
    pub adjustment_id: Option<String>,
    pub movement_type: MovementType,
    /// Base units moved; the locations give the direction.
    #[ts(type = "string")]
    pub quantity: Decimal,
    pub from_location_id: Option<String>,
    pub to_location_id: Option<String>,
    /// "SALE" or "PURCHASE_ORDER_ITEM".
    pub reference_type: Option<String>,
    pub reference_id: Option<String>,
    pub member_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Sales
// =============================================================================

/// A completed sale header.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub organization_id: String,
    /// Human-readable number, unique per organization (`S-20250115-1A2B3C4D`).
    pub sale_number: String,
    pub location_id: String,
    pub customer_id: Option<String>,
    pub member_id: String,
    pub status: SaleStatus,
    pub payment_method: PaymentMethod,
    pub subtotal_cents: i64,
    pub discount_cents: i64,
    pub tax_cents: i64,
    pub final_amount_cents: i64,
    pub notes: Option<String>,
    /// Set after commit by the receipt generator, best-effort.
    pub receipt_url: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }

    #[inline]
    pub fn discount(&self) -> Money {
        Money::from_cents(self.discount_cents)
    }

    #[inline]
    pub fn tax(&self) -> Money {
        Money::from_cents(self.tax_cents)
    }

    #[inline]
    pub fn final_amount(&self) -> Money {
        Money::from_cents(self.final_amount_cents)
    }
}

/// A line item of a sale. Pins the price, the cost and the batch consumed.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub product_id: String,
    pub variant_id: String,
    /// Never null: every line is linked to the batch that funded it.
    pub stock_batch_id: String,
    /// Quantity in the selling unit.
    #[ts(type = "string")]
    pub quantity: Decimal,
    /// The same quantity in base units, as taken from the batch.
    #[ts(type = "string")]
    pub base_quantity: Decimal,
    pub unit_price_cents: i64,
    /// Cost per base unit, copied from the batch.
    #[ts(type = "string")]
    pub unit_cost: Decimal,
    pub line_total_cents: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleItem {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn line_total(&self) -> Money {
        Money::from_cents(self.line_total_cents)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LoyaltyTransaction {
    pub id: String,
    pub organization_id: String,
    pub customer_id: String,
    pub sale_id: Option<String>,
    /// Signed point delta.
    pub points: i64,
    pub description: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Audit Trail
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AuditEntry {
    pub id: String,
    pub organization_id: String,
    pub entity_type: AuditEntityType,
    pub entity_id: String,
    /// "CREATE", "RESTOCK", "ADJUST", "WRITE_OFF".
    pub action: String,
    pub previous_status: Option<String>,
    pub new_status: Option<String>,
    #[ts(type = "unknown")]
    pub details: serde_json::Value,
    pub member_id: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Context Types
// =============================================================================

/// Per-organization settings, fetched once per operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct OrganizationSettings {
    pub organization_id: String,
    pub default_tax_rate: TaxRate,
    pub negative_stock_allowed: bool,
    pub inventory_policy: InventoryPolicy,
}

/// Who is acting, and for which tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AuthContext {
    pub member_id: String,
    pub organization_id: String,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tax_rate_from_bps() {
        let rate = TaxRate::from_bps(825);
        assert_eq!(rate.fraction(), dec!(0.0825));
        assert_eq!(rate.to_string(), "8.25%");
    }

    #[test]
    fn test_tax_rate_bounds() {
        assert!(TaxRate::new(dec!(0.16)).is_ok());
        assert!(TaxRate::new(dec!(0)).is_ok());
        assert!(TaxRate::new(dec!(1)).is_ok());
        assert!(TaxRate::new(dec!(-0.01)).is_err());
        assert!(TaxRate::new(dec!(1.5)).is_err());
    }

    #[test]
    fn test_inventory_policy_parse_is_case_insensitive() {
        assert_eq!("fefo".parse::<InventoryPolicy>().unwrap(), InventoryPolicy::Fefo);
        assert_eq!("FIFO".parse::<InventoryPolicy>().unwrap(), InventoryPolicy::Fifo);
        assert!("LIFO".parse::<InventoryPolicy>().is_err());
        assert_eq!(InventoryPolicy::default(), InventoryPolicy::Fifo);
    }

    #[test]
    fn test_enum_text_matches_serde() {
        for reason in AdjustmentReason::ALL {
            let json = serde_json::to_string(reason).unwrap();
            assert_eq!(json, format!("\"{}\"", reason.as_str()));
        }
        for method in PaymentMethod::ALL {
            let json = serde_json::to_string(method).unwrap();
            assert_eq!(json, format!("\"{}\"", method.as_str()));
        }
        assert_eq!(MovementType::WriteOff.to_string(), "WRITE_OFF");
    }

    #[test]
    fn test_batch_expiry_is_strictly_before_today() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let mut batch = StockBatch {
            id: "b".into(),
            organization_id: "org".into(),
            variant_id: "v".into(),
            location_id: "l".into(),
            batch_number: "B-1".into(),
            initial_quantity: dec!(10),
            current_quantity: dec!(10),
            purchase_price: dec!(1),
            expiry_date: Some(today),
            received_date: Utc::now(),
            supplier_id: None,
            purchase_order_item_id: None,
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(!batch.is_expired(today));
        batch.expiry_date = today.pred_opt();
        assert!(batch.is_expired(today));
        batch.expiry_date = None;
        assert!(!batch.is_expired(today));
    }
}
