//! # Ledger Rule Errors
//!
//! What the pure layer can refuse. Storage failures live in `stockline-db`,
//! and `stockline-ledger` folds both into one `LedgerError` with a
//! serialisable kind.
//!
//! ```text
//! caller input ──► ValidationError ─┐
//! unit graph ────► UnknownUnit, CycleDetected, NoConversionPath,
//!                  InvalidConversionFactor ──────────┤
//! batch selection ► InsufficientStock, NoCostBasisAvailable ──► CoreError
//! totals ────────► DiscountExceedsSubtotal ─────────┤
//! variant lookup ► MissingVariantForStockTracking ──┘
//! ```
//!
//! Messages carry the ids and quantities involved; they are shown to
//! cashiers as-is.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::money::Money;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    /// A unit id (or symbol) is not part of the unit graph.
    #[error("Unknown unit of measure: {0}")]
    UnknownUnit(String),

    /// Following `base_unit_id` pointers revisited a unit.
    #[error("Unit hierarchy contains a cycle at unit {unit_id}")]
    CycleDetected { unit_id: String },

    /// The walk from `from` ended at a root without reaching `to`.
    #[error("No conversion path from unit {from} to unit {to}")]
    NoConversionPath { from: String, to: String },

    /// A conversion factor is zero, negative, or overflows.
    #[error("Invalid conversion factor on unit {unit_id}")]
    InvalidConversionFactor { unit_id: String },

    /// No batch can fund the line and negative stock is disallowed.
    ///
    /// ## User Workflow
    /// ```text
    /// Sell 15 PCS
    ///      │
    ///      ▼
    /// No batch holds 15, aggregate shows 13 available
    ///      │
    ///      ▼
    /// InsufficientStock { required: 15, available: 13 }
    ///      │
    ///      ▼
    /// Whole sale rolls back, cashier sees "required 15, available 13"
    /// ```
    #[error(
        "Insufficient stock for variant {variant_id} at location {location_id}: required {required}, available {available}"
    )]
    InsufficientStock {
        variant_id: String,
        location_id: String,
        required: Decimal,
        available: Decimal,
    },

    /// Negative stock is allowed but no batch ever existed to link the sale to.
    #[error(
        "No stock batch has ever been received for variant {variant_id} at location {location_id}; cannot record a cost basis"
    )]
    NoCostBasisAvailable {
        variant_id: String,
        location_id: String,
    },

    /// The sale discount is larger than the subtotal.
    #[error("Discount {discount} exceeds subtotal {subtotal}")]
    DiscountExceedsSubtotal { discount: Money, subtotal: Money },

    /// The product has no variant that can hold stock.
    #[error("Product {product_id} has no variant configured for stock tracking")]
    MissingVariantForStockTracking { product_id: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// A request field failed a check before any transaction was opened.
///
/// `field` is the camelCase name the caller sent (`cartItems[2].quantity`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Discounts, prices and reorder points.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Unparseable decimal or date text.
    #[error("{field} is malformed: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Unknown enum text such as an inventory policy or payment method.
    #[error("{field} must be one of {}", .allowed.join(", "))]
    NotAllowed { field: String, allowed: Vec<String> },
}

// =============================================================================
// Result Type Alias
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
