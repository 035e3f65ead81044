//! # stockline-core: Pure Business Logic for Stockline
//!
//! This crate is the **heart** of the stock ledger. It contains every rule
//! of the inventory and sale engine as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockline Architecture                           │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Host (CLI / API layer of the host system)          │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │        stockline-ledger (Sale / Restock / Adjust orchestrators) │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              ★ stockline-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐  ┌─────────┐  ┌───────────┐  ┌──────────────┐    │   │
//! │  │   │  units  │  │  money  │  │ selection │  │    ledger    │    │   │
//! │  │   │ UnitGraph│ │  Money  │  │ FIFO/FEFO │  │ StockDeltas  │    │   │
//! │  │   │ factors │  │ TaxRate │  │ fallback  │  │ SaleTotals   │    │   │
//! │  │   └─────────┘  └─────────┘  └───────────┘  └──────────────┘    │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                stockline-db (SQLite ledger storage)             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (UnitOfMeasure, StockBatch, Sale, ...)
//! - [`money`] - Money type with integer cents
//! - [`units`] - Unit-of-measure hierarchy and conversions
//! - [`selection`] - Which batch funds a sale line
//! - [`ledger`] - Staged stock deltas, sale totals, reconciliation
//! - [`error`] - Domain error types
//! - [`validation`] - Input validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input = same output; callers pass the clock
//! 2. **Integer Money**: till amounts are cents (i64)
//! 3. **Exact Quantities**: stock quantities and unit costs are `Decimal`
//! 4. **Explicit Errors**: all errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use rust_decimal::Decimal;
//! use stockline_core::money::Money;
//! use stockline_core::types::TaxRate;
//! use stockline_core::ledger::SaleTotals;
//!
//! let subtotal = Money::from_cents(10_000); // $100.00
//! let discount = Money::from_cents(2_000);  // $20.00
//! let rate = TaxRate::new(Decimal::new(16, 2)).unwrap(); // 16%
//!
//! let totals = SaleTotals::compute(subtotal, discount, rate).unwrap();
//! assert_eq!(totals.tax.cents(), 1_280);
//! assert_eq!(totals.final_amount.cents(), 9_280);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod money;
pub mod selection;
pub mod types;
pub mod units;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use ledger::{SaleTotals, StockDeltas, StockDiscrepancy, StockKey};
pub use money::Money;
pub use selection::{FundingBatch, FundingSource, SelectionRequest};
pub use types::*;
pub use units::{UnitConversion, UnitGraph};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum lines allowed in a single cart.
pub const MAX_CART_ITEMS: usize = 100;

/// Maximum quantity of a single line, in the unit it is expressed in.
///
/// ## Business Reason
/// Prevents accidental over-ordering (e.g., typing 10000 instead of 10)
/// and keeps `Money × quantity` far away from i64 overflow.
pub const MAX_ITEM_QUANTITY: i64 = 100_000;

/// Spend (in cents) that earns one loyalty point: one point per 10.00.
pub const LOYALTY_CENTS_PER_POINT: i64 = 1_000;
