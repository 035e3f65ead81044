//! # Validation Module
//!
//! Input validation for orchestrator requests.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Request DTO (serde)                                          │
//! │  ├── Type validation (deserialization)                                 │
//! │  └── Enum values (paymentMethod, reason)                               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE, before any unit of work begins                  │
//! │  ├── Required ids, positive quantities, cart size                      │
//! │  └── Non-negative prices and discounts                                 │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL / UNIQUE constraints                                     │
//! │  └── Foreign key constraints                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use rust_decimal::Decimal;
//! use stockline_core::validation::{validate_id, validate_quantity};
//!
//! validate_id("locationId", "loc-1").unwrap();
//! validate_quantity("quantity", Decimal::from(5)).unwrap();
//! ```

use rust_decimal::Decimal;

use crate::error::ValidationError;
use crate::{MAX_CART_ITEMS, MAX_ITEM_QUANTITY};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest id accepted from a caller.
const MAX_ID_LEN: usize = 64;

/// Longest free-text note accepted on a sale, restock or adjustment.
const MAX_NOTES_LEN: usize = 1_000;

// =============================================================================
// String Validators
// =============================================================================

/// Validates a required reference id (`productId`, `locationId`, ...).
pub fn validate_id(field: &str, id: &str) -> ValidationResult<()> {
    let id = id.trim();

    if id.is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if id.len() > MAX_ID_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_ID_LEN,
        });
    }

    Ok(())
}

/// Validates an optional reference id; `None` is fine, `Some("")` is not.
pub fn validate_optional_id(field: &str, id: Option<&str>) -> ValidationResult<()> {
    match id {
        Some(id) => validate_id(field, id),
        None => Ok(()),
    }
}

/// Validates free-text notes.
pub fn validate_notes(notes: Option<&str>) -> ValidationResult<()> {
    match notes {
        Some(text) if text.chars().count() > MAX_NOTES_LEN => Err(ValidationError::TooLong {
            field: "notes".to_string(),
            max: MAX_NOTES_LEN,
        }),
        _ => Ok(()),
    }
}

/// Validates a SKU (Stock Keeping Unit).
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Only alphanumeric characters, hyphens, underscores
///
/// ## Example
/// ```rust
/// use stockline_core::validation::validate_sku;
///
/// assert!(validate_sku("COLA-330").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("A".repeat(100).as_str()).is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    let sku = sku.trim();

    if sku.is_empty() {
        return Err(ValidationError::Required {
            field: "sku".to_string(),
        });
    }

    if sku.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "sku".to_string(),
            max: 50,
        });
    }

    if !sku
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "sku".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a quantity.
///
/// ## Rules
/// - Must be positive (> 0)
/// - Must not exceed MAX_ITEM_QUANTITY
///
/// ## User Workflow
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Cart line / restock: quantity 0.25                                     │
/// │       │                                                                 │
/// │       ▼                                                                 │
/// │  validate_quantity("quantity", 0.25) ← THIS FUNCTION                    │
/// │       │                                                                 │
/// │       ├── qty <= 0?         → "quantity must be positive"               │
/// │       ├── qty > 100000?     → "quantity must be between 0 and 100000"   │
/// │       └── OK → proceed                                                  │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
pub fn validate_quantity(field: &str, qty: Decimal) -> ValidationResult<()> {
    if qty <= Decimal::ZERO {
        return Err(ValidationError::MustBePositive {
            field: field.to_string(),
        });
    }

    if qty > Decimal::from(MAX_ITEM_QUANTITY) {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a signed manual adjustment: non-zero and within bounds.
pub fn validate_quantity_change(qty: Decimal) -> ValidationResult<()> {
    if qty.is_zero() || qty.abs() > Decimal::from(MAX_ITEM_QUANTITY) {
        return Err(ValidationError::OutOfRange {
            field: "quantityChange".to_string(),
            min: -MAX_ITEM_QUANTITY,
            max: MAX_ITEM_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a price that may be zero (free goods) but not negative.
pub fn validate_price(field: &str, price: Decimal) -> ValidationResult<()> {
    if price < Decimal::ZERO {
        return Err(ValidationError::MustNotBeNegative {
            field: field.to_string(),
        });
    }

    Ok(())
}

/// Validates a discount in cents.
///
/// ## Example
/// ```rust
/// use stockline_core::validation::validate_discount_cents;
///
/// assert!(validate_discount_cents(0).is_ok());
/// assert!(validate_discount_cents(2_000).is_ok());
/// assert!(validate_discount_cents(-1).is_err());
/// ```
pub fn validate_discount_cents(cents: i64) -> ValidationResult<()> {
    if cents < 0 {
        return Err(ValidationError::MustNotBeNegative {
            field: "discountAmount".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Collection Validators
// =============================================================================

/// Validates cart size: at least one line, at most MAX_CART_ITEMS.
pub fn validate_cart_size(lines: usize) -> ValidationResult<()> {
    if lines == 0 {
        return Err(ValidationError::Required {
            field: "cartItems".to_string(),
        });
    }

    if lines > MAX_CART_ITEMS {
        return Err(ValidationError::OutOfRange {
            field: "cartItems".to_string(),
            min: 1,
            max: MAX_CART_ITEMS as i64,
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================
