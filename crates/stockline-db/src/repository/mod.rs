//! # Repository Module
//!
//! SQL access for the stock ledger, grouped by table family.
//!
//! ## Connection-Scoped Repositories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every function takes `&mut SqliteConnection`:                          │
//! │                                                                         │
//! │   let mut tx = db.begin().await?;                                      │
//! │   batch::update_quantity(&mut tx, ...).await?;   ─┐ same               │
//! │   stock::update_levels(&mut tx, ...).await?;      ├─ transaction       │
//! │   sale::insert_sale(&mut tx, ...).await?;        ─┘                    │
//! │   tx.commit().await?;                                                  │
//! │                                                                         │
//! │   let mut conn = db.pool().acquire().await?;     ← out-of-band reads   │
//! │   stock::list_for_organization(&mut conn, org).await?;                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The caller owns the transaction boundary; nothing in here commits.
//!
//! ## Decimal Columns
//! Quantities and unit costs are stored as TEXT and parsed here, so a row
//! struct (`*Row`, `sqlx::FromRow`) is converted into its domain type with
//! `TryFrom`. A malformed value surfaces as [`DbError::Decode`].
//!
//! ## Available Repositories
//!
//! - [`unit`] - Units of measure
//! - [`catalog`] - Products, variants, locations
//! - [`supplier`] - Suppliers and variant/supplier links
//! - [`customer`] - Customers and loyalty transactions
//! - [`batch`] - Stock batches (the ledger)
//! - [`stock`] - Per-(variant, location) aggregate
//! - [`sale`] - Sales and sale items
//! - [`journal`] - Adjustments, movements, audit entries
//! - [`settings`] - Organization settings

use std::str::FromStr;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{DbError, DbResult};

pub mod batch;
pub mod catalog;
pub mod customer;
pub mod journal;
pub mod sale;
pub mod settings;
pub mod stock;
pub mod supplier;
pub mod unit;

/// Generates a new primary key.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Canonical TEXT form of a decimal column value.
pub(crate) fn decimal_text(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Parses a TEXT decimal column.
pub(crate) fn parse_decimal(column: &str, value: &str) -> DbResult<Decimal> {
    Decimal::from_str(value.trim()).map_err(|_| DbError::Decode {
        column: column.to_string(),
        value: value.to_string(),
    })
}

/// Parses a nullable TEXT decimal column.
pub(crate) fn parse_optional_decimal(column: &str, value: Option<&str>) -> DbResult<Option<Decimal>> {
    value.map(|v| parse_decimal(column, v)).transpose()
}


#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_decimal_text_round_trip() {
        assert_eq!(decimal_text(dec!(48.000)), "48");
        assert_eq!(decimal_text(dec!(-2.50)), "-2.5");
        assert_eq!(parse_decimal("qty", "2.5").unwrap(), dec!(2.5));
        assert_eq!(parse_optional_decimal("qty", None).unwrap(), None);
        assert!(matches!(
            parse_decimal("qty", "2,5"),
            Err(DbError::Decode { .. })
        ));
    }
}
