//! # Unit Conversion Resolver
//!
//! Resolves quantities and prices expressed in any unit to a variant's
//! base unit by walking the unit-of-measure forest.
//!
//! ## The Walk
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  factor_to_base("Pallet", "Piece")                                      │
//! │                                                                         │
//! │   Pallet ──(×40)──► Case ──(×24)──► Piece                               │
//! │   factor = 1       40               960        current == target ✓      │
//! │                                                                         │
//! │  Each hop multiplies by the node's conversion_factor. The walk stops    │
//! │  when it reaches the target, fails with NoConversionPath at a root,     │
//! │  and fails with CycleDetected if a node is visited twice.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quantities vs Prices
//! Quantities scale *with* the factor, prices per unit scale *against* it:
//! 2 Case = 48 Piece, while $48/Case = $2/Piece.

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::types::UnitOfMeasure;

// =============================================================================
// Unit Conversion Record
// =============================================================================

/// The full context of one conversion, kept for traceability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct UnitConversion {
    pub unit_id: String,
    #[ts(type = "string")]
    pub unit_quantity: Decimal,
    pub base_unit_id: String,
    #[ts(type = "string")]
    pub base_quantity: Decimal,
    /// Number of base units in one `unit_id`.
    #[ts(type = "string")]
    pub factor: Decimal,
}

// =============================================================================
// Unit Graph
// =============================================================================

/// An in-memory view of an organization's units.
///
/// Built once per operation from the unit table. Lookups by id are O(1);
/// [`UnitGraph::find`] also accepts a symbol or name.
#[derive(Debug, Clone, Default)]
pub struct UnitGraph {
    units: Vec<UnitOfMeasure>,
    by_id: HashMap<String, usize>,
}

impl UnitGraph {
    /// Builds a graph from a list of units. Later duplicates of an id win.
    pub fn new(units: impl IntoIterator<Item = UnitOfMeasure>) -> Self {
        let units: Vec<UnitOfMeasure> = units.into_iter().collect();
        let by_id = units
            .iter()
            .enumerate()
            .map(|(idx, unit)| (unit.id.clone(), idx))
            .collect();
        Self { units, by_id }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Looks a unit up by id.
    pub fn get(&self, unit_id: &str) -> CoreResult<&UnitOfMeasure> {
        self.by_id
            .get(unit_id)
            .map(|&idx| &self.units[idx])
            .ok_or_else(|| CoreError::UnknownUnit(unit_id.to_string()))
    }

    /// Looks a unit up by id, then symbol, then name.
    ///
    /// Symbol and name matches are case-insensitive ("cs", "CASE", "Case").
    pub fn find(&self, reference: &str) -> CoreResult<&UnitOfMeasure> {
        let reference = reference.trim();
        if let Ok(unit) = self.get(reference) {
            return Ok(unit);
        }
        self.units
            .iter()
            .find(|u| u.symbol.eq_ignore_ascii_case(reference))
            .or_else(|| {
                self.units
                    .iter()
                    .find(|u| u.name.eq_ignore_ascii_case(reference))
            })
            .ok_or_else(|| CoreError::UnknownUnit(reference.to_string()))
    }

    /// Number of `target_base_id` units in one `source_id` unit.
    ///
    /// ## Example
    /// ```rust
    /// use rust_decimal::Decimal;
    /// use stockline_core::types::{UnitOfMeasure, UnitType};
    /// use stockline_core::units::UnitGraph;
    ///
    /// let unit = |id: &str, base: Option<&str>, factor: Option<i64>| UnitOfMeasure {
    ///     id: id.into(),
    ///     organization_id: "org".into(),
    ///     name: id.into(),
    ///     symbol: id.into(),
    ///     unit_type: UnitType::Count,
    ///     base_unit_id: base.map(Into::into),
    ///     conversion_factor: factor.map(Decimal::from),
    /// };
    /// let graph = UnitGraph::new([
    ///     unit("pc", None, None),
    ///     unit("case", Some("pc"), Some(24)),
    /// ]);
    /// assert_eq!(graph.factor_to_base("case", "pc").unwrap(), Decimal::from(24));
    /// assert_eq!(graph.factor_to_base("pc", "pc").unwrap(), Decimal::ONE);
    /// ```
    pub fn factor_to_base(&self, source_id: &str, target_base_id: &str) -> CoreResult<Decimal> {
        // Both ends must exist
        self.get(target_base_id)?;
        let mut current = self.get(source_id)?;

        let mut visited: HashSet<&str> = HashSet::new();
        let mut factor = Decimal::ONE;

        loop {
            if current.id == target_base_id {
                return Ok(factor);
            }
            if !visited.insert(current.id.as_str()) {
                return Err(CoreError::CycleDetected {
                    unit_id: current.id.clone(),
                });
            }

            match (&current.base_unit_id, current.conversion_factor) {
                (Some(parent_id), Some(step)) => {
                    factor = Self::checked_step(&current.id, factor, step)?;
                    current = self.get(parent_id)?;
                }
                _ => {
                    return Err(CoreError::NoConversionPath {
                        from: source_id.to_string(),
                        to: target_base_id.to_string(),
                    });
                }
            }
        }
    }

    /// Walks from `unit_id` up to its root, returning the root id and the
    /// accumulated factor.
    pub fn root_of(&self, unit_id: &str) -> CoreResult<(String, Decimal)> {
        let mut current = self.get(unit_id)?;
        let mut visited: HashSet<&str> = HashSet::new();
        let mut factor = Decimal::ONE;

        loop {
            if !visited.insert(current.id.as_str()) {
                return Err(CoreError::CycleDetected {
                    unit_id: current.id.clone(),
                });
            }
            match (&current.base_unit_id, current.conversion_factor) {
                (None, _) => return Ok((current.id.clone(), factor)),
                (Some(parent_id), Some(step)) => {
                    factor = Self::checked_step(&current.id, factor, step)?;
                    current = self.get(parent_id)?;
                }
                // A parent without a factor cannot be converted through
                (Some(_), None) => {
                    return Err(CoreError::InvalidConversionFactor {
                        unit_id: current.id.clone(),
                    });
                }
            }
        }
    }

    /// Checks that every unit reaches a root with valid factors.
    pub fn validate(&self) -> CoreResult<()> {
        for unit in &self.units {
            self.root_of(&unit.id)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Derived conversions
    // -------------------------------------------------------------------------

    /// `quantity` of `unit_id` expressed in `base_unit_id`: `quantity × factor`.
    pub fn convert_quantity_to_base(
        &self,
        quantity: Decimal,
        unit_id: &str,
        base_unit_id: &str,
    ) -> CoreResult<Decimal> {
        let factor = self.factor_to_base(unit_id, base_unit_id)?;
        quantity
            .checked_mul(factor)
            .ok_or_else(|| CoreError::InvalidConversionFactor {
                unit_id: unit_id.to_string(),
            })
    }

    /// Price per `unit_id` expressed per `base_unit_id`: `price ÷ factor`.
    pub fn convert_price_per_unit_to_base(
        &self,
        price: Decimal,
        unit_id: &str,
        base_unit_id: &str,
    ) -> CoreResult<Decimal> {
        let factor = self.factor_to_base(unit_id, base_unit_id)?;
        Self::checked_divide(unit_id, price, factor)
    }

    /// Inverse of [`Self::convert_quantity_to_base`]: `quantity ÷ factor`.
    pub fn convert_quantity_from_base(
        &self,
        base_quantity: Decimal,
        unit_id: &str,
        base_unit_id: &str,
    ) -> CoreResult<Decimal> {
        let factor = self.factor_to_base(unit_id, base_unit_id)?;
        Self::checked_divide(unit_id, base_quantity, factor)
    }

    /// Inverse of [`Self::convert_price_per_unit_to_base`]: `price × factor`.
    pub fn convert_price_per_base_to_unit(
        &self,
        base_price: Decimal,
        unit_id: &str,
        base_unit_id: &str,
    ) -> CoreResult<Decimal> {
        let factor = self.factor_to_base(unit_id, base_unit_id)?;
        base_price
            .checked_mul(factor)
            .ok_or_else(|| CoreError::InvalidConversionFactor {
                unit_id: unit_id.to_string(),
            })
    }

    /// Converts `quantity` of `unit_id` and records the conversion.
    pub fn resolve(
        &self,
        quantity: Decimal,
        unit_id: &str,
        base_unit_id: &str,
    ) -> CoreResult<UnitConversion> {
        let factor = self.factor_to_base(unit_id, base_unit_id)?;
        let base_quantity =
            quantity
                .checked_mul(factor)
                .ok_or_else(|| CoreError::InvalidConversionFactor {
                    unit_id: unit_id.to_string(),
                })?;
        Ok(UnitConversion {
            unit_id: unit_id.to_string(),
            unit_quantity: quantity,
            base_unit_id: base_unit_id.to_string(),
            base_quantity,
            factor,
        })
    }

    fn checked_step(unit_id: &str, factor: Decimal, step: Decimal) -> CoreResult<Decimal> {
        if step <= Decimal::ZERO {
            return Err(CoreError::InvalidConversionFactor {
                unit_id: unit_id.to_string(),
            });
        }
        factor
            .checked_mul(step)
            .ok_or_else(|| CoreError::InvalidConversionFactor {
                unit_id: unit_id.to_string(),
            })
    }

    fn checked_divide(unit_id: &str, value: Decimal, factor: Decimal) -> CoreResult<Decimal> {
        if factor.is_zero() {
            return Err(CoreError::InvalidConversionFactor {
                unit_id: unit_id.to_string(),
            });
        }
        value
            .checked_div(factor)
            .ok_or_else(|| CoreError::InvalidConversionFactor {
                unit_id: unit_id.to_string(),
            })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
