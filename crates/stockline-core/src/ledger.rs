//! # Ledger Arithmetic
//!
//! Pure pieces of the stock ledger: staged deltas, sale totals, loyalty
//! points and reconciliation.
//!
//! ## Staged Deltas
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  cart line 1: 3 × Cola  ── batch A ──┐                                  │
//! │  cart line 2: 2 × Cola  ── batch A ──┼──► batches:    { A: -5 }         │
//! │                                      └──► aggregates: { (Cola,Shop):-5 }│
//! │                                                                         │
//! │  Lines that touch the same batch or (variant, location) are summed     │
//! │  in memory, then written ONCE each, in key order.                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::TaxRate;
use crate::LOYALTY_CENTS_PER_POINT;

// =============================================================================
// Stock Key
// =============================================================================

/// Composite key of the stock aggregate.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StockKey {
    pub variant_id: String,
    pub location_id: String,
}

impl StockKey {
    pub fn new(variant_id: impl Into<String>, location_id: impl Into<String>) -> Self {
        Self {
            variant_id: variant_id.into(),
            location_id: location_id.into(),
        }
    }
}

// =============================================================================
// Staged Deltas
// =============================================================================

/// Signed quantity changes staged during one operation, not yet written.
///
/// Both maps are `BTreeMap`s so writes happen in a stable order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StockDeltas {
    batches: BTreeMap<String, Decimal>,
    aggregates: BTreeMap<StockKey, Decimal>,
}

impl StockDeltas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages `delta` (negative for a decrement) against a batch and its
    /// aggregate.
    pub fn stage(&mut self, batch_id: &str, key: &StockKey, delta: Decimal) {
        *self
            .batches
            .entry(batch_id.to_string())
            .or_insert(Decimal::ZERO) += delta;
        *self
            .aggregates
            .entry(key.clone())
            .or_insert(Decimal::ZERO) += delta;
    }

    /// Delta staged so far against a batch (zero if none).
    pub fn batch_delta(&self, batch_id: &str) -> Decimal {
        self.batches.get(batch_id).copied().unwrap_or(Decimal::ZERO)
    }

    /// Delta staged so far against an aggregate (zero if none).
    pub fn aggregate_delta(&self, key: &StockKey) -> Decimal {
        self.aggregates.get(key).copied().unwrap_or(Decimal::ZERO)
    }

    /// Staged batch deltas in batch-id order.
    pub fn batches(&self) -> impl Iterator<Item = (&String, &Decimal)> {
        self.batches.iter()
    }

    /// Staged aggregate deltas in (variant, location) order.
    pub fn aggregates(&self) -> impl Iterator<Item = (&StockKey, &Decimal)> {
        self.aggregates.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

// =============================================================================
// Sale Totals
// =============================================================================

/// Header amounts of a sale.
///
/// ```text
/// taxable = subtotal − discount
/// tax     = round(taxable × rate, 2, HALF_UP)
/// final   = taxable + tax
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleTotals {
    pub subtotal: Money,
    pub discount: Money,
    pub taxable: Money,
    pub tax: Money,
    pub final_amount: Money,
}

impl SaleTotals {
    /// Computes totals, rejecting a negative discount or one above the subtotal.
    pub fn compute(subtotal: Money, discount: Money, rate: TaxRate) -> CoreResult<Self> {
        if discount.is_negative() {
            return Err(ValidationError::MustNotBeNegative {
                field: "discountAmount".to_string(),
            }
            .into());
        }
        if discount > subtotal {
            return Err(CoreError::DiscountExceedsSubtotal { discount, subtotal });
        }

        let taxable = subtotal - discount;
        let tax = taxable.calculate_tax(rate);

        Ok(Self {
            subtotal,
            discount,
            taxable,
            tax,
            final_amount: taxable + tax,
        })
    }
}

/// Points earned on a sale: one per full 10.00 of the final amount.
pub fn loyalty_points_earned(final_amount: Money) -> i64 {
    if final_amount.is_positive() {
        final_amount.cents() / LOYALTY_CENTS_PER_POINT
    } else {
        0
    }
}

// =============================================================================
// Reconciliation
// =============================================================================

/// A (variant, location) the reconciliation pass wants someone to look at.
///
/// ```text
/// difference       = aggregate − Σ all batches   ≠ 0 ⇒ the ledger drifted
/// expired_quantity = Σ batches past expiry      > 0 ⇒ aggregate still counts
///                                                     stock nobody may sell;
///                                                     write_off_expired clears it
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct StockDiscrepancy {
    pub variant_id: String,
    pub location_id: String,
    /// `None` when batches exist but the aggregate row does not.
    #[ts(as = "Option<String>")]
    pub aggregate_stock: Option<Decimal>,
    #[ts(type = "string")]
    pub batch_total: Decimal,
    /// `aggregate_stock − batch_total` (missing aggregate counts as zero).
    #[ts(type = "string")]
    pub difference: Decimal,
    /// Positive quantity left in expired batches, included in `batch_total`.
    #[ts(type = "string")]
    pub expired_quantity: Decimal,
}

impl StockDiscrepancy {
    /// The aggregate no longer equals the sum of its batches.
    pub fn is_drift(&self) -> bool {
        !self.difference.is_zero() || (self.aggregate_stock.is_none() && !self.batch_total.is_zero())
    }

    /// Aggregate over the batches that can still be sold.
    pub fn sellable_total(&self) -> Decimal {
        self.batch_total - self.expired_quantity
    }
}

#[derive(Default)]
struct PairTotals {
    aggregate: Option<Decimal>,
    batches: Decimal,
    expired: Decimal,
}

/// Compares aggregate rows with per-pair batch sums.
///
/// A pair is reported when it drifted or still holds expired stock. Pairs
/// present on only one side are compared against zero. Results are ordered
/// by (variant, location).
pub fn find_discrepancies(
    aggregates: impl IntoIterator<Item = (StockKey, Decimal)>,
    batch_totals: impl IntoIterator<Item = (StockKey, Decimal)>,
    expired_totals: impl IntoIterator<Item = (StockKey, Decimal)>,
) -> Vec<StockDiscrepancy> {
    let mut pairs: BTreeMap<StockKey, PairTotals> = BTreeMap::new();

    for (key, stock) in aggregates {
        pairs.entry(key).or_default().aggregate = Some(stock);
    }
    for (key, total) in batch_totals {
        pairs.entry(key).or_default().batches += total;
    }
    for (key, expired) in expired_totals {
        pairs.entry(key).or_default().expired += expired;
    }

    pairs
        .into_iter()
        .filter_map(|(key, totals)| {
            let found = StockDiscrepancy {
                variant_id: key.variant_id,
                location_id: key.location_id,
                aggregate_stock: totals.aggregate,
                batch_total: totals.batches,
                difference: totals.aggregate.unwrap_or(Decimal::ZERO) - totals.batches,
                expired_quantity: totals.expired,
            };
            (found.is_drift() || found.expired_quantity > Decimal::ZERO).then_some(found)
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_stage_sums_lines_on_the_same_batch() {
        let key = StockKey::new("cola", "shop");
        let mut deltas = StockDeltas::new();
        deltas.stage("batch-a", &key, dec!(-3));
        deltas.stage("batch-a", &key, dec!(-2));
        deltas.stage("batch-b", &key, dec!(-1));

        assert_eq!(deltas.batch_delta("batch-a"), dec!(-5));
        assert_eq!(deltas.batch_delta("batch-c"), dec!(0));
        assert_eq!(deltas.aggregate_delta(&key), dec!(-6));
        assert_eq!(deltas.batches().count(), 2);
        assert_eq!(deltas.aggregates().count(), 1);
    }

    #[test]
    fn test_staged_writes_are_key_ordered() {
        let mut deltas = StockDeltas::new();
        deltas.stage("zeta", &StockKey::new("v2", "l1"), dec!(-1));
        deltas.stage("alpha", &StockKey::new("v1", "l1"), dec!(-1));

        let order: Vec<&String> = deltas.batches().map(|(id, _)| id).collect();
        assert_eq!(order, ["alpha", "zeta"]);
        let first = deltas.aggregates().next().map(|(k, _)| k.variant_id.clone());
        assert_eq!(first.as_deref(), Some("v1"));
    }

    #[test]
    fn test_totals_with_discount_and_tax() {
        let totals = SaleTotals::compute(
            Money::from_cents(10_000),
            Money::from_cents(2_000),
            TaxRate::new(dec!(0.16)).unwrap(),
        )
        .unwrap();

        assert_eq!(totals.taxable.cents(), 8_000);
        assert_eq!(totals.tax.cents(), 1_280);
        assert_eq!(totals.final_amount.cents(), 9_280);
    }

    #[test]
    fn test_discount_equal_to_subtotal_is_allowed() {
        let totals =
            SaleTotals::compute(Money::from_cents(500), Money::from_cents(500), TaxRate::from_bps(1600))
                .unwrap();
        assert!(totals.final_amount.is_zero());
    }

    #[test]
    fn test_discount_above_subtotal_is_rejected() {
        let err =
            SaleTotals::compute(Money::from_cents(500), Money::from_cents(501), TaxRate::zero())
                .unwrap_err();
        assert!(matches!(err, CoreError::DiscountExceedsSubtotal { .. }));
    }

    #[test]
    fn test_negative_discount_is_rejected() {
        let err =
            SaleTotals::compute(Money::from_cents(500), Money::from_cents(-1), TaxRate::zero())
                .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_loyalty_points_floor() {
        assert_eq!(loyalty_points_earned(Money::from_cents(9_280)), 9);
        assert_eq!(loyalty_points_earned(Money::from_cents(999)), 0);
        assert_eq!(loyalty_points_earned(Money::from_cents(1_000)), 1);
        assert_eq!(loyalty_points_earned(Money::zero()), 0);
        assert_eq!(loyalty_points_earned(Money::from_cents(-5_000)), 0);
    }

    #[test]
    fn test_find_discrepancies() {
        let agg = vec![
            (StockKey::new("v1", "l1"), dec!(13)),
            (StockKey::new("v2", "l1"), dec!(5)),
            (StockKey::new("v4", "l1"), dec!(0)),
        ];
        let batches = vec![
            (StockKey::new("v1", "l1"), dec!(3)),
            (StockKey::new("v1", "l1"), dec!(10)),
            (StockKey::new("v2", "l1"), dec!(4)),
            (StockKey::new("v3", "l1"), dec!(7)),
        ];

        let found = find_discrepancies(agg, batches, Vec::new());
        assert_eq!(found.len(), 2);

        assert_eq!(found[0].variant_id, "v2");
        assert_eq!(found[0].difference, dec!(1));
        assert!(found[0].is_drift());

        assert_eq!(found[1].variant_id, "v3");
        assert_eq!(found[1].aggregate_stock, None);
        assert_eq!(found[1].difference, dec!(-7));
    }

    #[test]
    fn test_expired_stock_is_reported_without_drift() {
        let key = StockKey::new("v1", "l1");
        let found = find_discrepancies(
            vec![(key.clone(), dec!(13))],
            vec![(key.clone(), dec!(3)), (key.clone(), dec!(10))],
            vec![(key, dec!(3))],
        );

        assert_eq!(found.len(), 1);
        assert!(!found[0].is_drift());
        assert_eq!(found[0].difference, dec!(0));
        assert_eq!(found[0].expired_quantity, dec!(3));
        assert_eq!(found[0].sellable_total(), dec!(10));
    }
}
