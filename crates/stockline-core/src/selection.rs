//! # Batch Selection Policy
//!
//! Decides which single batch funds a sale line.
//!
//! ## Decision Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  candidates = batches at (variant, location)                            │
//! │               not expired                                               │
//! │               current_quantity + staged_delta ≥ required                │
//! │                                                                         │
//! │  sorted by policy ──► FIFO: received_date ASC                           │
//! │                       FEFO: expiry_date ASC (nulls last), received ASC  │
//! │                                                                         │
//! │  first candidate? ──yes──► FundingSource::Available                     │
//! │        │ no                                                             │
//! │        ▼                                                                │
//! │  negative stock allowed? ──no──► InsufficientStock {required, available}│
//! │        │ yes                                                            │
//! │        ▼                                                                │
//! │  any batch ever received? ──no──► NoCostBasisAvailable                  │
//! │        │ yes                                                            │
//! │        ▼                                                                │
//! │  most recently received batch ──► FundingSource::NegativeStockFallback  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A sale line never splits across batches. The unit cost recorded on the
//! line is always the purchase price of the batch returned here.

use std::cmp::Ordering;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::ledger::{StockDeltas, StockKey};
use crate::types::{InventoryPolicy, StockBatch};

// =============================================================================
// Policy Ordering
// =============================================================================

impl InventoryPolicy {
    /// Orders two batches by consumption priority (earlier = consumed first).
    ///
    /// Ties fall back to `received_date`, then to the batch id so the order
    /// is total.
    pub fn compare(&self, a: &StockBatch, b: &StockBatch) -> Ordering {
        let by_received = a
            .received_date
            .cmp(&b.received_date)
            .then_with(|| a.id.cmp(&b.id));

        match self {
            InventoryPolicy::Fifo => by_received,
            InventoryPolicy::Fefo => {
                let by_expiry = match (a.expiry_date, b.expiry_date) {
                    (Some(x), Some(y)) => x.cmp(&y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                by_expiry.then(by_received)
            }
        }
    }
}

// =============================================================================
// Request / Result
// =============================================================================

/// Everything the policy needs to fund one line.
#[derive(Debug, Clone)]
pub struct SelectionRequest {
    pub key: StockKey,
    /// Quantity in base units.
    pub required: Decimal,
    pub policy: InventoryPolicy,
    pub negative_stock_allowed: bool,
    /// `available_stock` from the aggregate row (zero if the row is missing).
    pub aggregate_available: Decimal,
    /// Batches expiring before this date are not used to fund sales.
    pub today: NaiveDate,
}

/// How the returned batch funds the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FundingSource {
    /// The batch holds enough quantity.
    Available,
    /// Negative stock: the batch only supplies a cost basis and a link.
    NegativeStockFallback,
}

/// The batch chosen to fund a line.
#[derive(Debug, Clone, PartialEq)]
pub struct FundingBatch {
    pub batch_id: String,
    /// Purchase price per base unit of the batch.
    pub unit_cost: Decimal,
    /// Batch quantity after earlier lines of the same operation.
    pub effective_quantity: Decimal,
    pub source: FundingSource,
}

impl FundingBatch {
    fn from_batch(batch: &StockBatch, staged: &StockDeltas, source: FundingSource) -> Self {
        Self {
            batch_id: batch.id.clone(),
            unit_cost: batch.purchase_price,
            effective_quantity: batch.current_quantity + staged.batch_delta(&batch.id),
            source,
        }
    }
}

// =============================================================================
// Selection
// =============================================================================

/// Picks the batch that funds `request.required` base units.
///
/// `batches` are the pair's batches (others are ignored). `staged` carries
/// decrements already claimed by earlier lines of the same sale, so two lines
/// never both claim the same remaining quantity.
pub fn select_funding_batch(
    batches: &[StockBatch],
    request: &SelectionRequest,
    staged: &StockDeltas,
) -> CoreResult<FundingBatch> {
    if request.required <= Decimal::ZERO {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        }
        .into());
    }

    let at_pair = || {
        batches.iter().filter(|b| {
            b.variant_id == request.key.variant_id && b.location_id == request.key.location_id
        })
    };

    let chosen = at_pair()
        .filter(|b| !b.is_expired(request.today))
        .filter(|b| b.current_quantity + staged.batch_delta(&b.id) >= request.required)
        .min_by(|a, b| request.policy.compare(a, b));

    if let Some(batch) = chosen {
        return Ok(FundingBatch::from_batch(batch, staged, FundingSource::Available));
    }

    if !request.negative_stock_allowed {
        return Err(CoreError::InsufficientStock {
            variant_id: request.key.variant_id.clone(),
            location_id: request.key.location_id.clone(),
            required: request.required,
            available: request.aggregate_available + staged.aggregate_delta(&request.key),
        });
    }

    // Cost basis only: quantity and expiry do not matter here
    at_pair()
        .max_by(|a, b| {
            a.received_date
                .cmp(&b.received_date)
                .then_with(|| a.id.cmp(&b.id))
        })
        .map(|batch| FundingBatch::from_batch(batch, staged, FundingSource::NegativeStockFallback))
        .ok_or_else(|| CoreError::NoCostBasisAvailable {
            variant_id: request.key.variant_id.clone(),
            location_id: request.key.location_id.clone(),
        })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn date(month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, month, day).unwrap()
    }

    fn batch(id: &str, qty: Decimal, received_day: u32, expiry: Option<NaiveDate>) -> StockBatch {
        let received = Utc.with_ymd_and_hms(2025, 1, received_day, 9, 0, 0).unwrap();
        StockBatch {
            id: id.to_string(),
            organization_id: "org".to_string(),
            variant_id: "v1".to_string(),
            location_id: "l1".to_string(),
            batch_number: format!("B-{}", id),
            initial_quantity: qty,
            current_quantity: qty,
            purchase_price: dec!(1.50),
            expiry_date: expiry,
            received_date: received,
            supplier_id: None,
            purchase_order_item_id: None,
            version: 0,
            created_at: received,
            updated_at: received,
        }
    }

    fn request(required: Decimal, policy: InventoryPolicy, negative: bool) -> SelectionRequest {
        SelectionRequest {
            key: StockKey::new("v1", "l1"),
            required,
            policy,
            negative_stock_allowed: negative,
            aggregate_available: dec!(20),
            today: date(2, 1),
        }
    }

    #[test]
    fn test_fifo_takes_oldest_batch_that_covers_the_line() {
        let batches = vec![batch("B", dec!(10), 5, None), batch("A", dec!(10), 1, None)];
        let funding =
            select_funding_batch(&batches, &request(dec!(7), InventoryPolicy::Fifo, false), &StockDeltas::new())
                .unwrap();
        assert_eq!(funding.batch_id, "A");
        assert_eq!(funding.source, FundingSource::Available);
        assert_eq!(funding.unit_cost, dec!(1.50));
    }

    #[test]
    fn test_fifo_skips_batches_too_small() {
        let batches = vec![batch("A", dec!(3), 1, None), batch("B", dec!(10), 5, None)];
        let funding =
            select_funding_batch(&batches, &request(dec!(7), InventoryPolicy::Fifo, false), &StockDeltas::new())
                .unwrap();
        assert_eq!(funding.batch_id, "B");
    }

    #[test]
    fn test_fefo_takes_earliest_expiry_with_nulls_last() {
        let batches = vec![
            batch("old-no-expiry", dec!(10), 1, None),
            batch("late", dec!(10), 2, Some(date(6, 1))),
            batch("soon", dec!(10), 3, Some(date(3, 1))),
        ];
        let funding =
            select_funding_batch(&batches, &request(dec!(5), InventoryPolicy::Fefo, false), &StockDeltas::new())
                .unwrap();
        assert_eq!(funding.batch_id, "soon");

        let fifo =
            select_funding_batch(&batches, &request(dec!(5), InventoryPolicy::Fifo, false), &StockDeltas::new())
                .unwrap();
        assert_eq!(fifo.batch_id, "old-no-expiry");
    }

    #[test]
    fn test_expired_batches_do_not_fund_sales() {
        let batches = vec![
            batch("expired", dec!(10), 1, Some(date(1, 15))),
            batch("fresh", dec!(10), 5, None),
        ];
        let funding =
            select_funding_batch(&batches, &request(dec!(5), InventoryPolicy::Fifo, false), &StockDeltas::new())
                .unwrap();
        assert_eq!(funding.batch_id, "fresh");
    }

    #[test]
    fn test_staged_decrements_reduce_effective_quantity() {
        let batches = vec![batch("A", dec!(10), 1, None), batch("B", dec!(10), 5, None)];
        let mut staged = StockDeltas::new();
        staged.stage("A", &StockKey::new("v1", "l1"), dec!(-7));

        let funding =
            select_funding_batch(&batches, &request(dec!(5), InventoryPolicy::Fifo, false), &staged).unwrap();
        assert_eq!(funding.batch_id, "B");

        let funding =
            select_funding_batch(&batches, &request(dec!(3), InventoryPolicy::Fifo, false), &staged).unwrap();
        assert_eq!(funding.batch_id, "A");
        assert_eq!(funding.effective_quantity, dec!(3));
    }

    #[test]
    fn test_insufficient_stock_reports_aggregate_minus_staged() {
        let batches = vec![batch("A", dec!(10), 1, None)];
        let mut staged = StockDeltas::new();
        staged.stage("A", &StockKey::new("v1", "l1"), dec!(-4));

        let err =
            select_funding_batch(&batches, &request(dec!(15), InventoryPolicy::Fifo, false), &staged).unwrap_err();
        assert_eq!(
            err,
            CoreError::InsufficientStock {
                variant_id: "v1".to_string(),
                location_id: "l1".to_string(),
                required: dec!(15),
                available: dec!(16),
            }
        );
    }

    #[test]
    fn test_negative_stock_falls_back_to_latest_batch_even_if_empty() {
        let mut empty = batch("latest", dec!(0), 9, Some(date(1, 10)));
        empty.initial_quantity = dec!(5);
        let batches = vec![batch("older", dec!(2), 1, None), empty];

        let funding =
            select_funding_batch(&batches, &request(dec!(5), InventoryPolicy::Fifo, true), &StockDeltas::new())
                .unwrap();
        assert_eq!(funding.batch_id, "latest");
        assert_eq!(funding.source, FundingSource::NegativeStockFallback);
    }

    #[test]
    fn test_no_batch_ever_means_no_cost_basis() {
        let err = select_funding_batch(&[], &request(dec!(1), InventoryPolicy::Fifo, true), &StockDeltas::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::NoCostBasisAvailable { .. }));

        let err = select_funding_batch(&[], &request(dec!(1), InventoryPolicy::Fifo, false), &StockDeltas::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::InsufficientStock { .. }));
    }

    #[test]
    fn test_non_positive_quantity_is_rejected() {
        let batches = vec![batch("A", dec!(10), 1, None)];
        let err = select_funding_batch(&batches, &request(dec!(0), InventoryPolicy::Fifo, false), &StockDeltas::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_other_pairs_are_ignored() {
        let mut elsewhere = batch("elsewhere", dec!(100), 1, None);
        elsewhere.location_id = "l2".to_string();
        let err = select_funding_batch(&[elsewhere], &request(dec!(1), InventoryPolicy::Fifo, true), &StockDeltas::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::NoCostBasisAvailable { .. }));
    }
}
