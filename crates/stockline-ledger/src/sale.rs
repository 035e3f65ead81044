//! # Sale Orchestrator
//!
//! Turns a cart into a committed sale: batch selection, totals, ledger
//! decrements, loyalty and audit, all in one unit of work.
//!
//! ## Sale Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  authenticate ─► validate request ─► settings (once)                    │
//! │                                                                         │
//! │  ┌──────────────────── unit of work ────────────────────────────────┐  │
//! │  │  for each cart line:                                             │  │
//! │  │    resolve variant ─► selling unit → base units                  │  │
//! │  │    select funding batch (FIFO / FEFO, staged claims respected)   │  │
//! │  │    subtotal += unit price × quantity                             │  │
//! │  │    stage −qty on (batch) and on (variant, location)              │  │
//! │  │                                                                  │  │
//! │  │  totals (discount ≤ subtotal, tax HALF_UP)                       │  │
//! │  │  ── nothing written before this line ──                          │  │
//! │  │  Sale + SaleItems                                                │  │
//! │  │  apply staged batch deltas (+ SALE movements), then aggregates   │  │
//! │  │  loyalty points, audit entry                                     │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! │                                                                         │
//! │  after commit: publish SaleCompleted, generate receipt (best-effort)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{BTreeMap, BTreeSet};

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::SqliteConnection;
use stockline_core::{
    ledger::loyalty_points_earned, selection::select_funding_batch, AuditEntityType, AuditEntry,
    AuthContext, LoyaltyTransaction, Money, MovementType, OrganizationSettings, Sale, SaleItem,
    SaleStatus, SaleTotals, SelectionRequest, StockBatch, StockDeltas, StockKey, StockMovement,
    UnitGraph, ValidationError, MAX_ITEM_QUANTITY,
};
use stockline_db::{
    new_id,
    repository::{
        batch, catalog, customer as customer_repo, journal, sale as sale_repo, stock as stock_repo,
        unit,
    },
};
use tracing::{debug, error, info, warn};

use crate::context::{today, LedgerContext, StockEvent};
use crate::dto::{CompletedSale, SaleRequest, SaleResponse};
use crate::error::{LedgerError, LedgerResult};
use crate::numbering;
use crate::stock::{apply_aggregate_delta, apply_batch_delta};
use crate::unit_of_work;
use crate::variant;

/// Records sales against the stock ledger.
#[derive(Clone)]
pub struct SaleService {
    ctx: LedgerContext,
}

impl SaleService {
    pub fn new(ctx: LedgerContext) -> Self {
        SaleService { ctx }
    }

    /// Boundary entry point: never fails, reports the outcome as a response.
    pub async fn handle(&self, request: SaleRequest) -> SaleResponse {
        match self.execute(request).await {
            Ok(completed) => SaleResponse::completed(&completed),
            Err(err) => {
                error!(error = %err, kind = ?err.kind(), "Sale failed");
                SaleResponse::failed(&err)
            }
        }
    }

    /// Records the sale atomically, then runs the post-commit hooks.
    pub async fn execute(&self, request: SaleRequest) -> LedgerResult<CompletedSale> {
        let auth = self.ctx.authenticate().await?;
        request.validate()?;
        let settings = self.ctx.settings.settings(&auth.organization_id).await?;
        let today = today();

        let (auth_ref, settings_ref, request_ref) = (&auth, &settings, &request);
        let mut completed = unit_of_work::run(&self.ctx.db, &self.ctx.config, "sale", move |tx| {
            async move {
                let mut tx = tx;
                let result = record_sale(&mut tx, auth_ref, settings_ref, request_ref, today).await;
                (tx, result)
            }
        })
        .await?;

        info!(
            sale_id = %completed.sale.id,
            sale_number = %completed.sale.sale_number,
            total = %completed.totals.final_amount,
            items = completed.items.len(),
            "Sale completed"
        );

        let variant_ids: BTreeSet<String> = completed
            .items
            .iter()
            .map(|item| item.variant_id.clone())
            .collect();
        self.ctx.events.publish(StockEvent::SaleCompleted {
            organization_id: completed.sale.organization_id.clone(),
            sale_id: completed.sale.id.clone(),
            sale_number: completed.sale.sale_number.clone(),
            location_id: completed.sale.location_id.clone(),
            variant_ids: variant_ids.into_iter().collect(),
        });

        self.attach_receipt(&mut completed).await;
        Ok(completed)
    }

    /// Best-effort: failures are logged and the sale stands.
    async fn attach_receipt(&self, completed: &mut CompletedSale) {
        let url = match self
            .ctx
            .receipts
            .generate(&completed.sale, &completed.items)
            .await
        {
            Ok(Some(url)) => url,
            Ok(None) => return,
            Err(err) => {
                warn!(sale_id = %completed.sale.id, error = %err, "Receipt generation failed");
                return;
            }
        };

        match self.store_receipt_url(&completed.sale.id, &url).await {
            Ok(()) => completed.sale.receipt_url = Some(url),
            Err(err) => {
                warn!(sale_id = %completed.sale.id, error = %err, "Could not store receipt URL");
            }
        }
    }

    async fn store_receipt_url(&self, sale_id: &str, url: &str) -> LedgerResult<()> {
        let mut conn = self.ctx.db.acquire().await?;
        sale_repo::set_receipt_url(&mut conn, sale_id, url).await?;
        Ok(())
    }
}

// =============================================================================
// Inside the Unit of Work
// =============================================================================

/// A cart line after its funding batch has been chosen.
#[derive(Debug)]
struct FundedLine {
    product_id: String,
    variant_id: String,
    stock_batch_id: String,
    quantity: Decimal,
    base_quantity: Decimal,
    unit_price: Money,
    unit_cost: Decimal,
    line_total: Money,
}

async fn record_sale(
    conn: &mut SqliteConnection,
    auth: &AuthContext,
    settings: &OrganizationSettings,
    request: &SaleRequest,
    today: NaiveDate,
) -> LedgerResult<CompletedSale> {
    let org = auth.organization_id.as_str();
    let location = catalog::find_active_location(conn, org, &request.location_id).await?;
    let customer = match request.customer_id.as_deref() {
        Some(id) => Some(customer_repo::find_active(conn, org, id).await?),
        None => None,
    };
    let units = UnitGraph::new(unit::list_for_organization(conn, org).await?);

    // Steps 2-4 only read; every write comes after the totals are known
    let mut staged = StockDeltas::new();
    let mut snapshots: BTreeMap<String, StockBatch> = BTreeMap::new();
    let mut lines = Vec::with_capacity(request.cart_items.len());
    let mut subtotal = Money::zero();

    for (index, item) in request.cart_items.iter().enumerate() {
        let variant = variant::resolve(conn, org, &item.product_id, item.variant_id.as_deref())
            .await?
            .into_variant()?;
        let key = StockKey::new(variant.id.clone(), location.id.clone());
        let base_quantity = units.convert_quantity_to_base(
            item.quantity,
            &variant.selling_unit_id,
            &variant.base_unit_id,
        )?;

        let batches = batch::list_for_pair(conn, org, &key).await?;
        let aggregate_available = stock_repo::find(conn, org, &key)
            .await?
            .map(|row| row.available_stock)
            .unwrap_or(Decimal::ZERO);

        let funding = select_funding_batch(
            &batches,
            &SelectionRequest {
                key: key.clone(),
                required: base_quantity,
                policy: settings.inventory_policy,
                negative_stock_allowed: settings.negative_stock_allowed,
                aggregate_available,
                today,
            },
            &staged,
        )?;

        let unit_price = variant.unit_price();
        let too_large = || ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: MAX_ITEM_QUANTITY,
        };
        let line_total = unit_price
            .checked_mul_quantity(item.quantity)
            .ok_or_else(too_large)?;
        subtotal = subtotal.checked_add(line_total).ok_or_else(too_large)?;
        staged.stage(&funding.batch_id, &key, -base_quantity);

        if let Some(funded) = batches.into_iter().find(|b| b.id == funding.batch_id) {
            snapshots.entry(funded.id.clone()).or_insert(funded);
        }

        debug!(
            line = index + 1,
            variant_id = %variant.id,
            stock_batch_id = %funding.batch_id,
            base_quantity = %base_quantity,
            source = ?funding.source,
            "Cart line funded"
        );

        lines.push(FundedLine {
            product_id: item.product_id.clone(),
            variant_id: variant.id,
            stock_batch_id: funding.batch_id,
            quantity: item.quantity,
            base_quantity,
            unit_price,
            unit_cost: funding.unit_cost,
            line_total,
        });
    }

    let totals = SaleTotals::compute(subtotal, request.discount_amount, settings.default_tax_rate)?;

    // Sale header and items
    let now = Utc::now();
    let sale = Sale {
        id: new_id(),
        organization_id: org.to_string(),
        sale_number: numbering::sale_number(now),
        location_id: location.id.clone(),
        customer_id: customer.as_ref().map(|c| c.id.clone()),
        member_id: auth.member_id.clone(),
        status: SaleStatus::Completed,
        payment_method: request.payment_method,
        subtotal_cents: totals.subtotal.cents(),
        discount_cents: totals.discount.cents(),
        tax_cents: totals.tax.cents(),
        final_amount_cents: totals.final_amount.cents(),
        notes: request.notes.clone(),
        receipt_url: None,
        created_at: now,
        updated_at: now,
    };
    sale_repo::insert_sale(conn, &sale).await?;

    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let item = SaleItem {
            id: new_id(),
            sale_id: sale.id.clone(),
            product_id: line.product_id,
            variant_id: line.variant_id,
            stock_batch_id: line.stock_batch_id,
            quantity: line.quantity,
            base_quantity: line.base_quantity,
            unit_price_cents: line.unit_price.cents(),
            unit_cost: line.unit_cost,
            line_total_cents: line.line_total.cents(),
            created_at: now,
        };
        sale_repo::insert_item(conn, &item).await?;
        items.push(item);
    }

    // Ledger: one write per batch and per aggregate, whatever the line count
    let mut consumed = Vec::new();
    for (batch_id, delta) in staged.batches() {
        let snapshot = snapshots
            .get(batch_id)
            .ok_or_else(|| LedgerError::not_found("StockBatch", batch_id.clone()))?;
        apply_batch_delta(conn, snapshot, *delta).await?;

        journal::insert_movement(
            conn,
            &StockMovement {
                id: new_id(),
                organization_id: org.to_string(),
                stock_batch_id: batch_id.clone(),
                variant_id: snapshot.variant_id.clone(),
                adjustment_id: None,
                movement_type: MovementType::Sale,
                quantity: -*delta,
                from_location_id: Some(location.id.clone()),
                to_location_id: None,
                reference_type: Some(AuditEntityType::Sale.to_string()),
                reference_id: Some(sale.id.clone()),
                member_id: auth.member_id.clone(),
                created_at: now,
            },
        )
        .await?;

        consumed.push(json!({ "stockBatchId": batch_id, "quantity": (-*delta).normalize() }));
    }

    for (key, delta) in staged.aggregates() {
        apply_aggregate_delta(conn, org, key, *delta).await?;
    }

    // Loyalty
    let mut loyalty_points = None;
    if let Some(customer) = &customer {
        let points = loyalty_points_earned(totals.final_amount);
        if points > 0 {
            customer_repo::insert_loyalty_transaction(
                conn,
                &LoyaltyTransaction {
                    id: new_id(),
                    organization_id: org.to_string(),
                    customer_id: customer.id.clone(),
                    sale_id: Some(sale.id.clone()),
                    points,
                    description: Some(format!("Earned on sale {}", sale.sale_number)),
                    created_at: now,
                },
            )
            .await?;
            let balance = customer_repo::recompute_loyalty_points(conn, &customer.id).await?;
            debug!(customer_id = %customer.id, points, balance, "Loyalty points awarded");
            loyalty_points = Some(points);
        }
    }

    journal::insert_audit(
        conn,
        &AuditEntry {
            id: new_id(),
            organization_id: org.to_string(),
            entity_type: AuditEntityType::Sale,
            entity_id: sale.id.clone(),
            action: "CREATE".to_string(),
            previous_status: None,
            new_status: Some(sale.status.to_string()),
            details: json!({
                "saleNumber": sale.sale_number,
                "locationId": sale.location_id,
                "paymentMethod": sale.payment_method,
                "totals": totals,
                "batches": consumed,
                "loyaltyPoints": loyalty_points,
            }),
            member_id: auth.member_id.clone(),
            created_at: now,
        },
    )
    .await?;

    Ok(CompletedSale {
        sale,
        items,
        totals,
        loyalty_points,
    })
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use stockline_core::PaymentMethod;

    use crate::context::{BroadcastEventSink, ReceiptGenerator, StaticAuthContext};
    use crate::dto::CartItem;
    use crate::error::ErrorKind;
    use crate::testing::{self, CUSTOMER, LOCATION, PRODUCT, VARIANT};

    fn line(quantity: Decimal) -> CartItem {
        CartItem {
            product_id: PRODUCT.into(),
            variant_id: Some(VARIANT.into()),
            quantity,
        }
    }

    fn request(items: Vec<CartItem>) -> SaleRequest {
        SaleRequest {
            cart_items: items,
            location_id: LOCATION.into(),
            customer_id: None,
            payment_method: PaymentMethod::Cash,
            discount_amount: Money::zero(),
            notes: None,
        }
    }

    struct FixedReceipt;

    #[async_trait]
    impl ReceiptGenerator for FixedReceipt {
        async fn generate(&self, sale: &Sale, _items: &[SaleItem]) -> anyhow::Result<Option<String>> {
            Ok(Some(format!("receipts/{}.txt", sale.sale_number)))
        }
    }

    struct BrokenPrinter;

    #[async_trait]
    impl ReceiptGenerator for BrokenPrinter {
        async fn generate(&self, _sale: &Sale, _items: &[SaleItem]) -> anyhow::Result<Option<String>> {
            anyhow::bail!("printer offline")
        }
    }

    #[tokio::test]
    async fn test_fifo_sale_consumes_oldest_batch() {
        let db = testing::database().await;
        {
            let mut conn = db.pool().acquire().await.unwrap();
            testing::receive(&mut conn, "A", dec!(10), 1, None).await;
            testing::receive(&mut conn, "B", dec!(10), 5, None).await;
        }

        let service = SaleService::new(testing::context(&db, testing::fifo()));
        let completed = service.execute(request(vec![line(dec!(7))])).await.unwrap();

        assert_eq!(completed.items.len(), 1);
        assert_eq!(completed.items[0].stock_batch_id, "A");
        assert_eq!(completed.items[0].unit_cost, dec!(1.25));
        assert_eq!(testing::batch_quantity(&db, "A").await, dec!(3));
        assert_eq!(testing::batch_quantity(&db, "B").await, dec!(10));
        let aggregate = testing::aggregate(&db).await.unwrap();
        assert_eq!(aggregate.current_stock, dec!(13));
        assert_eq!(aggregate.available_stock, dec!(13));
        assert_eq!(testing::count(&db, "stock_movements").await, 1);
        assert_eq!(testing::count(&db, "audit_entries").await, 1);
    }

    #[tokio::test]
    async fn test_fefo_prefers_earliest_expiry() {
        let db = testing::database().await;
        {
            let mut conn = db.pool().acquire().await.unwrap();
            testing::receive(&mut conn, "A", dec!(10), 1, Some(testing::days_from_today(30))).await;
            testing::receive(&mut conn, "B", dec!(10), 5, Some(testing::days_from_today(10))).await;
        }

        let service = SaleService::new(testing::context(&db, testing::fefo()));
        let completed = service.execute(request(vec![line(dec!(2))])).await.unwrap();

        assert_eq!(completed.items[0].stock_batch_id, "B");
        assert_eq!(testing::batch_quantity(&db, "B").await, dec!(8));
    }

    #[tokio::test]
    async fn test_expired_batch_never_funds_a_sale() {
        let db = testing::database().await;
        {
            let mut conn = db.pool().acquire().await.unwrap();
            testing::receive(&mut conn, "A", dec!(10), 1, Some(testing::days_from_today(-1))).await;
            testing::receive(&mut conn, "B", dec!(10), 5, None).await;
        }

        let service = SaleService::new(testing::context(&db, testing::fifo()));
        let completed = service.execute(request(vec![line(dec!(5))])).await.unwrap();

        assert_eq!(completed.items[0].stock_batch_id, "B");
        assert_eq!(testing::batch_quantity(&db, "A").await, dec!(10));
    }

    #[tokio::test]
    async fn test_lines_on_same_batch_are_summed_once() {
        let db = testing::database().await;
        {
            let mut conn = db.pool().acquire().await.unwrap();
            testing::receive(&mut conn, "A", dec!(10), 1, None).await;
            testing::receive(&mut conn, "B", dec!(10), 5, None).await;
        }

        let service = SaleService::new(testing::context(&db, testing::fifo()));
        let completed = service
            .execute(request(vec![line(dec!(3)), line(dec!(3)), line(dec!(6))]))
            .await
            .unwrap();

        let batches: Vec<&str> = completed.items.iter().map(|i| i.stock_batch_id.as_str()).collect();
        assert_eq!(batches, vec!["A", "A", "B"]);
        assert_eq!(testing::batch_quantity(&db, "A").await, dec!(4));
        assert_eq!(testing::batch_quantity(&db, "B").await, dec!(4));
        assert_eq!(testing::aggregate(&db).await.unwrap().current_stock, dec!(8));
        // one movement per touched batch
        assert_eq!(testing::count(&db, "stock_movements").await, 2);
    }

    #[tokio::test]
    async fn test_totals_tax_and_loyalty() {
        let db = testing::database().await;
        {
            let mut conn = db.pool().acquire().await.unwrap();
            testing::receive(&mut conn, "A", dec!(10), 1, None).await;
        }

        let service = SaleService::new(testing::context(&db, testing::taxed(dec!(0.16))));
        let mut sale_request = request(vec![line(dec!(4))]);
        sale_request.customer_id = Some(CUSTOMER.into());
        sale_request.discount_amount = Money::from_cents(2_000);

        let completed = service.execute(sale_request).await.unwrap();

        assert_eq!(completed.totals.subtotal, Money::from_cents(10_000));
        assert_eq!(completed.totals.taxable, Money::from_cents(8_000));
        assert_eq!(completed.totals.tax, Money::from_cents(1_280));
        assert_eq!(completed.totals.final_amount, Money::from_cents(9_280));
        assert_eq!(completed.sale.final_amount_cents, 9_280);
        assert_eq!(completed.loyalty_points, Some(9));

        let mut conn = db.pool().acquire().await.unwrap();
        let customer = customer_repo::find_active(&mut conn, testing::ORG, CUSTOMER).await.unwrap();
        assert_eq!(customer.loyalty_points, 9);
    }

    #[tokio::test]
    async fn test_small_sale_earns_no_loyalty_row() {
        let db = testing::database().await;
        {
            let mut conn = db.pool().acquire().await.unwrap();
            testing::receive(&mut conn, "A", dec!(10), 1, None).await;
        }

        let service = SaleService::new(testing::context(&db, testing::fifo()));
        let mut sale_request = request(vec![line(dec!(1))]);
        sale_request.customer_id = Some(CUSTOMER.into());
        sale_request.discount_amount = Money::from_cents(1_600);

        let completed = service.execute(sale_request).await.unwrap();
        assert_eq!(completed.totals.final_amount, Money::from_cents(900));
        assert_eq!(completed.loyalty_points, None);
        assert_eq!(testing::count(&db, "loyalty_transactions").await, 0);
    }

    #[tokio::test]
    async fn test_failing_third_line_leaves_no_trace() {
        let db = testing::database().await;
        {
            let mut conn = db.pool().acquire().await.unwrap();
            testing::receive(&mut conn, "A", dec!(10), 1, None).await;
        }

        let service = SaleService::new(testing::context(&db, testing::fifo()));
        let err = service
            .execute(request(vec![line(dec!(2)), line(dec!(3)), line(dec!(100))]))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InsufficientStock);
        assert_eq!(testing::count(&db, "sales").await, 0);
        assert_eq!(testing::count(&db, "sale_items").await, 0);
        assert_eq!(testing::count(&db, "stock_movements").await, 0);
        assert_eq!(testing::batch_quantity(&db, "A").await, dec!(10));
        assert_eq!(testing::aggregate(&db).await.unwrap().current_stock, dec!(10));
    }

    #[tokio::test]
    async fn test_negative_stock_gate() {
        let db = testing::database().await;
        {
            let mut conn = db.pool().acquire().await.unwrap();
            testing::receive(&mut conn, "A", dec!(5), 1, None).await;
        }

        let strict = SaleService::new(testing::context(&db, testing::fifo()));
        let err = strict.execute(request(vec![line(dec!(8))])).await.unwrap_err();
        match err {
            LedgerError::Core(stockline_core::CoreError::InsufficientStock {
                required,
                available,
                ..
            }) => {
                assert_eq!(required, dec!(8));
                assert_eq!(available, dec!(5));
            }
            other => panic!("expected InsufficientStock, got {other:?}"),
        }

        let permissive = SaleService::new(testing::context(&db, testing::negative_stock()));
        let completed = permissive.execute(request(vec![line(dec!(8))])).await.unwrap();
        assert_eq!(completed.items[0].stock_batch_id, "A");
        assert_eq!(testing::batch_quantity(&db, "A").await, dec!(-3));
        assert_eq!(testing::aggregate(&db).await.unwrap().current_stock, dec!(-3));
    }

    #[tokio::test]
    async fn test_negative_stock_without_history_has_no_cost_basis() {
        let db = testing::database().await;
        let service = SaleService::new(testing::context(&db, testing::negative_stock()));

        let err = service.execute(request(vec![line(dec!(1))])).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NoCostBasisAvailable);
        assert!(testing::aggregate(&db).await.is_none());
    }

    #[tokio::test]
    async fn test_discount_above_subtotal_is_rejected() {
        let db = testing::database().await;
        {
            let mut conn = db.pool().acquire().await.unwrap();
            testing::receive(&mut conn, "A", dec!(10), 1, None).await;
        }

        let service = SaleService::new(testing::context(&db, testing::fifo()));
        let mut sale_request = request(vec![line(dec!(1))]);
        sale_request.discount_amount = Money::from_cents(2_501);

        let err = service.execute(sale_request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DiscountExceedsSubtotal);
        assert_eq!(testing::count(&db, "sales").await, 0);
        assert_eq!(testing::batch_quantity(&db, "A").await, dec!(10));
    }

    #[tokio::test]
    async fn test_default_variant_and_missing_variant() {
        let db = testing::database().await;
        {
            let mut conn = db.pool().acquire().await.unwrap();
            testing::receive(&mut conn, "A", dec!(10), 1, None).await;
        }
        let service = SaleService::new(testing::context(&db, testing::fifo()));

        let mut by_product = line(dec!(1));
        by_product.variant_id = None;
        let completed = service.execute(request(vec![by_product])).await.unwrap();
        assert_eq!(completed.items[0].variant_id, VARIANT);

        let bare = CartItem {
            product_id: testing::BARE_PRODUCT.into(),
            variant_id: None,
            quantity: dec!(1),
        };
        let err = service.execute(request(vec![bare])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingVariantForStockTracking);
    }

    #[tokio::test]
    async fn test_unauthenticated_sale_is_refused() {
        let db = testing::database().await;
        let ctx = testing::context(&db, testing::fifo());
        let ctx = LedgerContext {
            auth: Arc::new(StaticAuthContext::anonymous()),
            ..ctx
        };

        let response = SaleService::new(ctx).handle(request(vec![line(dec!(1))])).await;

        assert!(!response.success);
        assert_eq!(response.error, Some(ErrorKind::Authentication));
        assert_eq!(testing::count(&db, "sales").await, 0);
    }

    #[tokio::test]
    async fn test_receipt_and_event_after_commit() {
        let db = testing::database().await;
        {
            let mut conn = db.pool().acquire().await.unwrap();
            testing::receive(&mut conn, "A", dec!(10), 1, None).await;
        }
        let events = Arc::new(BroadcastEventSink::new(8));
        let mut rx = events.subscribe();
        let ctx = testing::context(&db, testing::fifo())
            .with_receipts(Arc::new(FixedReceipt))
            .with_events(events);

        let response = SaleService::new(ctx).handle(request(vec![line(dec!(1))])).await;

        assert!(response.success);
        let sale_number = response.sale_number.clone().unwrap();
        assert_eq!(response.receipt_url, Some(format!("receipts/{sale_number}.txt")));

        let mut conn = db.pool().acquire().await.unwrap();
        let stored = sale_repo::find_sale(&mut conn, testing::ORG, &response.sale_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.receipt_url, response.receipt_url);

        match rx.recv().await.unwrap() {
            StockEvent::SaleCompleted { variant_ids, .. } => assert_eq!(variant_ids, vec![VARIANT]),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_receipt_failure_does_not_fail_sale() {
        let db = testing::database().await;
        {
            let mut conn = db.pool().acquire().await.unwrap();
            testing::receive(&mut conn, "A", dec!(10), 1, None).await;
        }
        let ctx = testing::context(&db, testing::fifo()).with_receipts(Arc::new(BrokenPrinter));

        let response = SaleService::new(ctx).handle(request(vec![line(dec!(1))])).await;

        assert!(response.success);
        assert_eq!(response.receipt_url, None);
        assert_eq!(testing::count(&db, "sales").await, 1);
    }

    async fn sell_concurrently(service: &SaleService, quantities: &[Decimal]) -> Vec<LedgerResult<CompletedSale>> {
        let handles: Vec<_> = quantities
            .iter()
            .map(|&quantity| {
                let service = service.clone();
                tokio::spawn(async move { service.execute(request(vec![line(quantity)])).await })
            })
            .collect();

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        results
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sales_that_fit_all_succeed() {
        let (_dir, db) = testing::file_database(5).await;
        {
            let mut conn = db.pool().acquire().await.unwrap();
            testing::receive(&mut conn, "A", dec!(10), 1, None).await;
        }
        let service = SaleService::new(testing::context(&db, testing::fifo()));

        let results = sell_concurrently(&service, &[dec!(2); 4]).await;

        for result in &results {
            assert!(result.is_ok(), "sale failed: {:?}", result.as_ref().err());
        }
        assert_eq!(testing::batch_quantity(&db, "A").await, dec!(2));
        assert_eq!(testing::aggregate(&db).await.unwrap().current_stock, dec!(2));
        assert_eq!(testing::count(&db, "sales").await, 4);
        assert!(crate::check_consistency(&db, testing::ORG).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sales_never_oversell_a_batch() {
        let (_dir, db) = testing::file_database(5).await;
        {
            let mut conn = db.pool().acquire().await.unwrap();
            testing::receive(&mut conn, "A", dec!(10), 1, None).await;
        }
        let service = SaleService::new(testing::context(&db, testing::fifo()));

        let results = sell_concurrently(&service, &[dec!(7); 3]).await;

        let sold = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(sold, 1);
        for err in results.iter().filter_map(|r| r.as_ref().err()) {
            assert_eq!(err.kind(), ErrorKind::InsufficientStock, "unexpected failure: {err}");
        }

        let remaining = testing::batch_quantity(&db, "A").await;
        assert_eq!(remaining, dec!(3));
        assert_eq!(testing::aggregate(&db).await.unwrap().current_stock, remaining);
        assert_eq!(testing::count(&db, "stock_movements").await, 1);
        assert!(crate::check_consistency(&db, testing::ORG).await.unwrap().is_empty());
    }
}
