//! # Request / Response Contracts
//!
//! The logical call shapes for sales, restocks and adjustments. They carry
//! no transport assumptions; the CLI reads and prints them as JSON and a
//! web front end can use the generated TypeScript types.
//!
//! ## Sale Round Trip
//! ```json
//! // request
//! {
//!   "cartItems": [{ "productId": "prod-1", "quantity": "4" }],
//!   "locationId": "loc-1",
//!   "customerId": "cust-1",
//!   "paymentMethod": "cash",
//!   "discountAmount": 2000
//! }
//! // response
//! { "success": true, "saleId": "…", "saleNumber": "S-20250105-3F9A0C1B",
//!   "receiptUrl": null, "message": "Sale S-20250105-3F9A0C1B completed" }
//! ```
//!
//! Quantities and prices are decimal strings; `discountAmount` is cents.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stockline_core::{
    validation::{
        validate_cart_size, validate_discount_cents, validate_id, validate_notes,
        validate_optional_id, validate_price, validate_quantity, validate_quantity_change,
    },
    AdjustmentReason, Money, PaymentMethod, ProductVariantStock, Sale, SaleItem, SaleTotals,
    StockAdjustment, StockBatch, StockMovement, UnitConversion, ValidationError,
};
use ts_rs::TS;

use crate::error::{ErrorKind, LedgerError};

// =============================================================================
// Sale
// =============================================================================

/// One cart line. `quantity` is in the variant's selling unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: String,
    #[serde(default)]
    pub variant_id: Option<String>,
    #[ts(type = "string")]
    pub quantity: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleRequest {
    pub cart_items: Vec<CartItem>,
    pub location_id: String,
    #[serde(default)]
    pub customer_id: Option<String>,
    pub payment_method: PaymentMethod,
    /// Overall discount in cents.
    #[serde(default)]
    pub discount_amount: Money,
    #[serde(default)]
    pub notes: Option<String>,
}

impl SaleRequest {
    /// Shape checks that need no database access.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_cart_size(self.cart_items.len())?;
        validate_id("locationId", &self.location_id)?;
        validate_optional_id("customerId", self.customer_id.as_deref())?;
        validate_discount_cents(self.discount_amount.cents())?;
        validate_notes(self.notes.as_deref())?;

        for item in &self.cart_items {
            validate_id("productId", &item.product_id)?;
            validate_optional_id("variantId", item.variant_id.as_deref())?;
            validate_quantity("quantity", item.quantity)?;
        }

        Ok(())
    }
}

/// A committed sale as returned by [`SaleService::execute`](crate::SaleService::execute).
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CompletedSale {
    pub sale: Sale,
    pub items: Vec<SaleItem>,
    pub totals: SaleTotals,
    /// Points awarded to the attached customer, if any were.
    pub loyalty_points: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SaleResponse {
    pub success: bool,
    pub sale_id: Option<String>,
    pub sale_number: Option<String>,
    pub receipt_url: Option<String>,
    pub message: String,
    pub error: Option<ErrorKind>,
}

impl SaleResponse {
    pub fn completed(sale: &CompletedSale) -> Self {
        SaleResponse {
            success: true,
            sale_id: Some(sale.sale.id.clone()),
            sale_number: Some(sale.sale.sale_number.clone()),
            receipt_url: sale.sale.receipt_url.clone(),
            message: format!("Sale {} completed", sale.sale.sale_number),
            error: None,
        }
    }

    pub fn failed(err: &LedgerError) -> Self {
        SaleResponse {
            success: false,
            sale_id: None,
            sale_number: None,
            receipt_url: None,
            message: err.user_message(),
            error: Some(err.kind()),
        }
    }
}

// =============================================================================
// Restock
// =============================================================================

/// `unit_quantity` of `unit` (id, symbol or name) received into a location.
///
/// `purchase_price` is per `unit`; without it the variant's buying price
/// (per base unit) is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RestockRequest {
    pub product_id: String,
    #[serde(default)]
    pub variant_id: Option<String>,
    pub unit: String,
    #[ts(type = "string")]
    pub unit_quantity: Decimal,
    pub location_id: String,
    #[serde(default)]
    pub supplier_id: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub purchase_price: Option<Decimal>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default)]
    pub purchase_order_item_id: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl RestockRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_id("productId", &self.product_id)?;
        validate_optional_id("variantId", self.variant_id.as_deref())?;
        validate_id("locationId", &self.location_id)?;
        validate_optional_id("supplierId", self.supplier_id.as_deref())?;
        validate_optional_id("purchaseOrderItemId", self.purchase_order_item_id.as_deref())?;
        if self.unit.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "unit".to_string(),
            });
        }
        validate_quantity("unitQuantity", self.unit_quantity)?;
        if let Some(price) = self.purchase_price {
            validate_price("purchasePrice", price)?;
        }
        validate_notes(self.notes.as_deref())?;
        Ok(())
    }

    /// Received against a purchase rather than counted in.
    pub fn is_purchase(&self) -> bool {
        self.supplier_id.is_some() || self.purchase_order_item_id.is_some()
    }
}

/// Every row a restock wrote, plus the conversion it applied.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RestockResult {
    pub stock_batch: StockBatch,
    pub stock_aggregate: ProductVariantStock,
    pub adjustment: StockAdjustment,
    pub movement: StockMovement,
    pub unit_conversion: UnitConversion,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RestockResponse {
    pub success: bool,
    pub message: String,
    pub error: Option<ErrorKind>,
    pub result: Option<RestockResult>,
}

impl RestockResponse {
    pub fn received(result: RestockResult) -> Self {
        RestockResponse {
            success: true,
            message: format!(
                "Received {} {} as batch {}",
                result.unit_conversion.unit_quantity.normalize(),
                result.unit_conversion.unit_id,
                result.stock_batch.batch_number
            ),
            error: None,
            result: Some(result),
        }
    }

    pub fn failed(err: &LedgerError) -> Self {
        RestockResponse {
            success: false,
            message: err.user_message(),
            error: Some(err.kind()),
            result: None,
        }
    }
}

// =============================================================================
// Manual Adjustment
// =============================================================================

/// A signed correction to one batch, in base units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentRequest {
    pub stock_batch_id: String,
    #[ts(type = "string")]
    pub quantity_change: Decimal,
    pub reason: AdjustmentReason,
    #[serde(default)]
    pub notes: Option<String>,
}

impl AdjustmentRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_id("stockBatchId", &self.stock_batch_id)?;
        validate_quantity_change(self.quantity_change)?;
        validate_notes(self.notes.as_deref())?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AdjustmentResult {
    pub stock_batch: StockBatch,
    pub stock_aggregate: ProductVariantStock,
    pub adjustment: StockAdjustment,
    pub movement: StockMovement,
}

/// Outcome of writing off expired batches.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct WriteOffSummary {
    pub adjustments: Vec<StockAdjustment>,
    /// Base units removed across all batches.
    #[ts(type = "string")]
    pub total_quantity: Decimal,
}

/// An aggregate at or below its variant's reorder point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct LowStockItem {
    pub variant_id: String,
    pub sku: String,
    pub name: String,
    pub location_id: String,
    #[ts(type = "string")]
    pub available_stock: Decimal,
    #[ts(type = "string")]
    pub reorder_point: Decimal,
    #[ts(type = "string")]
    pub reorder_qty: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sale_request() -> SaleRequest {
        SaleRequest {
            cart_items: vec![CartItem {
                product_id: "prod-1".into(),
                variant_id: None,
                quantity: dec!(2),
            }],
            location_id: "loc-1".into(),
            customer_id: None,
            payment_method: PaymentMethod::Cash,
            discount_amount: Money::zero(),
            notes: None,
        }
    }

    #[test]
    fn test_sale_request_from_json() {
        let json = r#"{
            "cartItems": [{ "productId": "prod-1", "quantity": "1.5" }],
            "locationId": "loc-1",
            "paymentMethod": "mobile_money",
            "discountAmount": 250
        }"#;
        let request: SaleRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.cart_items[0].quantity, dec!(1.5));
        assert_eq!(request.payment_method, PaymentMethod::MobileMoney);
        assert_eq!(request.discount_amount, Money::from_cents(250));
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_sale_request_validation() {
        let mut empty = sale_request();
        empty.cart_items.clear();
        assert!(matches!(empty.validate(), Err(ValidationError::Required { .. })));

        let mut zero_qty = sale_request();
        zero_qty.cart_items[0].quantity = Decimal::ZERO;
        assert!(matches!(zero_qty.validate(), Err(ValidationError::MustBePositive { .. })));

        let mut negative_discount = sale_request();
        negative_discount.discount_amount = Money::from_cents(-1);
        assert!(negative_discount.validate().is_err());
    }

    #[test]
    fn test_restock_reason_source() {
        let mut request = RestockRequest {
            product_id: "prod-1".into(),
            variant_id: None,
            unit: "case".into(),
            unit_quantity: dec!(2),
            location_id: "loc-1".into(),
            supplier_id: None,
            purchase_price: Some(dec!(48)),
            expiry_date: None,
            purchase_order_item_id: None,
            notes: None,
        };
        assert!(request.validate().is_ok());
        assert!(!request.is_purchase());

        request.supplier_id = Some("sup-1".into());
        assert!(request.is_purchase());

        request.unit = " ".into();
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_failed_response_carries_kind() {
        let err = LedgerError::Unauthenticated;
        let response = SaleResponse::failed(&err);
        assert!(!response.success);
        assert_eq!(response.error, Some(ErrorKind::Authentication));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["error"], "AUTHENTICATION");
    }
}
