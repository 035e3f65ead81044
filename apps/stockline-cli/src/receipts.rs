//! Plain-text receipts written next to the database.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use stockline_core::{Sale, SaleItem};
use stockline_ledger::ReceiptGenerator;
use tracing::debug;

/// Writes `<dir>/<sale number>.txt` and returns its path.
#[derive(Debug, Clone)]
pub struct TextReceipts {
    dir: PathBuf,
}

impl TextReceipts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        TextReceipts { dir: dir.into() }
    }
}

#[async_trait]
impl ReceiptGenerator for TextReceipts {
    async fn generate(&self, sale: &Sale, items: &[SaleItem]) -> anyhow::Result<Option<String>> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating receipt directory {}", self.dir.display()))?;

        let path = self.dir.join(format!("{}.txt", sale.sale_number));
        tokio::fs::write(&path, render(sale, items))
            .await
            .with_context(|| format!("writing receipt {}", path.display()))?;

        debug!(sale_number = %sale.sale_number, path = %path.display(), "Receipt written");
        Ok(Some(path.display().to_string()))
    }
}

fn render(sale: &Sale, items: &[SaleItem]) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(out, "Receipt {}", sale.sale_number);
    let _ = writeln!(out, "{}", sale.created_at.format("%Y-%m-%d %H:%M"));
    let _ = writeln!(out, "{}", "-".repeat(40));
    for item in items {
        let _ = writeln!(
            out,
            "{:<20} {:>6} x {:>10}",
            item.variant_id,
            item.quantity.normalize(),
            item.unit_price()
        );
        let _ = writeln!(out, "{:>40}", item.line_total());
    }
    let _ = writeln!(out, "{}", "-".repeat(40));
    let _ = writeln!(out, "{:<20}{:>20}", "Subtotal", sale.subtotal());
    if sale.discount_cents != 0 {
        let _ = writeln!(out, "{:<20}{:>20}", "Discount", format!("-{}", sale.discount()));
    }
    let _ = writeln!(out, "{:<20}{:>20}", "Tax", sale.tax());
    let _ = writeln!(out, "{:<20}{:>20}", "Total", sale.final_amount());
    let _ = writeln!(out, "Paid by {}", sale.payment_method);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use stockline_core::{PaymentMethod, SaleStatus};

    fn sale() -> (Sale, Vec<SaleItem>) {
        let now = Utc::now();
        let sale = Sale {
            id: "sale-1".into(),
            organization_id: "org".into(),
            sale_number: format!("S-TEST-{}", std::process::id()),
            location_id: "loc".into(),
            customer_id: None,
            member_id: "member".into(),
            status: SaleStatus::Completed,
            payment_method: PaymentMethod::Cash,
            subtotal_cents: 10_000,
            discount_cents: 2_000,
            tax_cents: 1_280,
            final_amount_cents: 9_280,
            notes: None,
            receipt_url: None,
            created_at: now,
            updated_at: now,
        };
        let item = SaleItem {
            id: "item-1".into(),
            sale_id: "sale-1".into(),
            product_id: "prod".into(),
            variant_id: "COLA-330".into(),
            stock_batch_id: "batch".into(),
            quantity: dec!(4),
            base_quantity: dec!(4),
            unit_price_cents: 2_500,
            unit_cost: dec!(1.25),
            line_total_cents: 10_000,
            created_at: now,
        };
        (sale, vec![item])
    }

    #[test]
    fn test_render_lists_totals() {
        let (sale, items) = sale();
        let text = render(&sale, &items);

        assert!(text.contains("$100.00"));
        assert!(text.contains("-$20.00"));
        assert!(text.contains("$92.80"));
        assert!(text.contains("Paid by cash"));
    }

    #[tokio::test]
    async fn test_receipt_file_is_written() {
        let (sale, items) = sale();
        let dir = std::env::temp_dir().join("stockline-receipts-test");
        let receipts = TextReceipts::new(&dir);

        let url = receipts.generate(&sale, &items).await.unwrap().unwrap();

        let written = tokio::fs::read_to_string(&url).await.unwrap();
        assert!(written.starts_with(&format!("Receipt {}", sale.sale_number)));
        tokio::fs::remove_file(&url).await.unwrap();
    }
}
