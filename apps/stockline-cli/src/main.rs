//! # Stockline CLI
//!
//! Command-line host for the stock ledger.
//!
//! ## Usage
//! ```bash
//! stockline seed
//! stockline restock --product prod-bev-cola --unit case --quantity 2 --price 19.20
//! stockline sell --location loc-main --item prod-bev-cola=3 --payment cash
//! stockline adjust --batch <id> --change -2 --reason damaged
//! stockline write-off-expired
//! stockline reconcile
//! stockline low-stock --location loc-main
//! ```
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  1. Parse arguments (clap)                                              │
//! │  2. Load StocklineConfig (defaults → stockline.toml → STOCKLINE__*)     │
//! │  3. Initialize tracing (RUST_LOG overrides config log_level)            │
//! │  4. Open the database, apply migrations                                 │
//! │  5. Build LedgerContext (static auth, DB settings, text receipts)       │
//! │  6. Run the command, print JSON on stdout                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod receipts;
mod seed;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use stockline_core::{AdjustmentReason, Money, PaymentMethod};
use stockline_db::Database;
use stockline_ledger::{
    check_consistency, low_stock, AdjustmentRequest, AdjustmentService, CartItem,
    DbSettingsProvider, LedgerContext, RestockRequest, RestockService, SaleRequest, SaleService,
    StaticAuthContext,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::StocklineConfig;
use crate::receipts::TextReceipts;

#[derive(Parser)]
#[command(name = "stockline", about = "Inventory stock ledger and sale engine", version)]
struct Cli {
    /// Configuration file; missing is fine.
    #[arg(long, global = true, env = "STOCKLINE_CONFIG", default_value = "stockline.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema.
    Migrate,
    /// Load a demo catalog into an empty organization.
    Seed,
    /// Receive stock as a new batch.
    Restock(RestockArgs),
    /// Record a sale.
    Sell(SellArgs),
    /// Correct one batch by a signed quantity of base units.
    Adjust(AdjustArgs),
    /// Zero every batch past its expiry date.
    WriteOffExpired {
        #[arg(long)]
        location: Option<String>,
    },
    /// Compare aggregates with batch sums and list unwritten expired stock.
    ///
    /// Exits non-zero only when an aggregate drifted.
    Reconcile,
    /// List variants at or below their reorder point.
    LowStock {
        #[arg(long)]
        location: Option<String>,
    },
}

#[derive(Args)]
struct RestockArgs {
    #[arg(long)]
    product: String,
    #[arg(long)]
    variant: Option<String>,
    /// Unit id, symbol or name ("case", "cs").
    #[arg(long)]
    unit: String,
    #[arg(long)]
    quantity: Decimal,
    #[arg(long, default_value = seed::LOCATION_ID)]
    location: String,
    #[arg(long)]
    supplier: Option<String>,
    /// Price per `unit`.
    #[arg(long)]
    price: Option<Decimal>,
    /// YYYY-MM-DD
    #[arg(long)]
    expiry: Option<NaiveDate>,
    #[arg(long)]
    purchase_order_item: Option<String>,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Args)]
struct SellArgs {
    #[arg(long, default_value = seed::LOCATION_ID)]
    location: String,
    /// `PRODUCT[:VARIANT]=QUANTITY`, repeatable.
    #[arg(long = "item", required = true, value_parser = parse_cart_item)]
    items: Vec<CartItem>,
    #[arg(long)]
    customer: Option<String>,
    #[arg(long, default_value = "cash")]
    payment: PaymentMethod,
    #[arg(long, default_value_t = 0)]
    discount_cents: i64,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Args)]
struct AdjustArgs {
    #[arg(long)]
    batch: String,
    #[arg(long, allow_hyphen_values = true)]
    change: Decimal,
    #[arg(long)]
    reason: AdjustmentReason,
    #[arg(long)]
    notes: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = StocklineConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    init_tracing(&config.log_level);
    info!(
        database = %config.database_path.display(),
        organization_id = %config.organization_id,
        "Stockline starting"
    );

    let db = Database::new(config.db_config()).await?;
    let ctx = build_context(&db, &config)?;

    match cli.command {
        Commands::Migrate => print_json(&db.migration_report().await?),
        Commands::Seed => {
            let summary =
                seed::run(&db, &config.organization_id, config.settings_defaults()?).await?;
            print_json(&summary)
        }
        Commands::Restock(args) => {
            let response = RestockService::new(ctx).handle(args.into_request()).await;
            print_json(&response)?;
            if !response.success {
                bail!(response.message);
            }
            Ok(())
        }
        Commands::Sell(args) => {
            let response = SaleService::new(ctx).handle(args.into_request()).await;
            print_json(&response)?;
            if !response.success {
                bail!(response.message);
            }
            Ok(())
        }
        Commands::Adjust(args) => {
            let result = AdjustmentService::new(ctx)
                .adjust(AdjustmentRequest {
                    stock_batch_id: args.batch,
                    quantity_change: args.change,
                    reason: args.reason,
                    notes: args.notes,
                })
                .await?;
            print_json(&result)
        }
        Commands::WriteOffExpired { location } => {
            let summary = AdjustmentService::new(ctx)
                .write_off_expired(location.as_deref())
                .await?;
            print_json(&summary)
        }
        Commands::Reconcile => {
            let discrepancies = check_consistency(&db, &config.organization_id).await?;
            print_json(&discrepancies)?;
            // expired stock is listed for a write-off, not treated as a failure
            let drifted = discrepancies.iter().filter(|d| d.is_drift()).count();
            if drifted > 0 {
                bail!("{drifted} stock aggregate(s) out of step");
            }
            Ok(())
        }
        Commands::LowStock { location } => {
            let items = low_stock(&db, &config.organization_id, location.as_deref()).await?;
            print_json(&items)
        }
    }
}

/// `RUST_LOG` wins over the configured level. Logs go to stderr so stdout
/// stays valid JSON.
fn init_tracing(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_context(db: &Database, config: &StocklineConfig) -> Result<LedgerContext> {
    let auth = StaticAuthContext::new(&config.member_id, &config.organization_id);
    let settings = DbSettingsProvider::new(db.clone()).with_defaults(config.settings_defaults()?);

    let mut ctx = LedgerContext::new(db.clone(), Arc::new(auth))
        .with_settings(Arc::new(settings))
        .with_config(config.ledger_config());
    if let Some(dir) = &config.receipt_dir {
        ctx = ctx.with_receipts(Arc::new(TextReceipts::new(dir)));
    }
    Ok(ctx)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parses `PRODUCT[:VARIANT]=QUANTITY`.
fn parse_cart_item(raw: &str) -> Result<CartItem, String> {
    let (target, quantity) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected PRODUCT[:VARIANT]=QUANTITY, got {raw:?}"))?;
    let quantity: Decimal = quantity
        .trim()
        .parse()
        .map_err(|e| format!("invalid quantity {quantity:?}: {e}"))?;

    let (product_id, variant_id) = match target.split_once(':') {
        Some((product, variant)) => (product.trim(), Some(variant.trim().to_string())),
        None => (target.trim(), None),
    };
    if product_id.is_empty() {
        return Err(format!("missing product in {raw:?}"));
    }

    Ok(CartItem {
        product_id: product_id.to_string(),
        variant_id,
        quantity,
    })
}

impl RestockArgs {
    fn into_request(self) -> RestockRequest {
        RestockRequest {
            product_id: self.product,
            variant_id: self.variant,
            unit: self.unit,
            unit_quantity: self.quantity,
            location_id: self.location,
            supplier_id: self.supplier,
            purchase_price: self.price,
            expiry_date: self.expiry,
            purchase_order_item_id: self.purchase_order_item,
            notes: self.notes,
        }
    }
}

impl SellArgs {
    fn into_request(self) -> SaleRequest {
        SaleRequest {
            cart_items: self.items,
            location_id: self.location,
            customer_id: self.customer,
            payment_method: self.payment,
            discount_amount: Money::from_cents(self.discount_cents),
            notes: self.notes,
        }
    }
}
