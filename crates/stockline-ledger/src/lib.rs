//! # Stockline Ledger
//!
//! Orchestrators that move stock: sales, restocks, adjustments and
//! expired write-offs, each inside one unit of work.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockline Ledger                                 │
//! │                                                                         │
//! │  ┌───────────────┐   ┌───────────────┐   ┌──────────────────────────┐  │
//! │  │  SaleService  │   │ RestockService│   │   AdjustmentService      │  │
//! │  │  handle()     │   │ handle()      │   │   adjust()               │  │
//! │  │  execute()    │   │ execute()     │   │   write_off_expired()    │  │
//! │  └───────┬───────┘   └───────┬───────┘   └────────────┬─────────────┘  │
//! │          └───────────────────┼────────────────────────┘                │
//! │                              ▼                                          │
//! │  ┌────────────────────────────────────────────────────────────────┐    │
//! │  │ unit_of_work::run   begin ─► work ─► commit | rollback, retry  │    │
//! │  └────────────────────────────────────────────────────────────────┘    │
//! │          │                   │                        │                 │
//! │          ▼                   ▼                        ▼                 │
//! │   stockline-core       stockline-db            LedgerContext           │
//! │   (units, selection,   (repositories)          (auth, settings,        │
//! │    totals, deltas)                              receipts, events)      │
//! │                                                                         │
//! │  consistency::check_consistency / low_stock   (out-of-band reads)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//! ```rust,ignore
//! let ctx = LedgerContext::new(db, Arc::new(StaticAuthContext::new("member", "org")));
//! let response = SaleService::new(ctx).handle(request).await;
//! ```

pub mod adjustment;
pub mod config;
pub mod consistency;
pub mod context;
pub mod dto;
pub mod error;
pub mod numbering;
pub mod restock;
pub mod sale;
pub mod stock;
pub mod unit_of_work;
pub mod variant;

#[cfg(test)]
mod testing;

pub use adjustment::AdjustmentService;
pub use config::LedgerConfig;
pub use consistency::{check_consistency, low_stock};
pub use context::{
    AuthContextProvider, BroadcastEventSink, DbSettingsProvider, LedgerContext, NoReceipts,
    NullEventSink, ReceiptGenerator, SettingsDefaults, SettingsProvider, StaticAuthContext,
    StockEvent, StockEventSink,
};
pub use dto::{
    AdjustmentRequest, AdjustmentResult, CartItem, CompletedSale, LowStockItem, RestockRequest,
    RestockResponse, RestockResult, SaleRequest, SaleResponse, WriteOffSummary,
};
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use restock::RestockService;
pub use sale::SaleService;
pub use variant::VariantResolution;
