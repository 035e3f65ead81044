//! # Collaborators
//!
//! The narrow interfaces the orchestrators consume, and the bundle that
//! carries them.
//!
//! ## Where Each Collaborator Runs
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEFORE the transaction                                                 │
//! │    AuthContextProvider::context()   → None aborts with Authentication   │
//! │    SettingsProvider::settings(org)  → fetched once, passed by value     │
//! │                                                                         │
//! │  INSIDE the transaction                                                 │
//! │    (no collaborators, only the connection)                              │
//! │                                                                         │
//! │  AFTER commit, best-effort                                              │
//! │    StockEventSink::publish(event)   → fire-and-forget                   │
//! │    ReceiptGenerator::generate(sale) → failure is logged only            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use stockline_core::{
    AuthContext, InventoryPolicy, OrganizationSettings, Sale, SaleItem, TaxRate,
};
use stockline_db::{repository::settings, Database};
use tokio::sync::broadcast;
use tracing::debug;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};

// =============================================================================
// Auth Context
// =============================================================================

/// Resolves who is acting and for which organization.
#[async_trait]
pub trait AuthContextProvider: Send + Sync {
    async fn context(&self) -> Option<AuthContext>;
}

/// A fixed context, for hosts that authenticate up front (and tests).
#[derive(Debug, Clone, Default)]
pub struct StaticAuthContext(Option<AuthContext>);

impl StaticAuthContext {
    pub fn new(member_id: impl Into<String>, organization_id: impl Into<String>) -> Self {
        StaticAuthContext(Some(AuthContext {
            member_id: member_id.into(),
            organization_id: organization_id.into(),
        }))
    }

    /// A provider that never authenticates.
    pub fn anonymous() -> Self {
        StaticAuthContext(None)
    }
}

#[async_trait]
impl AuthContextProvider for StaticAuthContext {
    async fn context(&self) -> Option<AuthContext> {
        self.0.clone()
    }
}

// =============================================================================
// Organization Settings
// =============================================================================

/// Looks up the per-organization tax, negative-stock and policy settings.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn settings(&self, organization_id: &str) -> LedgerResult<OrganizationSettings>;
}

/// Settings used when an organization has no row of its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsDefaults {
    pub default_tax_rate: TaxRate,
    pub negative_stock_allowed: bool,
    pub inventory_policy: InventoryPolicy,
}

impl Default for SettingsDefaults {
    fn default() -> Self {
        SettingsDefaults {
            default_tax_rate: TaxRate::zero(),
            negative_stock_allowed: false,
            inventory_policy: InventoryPolicy::Fifo,
        }
    }
}

impl SettingsDefaults {
    pub fn for_organization(&self, organization_id: &str) -> OrganizationSettings {
        OrganizationSettings {
            organization_id: organization_id.to_string(),
            default_tax_rate: self.default_tax_rate,
            negative_stock_allowed: self.negative_stock_allowed,
            inventory_policy: self.inventory_policy,
        }
    }
}

/// Reads `organization_settings`, falling back to configured defaults.
#[derive(Debug, Clone)]
pub struct DbSettingsProvider {
    db: Database,
    defaults: SettingsDefaults,
}

impl DbSettingsProvider {
    pub fn new(db: Database) -> Self {
        DbSettingsProvider {
            db,
            defaults: SettingsDefaults::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: SettingsDefaults) -> Self {
        self.defaults = defaults;
        self
    }
}

#[async_trait]
impl SettingsProvider for DbSettingsProvider {
    async fn settings(&self, organization_id: &str) -> LedgerResult<OrganizationSettings> {
        let mut conn = self.db.acquire().await?;
        match settings::find(&mut conn, organization_id).await? {
            Some(found) => Ok(found),
            None => {
                debug!(organization_id = %organization_id, "No settings row, using defaults");
                Ok(self.defaults.for_organization(organization_id))
            }
        }
    }
}

// =============================================================================
// Receipts
// =============================================================================

/// Produces a receipt artifact for a committed sale.
///
/// Returns the artifact's reference (a URL or path), or `None` if nothing
/// was produced. Errors are logged by the caller and never fail the sale.
#[async_trait]
pub trait ReceiptGenerator: Send + Sync {
    async fn generate(&self, sale: &Sale, items: &[SaleItem]) -> anyhow::Result<Option<String>>;
}

/// Generates nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReceipts;

#[async_trait]
impl ReceiptGenerator for NoReceipts {
    async fn generate(&self, _sale: &Sale, _items: &[SaleItem]) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

// =============================================================================
// Stock Events
// =============================================================================

/// Published after a ledger change commits (cache invalidation, notifications).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StockEvent {
    #[serde(rename_all = "camelCase")]
    SaleCompleted {
        organization_id: String,
        sale_id: String,
        sale_number: String,
        location_id: String,
        variant_ids: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    StockReceived {
        organization_id: String,
        variant_id: String,
        location_id: String,
        stock_batch_id: String,
        quantity: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    StockAdjusted {
        organization_id: String,
        variant_id: String,
        location_id: String,
        stock_batch_id: String,
        quantity_change: Decimal,
    },
    #[serde(rename_all = "camelCase")]
    ExpiredWrittenOff {
        organization_id: String,
        stock_batch_ids: Vec<String>,
    },
}

/// Receives post-commit events. Must not block and cannot fail.
pub trait StockEventSink: Send + Sync {
    fn publish(&self, event: StockEvent);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullEventSink;

impl StockEventSink for NullEventSink {
    fn publish(&self, _event: StockEvent) {}
}

/// Fans events out over a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastEventSink {
    tx: broadcast::Sender<StockEvent>,
}

impl BroadcastEventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        BroadcastEventSink { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StockEvent> {
        self.tx.subscribe()
    }
}

impl StockEventSink for BroadcastEventSink {
    fn publish(&self, event: StockEvent) {
        // No subscribers is not an error
        let _ = self.tx.send(event);
    }
}

// =============================================================================
// Ledger Context
// =============================================================================

/// Database handle plus every collaborator, shared by the services.
///
/// ## Usage
/// ```rust,ignore
/// let ctx = LedgerContext::new(db.clone(), Arc::new(StaticAuthContext::new("m-1", "org-1")))
///     .with_events(Arc::new(BroadcastEventSink::new(64)));
/// let sales = SaleService::new(ctx.clone());
/// ```
#[derive(Clone)]
pub struct LedgerContext {
    pub(crate) db: Database,
    pub(crate) auth: Arc<dyn AuthContextProvider>,
    pub(crate) settings: Arc<dyn SettingsProvider>,
    pub(crate) receipts: Arc<dyn ReceiptGenerator>,
    pub(crate) events: Arc<dyn StockEventSink>,
    pub(crate) config: LedgerConfig,
}

impl LedgerContext {
    /// Settings come from the database, no receipts, events are dropped.
    pub fn new(db: Database, auth: Arc<dyn AuthContextProvider>) -> Self {
        LedgerContext {
            settings: Arc::new(DbSettingsProvider::new(db.clone())),
            db,
            auth,
            receipts: Arc::new(NoReceipts),
            events: Arc::new(NullEventSink),
            config: LedgerConfig::default(),
        }
    }

    pub fn with_settings(mut self, settings: Arc<dyn SettingsProvider>) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_receipts(mut self, receipts: Arc<dyn ReceiptGenerator>) -> Self {
        self.receipts = receipts;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn StockEventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_config(mut self, config: LedgerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Resolves the acting member, failing before any other step.
    pub(crate) async fn authenticate(&self) -> LedgerResult<AuthContext> {
        self.auth.context().await.ok_or(LedgerError::Unauthenticated)
    }
}

/// Today's date for expiry checks.
pub(crate) fn today() -> chrono::NaiveDate {
    Utc::now().date_naive()
}
