//! # Host Configuration
//!
//! ## Sources (later wins)
//! 1. Defaults (this file)
//! 2. Config file (`stockline.toml`, optional)
//! 3. Environment variables (`STOCKLINE__*`, `__` separates nesting)
//!
//! ```toml
//! database_path = "./data/stockline.db"
//! organization_id = "org-demo"
//! member_id = "member-demo"
//!
//! [defaults]
//! default_tax_rate = "0.16"
//! inventory_policy = "FEFO"
//! ```
//!
//! `STOCKLINE__DEFAULTS__NEGATIVE_STOCK_ALLOWED=true` overrides a nested key.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use stockline_core::{InventoryPolicy, TaxRate};
use stockline_db::DbConfig;
use stockline_ledger::{LedgerConfig, SettingsDefaults};
use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Everything the CLI needs to build a ledger context.
#[derive(Debug, Clone, Deserialize)]
pub struct StocklineConfig {
    /// SQLite database file.
    pub database_path: PathBuf,

    pub max_connections: u32,

    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub log_level: String,

    /// Tenant the CLI acts for.
    pub organization_id: String,

    /// Acting member recorded on every ledger row.
    pub member_id: String,

    /// Deadline for one unit of work.
    pub operation_timeout_secs: u64,

    /// Where text receipts are written; `None` disables receipts.
    pub receipt_dir: Option<PathBuf>,

    /// Organization settings used when the database has none.
    pub defaults: DefaultsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
    pub default_tax_rate: Decimal,
    pub negative_stock_allowed: bool,
    /// "FIFO" or "FEFO", any case.
    pub inventory_policy: String,
}

impl StocklineConfig {
    /// Loads defaults, then `path` if it exists, then the environment.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("database_path", "stockline.db")?
            .set_default("max_connections", 5)?
            .set_default("log_level", "info,stockline=debug,sqlx=warn")?
            .set_default("organization_id", "org-demo")?
            .set_default("member_id", "member-demo")?
            .set_default("operation_timeout_secs", 30)?
            .set_default("defaults.default_tax_rate", "0")?
            .set_default("defaults.negative_stock_allowed", false)?
            .set_default("defaults.inventory_policy", "FIFO")?
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix("STOCKLINE").separator("__"))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(&self.database_path).max_connections(self.max_connections)
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig::default().operation_timeout(Duration::from_secs(self.operation_timeout_secs))
    }

    /// Validated organization defaults.
    pub fn settings_defaults(&self) -> Result<SettingsDefaults, ConfigError> {
        let default_tax_rate = TaxRate::new(self.defaults.default_tax_rate).map_err(|e| {
            ConfigError::InvalidValue {
                field: "defaults.default_tax_rate",
                reason: e.to_string(),
            }
        })?;
        let inventory_policy: InventoryPolicy =
            self.defaults.inventory_policy.parse().map_err(|e: stockline_core::ValidationError| {
                ConfigError::InvalidValue {
                    field: "defaults.inventory_policy",
                    reason: e.to_string(),
                }
            })?;

        Ok(SettingsDefaults {
            default_tax_rate,
            negative_stock_allowed: self.defaults.negative_stock_allowed,
            inventory_policy,
        })
    }
}
