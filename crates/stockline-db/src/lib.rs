//! # stockline-db: Database Layer for Stockline
//!
//! This crate provides database access for the stock ledger.
//! It uses SQLite with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Stockline Data Flow                              │
//! │                                                                         │
//! │  SaleService / RestockService (stockline-ledger)                       │
//! │       │  owns the Transaction                                           │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 stockline-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │ batch, stock, │    │  (embedded)  │  │   │
//! │  │   │               │    │ sale, journal │    │              │  │   │
//! │  │   │ SqlitePool    │◄───│ catalog, unit │    │ 001_initial  │  │   │
//! │  │   │ begin()       │    │ ...           │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Connection-scoped SQL access per table family
//!
//! ## Usage
//!
//! ```rust,ignore
//! use stockline_db::{repository::stock, Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("stockline.db")).await?;
//!
//! let mut tx = db.begin().await?;
//! let row = stock::find(&mut tx, org_id, &key).await?;
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use migrations::MigrationReport;
pub use pool::{Database, DbConfig};
pub use repository::new_id;
