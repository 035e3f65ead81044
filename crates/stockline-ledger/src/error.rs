//! # Ledger Error Types
//!
//! What orchestrators return, and the serialisable kind callers switch on.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  CoreError (rules)  ──┐                                                 │
//! │                       ├──► LedgerError ──► unit of work                 │
//! │  DbError (storage)  ──┘        │             │                          │
//! │                                │             ├─ ConcurrencyConflict?    │
//! │  no AuthContext ───────────────┤             │    └─ retry once         │
//! │  operation deadline ───────────┘             └─ anything else: surface  │
//! │                                                                         │
//! │  handle() ──► { success: false, message, error: ErrorKind }             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use stockline_core::{CoreError, ValidationError};
use stockline_db::DbError;
use thiserror::Error;
use ts_rs::TS;

/// Result type alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Everything a ledger operation can fail with.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// No acting member / organization could be resolved.
    #[error("Authentication required")]
    Unauthenticated,

    /// A business rule or unit-graph failure.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A storage failure.
    #[error(transparent)]
    Db(#[from] DbError),

    /// The operation did not finish before its deadline and was rolled back.
    #[error("{operation} timed out after {}ms", after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl From<ValidationError> for LedgerError {
    fn from(err: ValidationError) -> Self {
        LedgerError::Core(CoreError::Validation(err))
    }
}

impl LedgerError {
    /// Creates a not found error.
    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        LedgerError::Db(DbError::not_found(entity, id))
    }

    /// Classifies the error for callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Unauthenticated => ErrorKind::Authentication,
            LedgerError::Timeout { .. } => ErrorKind::Timeout,
            LedgerError::Core(err) => match err {
                CoreError::UnknownUnit(_) => ErrorKind::UnknownUnit,
                CoreError::CycleDetected { .. } => ErrorKind::CycleDetected,
                CoreError::NoConversionPath { .. } => ErrorKind::NoConversionPath,
                CoreError::InvalidConversionFactor { .. } => ErrorKind::InvalidConversionFactor,
                CoreError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
                CoreError::NoCostBasisAvailable { .. } => ErrorKind::NoCostBasisAvailable,
                CoreError::DiscountExceedsSubtotal { .. } => ErrorKind::DiscountExceedsSubtotal,
                CoreError::MissingVariantForStockTracking { .. } => {
                    ErrorKind::MissingVariantForStockTracking
                }
                CoreError::Validation(_) => ErrorKind::ValidationError,
            },
            LedgerError::Db(err) => match err {
                DbError::NotFound { .. } => ErrorKind::NotFound,
                err if err.is_concurrency_conflict() => ErrorKind::ConcurrencyConflict,
                _ => ErrorKind::PersistenceError,
            },
        }
    }

    /// True if re-running the whole unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::ConcurrencyConflict
    }

    /// Message safe to show a caller.
    ///
    /// Storage details stay in the logs.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::PersistenceError => "Database operation failed".to_string(),
            ErrorKind::ConcurrencyConflict => {
                "Stock changed while the operation was running, please retry".to_string()
            }
            _ => self.to_string(),
        }
    }
}

// =============================================================================
// Error Kind
// =============================================================================

/// Machine-readable error classification.
///
/// ## Serialization
/// ```json
/// { "success": false, "message": "...", "error": "INSUFFICIENT_STOCK" }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed or missing input.
    ValidationError,
    /// A referenced row does not exist or is inactive.
    NotFound,
    MissingVariantForStockTracking,
    UnknownUnit,
    CycleDetected,
    NoConversionPath,
    InvalidConversionFactor,
    InsufficientStock,
    NoCostBasisAvailable,
    DiscountExceedsSubtotal,
    /// Lost update detected; eligible for a single retry.
    ConcurrencyConflict,
    /// Underlying store failure.
    PersistenceError,
    Authentication,
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kinds_follow_source_error() {
        let err: LedgerError = CoreError::InsufficientStock {
            variant_id: "v".into(),
            location_id: "l".into(),
            required: dec!(5),
            available: dec!(2),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InsufficientStock);

        let err: LedgerError = ValidationError::Required {
            field: "locationId".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::ValidationError);

        assert_eq!(
            LedgerError::not_found("Product", "p-1").kind(),
            ErrorKind::NotFound
        );
        assert_eq!(LedgerError::Unauthenticated.kind(), ErrorKind::Authentication);
    }

    #[test]
    fn test_only_conflicts_are_retryable() {
        assert!(LedgerError::Db(DbError::conflict("StockBatch", "b-1")).is_retryable());
        assert!(LedgerError::Db(DbError::Busy("database is locked".into())).is_retryable());
        assert!(!LedgerError::Db(DbError::QueryFailed("syntax".into())).is_retryable());
        assert!(!LedgerError::Timeout {
            operation: "sale",
            after: Duration::from_secs(1)
        }
        .is_retryable());
    }

    #[test]
    fn test_persistence_details_are_hidden() {
        let err = LedgerError::Db(DbError::QueryFailed("no such column: foo".into()));
        assert_eq!(err.user_message(), "Database operation failed");
    }

    #[test]
    fn test_kind_serialization() {
        let json = serde_json::to_string(&ErrorKind::DiscountExceedsSubtotal).unwrap();
        assert_eq!(json, "\"DISCOUNT_EXCEEDS_SUBTOTAL\"");
    }
}
