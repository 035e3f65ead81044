//! # Ledger Configuration
//!
//! Limits applied to every unit of work.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default deadline for one sale, restock or adjustment.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// One attempt plus one retry after a concurrency conflict.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Per-operation limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Deadline for one attempt; on expiry the transaction is rolled back.
    pub operation_timeout: Duration,

    /// Total attempts for an operation that hits a concurrency conflict.
    pub max_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl LedgerConfig {
    /// Sets the per-attempt deadline.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Sets the attempt count (at least one).
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_allows_single_retry() {
        let config = LedgerConfig::default();
        assert_eq!(config.max_attempts, 2);
        assert_eq!(config.operation_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_attempts_never_zero() {
        assert_eq!(LedgerConfig::default().max_attempts(0).max_attempts, 1);
    }
}
