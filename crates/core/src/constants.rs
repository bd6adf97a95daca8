//! Tunable constants, with their design-mandated defaults.
//!
//! Every value here is a `const` default; callers that need different
//! numbers (tests shrinking timeouts, embedders with stricter SLAs) go
//! through `StorageCoreConfig` in `txstore-api` rather than editing these.

use std::time::Duration;

/// Maximum number of [`crate::record::Record`]-touching operations per
/// transaction context. The 101st enqueue fails with
/// [`crate::Error::MaxOperationsExceeded`].
pub const MAX_OPS: usize = 100;

/// Maximum number of whole-transaction retries after a commit-phase failure.
pub const MAX_RETRY: u32 = 3;

/// Base delay for the transaction retry backoff (doubles each attempt).
pub const RETRY_BASE: Duration = Duration::from_millis(100);

/// Per-operation timeout applied to every primitive backend request.
pub const OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Whole-transaction timeout covering callback + prepare + commit.
pub const TX_TIMEOUT: Duration = Duration::from_secs(30);

/// Commit markers older than this are considered stale and are discarded
/// (not replayed) by `recover_from_journal`.
pub const MARKER_STALE: Duration = Duration::from_secs(5 * 60);

/// Maximum number of compensation entries retained per tier before the
/// oldest entry is FIFO-evicted.
pub const COMP_MAX_ENTRIES: usize = 100;

/// Connection retry policy for `RecordStore::init_with_retry`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConnectionRetryPolicy {
    /// Delay before the first retry.
    pub base: Duration,
    /// Ceiling the exponential backoff is clamped to.
    pub cap: Duration,
    /// Backoff multiplier applied after each attempt.
    pub multiplier: u32,
    /// Maximum number of connection attempts before giving up (or falling
    /// back, if `enable_fallback` was requested).
    pub max_attempts: u32,
}

impl Default for ConnectionRetryPolicy {
    fn default() -> Self {
        ConnectionRetryPolicy {
            base: Duration::from_millis(500),
            cap: Duration::from_secs(5),
            multiplier: 2,
            max_attempts: 3,
        }
    }
}

impl ConnectionRetryPolicy {
    /// Delay before the `attempt`-th retry (0-indexed), clamped to `cap`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let scaled = self.base.as_millis().saturating_mul(
            (self.multiplier as u128).saturating_pow(attempt),
        );
        Duration::from_millis(scaled.min(self.cap.as_millis()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_until_cap() {
        let policy = ConnectionRetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(500));
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(10), policy.cap);
    }
}
