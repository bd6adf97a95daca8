//! [`StorageCoreConfig`]: the tunable surface threaded through
//! [`crate::builder::StorageCoreBuilder`] (spec §6's constants table).
//!
//! Lower crates bake a few of these same numbers in as `const`s
//! (`txstore_core::constants::MARKER_STALE`, `CompensationLogger::CAP`) for
//! paths that don't currently take a config argument; this struct covers the
//! subset the coordinator itself accepts per-instance; a fuller embedder
//! wanting to override marker staleness or the compensation cap would thread
//! that through the same builder once those lower layers grow a config
//! parameter of their own.

use std::time::Duration;

use txstore_core::constants::{MAX_RETRY, OP_TIMEOUT, RETRY_BASE, TX_TIMEOUT};
use txstore_engine::coordinator::CoordinatorConfig;

/// Timeouts and retry tuning for a [`crate::storage_core::StorageCore`].
/// Defaults mirror `txstore_core::constants`.
#[derive(Debug, Clone, Copy)]
pub struct StorageCoreConfig {
    /// Per-operation timeout applied by each backend's own request wrapper.
    pub op_timeout: Duration,
    /// Whole-transaction timeout covering callback + prepare + commit.
    pub tx_timeout: Duration,
    /// Maximum whole-transaction retries after a commit-phase failure.
    pub max_retry: u32,
    /// Base retry backoff (doubles each attempt).
    pub retry_base: Duration,
}

impl Default for StorageCoreConfig {
    fn default() -> Self {
        StorageCoreConfig {
            op_timeout: OP_TIMEOUT,
            tx_timeout: TX_TIMEOUT,
            max_retry: MAX_RETRY,
            retry_base: RETRY_BASE,
        }
    }
}

impl StorageCoreConfig {
    /// Project onto the coordinator's own config shape.
    pub(crate) fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            op_timeout: self.op_timeout,
            tx_timeout: self.tx_timeout,
            max_retry: self.max_retry,
            retry_base: self.retry_base,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_core_constants() {
        let config = StorageCoreConfig::default();
        assert_eq!(config.op_timeout, OP_TIMEOUT);
        assert_eq!(config.max_retry, MAX_RETRY);
    }
}
