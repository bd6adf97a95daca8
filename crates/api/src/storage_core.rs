//! [`StorageCore`]: the embedder-facing facade wiring the three backend
//! resources, the durability layer, and [`TransactionCoordinator`] into one
//! handle (spec §6 "Quick Start").

use std::future::Future;
use std::sync::Arc;

use txstore_core::{Error, Result};
use txstore_durability::CompensationEntry;
use txstore_engine::coordinator::{RunOutcome, TransactionCoordinator};
use txstore_engine::fatal::FatalInfo;
use txstore_engine::recovery::recover_from_journal;

use crate::metrics::{Metrics, MetricsSnapshot};
use crate::tx_handle::TxHandle;
use txstore_primitives::{CredentialStore, FlatStore};
use txstore_storage::record_store::RecordStore;

/// A fully wired transactional store: the three backend resources, the
/// durability layer (journal + compensation log), and the 2PC coordinator
/// in front of them.
///
/// Build one with [`crate::builder::StorageCoreBuilder`]; use [`StorageCore::run`]
/// for the common collect-everything-up-front shape, or
/// [`StorageCore::begin`] for the manual accumulate-then-commit shape.
pub struct StorageCore {
    pub(crate) coordinator: Arc<TransactionCoordinator>,
    pub(crate) record_store: Arc<RecordStore>,
    pub(crate) flat_store: Arc<dyn FlatStore>,
    pub(crate) credential_store: Arc<dyn CredentialStore>,
    pub(crate) metrics: Metrics,
}

impl StorageCore {
    /// The structured record store.
    pub fn record_store(&self) -> &Arc<RecordStore> {
        &self.record_store
    }

    /// The string-keyed flat store.
    pub fn flat_store(&self) -> &Arc<dyn FlatStore> {
        &self.flat_store
    }

    /// The credential/token custody store.
    pub fn credential_store(&self) -> &Arc<dyn CredentialStore> {
        &self.credential_store
    }

    /// Run a whole transaction in one shot: `collect` enqueues every
    /// operation up front, then the coordinator drives prepare, journal,
    /// commit, and (on failure) rollback and whole-transaction retry.
    pub async fn run<F, Fut>(&self, collect: F) -> Result<RunOutcome>
    where
        F: FnOnce(&mut txstore_engine::context::TransactionContext) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.metrics.record_started();
        let outcome = self.coordinator.run(collect).await;
        match &outcome {
            Ok(_) => self.metrics.record_committed(),
            Err(err) => self.metrics.record_aborted(!matches!(err, Error::RollbackIncomplete { .. })),
        }
        outcome
    }

    /// Begin a manual transaction: returns a [`TxHandle`] to accumulate
    /// operations on before calling [`TxHandle::commit`]. Fails fast if a
    /// transaction is already mid-commit at the moment of the call. The
    /// nested-transaction guard itself is acquired by [`TxHandle::commit`]
    /// (the engine's single protocol entrypoint acquires it, not a separate
    /// begin step), so this check is a point-in-time courtesy, not a lock
    /// held for the handle's lifetime — two handles can coexist unresolved,
    /// but only one `commit()` can be in flight at a time.
    pub fn begin(&self) -> Result<TxHandle<'_>> {
        let nested = self.coordinator.nested_stack();
        if nested.depth() > 0 {
            return Err(Error::NestedNotSupported {
                depth: nested.depth(),
                stack: nested.active_ids(),
            });
        }
        Ok(TxHandle::new(self))
    }

    /// Replay the commit marker journal left by a previous process, rolling
    /// forward or discarding each resource's own pending scratch. Returns the
    /// number of markers found.
    pub async fn recover_from_journal(&self) -> Result<usize> {
        let report = recover_from_journal(self.coordinator.journal().as_ref(), self.coordinator.resources()).await?;
        Ok(report.markers.len())
    }

    /// True once the coordinator has latched a fatal error and is refusing
    /// new transactions.
    pub fn is_fatal_state(&self) -> bool {
        self.coordinator.fatal_state().is_fatal()
    }

    /// Details of the latched fatal error, if any.
    pub fn get_fatal_state(&self) -> Option<FatalInfo> {
        self.coordinator.fatal_state().info()
    }

    /// Clear the latched fatal error, recording `reason` for the audit
    /// trail. Returns whether it had actually been set.
    pub fn clear_fatal_state(&self, reason: impl Into<String>) -> bool {
        self.coordinator.fatal_state().clear(reason.into())
    }

    /// Every compensation entry across whichever tiers are configured.
    pub async fn get_compensation_logs(&self) -> Result<Vec<CompensationEntry>> {
        self.coordinator.compensation_logger().all_entries().await
    }

    /// Mark a compensation entry resolved once an operator has manually
    /// reconciled it. Returns whether an entry with that id was found.
    pub async fn resolve_compensation_log(&self, transaction_id: &str) -> bool {
        self.coordinator.compensation_logger().resolve(transaction_id).await
    }

    /// Remove every resolved compensation entry. Returns how many were
    /// removed.
    pub async fn clear_resolved_compensation_logs(&self) -> usize {
        self.coordinator.compensation_logger().clear_resolved().await
    }

    /// True if a transaction is currently active.
    pub fn is_in_transaction(&self) -> bool {
        self.coordinator.nested_stack().depth() > 0
    }

    /// Current transaction nesting depth (0 or 1; nested transactions are
    /// rejected, not supported).
    pub fn transaction_depth(&self) -> usize {
        self.coordinator.nested_stack().depth()
    }

    /// A snapshot of the running transaction counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.transaction_depth())
    }

    pub(crate) fn coordinator(&self) -> &Arc<TransactionCoordinator> {
        &self.coordinator
    }
}
