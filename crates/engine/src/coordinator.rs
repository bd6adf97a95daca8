//! [`TransactionCoordinator`]: the 2PC protocol engine (spec §4.3).
//!
//! Control flow mirrors spec §2's diagram almost verbatim: fatal gate,
//! nested-tx guard, collection, prepare, decision (journal), commit,
//! cleanup, with a rollback branch off of any prepare/commit failure and a
//! retry loop wrapping prepare→commit on transient commit failures.
//!
//! Grounded on the teacher's `concurrency/manager.rs` commit-sequence doc
//! comment shape (numbered phases, explicit "DURABILITY POINT" callouts)
//! and `engine/coordinator.rs`'s pattern of a thin coordinator wrapping a
//! lower-level manager with typed error conversion and metrics.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use txstore_core::constants::{MAX_RETRY, OP_TIMEOUT, RETRY_BASE, TX_TIMEOUT};
use txstore_core::{
    Backend, Error, PartialCommitSummary, PrepareFailure, Result, TOPIC_COMPENSATION_NEEDED,
    TOPIC_FATAL_ERROR, TOPIC_PARTIAL_COMMIT,
};
use txstore_core::EventSink;
use txstore_durability::{CommitMarker, CompensationEntry, CompensationLogger, FailedOperation, JournalStore, MarkerState};

use crate::context::{Operation, TransactionContext};
use crate::fatal::FatalState;
use crate::nested::NestedTxStack;
use crate::resource::TransactionalResource;

/// Tunable timeouts and retry parameters for a [`TransactionCoordinator`].
/// Defaults mirror `txstore_core::constants`.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    /// Per-operation timeout (unused directly here; resources apply it to
    /// their own backend calls, but it's surfaced for callers composing a
    /// coordinator with matching timeouts).
    pub op_timeout: Duration,
    /// Whole-transaction timeout covering callback + prepare + commit.
    pub tx_timeout: Duration,
    /// Maximum whole-transaction retries after a commit-phase failure.
    pub max_retry: u32,
    /// Base retry backoff (doubles each attempt).
    pub retry_base: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        CoordinatorConfig {
            op_timeout: OP_TIMEOUT,
            tx_timeout: TX_TIMEOUT,
            max_retry: MAX_RETRY,
            retry_base: RETRY_BASE,
        }
    }
}

/// Result of a successful [`TransactionCoordinator::run`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Always true for a value returned via `Ok` (failures are `Err`); kept
    /// as an explicit field so callers that serialize the outcome don't
    /// need to special-case success.
    pub success: bool,
    /// Number of operations committed.
    pub operations_committed: usize,
    /// The transaction's id.
    pub transaction_id: String,
    /// Wall-clock duration of the whole `run` call.
    pub duration_ms: u64,
}

/// The two-phase commit coordinator (spec §4.3). Owns the process-wide
/// [`FatalState`] and [`NestedTxStack`] latches, the commit-marker journal,
/// and the compensation logger, and drives an ordered list of
/// [`TransactionalResource`]s through prepare/commit/rollback.
pub struct TransactionCoordinator {
    resources: Vec<Arc<dyn TransactionalResource>>,
    fatal: Arc<FatalState>,
    nested: Arc<NestedTxStack>,
    journal: Arc<dyn JournalStore>,
    compensation: Arc<CompensationLogger>,
    events: Arc<dyn EventSink>,
    config: CoordinatorConfig,
}

impl TransactionCoordinator {
    /// Construct a coordinator with default timeouts/retry parameters.
    pub fn new(
        resources: Vec<Arc<dyn TransactionalResource>>,
        journal: Arc<dyn JournalStore>,
        compensation: Arc<CompensationLogger>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        TransactionCoordinator::with_config(resources, journal, compensation, events, CoordinatorConfig::default())
    }

    /// Construct a coordinator with explicit tuning.
    pub fn with_config(
        resources: Vec<Arc<dyn TransactionalResource>>,
        journal: Arc<dyn JournalStore>,
        compensation: Arc<CompensationLogger>,
        events: Arc<dyn EventSink>,
        config: CoordinatorConfig,
    ) -> Self {
        TransactionCoordinator {
            resources,
            fatal: Arc::new(FatalState::new()),
            nested: Arc::new(NestedTxStack::new()),
            journal,
            compensation,
            events,
            config,
        }
    }

    /// The process-wide fatal latch.
    pub fn fatal_state(&self) -> &Arc<FatalState> {
        &self.fatal
    }

    /// The process-wide nested-transaction guard.
    pub fn nested_stack(&self) -> &Arc<NestedTxStack> {
        &self.nested
    }

    /// The compensation logger, for facade-level `get_compensation_logs`/
    /// `resolve_compensation_log`/`clear_resolved_compensation_logs`.
    pub fn compensation_logger(&self) -> &Arc<CompensationLogger> {
        &self.compensation
    }

    /// The commit-marker journal, for `recover_from_journal`.
    pub fn journal(&self) -> &Arc<dyn JournalStore> {
        &self.journal
    }

    /// Run `collect` to build a [`TransactionContext`], then drive it
    /// through the full 2PC protocol (spec §2's control-flow diagram).
    pub async fn run<F, Fut>(&self, collect: F) -> Result<RunOutcome>
    where
        F: FnOnce(&mut TransactionContext) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if let Some(info) = self.fatal.info() {
            return Err(Error::FatalState { reason: info.reason });
        }

        let mut ctx = TransactionContext::new();
        let _guard = self.nested.try_enter(ctx.id.clone())?;

        let start = std::time::Instant::now();
        let outcome = self.run_guarded(&mut ctx, collect).await;

        match &outcome {
            Ok(_) => info!(target: "txstore::engine", tx_id = %ctx.id, "transaction committed"),
            Err(e) => warn!(target: "txstore::engine", tx_id = %ctx.id, error = %e, "transaction failed"),
        }

        outcome.map(|_| RunOutcome {
            success: true,
            operations_committed: ctx.operations.iter().filter(|o| o.committed).count(),
            transaction_id: ctx.id.clone(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn run_guarded<F, Fut>(&self, ctx: &mut TransactionContext, collect: F) -> Result<()>
    where
        F: FnOnce(&mut TransactionContext) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        collect(ctx).await?;

        if ctx.operations.is_empty() {
            ctx.committed = true;
            return Ok(());
        }

        let mut attempt = 0u32;
        loop {
            if attempt > 0 {
                ctx.reset_for_retry();
                let delay = self.config.retry_base.saturating_mul(1 << (attempt - 1).min(16));
                tokio::time::sleep(delay).await;
            }

            match self.prepare(ctx).await {
                Ok(()) => {}
                Err(e) => return Err(e),
            }
            ctx.prepared = true;

            self.write_marker(ctx, MarkerState::Prepared).await?;
            ctx.journaled = true;
            self.write_marker(ctx, MarkerState::Committing).await?;

            match self.commit(ctx).await {
                Ok(()) => {
                    ctx.committed = true;
                    let _ = self.journal.remove(&ctx.id);
                    return Ok(());
                }
                Err(commit_err) => {
                    self.rollback(ctx).await;

                    let residual = self.residual_committed(ctx);
                    if !residual.is_empty() {
                        let _ = self.journal.remove(&ctx.id);
                        return Err(self.handle_rollback_failure(ctx, &residual, &commit_err).await);
                    }

                    ctx.rolled_back = true;
                    let _ = self.journal.remove(&ctx.id);

                    if !commit_err.is_transient() {
                        return Err(commit_err);
                    }
                    if attempt >= self.config.max_retry {
                        let summary = self.partial_commit_summary(ctx, &commit_err);
                        self.events.publish(
                            TOPIC_PARTIAL_COMMIT,
                            serde_json::json!({
                                "tx_id": ctx.id,
                                "succeeded": summary.succeeded_by_backend,
                                "failed": summary.failed_by_backend,
                                "total": summary.total,
                            }),
                        );
                        return Err(Error::PartialCommitAfterRetries { summary });
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn prepare(&self, ctx: &TransactionContext) -> Result<()> {
        let mut failures = Vec::new();
        for resource in &self.resources {
            if let Err(e) = resource.prepare(ctx).await {
                failures.push(PrepareFailure {
                    resource: resource.name().to_string(),
                    reason: e.to_string(),
                });
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Error::PrepareFailed(failures))
        }
    }

    async fn write_marker(&self, ctx: &TransactionContext, state: MarkerState) -> Result<()> {
        self.journal.write(CommitMarker {
            transaction_id: ctx.id.clone(),
            state,
            operation_count: ctx.operations.len(),
            journal_time: chrono::Utc::now(),
        })
    }

    async fn commit(&self, ctx: &mut TransactionContext) -> Result<()> {
        for resource in &self.resources {
            resource.commit(ctx).await?;
        }
        Ok(())
    }

    async fn rollback(&self, ctx: &mut TransactionContext) {
        for resource in self.resources.iter().rev() {
            if let Err(e) = resource.rollback(ctx).await {
                warn!(target: "txstore::engine", tx_id = %ctx.id, resource = resource.name(), error = %e, "rollback step failed");
            }
        }
    }

    fn residual_committed<'a>(&self, ctx: &'a TransactionContext) -> Vec<(usize, &'a Operation)> {
        ctx.operations.iter().enumerate().filter(|(_, op)| op.committed).collect()
    }

    async fn handle_rollback_failure(&self, ctx: &TransactionContext, residual: &[(usize, &Operation)], cause: &Error) -> Error {
        let failed_operations = residual
            .iter()
            .map(|(_, op)| {
                FailedOperation::new(op.backend, op.store.clone(), op.key.clone(), op.value.clone())
            })
            .collect();

        let entry = CompensationEntry {
            transaction_id: ctx.id.clone(),
            failed_operations,
            expected_state: "rolled_back".to_string(),
            error: cause.to_string(),
            timestamp: chrono::Utc::now(),
            resolved: false,
            resolved_at: None,
        };

        match self.compensation.log(entry).await {
            Some(_tier) => {
                self.events.publish(
                    TOPIC_COMPENSATION_NEEDED,
                    serde_json::json!({
                        "tx_id": ctx.id,
                        "failed_operations": residual.len(),
                        "timestamp": chrono::Utc::now().to_rfc3339(),
                    }),
                );
            }
            None => {
                // Every tier — record store, flat store, session-scoped,
                // in-memory — rejected the write: there is no durable (or
                // even in-process) trace of this rollback failure left
                // anywhere. Latch fatal state so no further transaction
                // proceeds until an operator clears it (spec §4.3.3).
                self.enter_fatal_state(ctx, 1);
            }
        }

        Error::RollbackIncomplete {
            tx_id: ctx.id.clone(),
            failed_count: residual.len(),
        }
    }

    /// Enter the fatal latch after a compensation write has genuinely
    /// failed everywhere (every tier, including in-memory, rejected the
    /// write). Also called directly by `handle_rollback_failure`.
    pub fn enter_fatal_state(&self, ctx: &TransactionContext, compensation_count: usize) {
        self.fatal.enter(
            format!("compensation log exhausted for transaction {}", ctx.id),
            Some(ctx.id.clone()),
            compensation_count,
        );
        self.events.publish(
            TOPIC_FATAL_ERROR,
            serde_json::json!({
                "reason": "compensation_exhausted",
                "tx_id": ctx.id,
                "compensation_count": compensation_count,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        );
    }

    fn partial_commit_summary(&self, ctx: &TransactionContext, cause: &Error) -> PartialCommitSummary {
        let mut succeeded_by_backend: HashMap<String, usize> = HashMap::new();
        let mut failed_by_backend: HashMap<String, usize> = HashMap::new();
        let mut diagnostics = Vec::new();

        for op in &ctx.operations {
            let key = op.backend.to_string();
            if op.committed {
                *succeeded_by_backend.entry(key).or_insert(0) += 1;
            } else {
                *failed_by_backend.entry(key).or_insert(0) += 1;
                diagnostics.push(format!("{}/{}: {}", op.store, op.key, cause));
            }
        }

        PartialCommitSummary {
            succeeded_by_backend,
            failed_by_backend,
            total: ctx.operations.len(),
            diagnostics,
        }
    }

    /// The resources this coordinator drives, in registration order.
    pub fn resources(&self) -> &[Arc<dyn TransactionalResource>] {
        &self.resources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use txstore_core::NoopEventSink;
    use txstore_durability::{CompensationLogger, InMemoryJournalStore};

    use crate::context::Operation;
    use crate::resource::{PendingPredicate, ResourceFuture};

    struct MockResource {
        name: &'static str,
        backend: Backend,
        prepare_ok: AtomicBool,
        fail_on_commit_index: Option<usize>,
        commit_calls: AtomicUsize,
        rollback_fails: AtomicBool,
    }

    impl MockResource {
        fn new(name: &'static str, backend: Backend) -> Self {
            MockResource {
                name,
                backend,
                prepare_ok: AtomicBool::new(true),
                fail_on_commit_index: None,
                commit_calls: AtomicUsize::new(0),
                rollback_fails: AtomicBool::new(false),
            }
        }
    }

    impl TransactionalResource for MockResource {
        fn name(&self) -> &str {
            self.name
        }

        fn backend(&self) -> Backend {
            self.backend
        }

        fn prepare<'a>(&'a self, _ctx: &'a TransactionContext) -> ResourceFuture<'a, Result<()>> {
            Box::pin(async move {
                if self.prepare_ok.load(Ordering::Relaxed) {
                    Ok(())
                } else {
                    Err(Error::Backend("prepare denied".into()))
                }
            })
        }

        fn commit<'a>(&'a self, ctx: &'a mut TransactionContext) -> ResourceFuture<'a, Result<()>> {
            Box::pin(async move {
                self.commit_calls.fetch_add(1, Ordering::Relaxed);
                let my_backend = self.backend;
                for (i, op) in ctx.operations.iter_mut().enumerate().filter(|(_, o)| o.backend == my_backend) {
                    if Some(i) == self.fail_on_commit_index {
                        return Err(Error::Backend("commit failed".into()));
                    }
                    op.committed = true;
                }
                Ok(())
            })
        }

        fn rollback<'a>(&'a self, ctx: &'a mut TransactionContext) -> ResourceFuture<'a, Result<()>> {
            Box::pin(async move {
                let my_backend = self.backend;
                for op in ctx.operations.iter_mut().rev().filter(|o| o.backend == my_backend && o.committed) {
                    if self.rollback_fails.load(Ordering::Relaxed) {
                        continue;
                    }
                    op.committed = false;
                }
                Ok(())
            })
        }

        fn recover<'a>(&'a self, _p: &'a PendingPredicate<'a>) -> ResourceFuture<'a, Result<()>> {
            Box::pin(async move { Ok(()) })
        }
    }

    fn coordinator(resources: Vec<Arc<dyn TransactionalResource>>) -> TransactionCoordinator {
        TransactionCoordinator::with_config(
            resources,
            Arc::new(InMemoryJournalStore::new()),
            Arc::new(CompensationLogger::in_memory_only()),
            Arc::new(NoopEventSink),
            CoordinatorConfig {
                op_timeout: Duration::from_millis(50),
                tx_timeout: Duration::from_millis(200),
                max_retry: 2,
                retry_base: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn happy_path_commits_and_clears_marker() {
        let resource = Arc::new(MockResource::new("r1", Backend::RecordStore));
        let coord = coordinator(vec![resource.clone()]);

        let outcome = coord
            .run(|ctx| async move {
                ctx.enqueue(Operation::put(Backend::RecordStore, "s", "k1", serde_json::json!(1), None, None))
            })
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.operations_committed, 1);
        assert!(coord.journal().list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_operation_transaction_succeeds_without_marker() {
        let resource = Arc::new(MockResource::new("r1", Backend::RecordStore));
        let coord = coordinator(vec![resource]);

        let outcome = coord.run(|_ctx| async move { Ok(()) }).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.operations_committed, 0);
        assert!(coord.journal().list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn prepare_failure_is_not_retried() {
        let resource = Arc::new(MockResource::new("r1", Backend::RecordStore));
        resource.prepare_ok.store(false, Ordering::Relaxed);
        let coord = coordinator(vec![resource]);

        let err = coord
            .run(|ctx| async move {
                ctx.enqueue(Operation::put(Backend::RecordStore, "s", "k1", serde_json::json!(1), None, None))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::PrepareFailed(_)));
    }

    #[tokio::test]
    async fn nested_run_calls_fail_fast() {
        let resource = Arc::new(MockResource::new("r1", Backend::RecordStore));
        let coord = Arc::new(coordinator(vec![resource]));
        let _guard = coord.nested_stack().try_enter("outer").unwrap();

        let err = coord.run(|_ctx| async move { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, Error::NestedNotSupported { .. }));
    }

    #[tokio::test]
    async fn fatal_state_blocks_new_runs() {
        let resource = Arc::new(MockResource::new("r1", Backend::RecordStore));
        let coord = coordinator(vec![resource]);
        coord.fatal_state().enter("operator test", None, 0);

        let err = coord.run(|_ctx| async move { Ok(()) }).await.unwrap_err();
        assert!(matches!(err, Error::FatalState { .. }));

        coord.fatal_state().clear("ok");
        let outcome = coord.run(|_ctx| async move { Ok(()) }).await.unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn commit_failure_rolls_back_and_exhausts_retries() {
        let resource = Arc::new(MockResource {
            name: "r1",
            backend: Backend::RecordStore,
            prepare_ok: AtomicBool::new(true),
            fail_on_commit_index: Some(0),
            commit_calls: AtomicUsize::new(0),
            rollback_fails: AtomicBool::new(false),
        });
        let coord = coordinator(vec![resource.clone()]);

        let err = coord
            .run(|ctx| async move {
                ctx.enqueue(Operation::put(Backend::RecordStore, "s", "k1", serde_json::json!(1), None, None))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::PartialCommitAfterRetries { .. }));
        // initial attempt + 2 retries = 3 commit calls
        assert_eq!(resource.commit_calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn rollback_failure_produces_compensation_entry() {
        // Two ops so the first commits before the second fails: op0 then
        // has `committed = true` and something to roll back. With a single
        // op failing at index 0, nothing is ever committed and there is
        // nothing for `rollback_fails` to fail to undo (spec §8 scenario 3
        // needs a real residual-committed op to exercise).
        let resource = Arc::new(MockResource {
            name: "r1",
            backend: Backend::RecordStore,
            prepare_ok: AtomicBool::new(true),
            fail_on_commit_index: Some(1),
            commit_calls: AtomicUsize::new(0),
            rollback_fails: AtomicBool::new(true),
        });
        let coord = coordinator(vec![resource]);

        let err = coord
            .run(|ctx| async move {
                ctx.enqueue(Operation::put(Backend::RecordStore, "s", "k1", serde_json::json!(1), None, None))?;
                ctx.enqueue(Operation::put(Backend::RecordStore, "s", "k2", serde_json::json!(2), None, None))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RollbackIncomplete { .. }));
        assert_eq!(coord.compensation_logger().all_entries().await.len(), 1);
        assert!(!coord.fatal_state().is_fatal());
    }

    #[tokio::test]
    async fn rollback_failure_with_every_compensation_tier_unavailable_latches_fatal() {
        let resource = Arc::new(MockResource {
            name: "r1",
            backend: Backend::RecordStore,
            prepare_ok: AtomicBool::new(true),
            fail_on_commit_index: Some(1),
            commit_calls: AtomicUsize::new(0),
            rollback_fails: AtomicBool::new(true),
        });
        let compensation = Arc::new(CompensationLogger::in_memory_only());
        compensation.set_memory_tiers_unavailable(true);
        let coord = TransactionCoordinator::with_config(
            vec![resource],
            Arc::new(InMemoryJournalStore::new()),
            compensation,
            Arc::new(NoopEventSink),
            CoordinatorConfig {
                op_timeout: Duration::from_millis(50),
                tx_timeout: Duration::from_millis(200),
                max_retry: 2,
                retry_base: Duration::from_millis(1),
            },
        );

        let err = coord
            .run(|ctx| async move {
                ctx.enqueue(Operation::put(Backend::RecordStore, "s", "k1", serde_json::json!(1), None, None))?;
                ctx.enqueue(Operation::put(Backend::RecordStore, "s", "k2", serde_json::json!(2), None, None))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RollbackIncomplete { .. }));
        assert!(coord.fatal_state().is_fatal());
        assert!(coord.compensation_logger().all_entries().await.is_empty());

        // Fatal state now blocks any further run, per spec §8 scenario 4.
        let blocked = coord.run(|_ctx| async move { Ok(()) }).await.unwrap_err();
        assert!(matches!(blocked, Error::FatalState { .. }));
    }
}
