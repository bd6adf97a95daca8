//! [`TransactionalResource`]: the capability set every backend adapter
//! implements (spec §4.5, §9 "Dynamic dispatch across resources").
//!
//! The coordinator talks to resources only through this trait, never
//! through a concrete type, so arbitrary caller-supplied resources compose
//! with the three built-in adapters the same way. Methods return a boxed
//! future by hand rather than pulling in an `async_trait`-style macro
//! dependency the teacher's stack doesn't otherwise need.

use std::future::Future;
use std::pin::Pin;

use txstore_core::{Backend, Result};

use crate::context::TransactionContext;

/// A boxed, `Send` future, used in place of `async fn` in a trait object.
pub type ResourceFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A predicate answering "is this transaction id still pending a commit
/// decision?", built by the coordinator from the commit-marker journal and
/// handed to each resource's `recover` so it can reconcile its own private
/// pending scratch (spec §4.3.6).
pub type PendingPredicate<'a> = dyn Fn(&str) -> bool + Send + Sync + 'a;

/// The `prepare/commit/rollback/recover` capability set bound to one
/// backend (spec §4.5). Implementations must be idempotent for `commit`
/// and `rollback` under retries (spec: "re-running produces the same
/// observable state").
pub trait TransactionalResource: Send + Sync {
    /// Diagnostic name (`record_store`, `flat_store`, `credential_store`,
    /// or a caller-supplied resource's own name), used in `PrepareFailure`
    /// and log lines.
    fn name(&self) -> &str;

    /// Which backend tag this resource services. The coordinator hands it
    /// only the subset of a context's operations matching this tag.
    fn backend(&self) -> Backend;

    /// Vote on whether commit will succeed: connection alive, quota
    /// headroom, target resource reachable. Must not mutate observable
    /// state.
    fn prepare<'a>(&'a self, ctx: &'a TransactionContext) -> ResourceFuture<'a, Result<()>>;

    /// Commit every not-yet-committed operation in `ctx` targeting this
    /// resource's backend, in enqueue order, flipping `Operation::committed`
    /// true as each one lands. On failure, stop and return `Err`; operations
    /// already flipped true remain true so the coordinator can account for
    /// a partial commit.
    fn commit<'a>(&'a self, ctx: &'a mut TransactionContext) -> ResourceFuture<'a, Result<()>>;

    /// Undo every operation in `ctx` targeting this resource's backend that
    /// is still marked `committed`, in **reverse** enqueue order, flipping
    /// `committed` back to false as each one is undone. A single failed
    /// step must not abort the rest: continue past it and leave it
    /// `committed = true` so the coordinator can build a compensation entry
    /// for it.
    fn rollback<'a>(&'a self, ctx: &'a mut TransactionContext) -> ResourceFuture<'a, Result<()>>;

    /// Scan this resource's private pending scratch at startup, deciding
    /// roll-forward vs. rollback per transaction id using `is_tx_pending_commit`
    /// (built from the commit-marker journal).
    fn recover<'a>(&'a self, is_tx_pending_commit: &'a PendingPredicate<'a>) -> ResourceFuture<'a, Result<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Operation;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// A minimal in-memory resource used to exercise the trait's object
    /// safety and calling convention.
    struct EchoResource {
        prepare_ok: AtomicBool,
    }

    impl TransactionalResource for EchoResource {
        fn name(&self) -> &str {
            "echo"
        }

        fn backend(&self) -> Backend {
            Backend::RecordStore
        }

        fn prepare<'a>(&'a self, _ctx: &'a TransactionContext) -> ResourceFuture<'a, Result<()>> {
            Box::pin(async move {
                if self.prepare_ok.load(Ordering::Relaxed) {
                    Ok(())
                } else {
                    Err(txstore_core::Error::Backend("prepare denied".into()))
                }
            })
        }

        fn commit<'a>(&'a self, ctx: &'a mut TransactionContext) -> ResourceFuture<'a, Result<()>> {
            Box::pin(async move {
                for op in ctx.operations.iter_mut().filter(|o| o.backend == Backend::RecordStore) {
                    op.committed = true;
                }
                Ok(())
            })
        }

        fn rollback<'a>(&'a self, ctx: &'a mut TransactionContext) -> ResourceFuture<'a, Result<()>> {
            Box::pin(async move {
                for op in ctx
                    .operations
                    .iter_mut()
                    .rev()
                    .filter(|o| o.backend == Backend::RecordStore && o.committed)
                {
                    op.committed = false;
                }
                Ok(())
            })
        }

        fn recover<'a>(&'a self, _is_tx_pending_commit: &'a PendingPredicate<'a>) -> ResourceFuture<'a, Result<()>> {
            Box::pin(async move { Ok(()) })
        }
    }

    #[tokio::test]
    async fn trait_object_round_trips_commit_and_rollback() {
        let resource: Arc<dyn TransactionalResource> = Arc::new(EchoResource {
            prepare_ok: AtomicBool::new(true),
        });
        let mut ctx = TransactionContext::new();
        ctx.enqueue(Operation::put(Backend::RecordStore, "s", "k", serde_json::json!(1), None, None))
            .unwrap();

        resource.prepare(&ctx).await.unwrap();
        resource.commit(&mut ctx).await.unwrap();
        assert!(ctx.operations[0].committed);

        resource.rollback(&mut ctx).await.unwrap();
        assert!(!ctx.operations[0].committed);
    }

    #[tokio::test]
    async fn prepare_failure_surfaces_error() {
        let resource: Arc<dyn TransactionalResource> = Arc::new(EchoResource {
            prepare_ok: AtomicBool::new(false),
        });
        let ctx = TransactionContext::new();
        assert!(resource.prepare(&ctx).await.is_err());
    }
}
