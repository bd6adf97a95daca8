//! [`RecordStoreResource`]: the [`TransactionalResource`] adapter fronting
//! the structured record store (spec §4.5 "RecordStoreResource").

use std::sync::Arc;

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::warn;
use txstore_core::{Backend, Error, Result};
use txstore_engine::context::{Operation, OpKind, TransactionContext};
use txstore_engine::resource::{PendingPredicate, ResourceFuture, TransactionalResource};
use txstore_storage::record_store::{PutOptions, RecordStore, WriteOptions};

/// Fronts [`RecordStore`] as a `TransactionalResource`. `prepare` verifies
/// every targeted store was actually declared by a migration; `commit`
/// issues the backend `put`/`delete` for each operation in enqueue order;
/// `rollback` restores each committed operation's pre-image in reverse
/// order; `recover` replays (or discards) whatever this resource's own
/// commit pass left pending when the process last stopped.
pub struct RecordStoreResource {
    store: Arc<RecordStore>,
    /// Private scratch keyed by transaction id: the record-store-targeted
    /// operations of a commit pass currently in flight. A real embedder
    /// would persist this in its own reserved table so it survives a
    /// process restart; the in-process reference keeps it in memory, which
    /// means `recover` only ever sees crashes within the same process run
    /// (still enough to exercise the roll-forward/discard decision).
    pending: Mutex<HashMap<String, Vec<Operation>>>,
}

impl RecordStoreResource {
    /// Front `store` as a `record_store` transactional resource.
    pub fn new(store: Arc<RecordStore>) -> Self {
        RecordStoreResource {
            store,
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn record_of(op: &Operation) -> Result<txstore_core::Record> {
        op.value
            .clone()
            .ok_or_else(|| Error::InvalidState("put operation missing a value".to_string()))?
            .as_object()
            .cloned()
            .ok_or_else(|| Error::InvalidState("record-store value must be a JSON object".to_string()))
    }

    async fn apply(&self, op: &Operation) -> Result<()> {
        match op.kind {
            OpKind::Put => {
                let record = Self::record_of(op)?;
                self.store.put(&op.store, record, PutOptions::default()).await
            }
            OpKind::Delete => self.store.delete(&op.store, &op.key, WriteOptions::default()).await,
        }
    }

    async fn restore_pre_image(&self, op: &Operation) -> Result<()> {
        match &op.previous_value {
            Some(value) => {
                let record = value
                    .as_object()
                    .cloned()
                    .ok_or_else(|| Error::InvalidState("record-store pre-image must be a JSON object".to_string()))?;
                self.store
                    .put(
                        &op.store,
                        record,
                        PutOptions {
                            skip_write_epoch: true,
                            bypass_authority: true,
                            bypass_conflict: true,
                        },
                    )
                    .await
            }
            None => {
                self.store
                    .delete(&op.store, &op.key, WriteOptions { bypass_authority: true })
                    .await
            }
        }
    }
}

impl TransactionalResource for RecordStoreResource {
    fn name(&self) -> &str {
        "record_store"
    }

    fn backend(&self) -> Backend {
        Backend::RecordStore
    }

    fn prepare<'a>(&'a self, ctx: &'a TransactionContext) -> ResourceFuture<'a, Result<()>> {
        Box::pin(async move {
            for (_, op) in ctx.operations_for(Backend::RecordStore) {
                if self.store.tables().descriptor(&op.store).is_none() {
                    return Err(Error::NotFound(op.store.clone()));
                }
            }
            Ok(())
        })
    }

    fn commit<'a>(&'a self, ctx: &'a mut TransactionContext) -> ResourceFuture<'a, Result<()>> {
        Box::pin(async move {
            let targets: Vec<(usize, Operation)> = ctx
                .operations_for(Backend::RecordStore)
                .filter(|(_, op)| !op.committed)
                .map(|(i, op)| (i, op.clone()))
                .collect();
            if targets.is_empty() {
                return Ok(());
            }

            self.pending.lock().insert(
                ctx.id.clone(),
                targets.iter().map(|(_, op)| op.clone()).collect(),
            );

            for (idx, op) in &targets {
                match self.apply(op).await {
                    Ok(()) => ctx.operations[*idx].committed = true,
                    Err(err) => return Err(err),
                }
            }

            self.pending.lock().remove(&ctx.id);
            Ok(())
        })
    }

    fn rollback<'a>(&'a self, ctx: &'a mut TransactionContext) -> ResourceFuture<'a, Result<()>> {
        Box::pin(async move {
            let targets: Vec<(usize, Operation)> = ctx
                .operations_for(Backend::RecordStore)
                .filter(|(_, op)| op.committed)
                .map(|(i, op)| (i, op.clone()))
                .collect();

            for (idx, op) in targets.into_iter().rev() {
                match self.restore_pre_image(&op).await {
                    Ok(()) => ctx.operations[idx].committed = false,
                    Err(err) => warn!(tx_id = %ctx.id, store = %op.store, key = %op.key, error = %err, "record store rollback step failed"),
                }
            }

            self.pending.lock().remove(&ctx.id);
            Ok(())
        })
    }

    fn recover<'a>(&'a self, is_tx_pending_commit: &'a PendingPredicate<'a>) -> ResourceFuture<'a, Result<()>> {
        Box::pin(async move {
            let left_over: Vec<(String, Vec<Operation>)> = self.pending.lock().drain().collect();
            for (tx_id, ops) in left_over {
                if is_tx_pending_commit(&tx_id) {
                    for op in &ops {
                        if let Err(err) = self.apply(op).await {
                            warn!(tx_id = %tx_id, store = %op.store, error = %err, "record store recovery replay failed");
                        }
                    }
                } else {
                    warn!(tx_id = %tx_id, "discarding uncommitted record store pending scratch");
                }
            }
            Ok(())
        })
    }
}
