//! [`FlatStoreResource`]: the [`TransactionalResource`] adapter fronting the
//! string-keyed flat store (spec §4.5 "FlatStoreResource").

use std::sync::Arc;

use tracing::warn;
use txstore_core::{Backend, Error, Result};
use txstore_engine::context::{OpKind, Operation, TransactionContext};
use txstore_engine::resource::{PendingPredicate, ResourceFuture, TransactionalResource};

use crate::flat_store::FlatStore;

/// A probe key written then immediately deleted by `prepare` to detect
/// quota exhaustion ahead of the real writes (spec §4.5: "a short key;
/// immediately deleted").
const PROBE_KEY: &str = "__txstore_prepare_probe__";

fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Fronts any [`FlatStore`] implementation as a `flat_store` transactional
/// resource. Values round-trip through strings: a JSON string is stored
/// verbatim, anything else is stored as its JSON text and parsed back on
/// read.
pub struct FlatStoreResource {
    store: Arc<dyn FlatStore>,
}

impl FlatStoreResource {
    /// Front `store` as a `flat_store` transactional resource.
    pub fn new(store: Arc<dyn FlatStore>) -> Self {
        FlatStoreResource { store }
    }

    async fn apply(&self, op: &Operation) -> Result<()> {
        match op.kind {
            OpKind::Put => {
                let value = op.value.as_ref().ok_or_else(|| Error::InvalidState("put operation missing a value".to_string()))?;
                self.store.set(&op.key, value_to_string(value)).await
            }
            OpKind::Delete => self.store.remove(&op.key).await,
        }
    }

    async fn restore_pre_image(&self, op: &Operation) -> Result<()> {
        match &op.previous_value {
            Some(value) => self.store.set(&op.key, value_to_string(value)).await,
            None => self.store.remove(&op.key).await,
        }
    }
}

impl TransactionalResource for FlatStoreResource {
    fn name(&self) -> &str {
        "flat_store"
    }

    fn backend(&self) -> Backend {
        Backend::FlatStore
    }

    fn prepare<'a>(&'a self, ctx: &'a TransactionContext) -> ResourceFuture<'a, Result<()>> {
        Box::pin(async move {
            if ctx.operations_for(Backend::FlatStore).next().is_none() {
                return Ok(());
            }
            self.store.set(PROBE_KEY, String::new()).await?;
            self.store.remove(PROBE_KEY).await?;
            Ok(())
        })
    }

    fn commit<'a>(&'a self, ctx: &'a mut TransactionContext) -> ResourceFuture<'a, Result<()>> {
        Box::pin(async move {
            let targets: Vec<(usize, Operation)> = ctx
                .operations_for(Backend::FlatStore)
                .filter(|(_, op)| !op.committed)
                .map(|(i, op)| (i, op.clone()))
                .collect();

            for (idx, op) in &targets {
                self.apply(op).await?;
                ctx.operations[*idx].committed = true;
            }
            Ok(())
        })
    }

    fn rollback<'a>(&'a self, ctx: &'a mut TransactionContext) -> ResourceFuture<'a, Result<()>> {
        Box::pin(async move {
            let targets: Vec<(usize, Operation)> = ctx
                .operations_for(Backend::FlatStore)
                .filter(|(_, op)| op.committed)
                .map(|(i, op)| (i, op.clone()))
                .collect();

            for (idx, op) in targets.into_iter().rev() {
                match self.restore_pre_image(&op).await {
                    Ok(()) => ctx.operations[idx].committed = false,
                    Err(err) => warn!(tx_id = %ctx.id, key = %op.key, error = %err, "flat store rollback step failed"),
                }
            }
            Ok(())
        })
    }

    fn recover<'a>(&'a self, _is_tx_pending_commit: &'a PendingPredicate<'a>) -> ResourceFuture<'a, Result<()>> {
        // The flat store has no private pending scratch of its own: each
        // `set`/`remove` call is a single atomic string write, so there is
        // no partially-applied intermediate state for a crash to leave
        // behind within one operation.
        Box::pin(async move { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flat_store::InMemoryFlatStore;
    use serde_json::json;

    fn ctx_with_put(key: &str, value: serde_json::Value) -> TransactionContext {
        let mut ctx = TransactionContext::new();
        ctx.enqueue(Operation::put(Backend::FlatStore, "flat", key, value, None, None)).unwrap();
        ctx
    }

    #[tokio::test]
    async fn prepare_probes_then_cleans_up() {
        let flat = InMemoryFlatStore::shared();
        let resource = FlatStoreResource::new(flat.clone());
        let ctx = ctx_with_put("k1", json!("v1"));
        resource.prepare(&ctx).await.unwrap();
        assert!(!flat.contains(PROBE_KEY).await.unwrap());
    }

    #[tokio::test]
    async fn commit_then_rollback_round_trips() {
        let flat = InMemoryFlatStore::shared();
        flat.set("k1", "original".to_string()).await.unwrap();
        let resource = FlatStoreResource::new(flat.clone());

        let mut ctx = TransactionContext::new();
        ctx.enqueue(Operation::put(
            Backend::FlatStore,
            "flat",
            "k1",
            json!("updated"),
            Some(json!("original")),
            None,
        ))
        .unwrap();

        resource.commit(&mut ctx).await.unwrap();
        assert_eq!(flat.get("k1").await.unwrap(), Some("updated".to_string()));

        resource.rollback(&mut ctx).await.unwrap();
        assert_eq!(flat.get("k1").await.unwrap(), Some("original".to_string()));
        assert!(!ctx.operations[0].committed);
    }

    #[tokio::test]
    async fn rollback_deletes_key_with_no_pre_image() {
        let flat = InMemoryFlatStore::shared();
        let resource = FlatStoreResource::new(flat.clone());
        let mut ctx = ctx_with_put("new_key", json!("v1"));

        resource.commit(&mut ctx).await.unwrap();
        assert!(flat.contains("new_key").await.unwrap());

        resource.rollback(&mut ctx).await.unwrap();
        assert!(!flat.contains("new_key").await.unwrap());
    }
}
