//! [`CredentialStoreResource`]: the [`TransactionalResource`] adapter
//! fronting the credential/token custody subsystem (spec §4.5
//! "CredentialStoreResource").
//!
//! `Operation` has no separate slot for a *new* write's options (only
//! `previous_options`, captured for the pre-image) — so credential writes
//! pack `CredentialOptions` alongside the value as a small JSON wrapper
//! object (`{"value": ..., "device_bound": ...}`), the same reserved-field
//! convention `txstore_core::record` uses for write-epoch stamping. A bare,
//! unwrapped value is treated as `device_bound: false` for backward
//! compatibility with callers that never wrap.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::warn;
use txstore_core::{Backend, Error, Result};
use txstore_engine::context::{OpKind, Operation, TransactionContext};
use txstore_engine::resource::{PendingPredicate, ResourceFuture, TransactionalResource};

use crate::credential_store::{CredentialOptions, CredentialStore};

/// Pack a credential value and its options into the wrapper `Operation`
/// values carry.
pub fn pack(value: &Value, options: CredentialOptions) -> Value {
    json!({"value": value, "device_bound": options.device_bound})
}

/// Unpack a wrapper produced by [`pack`], falling back to treating an
/// unwrapped value as `device_bound: false`.
pub fn unpack(wrapped: &Value) -> (Value, CredentialOptions) {
    match wrapped.as_object() {
        Some(obj) if obj.contains_key("value") => {
            let value = obj.get("value").cloned().unwrap_or(Value::Null);
            let device_bound = obj.get("device_bound").and_then(Value::as_bool).unwrap_or(false);
            (value, CredentialOptions { device_bound })
        }
        _ => (wrapped.clone(), CredentialOptions::default()),
    }
}

/// Fronts any [`CredentialStore`] implementation as a `credential_store`
/// transactional resource.
pub struct CredentialStoreResource {
    store: Arc<dyn CredentialStore>,
}

impl CredentialStoreResource {
    /// Front `store` as a `credential_store` transactional resource.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        CredentialStoreResource { store }
    }

    async fn apply(&self, op: &Operation) -> Result<()> {
        match op.kind {
            OpKind::Put => {
                let wrapped = op.value.as_ref().ok_or_else(|| Error::InvalidState("put operation missing a value".to_string()))?;
                let (value, options) = unpack(wrapped);
                self.store.store(&op.key, value, options).await
            }
            OpKind::Delete => self.store.invalidate(&op.key).await,
        }
    }

    async fn restore_pre_image(&self, op: &Operation) -> Result<()> {
        match &op.previous_value {
            Some(value) => {
                let options = op
                    .previous_options
                    .as_ref()
                    .and_then(Value::as_object)
                    .and_then(|obj| obj.get("device_bound"))
                    .and_then(Value::as_bool)
                    .map(|device_bound| CredentialOptions { device_bound })
                    .unwrap_or_default();
                self.store.store(&op.key, value.clone(), options).await
            }
            // Open question, decided: restoring "never bound" means
            // invalidating a key that may never have existed, which is a
            // no-op success per `CredentialStore::invalidate`'s contract.
            None => self.store.invalidate(&op.key).await,
        }
    }
}

impl TransactionalResource for CredentialStoreResource {
    fn name(&self) -> &str {
        "credential_store"
    }

    fn backend(&self) -> Backend {
        Backend::CredentialStore
    }

    fn prepare<'a>(&'a self, ctx: &'a TransactionContext) -> ResourceFuture<'a, Result<()>> {
        Box::pin(async move {
            if ctx.operations_for(Backend::CredentialStore).next().is_none() {
                return Ok(());
            }
            if !self.store.is_available() {
                return Err(Error::Backend("credential store is unavailable".to_string()));
            }
            if !self.store.is_device_bound() {
                return Err(Error::Backend("credential store is not device-bound".to_string()));
            }
            Ok(())
        })
    }

    fn commit<'a>(&'a self, ctx: &'a mut TransactionContext) -> ResourceFuture<'a, Result<()>> {
        Box::pin(async move {
            let targets: Vec<(usize, Operation)> = ctx
                .operations_for(Backend::CredentialStore)
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
                .operations_for(Backend::CredentialStore)
                .filter(|(_, op)| op.committed)
                .map(|(i, op)| (i, op.clone()))
                .collect();

            for (idx, op) in targets.into_iter().rev() {
                match self.restore_pre_image(&op).await {
                    Ok(()) => ctx.operations[idx].committed = false,
                    Err(err) => warn!(tx_id = %ctx.id, key = %op.key, error = %err, "credential store rollback step failed"),
                }
            }
            Ok(())
        })
    }

    fn recover<'a>(&'a self, _is_tx_pending_commit: &'a PendingPredicate<'a>) -> ResourceFuture<'a, Result<()>> {
        // Like the flat store, each credential write is a single atomic
        // custody-subsystem call with no adapter-owned intermediate state.
        Box::pin(async move { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential_store::InMemoryCredentialStore;
    use serde_json::json;

    fn ctx_with_put(key: &str, value: Value, options: CredentialOptions) -> TransactionContext {
        let mut ctx = TransactionContext::new();
        ctx.enqueue(Operation::put(Backend::CredentialStore, "credentials", key, pack(&value, options), None, None))
            .unwrap();
        ctx
    }

    #[tokio::test]
    async fn prepare_fails_when_unavailable_or_unbound() {
        let creds = Arc::new(InMemoryCredentialStore::new());
        creds.set_available(false);
        let resource = CredentialStoreResource::new(creds);
        let ctx = ctx_with_put("session", json!("tok"), CredentialOptions::default());
        assert!(resource.prepare(&ctx).await.is_err());
    }

    #[tokio::test]
    async fn commit_stores_unpacked_value_and_options() {
        let creds = Arc::new(InMemoryCredentialStore::new());
        let resource = CredentialStoreResource::new(creds.clone());
        let mut ctx = ctx_with_put("session", json!("tok"), CredentialOptions { device_bound: true });

        resource.commit(&mut ctx).await.unwrap();

        let (value, options) = creds.retrieve_with_options("session").await.unwrap().unwrap();
        assert_eq!(value, json!("tok"));
        assert!(options.device_bound);
        assert!(ctx.operations[0].committed);
    }

    #[tokio::test]
    async fn rollback_without_pre_image_invalidates() {
        let creds = Arc::new(InMemoryCredentialStore::new());
        let resource = CredentialStoreResource::new(creds.clone());
        let mut ctx = ctx_with_put("session", json!("tok"), CredentialOptions::default());

        resource.commit(&mut ctx).await.unwrap();
        resource.rollback(&mut ctx).await.unwrap();

        assert!(creds.retrieve("session").await.unwrap().is_none());
        assert!(!ctx.operations[0].committed);
    }
}
