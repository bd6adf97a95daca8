//! [`TxHandle`]: the manual three-step transaction API (spec §6:
//! "begin(resources) → ctx / commit(ctx, resources) / rollback(ctx,
//! resources)").
//!
//! The coordinator's own protocol (prepare → journal → commit → cleanup,
//! with whole-transaction retry) has exactly one entrypoint,
//! [`txstore_engine::coordinator::TransactionCoordinator::run`], which owns
//! its [`TransactionContext`] end to end. `TxHandle` reproduces the manual
//! shape on top of that single entrypoint: it buffers operations as the
//! caller enqueues them, then `commit` hands the whole buffer to `run` in one
//! collect callback. `rollback` before a commit is just dropping the handle
//! without ever calling it — nothing was applied to any backend yet, so
//! there is nothing to undo.

use serde_json::Value;
use txstore_core::{Backend, Result};
use txstore_engine::context::Operation;
use txstore_engine::coordinator::RunOutcome;
use txstore_primitives::credential_resource::pack;
use txstore_primitives::credential_store::CredentialOptions;

use crate::storage_core::StorageCore;

const FLAT_STORE_LABEL: &str = "flat_store";
const CREDENTIAL_STORE_LABEL: &str = "credential_store";

/// An in-progress manual transaction. Accumulates operations, each captured
/// with its pre-image read at enqueue time, until [`TxHandle::commit`] hands
/// them to the coordinator.
pub struct TxHandle<'a> {
    core: &'a StorageCore,
    ops: Vec<Operation>,
}

impl<'a> TxHandle<'a> {
    pub(crate) fn new(core: &'a StorageCore) -> Self {
        TxHandle { core, ops: Vec::new() }
    }

    /// Stage a record-store put, capturing the store's current value (if
    /// any) as the pre-image for rollback.
    pub async fn put_record(&mut self, store: impl Into<String>, key: impl Into<String>, value: Value) -> Result<()> {
        let store = store.into();
        let key = key.into();
        let previous = self.core.record_store().get(&store, &key).await?;
        let previous_value = previous.map(Value::Object);
        self.ops.push(Operation::put(Backend::RecordStore, store, key, value, previous_value, None));
        Ok(())
    }

    /// Stage a record-store delete, capturing the store's current value (if
    /// any) as the pre-image for rollback.
    pub async fn delete_record(&mut self, store: impl Into<String>, key: impl Into<String>) -> Result<()> {
        let store = store.into();
        let key = key.into();
        let previous = self.core.record_store().get(&store, &key).await?;
        let previous_value = previous.map(Value::Object);
        self.ops.push(Operation::delete(Backend::RecordStore, store, key, previous_value, None));
        Ok(())
    }

    /// Stage a flat-store put, capturing the key's current value as the
    /// pre-image for rollback.
    pub async fn put_flat(&mut self, key: impl Into<String>, value: Value) -> Result<()> {
        let key = key.into();
        let previous_value = self.core.flat_store().get(&key).await?.map(Value::String);
        self.ops
            .push(Operation::put(Backend::FlatStore, FLAT_STORE_LABEL, key, value, previous_value, None));
        Ok(())
    }

    /// Stage a flat-store delete, capturing the key's current value as the
    /// pre-image for rollback.
    pub async fn delete_flat(&mut self, key: impl Into<String>) -> Result<()> {
        let key = key.into();
        let previous_value = self.core.flat_store().get(&key).await?.map(Value::String);
        self.ops.push(Operation::delete(Backend::FlatStore, FLAT_STORE_LABEL, key, previous_value, None));
        Ok(())
    }

    /// Stage a credential-store put, capturing the key's current value and
    /// options as the pre-image for rollback.
    pub async fn put_credential(&mut self, key: impl Into<String>, value: Value, options: CredentialOptions) -> Result<()> {
        let key = key.into();
        let previous = self.core.credential_store().retrieve_with_options(&key).await?;
        let (previous_value, previous_options) = match previous {
            Some((value, options)) => (Some(value), Some(serde_json::json!({"device_bound": options.device_bound}))),
            None => (None, None),
        };
        let wrapped = pack(&value, options);
        self.ops.push(Operation {
            previous_options,
            ..Operation::put(Backend::CredentialStore, CREDENTIAL_STORE_LABEL, key, wrapped, previous_value, None)
        });
        Ok(())
    }

    /// Stage a credential-store delete, capturing the key's current value
    /// and options as the pre-image for rollback.
    pub async fn delete_credential(&mut self, key: impl Into<String>) -> Result<()> {
        let key = key.into();
        let previous = self.core.credential_store().retrieve_with_options(&key).await?;
        let (previous_value, previous_options) = match previous {
            Some((value, options)) => (Some(value), Some(serde_json::json!({"device_bound": options.device_bound}))),
            None => (None, None),
        };
        self.ops.push(Operation {
            previous_options,
            ..Operation::delete(Backend::CredentialStore, CREDENTIAL_STORE_LABEL, key, previous_value, None)
        });
        Ok(())
    }

    /// Hand every staged operation to the coordinator, driving the full
    /// prepare/journal/commit/rollback/retry protocol.
    pub async fn commit(self) -> Result<RunOutcome> {
        let ops = self.ops;
        self.core
            .run(move |ctx| async move {
                for op in ops {
                    ctx.enqueue(op)?;
                }
                Ok(())
            })
            .await
    }

    /// Discard every staged operation without committing. Nothing was ever
    /// applied to a backend, so there is nothing to undo.
    pub fn rollback(self) {
        drop(self)
    }
}
