//! Tier 1 (record store) and tier 2 (flat store) of the compensation log
//! (spec §4.3.4, §6). `txstore_durability::CompensationTier` is defined one
//! layer down so that crate can stay free of a dependency on
//! `txstore-storage`; the concrete backends live here, where both are
//! visible.
//!
//! [`CompensationEntry`]/[`FailedOperation`] don't derive `Serialize` (they
//! carry a `chrono::DateTime<Utc>` and are otherwise an internal durability
//! type), so both tiers convert through hand-written `entry_to_value`/
//! `value_to_entry` helpers rather than deriving through `serde`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::str::FromStr;
use txstore_core::{Backend, Error, Record, Result};
use txstore_durability::{CompensationEntry, CompensationTier, FailedOperation, TierFuture};
use txstore_storage::record_store::{PutOptions, RecordStore, WriteOptions};

use crate::flat_store::FlatStore;

/// Record-store table tier 1 persists compensation entries under, keyed by
/// transaction id (spec §6: `TRANSACTION_COMPENSATION`). An embedder wiring
/// [`RecordStoreCompensationTier`] in must declare this store (key path
/// `"id"`) in its migration chain, the same way it declares
/// `TRANSACTION_JOURNAL` for the commit-marker journal.
pub const COMPENSATION_STORE: &str = "transaction_compensation";

/// Reserved flat-store key tier 2 persists the whole compensation log array
/// under (spec §6).
pub const COMPENSATION_FLAT_KEY: &str = "_transaction_compensation_logs";

fn failed_op_to_value(op: &FailedOperation) -> Value {
    json!({
        "backend": op.backend.to_string(),
        "store": op.store,
        "key": op.key,
        "value": op.value,
    })
}

fn failed_op_from_value(value: &Value) -> Result<FailedOperation> {
    let backend = value
        .get("backend")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Serialization("compensation entry missing failed_operations[].backend".to_string()))?;
    let backend = Backend::from_str(backend).map_err(|e| Error::Serialization(e.to_string()))?;
    let store = value.get("store").and_then(Value::as_str).unwrap_or_default().to_string();
    let key = value.get("key").and_then(Value::as_str).unwrap_or_default().to_string();
    let value = value.get("value").cloned().filter(|v| !v.is_null());
    Ok(FailedOperation { backend, store, key, value })
}

/// Serialize a [`CompensationEntry`] to its persisted JSON shape.
pub fn entry_to_value(entry: &CompensationEntry) -> Value {
    json!({
        "id": entry.transaction_id,
        "failed_operations": entry.failed_operations.iter().map(failed_op_to_value).collect::<Vec<_>>(),
        "expected_state": entry.expected_state,
        "error": entry.error,
        "timestamp": entry.timestamp.to_rfc3339(),
        "resolved": entry.resolved,
        "resolved_at": entry.resolved_at.map(|t| t.to_rfc3339()),
    })
}

/// Deserialize a [`CompensationEntry`] from its persisted JSON shape.
pub fn value_to_entry(value: &Value) -> Result<CompensationEntry> {
    let transaction_id = value
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Serialization("compensation entry missing id".to_string()))?
        .to_string();

    let failed_operations = match value.get("failed_operations").and_then(Value::as_array) {
        Some(arr) => arr.iter().map(failed_op_from_value).collect::<Result<Vec<_>>>()?,
        None => Vec::new(),
    };

    let expected_state = value.get("expected_state").and_then(Value::as_str).unwrap_or_default().to_string();
    let error = value.get("error").and_then(Value::as_str).unwrap_or_default().to_string();

    let timestamp = value
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| Error::Serialization("compensation entry missing a valid timestamp".to_string()))?;

    let resolved = value.get("resolved").and_then(Value::as_bool).unwrap_or(false);
    let resolved_at = value
        .get("resolved_at")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(CompensationEntry {
        transaction_id,
        failed_operations,
        expected_state,
        error,
        timestamp,
        resolved,
        resolved_at,
    })
}

fn internal_write_options() -> PutOptions {
    PutOptions {
        skip_write_epoch: true,
        bypass_authority: true,
        bypass_conflict: true,
    }
}

/// Tier 1: persists each compensation entry as its own record in the
/// record store, keyed by transaction id.
pub struct RecordStoreCompensationTier {
    store: Arc<RecordStore>,
}

impl RecordStoreCompensationTier {
    /// Build a tier backed by `store`. `store` must have
    /// [`COMPENSATION_STORE`] declared (key path `"id"`).
    pub fn new(store: Arc<RecordStore>) -> Self {
        RecordStoreCompensationTier { store }
    }

    fn record_of(entry: CompensationEntry) -> Result<Record> {
        entry_to_value(&entry)
            .as_object()
            .cloned()
            .ok_or_else(|| Error::Serialization("compensation entry did not serialize to an object".to_string()))
    }
}

impl CompensationTier for RecordStoreCompensationTier {
    fn name(&self) -> &'static str {
        "record_store"
    }

    fn write<'a>(&'a self, entry: CompensationEntry) -> TierFuture<'a, Result<()>> {
        Box::pin(async move {
            let record = Self::record_of(entry)?;
            self.store.put(COMPENSATION_STORE, record, internal_write_options()).await
        })
    }

    fn read_all<'a>(&'a self) -> TierFuture<'a, Result<Vec<CompensationEntry>>> {
        Box::pin(async move {
            self.store
                .get_all(COMPENSATION_STORE)
                .await?
                .iter()
                .map(|record| value_to_entry(&Value::Object(record.clone())))
                .collect()
        })
    }

    fn resolve<'a>(&'a self, transaction_id: &'a str) -> TierFuture<'a, Result<bool>> {
        Box::pin(async move {
            let Some(record) = self.store.get(COMPENSATION_STORE, transaction_id).await? else {
                return Ok(false);
            };
            let mut entry = value_to_entry(&Value::Object(record))?;
            entry.resolved = true;
            entry.resolved_at = Some(Utc::now());
            self.store.put(COMPENSATION_STORE, Self::record_of(entry)?, internal_write_options()).await?;
            Ok(true)
        })
    }

    fn clear_resolved<'a>(&'a self) -> TierFuture<'a, Result<usize>> {
        Box::pin(async move {
            let entries = self.read_all().await?;
            let mut removed = 0;
            for entry in entries.into_iter().filter(|e| e.resolved) {
                self.store
                    .delete(COMPENSATION_STORE, &entry.transaction_id, WriteOptions { bypass_authority: true })
                    .await?;
                removed += 1;
            }
            Ok(removed)
        })
    }
}

/// Tier 2: persists the whole compensation log as one JSON array under a
/// reserved flat-store key.
pub struct FlatStoreCompensationTier {
    store: Arc<dyn FlatStore>,
    key: &'static str,
}

impl FlatStoreCompensationTier {
    /// Build a tier backed by `store`, writing under [`COMPENSATION_FLAT_KEY`].
    pub fn new(store: Arc<dyn FlatStore>) -> Self {
        FlatStoreCompensationTier { store, key: COMPENSATION_FLAT_KEY }
    }

    /// Build a tier writing under a caller-chosen key (used for the
    /// session-scoped `_tx_compensation_session` variant named in spec §6).
    pub fn with_key(store: Arc<dyn FlatStore>, key: &'static str) -> Self {
        FlatStoreCompensationTier { store, key }
    }

    async fn read_array(&self) -> Result<Vec<Value>> {
        match self.store.get(self.key).await? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| Error::Serialization(e.to_string())),
            None => Ok(Vec::new()),
        }
    }

    async fn write_array(&self, array: &[Value]) -> Result<()> {
        let raw = serde_json::to_string(array).map_err(|e| Error::Serialization(e.to_string()))?;
        self.store.set(self.key, raw).await
    }
}

impl CompensationTier for FlatStoreCompensationTier {
    fn name(&self) -> &'static str {
        "flat_store"
    }

    fn write<'a>(&'a self, entry: CompensationEntry) -> TierFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut array = self.read_array().await?;
            array.retain(|v| v.get("id").and_then(Value::as_str) != Some(entry.transaction_id.as_str()));
            array.push(entry_to_value(&entry));
            self.write_array(&array).await
        })
    }

    fn read_all<'a>(&'a self) -> TierFuture<'a, Result<Vec<CompensationEntry>>> {
        Box::pin(async move { self.read_array().await?.iter().map(value_to_entry).collect() })
    }

    fn resolve<'a>(&'a self, transaction_id: &'a str) -> TierFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut array = self.read_array().await?;
            let mut found = false;
            for value in array.iter_mut() {
                if value.get("id").and_then(Value::as_str) == Some(transaction_id) {
                    let mut entry = value_to_entry(value)?;
                    entry.resolved = true;
                    entry.resolved_at = Some(Utc::now());
                    *value = entry_to_value(&entry);
                    found = true;
                }
            }
            if found {
                self.write_array(&array).await?;
            }
            Ok(found)
        })
    }

    fn clear_resolved<'a>(&'a self) -> TierFuture<'a, Result<usize>> {
        Box::pin(async move {
            let array = self.read_array().await?;
            let before = array.len();
            let kept: Vec<Value> = array
                .into_iter()
                .filter(|v| !v.get("resolved").and_then(Value::as_bool).unwrap_or(false))
                .collect();
            let removed = before - kept.len();
            self.write_array(&kept).await?;
            Ok(removed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flat_store::InMemoryFlatStore;
    use txstore_storage::migration::MigrationStep;

    fn entry(tx: &str) -> CompensationEntry {
        CompensationEntry {
            transaction_id: tx.into(),
            failed_operations: vec![FailedOperation::new(Backend::RecordStore, "widgets", "w1", Some(json!({"name": "x"})))],
            expected_state: "committed".into(),
            error: "boom".into(),
            timestamp: Utc::now(),
            resolved: false,
            resolved_at: None,
        }
    }

    fn record_store() -> Arc<RecordStore> {
        let steps = vec![MigrationStep::declare_store(
            1,
            "v1",
            txstore_core::StoreDescriptor::new(COMPENSATION_STORE, "id"),
        )];
        Arc::new(RecordStore::with_defaults("p1", 1, &steps, &[]).unwrap())
    }

    #[test]
    fn entry_round_trips_through_value() {
        let original = entry("t1");
        let value = entry_to_value(&original);
        let restored = value_to_entry(&value).unwrap();
        assert_eq!(restored, original);
    }

    #[tokio::test]
    async fn record_store_tier_writes_reads_resolves_and_clears() {
        let tier = RecordStoreCompensationTier::new(record_store());
        tier.write(entry("t1")).await.unwrap();
        tier.write(entry("t2")).await.unwrap();

        assert_eq!(tier.read_all().await.unwrap().len(), 2);
        assert!(tier.resolve("t1").await.unwrap());
        assert!(!tier.resolve("ghost").await.unwrap());
        assert_eq!(tier.clear_resolved().await.unwrap(), 1);

        let remaining = tier.read_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].transaction_id, "t2");
    }

    #[tokio::test]
    async fn flat_store_tier_writes_reads_resolves_and_clears() {
        let tier = FlatStoreCompensationTier::new(InMemoryFlatStore::shared());
        tier.write(entry("t1")).await.unwrap();
        tier.write(entry("t2")).await.unwrap();

        assert_eq!(tier.read_all().await.unwrap().len(), 2);
        assert!(tier.resolve("t2").await.unwrap());
        assert_eq!(tier.clear_resolved().await.unwrap(), 1);

        let remaining = tier.read_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].transaction_id, "t1");
    }

    #[tokio::test]
    async fn rewriting_same_tx_id_does_not_duplicate_in_flat_tier() {
        let tier = FlatStoreCompensationTier::new(InMemoryFlatStore::shared());
        tier.write(entry("t1")).await.unwrap();
        tier.write(entry("t1")).await.unwrap();
        assert_eq!(tier.read_all().await.unwrap().len(), 1);
    }
}
