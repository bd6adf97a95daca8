//! [`FallbackEngine`]: secondary record-store implementation activated when
//! the primary is unavailable (spec §4.2.5).
//!
//! Same put/get/get_all/delete/clear/count surface as `RecordStore`, with
//! two weaker guarantees the spec calls out explicitly: transactions are
//! best-effort per-operation (no true atomicity), and `get_all_by_index`
//! only supports a small, pre-registered set of index fields, sorted
//! in-process over coerced strings rather than a real secondary index.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use txstore_core::{Error, Record, Result};

/// Secondary record-store implementation used when the primary is
/// unavailable. Every store is a flat row map; there is no migration chain
/// and no true secondary index — only fields explicitly registered via
/// [`FallbackEngine::register_index_field`] can be scanned by
/// `get_all_by_index`.
#[derive(Debug, Default)]
pub struct FallbackEngine {
    stores: DashMap<String, Arc<RwLock<BTreeMap<String, Record>>>>,
    known_index_fields: DashMap<String, HashSet<String>>,
}

impl FallbackEngine {
    /// Construct an empty fallback engine.
    pub fn new() -> Self {
        FallbackEngine::default()
    }

    fn table(&self, store: &str) -> Arc<RwLock<BTreeMap<String, Record>>> {
        self.stores
            .entry(store.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(BTreeMap::new())))
            .clone()
    }

    /// Declare that `field` on `store` may be used with
    /// `get_all_by_index`. Callers observing `is_using_fallback = true`
    /// should only request indexes they know were registered; anything
    /// else fails with [`Error::NotFound`].
    pub fn register_index_field(&self, store: &str, field: impl Into<String>) {
        self.known_index_fields
            .entry(store.to_string())
            .or_insert_with(HashSet::new)
            .insert(field.into());
    }

    /// Insert/overwrite a row keyed by `key`.
    pub fn put(&self, store: &str, key: String, value: Record) -> Result<()> {
        self.table(store).write().insert(key, value);
        Ok(())
    }

    /// Fetch a row.
    pub fn get(&self, store: &str, key: &str) -> Result<Option<Record>> {
        Ok(self.table(store).read().get(key).cloned())
    }

    /// Every row in `store`, order unspecified.
    pub fn get_all(&self, store: &str) -> Result<Vec<Record>> {
        Ok(self.table(store).read().values().cloned().collect())
    }

    /// Remove a row, returning its prior value.
    pub fn delete(&self, store: &str, key: &str) -> Result<Option<Record>> {
        Ok(self.table(store).write().remove(key))
    }

    /// Remove every row in `store`.
    pub fn clear(&self, store: &str) -> Result<()> {
        self.table(store).write().clear();
        Ok(())
    }

    /// Row count for `store`.
    pub fn count(&self, store: &str) -> Result<usize> {
        Ok(self.table(store).read().len())
    }

    /// In-process sort over a pre-registered field, lexicographic over the
    /// field's string-coerced value — the weaker guarantee spec §4.2.5
    /// calls out explicitly.
    pub fn get_all_by_index(
        &self,
        store: &str,
        field: &str,
        ascending: bool,
    ) -> Result<Vec<Record>> {
        let known = self
            .known_index_fields
            .get(store)
            .map(|set| set.contains(field))
            .unwrap_or(false);
        if !known {
            return Err(Error::NotFound(format!(
                "fallback engine has no registered index '{field}' on store '{store}'"
            )));
        }
        let mut rows = self.get_all(store)?;
        rows.sort_by(|a, b| {
            let av = a.get(field).map(coerce_string).unwrap_or_default();
            let bv = b.get(field).map(coerce_string).unwrap_or_default();
            av.cmp(&bv)
        });
        if !ascending {
            rows.reverse();
        }
        Ok(rows)
    }
}

fn coerce_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
