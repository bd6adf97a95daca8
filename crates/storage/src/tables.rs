//! In-process table storage backing `RecordStore`: one row map per
//! declared store, guarded by a per-store lock so `RecordStore::transaction`
//! can hold it for the duration of a native transaction body.
//!
//! This is the "connection" a real embedding's IndexedDB/chrome.storage
//! layer would provide; here it's an in-memory reference backend suitable
//! for unit testing the coordinator above it (see `SPEC_FULL.md`'s
//! ambient-stack section on test tooling).

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use txstore_core::{Error, IndexDescriptor, Record, Result, StoreDescriptor};

/// One store's rows, keyed by the serialized primary-key value.
#[derive(Debug, Default)]
pub struct StoreTable {
    pub(crate) descriptor: RwLock<StoreDescriptor>,
    pub(crate) rows: RwLock<BTreeMap<String, Record>>,
}

/// The full set of declared stores, plus their row tables.
#[derive(Debug, Default)]
pub struct StoreTables {
    stores: DashMap<String, Arc<StoreTable>>,
}

/// Render a primary-key JSON value to its string form used as the row map
/// key. Primary keys are typically strings or integers; anything else is
/// serialized to its canonical JSON text.
pub fn key_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl StoreTables {
    /// Construct an empty table set.
    pub fn new() -> Self {
        StoreTables {
            stores: DashMap::new(),
        }
    }

    /// Create `descriptor`'s store if it does not already exist; if it
    /// does, merge in any indexes `descriptor` declares that the existing
    /// one lacks. Never removes or renames an existing store/index (spec
    /// §4.2.1's migration invariant).
    pub fn ensure_store(&self, descriptor: StoreDescriptor) {
        match self.stores.get(&descriptor.name) {
            Some(existing) => {
                let mut current = existing.descriptor.write();
                for index in descriptor.indexes {
                    if current.index(&index.name).is_none() {
                        current.indexes.push(index);
                    }
                }
            }
            None => {
                self.stores.insert(
                    descriptor.name.clone(),
                    Arc::new(StoreTable {
                        descriptor: RwLock::new(descriptor),
                        rows: RwLock::new(BTreeMap::new()),
                    }),
                );
            }
        }
    }

    /// Add `index` to an already-declared store, idempotently.
    pub fn ensure_index(&self, store: &str, index: IndexDescriptor) -> Result<()> {
        let table = self.table(store)?;
        let mut descriptor = table.descriptor.write();
        if descriptor.index(&index.name).is_none() {
            descriptor.indexes.push(index);
        }
        Ok(())
    }

    /// Look up a store's table handle.
    pub fn table(&self, store: &str) -> Result<Arc<StoreTable>> {
        self.stores
            .get(store)
            .map(|entry| entry.clone())
            .ok_or_else(|| Error::NotFound(store.to_string()))
    }

    /// Snapshot of a store's descriptor, if declared.
    pub fn descriptor(&self, store: &str) -> Option<StoreDescriptor> {
        self.stores.get(store).map(|t| t.descriptor.read().clone())
    }

    /// True if `store` has been declared by a migration.
    pub fn contains(&self, store: &str) -> bool {
        self.stores.contains_key(store)
    }
}

impl StoreTable {
    /// Current row count.
    pub fn count(&self) -> usize {
        self.rows.read().len()
    }

    /// Fetch a single row by primary key.
    pub fn get(&self, key: &str) -> Option<Record> {
        self.rows.read().get(key).cloned()
    }

    /// Every row, order unspecified (BTreeMap iteration order by key, which
    /// callers must not rely on per spec §4.2's "order unspecified").
    pub fn get_all(&self) -> Vec<Record> {
        self.rows.read().values().cloned().collect()
    }

    /// Insert/overwrite a row.
    pub fn put(&self, key: String, value: Record) {
        self.rows.write().insert(key, value);
    }

    /// Remove a row, returning its prior value if present.
    pub fn delete(&self, key: &str) -> Option<Record> {
        self.rows.write().remove(key)
    }

    /// Remove every row.
    pub fn clear(&self) {
        self.rows.write().clear();
    }

    /// Rows ordered by the named field. `ascending` selects direction.
    /// Values are compared by the field's JSON ordering (numbers
    /// numerically, strings lexicographically); rows missing the field
    /// sort last.
    pub fn get_all_by_index(&self, key_path: &str, ascending: bool) -> Vec<Record> {
        let mut rows = self.get_all();
        rows.sort_by(|a, b| {
            let av = a.get(key_path);
            let bv = b.get(key_path);
            compare_json(av, bv)
        });
        if !ascending {
            rows.reverse();
        }
        rows
    }
}

fn compare_json(
    a: Option<&serde_json::Value>,
    b: Option<&serde_json::Value>,
) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a, b) {
            (serde_json::Value::Number(a), serde_json::Value::Number(b)) => a
                .as_f64()
                .unwrap_or(0.0)
                .partial_cmp(&b.as_f64().unwrap_or(0.0))
                .unwrap_or(Ordering::Equal),
            (serde_json::Value::String(a), serde_json::Value::String(b)) => a.cmp(b),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use txstore_core::IndexDescriptor;

    #[test]
    fn ensure_store_is_idempotent_and_merges_indexes() {
        let tables = StoreTables::new();
        tables.ensure_store(StoreDescriptor::new("users", "id"));
        tables.ensure_store(
            StoreDescriptor::new("users", "id")
                .with_index(IndexDescriptor::new("by_name", "name")),
        );
        let descriptor = tables.descriptor("users").unwrap();
        assert_eq!(descriptor.indexes.len(), 1);
    }

    #[test]
    fn get_all_by_index_sorts_ascending_and_descending() {
        let tables = StoreTables::new();
        tables.ensure_store(StoreDescriptor::new("users", "id"));
        let table = tables.table("users").unwrap();
        table.put("a".into(), json!({"id": "a", "age": 30}).as_object().unwrap().clone());
        table.put("b".into(), json!({"id": "b", "age": 10}).as_object().unwrap().clone());
        table.put("c".into(), json!({"id": "c", "age": 20}).as_object().unwrap().clone());

        let asc = table.get_all_by_index("age", true);
        let ages: Vec<_> = asc.iter().map(|r| r["age"].as_i64().unwrap()).collect();
        assert_eq!(ages, vec![10, 20, 30]);

        let desc = table.get_all_by_index("age", false);
        let ages: Vec<_> = desc.iter().map(|r| r["age"].as_i64().unwrap()).collect();
        assert_eq!(ages, vec![30, 20, 10]);
    }

    #[test]
    fn missing_store_lookup_fails() {
        let tables = StoreTables::new();
        assert!(tables.table("ghost").is_err());
    }
}
