//! The string-keyed flat store (spec §4.5, §6): a small key/value surface
//! sitting alongside the structured record store, used both by callers that
//! just want a string slot and internally as tier 2 of the compensation log
//! and the reserved `_transaction_compensation_logs`/`_tx_compensation_session`
//! keys.
//!
//! A real embedder backs this with `localStorage`/`chrome.storage`-style
//! storage, which is genuinely async; the trait is therefore expressed the
//! same boxed-future way as [`txstore_engine::resource::TransactionalResource`]
//! rather than assuming a synchronous backend.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use dashmap::DashMap;
use txstore_core::Result;

/// A boxed, `Send` future returned by [`FlatStore`] methods.
pub type FlatFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The string-valued flat-store contract (spec §4.5 "FlatStoreResource").
pub trait FlatStore: Send + Sync {
    /// Fetch the string currently stored at `key`, if any.
    fn get<'a>(&'a self, key: &'a str) -> FlatFuture<'a, Result<Option<String>>>;
    /// Set `key` to `value`, overwriting any previous value.
    fn set<'a>(&'a self, key: &'a str, value: String) -> FlatFuture<'a, Result<()>>;
    /// Remove `key`. Removing an absent key is not an error.
    fn remove<'a>(&'a self, key: &'a str) -> FlatFuture<'a, Result<()>>;
    /// True if `key` currently holds a value.
    fn contains<'a>(&'a self, key: &'a str) -> FlatFuture<'a, Result<bool>> {
        Box::pin(async move { Ok(self.get(key).await?.is_some()) })
    }
}

/// In-process reference [`FlatStore`], backed by a concurrent map. Handy for
/// embedders and tests that don't need to persist past the process.
#[derive(Debug, Default)]
pub struct InMemoryFlatStore {
    entries: DashMap<String, String>,
}

impl InMemoryFlatStore {
    /// Construct an empty store.
    pub fn new() -> Self {
        InMemoryFlatStore::default()
    }

    /// Wrap in an `Arc` for sharing across resources that each need their
    /// own handle to the same backing store.
    pub fn shared() -> Arc<Self> {
        Arc::new(InMemoryFlatStore::new())
    }
}

impl FlatStore for InMemoryFlatStore {
    fn get<'a>(&'a self, key: &'a str) -> FlatFuture<'a, Result<Option<String>>> {
        Box::pin(async move { Ok(self.entries.get(key).map(|v| v.clone())) })
    }

    fn set<'a>(&'a self, key: &'a str, value: String) -> FlatFuture<'a, Result<()>> {
        Box::pin(async move {
            self.entries.insert(key.to_string(), value);
            Ok(())
        })
    }

    fn remove<'a>(&'a self, key: &'a str) -> FlatFuture<'a, Result<()>> {
        Box::pin(async move {
            self.entries.remove(key);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = InMemoryFlatStore::new();
        store.set("k", "v".to_string()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
        assert!(store.contains("k").await.unwrap());
    }

    #[tokio::test]
    async fn remove_of_absent_key_is_not_an_error() {
        let store = InMemoryFlatStore::new();
        store.remove("ghost").await.unwrap();
        assert_eq!(store.get("ghost").await.unwrap(), None);
    }

    #[tokio::test]
    async fn overwrite_replaces_prior_value() {
        let store = InMemoryFlatStore::new();
        store.set("k", "v1".to_string()).await.unwrap();
        store.set("k", "v2".to_string()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v2".to_string()));
    }
}
