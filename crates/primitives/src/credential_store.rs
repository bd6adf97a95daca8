//! The credential/token custody contract (spec §1 "out-of-scope
//! collaborators": only `store`/`retrieve_with_options`/`invalidate` are
//! consumed; everything else about that subsystem — rotation, device
//! pairing, UI — is someone else's problem). What's here is the narrow
//! surface [`crate::credential_resource::CredentialStoreResource`] drives,
//! plus an in-process reference implementation for tests and embedders with
//! no real device-bound custody subsystem to wire in.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use serde_json::Value;
use txstore_core::Result;

/// A boxed, `Send` future returned by [`CredentialStore`] methods.
pub type CredFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Options accompanying a credential write, carried alongside the value
/// (spec §4.5: "commit/rollback delegate to store(key, value, options)").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CredentialOptions {
    /// Whether this credential is bound to the current device and must not
    /// be replayed from a pre-image captured on another one.
    pub device_bound: bool,
}

/// The credential custody contract actually consumed by the coordinator.
pub trait CredentialStore: Send + Sync {
    /// True if the custody subsystem is reachable at all.
    fn is_available(&self) -> bool;
    /// True if this process is bound to a physical device the custody
    /// subsystem recognizes. `CredentialStoreResource::prepare` requires
    /// both this and `is_available`.
    fn is_device_bound(&self) -> bool;
    /// Store `value` at `key` under `options`.
    fn store<'a>(&'a self, key: &'a str, value: Value, options: CredentialOptions) -> CredFuture<'a, Result<()>>;
    /// Fetch the value at `key`, without its options.
    fn retrieve<'a>(&'a self, key: &'a str) -> CredFuture<'a, Result<Option<Value>>>;
    /// Fetch the value at `key` together with the options it was stored
    /// under, for pre-image capture. Adapters fall back to `retrieve` paired
    /// with `CredentialOptions::default()` when a backend only implements
    /// the richer API partially.
    fn retrieve_with_options<'a>(&'a self, key: &'a str) -> CredFuture<'a, Result<Option<(Value, CredentialOptions)>>>;
    /// Remove the credential at `key`. Invalidating a key that was never
    /// bound is a no-op success (decided open question: see `DESIGN.md`).
    fn invalidate<'a>(&'a self, key: &'a str) -> CredFuture<'a, Result<()>>;
}

/// In-process reference [`CredentialStore`]. Always available and
/// device-bound unless told otherwise, for exercising the unavailable/
/// not-device-bound prepare-failure paths in tests.
pub struct InMemoryCredentialStore {
    available: AtomicBool,
    device_bound: AtomicBool,
    entries: DashMap<String, (Value, CredentialOptions)>,
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        InMemoryCredentialStore {
            available: AtomicBool::new(true),
            device_bound: AtomicBool::new(true),
            entries: DashMap::new(),
        }
    }
}

impl InMemoryCredentialStore {
    /// Construct a store that reports available and device-bound.
    pub fn new() -> Self {
        InMemoryCredentialStore::default()
    }

    /// Flip whether `is_available` reports true, for exercising the
    /// prepare-failure path.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Flip whether `is_device_bound` reports true.
    pub fn set_device_bound(&self, bound: bool) {
        self.device_bound.store(bound, Ordering::SeqCst);
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn is_device_bound(&self) -> bool {
        self.device_bound.load(Ordering::SeqCst)
    }

    fn store<'a>(&'a self, key: &'a str, value: Value, options: CredentialOptions) -> CredFuture<'a, Result<()>> {
        Box::pin(async move {
            self.entries.insert(key.to_string(), (value, options));
            Ok(())
        })
    }

    fn retrieve<'a>(&'a self, key: &'a str) -> CredFuture<'a, Result<Option<Value>>> {
        Box::pin(async move { Ok(self.entries.get(key).map(|e| e.0.clone())) })
    }

    fn retrieve_with_options<'a>(&'a self, key: &'a str) -> CredFuture<'a, Result<Option<(Value, CredentialOptions)>>> {
        Box::pin(async move { Ok(self.entries.get(key).map(|e| e.value().clone())) })
    }

    fn invalidate<'a>(&'a self, key: &'a str) -> CredFuture<'a, Result<()>> {
        Box::pin(async move {
            self.entries.remove(key);
            Ok(())
        })
    }
}
