//! The external write-authority collaborator (spec §4.2.3).
//!
//! `RecordStore` consults a `WriteAuthority` before every `put`/`delete`/
//! `clear`, except for stores declared exempt (the migration-metadata store,
//! typically). The real collaborator lives outside this crate (leader
//! election / cross-process write-authority); what's here is the contract
//! plus the two reference implementations a full crate needs to exercise
//! it: always-allow and a togglable test double.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

/// Whether a denied write should be silently dropped or surfaced as an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityMode {
    /// A denied write is logged and treated as a no-op; the call still
    /// reports success. Risks non-atomic transactions (spec §5) — callers
    /// building 2PC transactions should prefer `Strict`.
    Permissive,
    /// A denied write fails with [`txstore_core::Error::WriteAuthorityDenied`].
    Strict,
}

/// Capability consulted before a write: "is this process/tab currently
/// allowed to write to `store`?"
pub trait WriteAuthority: Send + Sync {
    /// True if a write to `store` should proceed.
    fn is_write_allowed(&self, store: &str) -> bool;
}

/// Always grants write authority. The default for embedders that run a
/// single writer and have no cross-process coordination to consult.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysAllow;

impl WriteAuthority for AlwaysAllow {
    fn is_write_allowed(&self, _store: &str) -> bool {
        true
    }
}

/// Always denies write authority. Useful for exercising `AuthorityMode`
/// handling in tests without a real cross-process coordinator.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysDeny;

impl WriteAuthority for AlwaysDeny {
    fn is_write_allowed(&self, _store: &str) -> bool {
        false
    }
}

/// A test double whose answer can be flipped at runtime, for exercising the
/// permissive/strict transition mid-test.
#[derive(Debug, Default)]
pub struct Togglable {
    allowed: AtomicBool,
}

impl Togglable {
    /// Construct a togglable authority starting in the given state.
    pub fn new(allowed: bool) -> Self {
        Togglable {
            allowed: AtomicBool::new(allowed),
        }
    }

    /// Flip the current answer for all stores.
    pub fn set_allowed(&self, allowed: bool) {
        self.allowed.store(allowed, Ordering::SeqCst);
    }
}

impl WriteAuthority for Togglable {
    fn is_write_allowed(&self, _store: &str) -> bool {
        self.allowed.load(Ordering::SeqCst)
    }
}

/// The set of stores exempt from the write-authority gate (spec §4.2.3):
/// typically migration metadata and the transaction journal itself, since
/// those must be writable regardless of tab/process write-authority so the
/// coordinator's own bookkeeping never deadlocks on the gate it enforces
/// for callers.
#[derive(Debug, Clone, Default)]
pub struct ExemptStores {
    names: HashSet<String>,
}

impl ExemptStores {
    /// Build an exemption set from the given store names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ExemptStores {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// True if `store` is exempt from the authority gate.
    pub fn contains(&self, store: &str) -> bool {
        self.names.contains(store)
    }

    /// Add a store to the exemption set.
    pub fn insert(&mut self, store: impl Into<String>) {
        self.names.insert(store.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn always_allow_and_deny() {
        assert!(AlwaysAllow.is_write_allowed("anything"));
        assert!(!AlwaysDeny.is_write_allowed("anything"));
    }

    #[test]
    fn togglable_flips_at_runtime() {
        let toggle = Togglable::new(true);
        assert!(toggle.is_write_allowed("s"));
        toggle.set_allowed(false);
        assert!(!toggle.is_write_allowed("s"));
    }

    #[test]
    fn exempt_stores_membership() {
        let mut exempt = ExemptStores::new(["migrations"]);
        assert!(exempt.contains("migrations"));
        assert!(!exempt.contains("users"));
        exempt.insert("transaction_journal");
        assert!(exempt.contains("transaction_journal"));
    }
}
