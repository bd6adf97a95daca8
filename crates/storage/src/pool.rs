//! Transaction pool: at most one pooled transaction per `(store, mode)`.
//!
//! Grounded on the teacher's thread-local context pool (`transaction/
//! pool.rs`): reuse instead of reallocate. The pooling rule here is the
//! spec's, not the teacher's — a keyed pool rather than a thread-local
//! stack, because spec §4.2.2 requires that *any* caller acquiring the
//! pooled transaction for a given `(store, mode)` key immediately
//! invalidates that slot, so a second concurrent caller always gets a
//! fresh handle rather than racing to check-then-use a stale one.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

/// Read-write mode of a native transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxMode {
    /// Read-only; never mutates the store.
    ReadOnly,
    /// Read-write.
    ReadWrite,
}

/// A single pooled native transaction handle. Carries no data of its own
/// beyond an id and a liveness flag — the actual staged writes live on the
/// stack of whoever is running the transaction body (see
/// `RecordStore::transaction`).
#[derive(Debug)]
pub struct PooledTransaction {
    id: u64,
    store: String,
    mode: TxMode,
    active: AtomicBool,
}

impl PooledTransaction {
    fn new(id: u64, store: String, mode: TxMode) -> Self {
        PooledTransaction {
            id,
            store,
            mode,
            active: AtomicBool::new(true),
        }
    }

    /// Opaque id, stable for the lifetime of this handle.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Store this transaction was acquired against.
    pub fn store(&self) -> &str {
        &self.store
    }

    /// Mode this transaction was acquired under.
    pub fn mode(&self) -> TxMode {
        self.mode
    }

    /// True if the native layer still considers this transaction active.
    /// Completion, abort, and timeout all flip this to false.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Mark this transaction completed/aborted. Idempotent.
    pub fn invalidate(&self) {
        self.active.store(false, Ordering::Release);
    }
}

/// Pool of at most one active [`PooledTransaction`] per `(store, mode)`
/// key, with a per-key mutex serializing acquisition.
#[derive(Debug, Default)]
pub struct TransactionPool {
    slots: DashMap<(String, TxModeKey), Arc<Mutex<Option<Arc<PooledTransaction>>>>>,
    next_id: AtomicU64,
}

/// `TxMode` isn't `Eq`-derivable through the newtype boundary cleanly for a
/// `DashMap` key tuple without also deriving `Hash`/`Eq` on the enum
/// itself, which it already has; this alias just documents the key shape.
type TxModeKey = TxMode;

impl TransactionPool {
    /// Construct an empty pool.
    pub fn new() -> Self {
        TransactionPool {
            slots: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    fn slot(&self, store: &str, mode: TxMode) -> Arc<Mutex<Option<Arc<PooledTransaction>>>> {
        self.slots
            .entry((store.to_string(), mode))
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    /// Acquire a transaction for `(store, mode)`. If the pool holds a still
    /// active handle for that key, it is returned; otherwise a fresh one is
    /// minted. Either way, the pool slot is invalidated *before* returning
    /// so a second concurrent caller never observes (and reuses) the same
    /// handle this caller just took.
    pub fn acquire(&self, store: &str, mode: TxMode) -> Arc<PooledTransaction> {
        let slot = self.slot(store, mode);
        let mut guard = slot.lock();
        let txn = match guard.take() {
            Some(existing) if existing.is_active() => existing,
            _ => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                Arc::new(PooledTransaction::new(id, store.to_string(), mode))
            }
        };
        // Slot is now `None` regardless of branch taken above: the next
        // acquirer always mints or re-derives fresh, never races this one.
        txn
    }

    /// Release `txn` back to the pool so a subsequent acquirer on the same
    /// key may reuse it, provided it's still active. A transaction that
    /// completed or aborted (see [`PooledTransaction::invalidate`]) is
    /// dropped rather than pooled.
    pub fn release(&self, txn: Arc<PooledTransaction>) {
        if !txn.is_active() {
            return;
        }
        let slot = self.slot(txn.store(), txn.mode());
        let mut guard = slot.lock();
        *guard = Some(txn);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_invalidates_slot_immediately() {
        let pool = TransactionPool::new();
        let first = pool.acquire("users", TxMode::ReadWrite);
        // No release yet: a second acquirer must get a distinct handle,
        // never the one `first` is holding.
        let second = pool.acquire("users", TxMode::ReadWrite);
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn released_active_transaction_is_reused() {
        let pool = TransactionPool::new();
        let first = pool.acquire("users", TxMode::ReadWrite);
        let id = first.id();
        pool.release(first);
        let second = pool.acquire("users", TxMode::ReadWrite);
        assert_eq!(second.id(), id);
    }

    #[test]
    fn invalidated_transaction_is_not_reused() {
        let pool = TransactionPool::new();
        let first = pool.acquire("users", TxMode::ReadWrite);
        first.invalidate();
        pool.release(first);
        let second = pool.acquire("users", TxMode::ReadWrite);
        // A fresh id was minted because the released handle was inactive.
        assert_ne!(second.id(), 0);
        assert!(second.is_active());
    }

    #[test]
    fn distinct_keys_pool_independently() {
        let pool = TransactionPool::new();
        let a = pool.acquire("users", TxMode::ReadWrite);
        let b = pool.acquire("users", TxMode::ReadOnly);
        assert_ne!(a.id(), b.id());
    }
}
