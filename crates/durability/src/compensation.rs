//! The compensation log: the record of transactions that committed
//! partially and need manual or automated follow-up (spec §4.3.4, §6).
//!
//! Grounded on the teacher's `durability/recovery/coordinator.rs`
//! plan-then-execute staging: a compensation entry is staged once the
//! failure is known, then written through a descending-priority chain of
//! tiers until one accepts it, exactly as that module falls back across
//! recovery plans when the preferred one can't run.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use txstore_core::{redact_sensitive, Backend, Result, TOPIC_COMPENSATION_LOG_IN_MEMORY};
use txstore_core::{EventSink, NoopEventSink};

use std::sync::Arc;

/// A tier's operations run through a backend (record store, flat store)
/// that is itself async, so `CompensationTier` is expressed the same way
/// as `txstore_engine`'s `TransactionalResource`: boxed futures rather
/// than an `async_trait` macro dependency.
pub type TierFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A single failed write the compensation log remembers, with sensitive
/// field values already redacted (spec §4.3.4: "never write raw credential
/// values into the compensation log").
#[derive(Debug, Clone, PartialEq)]
pub struct FailedOperation {
    /// Which backend the operation targeted.
    pub backend: Backend,
    /// Store name.
    pub store: String,
    /// Record key.
    pub key: String,
    /// The value that failed to apply, with sensitive fields redacted.
    pub value: Option<Value>,
}

impl FailedOperation {
    /// Build a `FailedOperation`, redacting sensitive fields in `value` by
    /// key name (see `txstore_core::redact_sensitive`).
    pub fn new(backend: Backend, store: impl Into<String>, key: impl Into<String>, value: Option<Value>) -> Self {
        let store = store.into();
        let key = key.into();
        let value = value.map(|v| redact_sensitive(&store, &key, &v));
        FailedOperation { backend, store, key, value }
    }
}

/// One compensation log entry: a transaction that failed partway through
/// commit, with the operations that did not apply.
#[derive(Debug, Clone, PartialEq)]
pub struct CompensationEntry {
    /// The transaction this entry is about.
    pub transaction_id: String,
    /// The operations that failed to apply.
    pub failed_operations: Vec<FailedOperation>,
    /// Human-readable description of the expected final state.
    pub expected_state: String,
    /// The error that caused the partial commit.
    pub error: String,
    /// When this entry was logged.
    pub timestamp: DateTime<Utc>,
    /// Whether an operator (or automated recovery) has resolved this.
    pub resolved: bool,
    /// When it was resolved, if it was.
    pub resolved_at: Option<DateTime<Utc>>,
}

/// A durable (or best-effort) backing store for compensation entries. Tiers
/// 1 (record store) and 2 (flat store) are implemented in `txstore-primitives`,
/// which can see the storage backends this crate deliberately doesn't
/// depend on.
pub trait CompensationTier: Send + Sync {
    /// Name for diagnostics and event payloads.
    fn name(&self) -> &'static str;
    /// Persist `entry`. Tiers may fail (e.g. the record store itself being
    /// down); the logger falls through to the next tier on `Err`.
    fn write<'a>(&'a self, entry: CompensationEntry) -> TierFuture<'a, Result<()>>;
    /// All entries currently held by this tier.
    fn read_all<'a>(&'a self) -> TierFuture<'a, Result<Vec<CompensationEntry>>>;
    /// Mark the entry for `transaction_id` resolved. Returns whether this
    /// tier held such an entry.
    fn resolve<'a>(&'a self, transaction_id: &'a str) -> TierFuture<'a, Result<bool>>;
    /// Remove every resolved entry from this tier. Returns how many were
    /// removed.
    fn clear_resolved<'a>(&'a self) -> TierFuture<'a, Result<usize>>;
}

/// A capped, FIFO-evicted in-memory tier (spec §4.3.4: "cap each in-process
/// tier at 100 entries; once full, the oldest entry — resolved or not — is
/// evicted to make room"). Backs tiers 3 and 4 by default.
pub struct CappedMemoryTier {
    name: &'static str,
    cap: usize,
    entries: Mutex<VecDeque<CompensationEntry>>,
    unavailable: std::sync::atomic::AtomicBool,
}

impl CappedMemoryTier {
    /// Construct an empty tier with the given diagnostic name and cap.
    pub fn new(name: &'static str, cap: usize) -> Self {
        CappedMemoryTier {
            name,
            cap,
            entries: Mutex::new(VecDeque::new()),
            unavailable: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Force this tier to reject writes (spec §8 scenario 4: "record store,
    /// flat store, session-scoped store, and in-memory map all made
    /// unavailable"). Exists so tests/operators can exercise the all-tiers-
    /// exhausted path; normal operation never sets this.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, std::sync::atomic::Ordering::Relaxed);
    }
}

impl CompensationTier for CappedMemoryTier {
    fn name(&self) -> &'static str {
        self.name
    }

    fn write<'a>(&'a self, entry: CompensationEntry) -> TierFuture<'a, Result<()>> {
        Box::pin(async move {
            if self.unavailable.load(std::sync::atomic::Ordering::Relaxed) {
                return Err(txstore_core::Error::Backend(format!("{} tier unavailable", self.name)));
            }
            let mut entries = self.entries.lock();
            entries.retain(|e| e.transaction_id != entry.transaction_id);
            entries.push_back(entry);
            while entries.len() > self.cap {
                entries.pop_front();
            }
            Ok(())
        })
    }

    fn read_all<'a>(&'a self) -> TierFuture<'a, Result<Vec<CompensationEntry>>> {
        Box::pin(async move { Ok(self.entries.lock().iter().cloned().collect()) })
    }

    fn resolve<'a>(&'a self, transaction_id: &'a str) -> TierFuture<'a, Result<bool>> {
        Box::pin(async move {
            let mut entries = self.entries.lock();
            if let Some(e) = entries.iter_mut().find(|e| e.transaction_id == transaction_id) {
                e.resolved = true;
                e.resolved_at = Some(Utc::now());
                Ok(true)
            } else {
                Ok(false)
            }
        })
    }

    fn clear_resolved<'a>(&'a self) -> TierFuture<'a, Result<usize>> {
        Box::pin(async move {
            let mut entries = self.entries.lock();
            let before = entries.len();
            entries.retain(|e| !e.resolved);
            Ok(before - entries.len())
        })
    }
}

/// The three/four-tier compensation log (spec §4.3.4): record store, flat
/// store, session-scoped flat store, in-memory map, in descending
/// durability and descending write-priority. A write is attempted against
/// each tier in order until one succeeds. Under normal operation the
/// in-memory tier always accepts, but it can be forced unavailable (see
/// [`set_memory_tiers_unavailable`](Self::set_memory_tiers_unavailable)) to
/// exercise the all-tiers-exhausted path.
pub struct CompensationLogger {
    tier1: Option<Arc<dyn CompensationTier>>,
    tier2: Option<Arc<dyn CompensationTier>>,
    tier3: Arc<CappedMemoryTier>,
    tier4: Arc<CappedMemoryTier>,
    events: Arc<dyn EventSink>,
}

impl CompensationLogger {
    /// Maximum entries each in-process tier (3 and 4) retains.
    pub const CAP: usize = txstore_core::constants::COMP_MAX_ENTRIES;

    /// Build a logger with only the in-process tiers (no record store or
    /// flat store wired in).
    pub fn in_memory_only() -> Self {
        CompensationLogger {
            tier1: None,
            tier2: None,
            tier3: Arc::new(CappedMemoryTier::new("session", Self::CAP)),
            tier4: Arc::new(CappedMemoryTier::new("in_memory", Self::CAP)),
            events: Arc::new(NoopEventSink),
        }
    }

    /// Build a logger with externally-provided tier 1 (record store) and
    /// tier 2 (flat store) backends.
    pub fn new(
        tier1: Option<Arc<dyn CompensationTier>>,
        tier2: Option<Arc<dyn CompensationTier>>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        CompensationLogger {
            tier1,
            tier2,
            tier3: Arc::new(CappedMemoryTier::new("session", Self::CAP)),
            tier4: Arc::new(CappedMemoryTier::new("in_memory", Self::CAP)),
            events,
        }
    }

    fn tiers(&self) -> Vec<&Arc<dyn CompensationTier>> {
        let mut v = Vec::new();
        if let Some(t) = &self.tier1 {
            v.push(t);
        }
        if let Some(t) = &self.tier2 {
            v.push(t);
        }
        v
    }

    /// Log a partial commit. Tries tier 1, then tier 2, then the
    /// session-scoped in-process tier, then the plain in-memory tier.
    /// Returns the name of the tier that accepted the write, or `None` if
    /// every tier — including the in-memory one — rejected it (spec §4.3.3:
    /// "compensation log failed to persist through all three tiers"),
    /// which the caller must treat as grounds to latch `FatalState`.
    pub async fn log(&self, entry: CompensationEntry) -> Option<&'static str> {
        for tier in self.tiers() {
            if tier.write(entry.clone()).await.is_ok() {
                return Some(tier.name());
            }
        }
        if self.tier3.write(entry.clone()).await.is_ok() {
            return Some(self.tier3.name());
        }
        if self.tier4.write(entry).await.is_ok() {
            self.events.publish(TOPIC_COMPENSATION_LOG_IN_MEMORY, serde_json::json!({}));
            return Some(self.tier4.name());
        }
        None
    }

    /// Force the two in-process tiers (session-scoped, in-memory) to reject
    /// writes, for exercising the all-tiers-exhausted fatal-latch path.
    pub fn set_memory_tiers_unavailable(&self, unavailable: bool) {
        self.tier3.set_unavailable(unavailable);
        self.tier4.set_unavailable(unavailable);
    }

    /// Every entry across every tier, deduplicated by transaction id
    /// (first tier to hold an id wins, in priority order).
    pub async fn all_entries(&self) -> Vec<CompensationEntry> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        let mut tiers: Vec<&Arc<dyn CompensationTier>> = self.tiers();
        tiers.push(&self.tier3);
        tiers.push(&self.tier4);
        for tier in tiers {
            if let Ok(entries) = tier.read_all().await {
                for entry in entries {
                    if seen.insert(entry.transaction_id.clone()) {
                        out.push(entry);
                    }
                }
            }
        }
        out
    }

    /// Mark the entry for `transaction_id` resolved in every tier that
    /// holds it (an id may have been retried across tiers in the past).
    pub async fn resolve(&self, transaction_id: &str) -> bool {
        let mut resolved_any = false;
        let mut tiers: Vec<&Arc<dyn CompensationTier>> = self.tiers();
        tiers.push(&self.tier3);
        tiers.push(&self.tier4);
        for tier in tiers {
            if tier.resolve(transaction_id).await.unwrap_or(false) {
                resolved_any = true;
            }
        }
        resolved_any
    }

    /// Remove resolved entries from every tier. Returns the total removed.
    pub async fn clear_resolved(&self) -> usize {
        let mut total = 0;
        let mut tiers: Vec<&Arc<dyn CompensationTier>> = self.tiers();
        tiers.push(&self.tier3);
        tiers.push(&self.tier4);
        for tier in tiers {
            total += tier.clear_resolved().await.unwrap_or(0);
        }
        total
    }
}
