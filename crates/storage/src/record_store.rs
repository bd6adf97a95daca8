//! [`RecordStore`]: connection lifecycle, migrations, transaction pool,
//! write-authority gate, vector-clock stamping, conflict detection, and
//! timeout-guarded requests (spec §4.2).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tracing::{info, warn};
use txstore_concurrency::VectorClock;
use txstore_core::{
    stamp, Error, EventSink, NoopEventSink, Record, Result, StoreDescriptor,
    TOPIC_CONNECTION_BLOCKED, TOPIC_CONNECTION_ESTABLISHED, TOPIC_CONNECTION_FAILED,
    TOPIC_CONNECTION_RETRY, TOPIC_FALLBACK_ACTIVATED,
};

use crate::conflict::{self, Winner};
use crate::fallback::FallbackEngine;
use crate::migration::{run_migrations, MigrationStep};
use crate::pool::{TransactionPool, TxMode};
use crate::tables::{key_to_string, StoreTables};
use crate::write_authority::{AlwaysAllow, AuthorityMode, ExemptStores, WriteAuthority};

/// Secondary-index scan direction (spec §4.2, `get_all_by_index`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Ascending.
    Forward,
    /// Descending.
    Reverse,
}

/// Options accepted by `put`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PutOptions {
    /// Suppress vector-clock stamping for this write.
    pub skip_write_epoch: bool,
    /// Bypass the write-authority gate. Internal maintenance paths only
    /// (compensation logging, recovery sweeps) per spec §4.2.3.
    pub bypass_authority: bool,
    /// Skip `detect_write_conflict` entirely. Internal maintenance paths
    /// only: a 2PC rollback restoring a captured pre-image is, by
    /// construction, writing something "older" than what commit just
    /// stamped in, which the ordinary conflict check would reject as
    /// `existing_newer` — exactly the outcome rollback exists to produce.
    pub bypass_conflict: bool,
}

/// Options accepted by `delete`/`clear`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOptions {
    /// Bypass the write-authority gate.
    pub bypass_authority: bool,
}

/// Connection-retry options for [`RecordStore::init_with_retry`].
#[derive(Debug, Clone, Copy)]
pub struct InitRetryOptions {
    /// Connection retry policy (base/cap/multiplier/max_attempts).
    pub policy: txstore_core::constants::ConnectionRetryPolicy,
    /// Activate the fallback engine if every attempt fails.
    pub enable_fallback: bool,
}

impl Default for InitRetryOptions {
    fn default() -> Self {
        InitRetryOptions {
            policy: txstore_core::constants::ConnectionRetryPolicy::default(),
            enable_fallback: true,
        }
    }
}

/// Outcome of a successful `init_with_retry`.
#[derive(Debug, Clone, Copy)]
pub struct ConnectOutcome {
    /// Number of attempts made before success (or before falling back).
    pub attempts: u32,
    /// True if the fallback engine was activated instead of the primary.
    pub used_fallback: bool,
}

/// Simulates the native connection attempt a real embedding's storage
/// layer would make (open the database handle, verify permissions). Tests
/// supply `AlwaysFails`/flaky implementations; production wiring supplies
/// whatever actually opens the primary backend.
pub trait Connector: Send + Sync {
    /// Attempt to establish the connection. `Ok(())` means the primary
    /// backend is reachable; `Err` carries the failure cause.
    fn try_connect(&self) -> Result<()>;
}

/// Always succeeds immediately. The default for embedders whose primary
/// backend has no meaningful "unavailable" state to simulate.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConnect;

impl Connector for AlwaysConnect {
    fn try_connect(&self) -> Result<()> {
        Ok(())
    }
}

/// The structured record-store engine: connection lifecycle, migrations,
/// transaction pool, write-authority gate, vector-clock stamping, conflict
/// detection, and timeout-guarded requests.
pub struct RecordStore {
    tables: StoreTables,
    pool: TransactionPool,
    clock: Mutex<VectorClock>,
    writer_id: String,
    authority: Arc<dyn WriteAuthority>,
    authority_mode: AuthorityMode,
    exempt: ExemptStores,
    events: Arc<dyn EventSink>,
    op_timeout: Duration,
    version: AtomicU32,
    fallback: Arc<FallbackEngine>,
    using_fallback: std::sync::atomic::AtomicBool,
    txn_counter: AtomicU64,
}

impl RecordStore {
    /// Construct a ready `RecordStore` already at `current_version`,
    /// running `steps` for `(0, current_version]` plus the safety sweep
    /// over `head_stores`. This is `init`'s synchronous core; `init`
    /// itself is async to match spec §5's suspension-point list (the
    /// primitive is still instantaneous here — there is no real I/O in
    /// the in-process reference backend).
    pub fn init(
        writer_id: impl Into<String>,
        current_version: u32,
        steps: &[MigrationStep],
        head_stores: &[StoreDescriptor],
        authority: Arc<dyn WriteAuthority>,
        authority_mode: AuthorityMode,
        exempt: ExemptStores,
        events: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let tables = StoreTables::new();
        run_migrations(&tables, steps, 0, current_version, head_stores)?;
        events.publish(TOPIC_CONNECTION_ESTABLISHED, json!({"attempts": 1}));
        info!(version = current_version, "record store connection established");
        Ok(RecordStore {
            tables,
            pool: TransactionPool::new(),
            clock: Mutex::new(VectorClock::new()),
            writer_id: writer_id.into(),
            authority,
            authority_mode,
            exempt,
            events,
            op_timeout: txstore_core::constants::OP_TIMEOUT,
            version: AtomicU32::new(current_version),
            fallback: Arc::new(FallbackEngine::new()),
            using_fallback: std::sync::atomic::AtomicBool::new(false),
            txn_counter: AtomicU64::new(1),
        })
    }

    /// Construct a `RecordStore` with every dependency defaulted
    /// (always-allow authority, permissive mode, no-op event sink). Handy
    /// for tests and simple embedders.
    pub fn with_defaults(
        writer_id: impl Into<String>,
        current_version: u32,
        steps: &[MigrationStep],
        head_stores: &[StoreDescriptor],
    ) -> Result<Self> {
        RecordStore::init(
            writer_id,
            current_version,
            steps,
            head_stores,
            Arc::new(AlwaysAllow),
            AuthorityMode::Permissive,
            ExemptStores::default(),
            Arc::new(NoopEventSink),
        )
    }

    /// Attempt to connect with exponential backoff (base/×2/cap per
    /// `options.policy`). On exhaustion, activates the fallback engine if
    /// `options.enable_fallback`, otherwise surfaces
    /// [`Error::ConnectionUnavailable`].
    pub async fn init_with_retry(
        &self,
        connector: &dyn Connector,
        options: InitRetryOptions,
    ) -> Result<ConnectOutcome> {
        let mut last_err = String::new();
        for attempt in 0..options.policy.max_attempts {
            match connector.try_connect() {
                Ok(()) => {
                    self.events
                        .publish(TOPIC_CONNECTION_ESTABLISHED, json!({"attempts": attempt + 1}));
                    return Ok(ConnectOutcome {
                        attempts: attempt + 1,
                        used_fallback: false,
                    });
                }
                Err(err) => {
                    last_err = err.to_string();
                    let next_ms = options.policy.delay_for(attempt).as_millis() as u64;
                    if attempt + 1 < options.policy.max_attempts {
                        self.events.publish(
                            TOPIC_CONNECTION_RETRY,
                            json!({
                                "attempt": attempt + 1,
                                "max": options.policy.max_attempts,
                                "next_ms": next_ms,
                                "error": last_err,
                            }),
                        );
                        warn!(attempt = attempt + 1, next_ms, error = %last_err, "connection retry");
                        tokio::time::sleep(options.policy.delay_for(attempt)).await;
                    }
                }
            }
        }

        self.events.publish(
            TOPIC_CONNECTION_FAILED,
            json!({
                "attempts": options.policy.max_attempts,
                "error": last_err,
                "recoverable": false,
            }),
        );

        if options.enable_fallback {
            self.using_fallback.store(true, Ordering::SeqCst);
            self.events.publish(
                TOPIC_FALLBACK_ACTIVATED,
                json!({"mode": "memory", "stats": {"stores": 0}}),
            );
            warn!("primary record store unavailable, fallback engine activated");
            Ok(ConnectOutcome {
                attempts: options.policy.max_attempts,
                used_fallback: true,
            })
        } else {
            Err(Error::ConnectionUnavailable {
                attempts: options.policy.max_attempts,
                cause: last_err,
            })
        }
    }

    /// True if the fallback engine (not the primary) is currently serving
    /// requests.
    pub fn is_using_fallback(&self) -> bool {
        self.using_fallback.load(Ordering::SeqCst)
    }

    /// Direct access to the fallback engine, for embedders that need to
    /// register index fields before activation.
    pub fn fallback(&self) -> &FallbackEngine {
        &self.fallback
    }

    /// Publish a `storage:connection_blocked` event (e.g. a version-change
    /// request blocked by another open connection).
    pub fn publish_blocked(&self, reason: &str, message: &str) {
        self.events.publish(
            TOPIC_CONNECTION_BLOCKED,
            json!({"reason": reason, "message": message}),
        );
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::OperationTimeout(self.op_timeout)),
        }
    }

    fn check_authority(&self, store: &str, bypass: bool) -> Result<bool> {
        if bypass || self.exempt.contains(store) {
            return Ok(true);
        }
        if self.authority.is_write_allowed(store) {
            return Ok(true);
        }
        match self.authority_mode {
            AuthorityMode::Strict => Err(Error::WriteAuthorityDenied {
                store: store.to_string(),
            }),
            AuthorityMode::Permissive => {
                warn!(store, "write authority denied; permissive no-op");
                Ok(false)
            }
        }
    }

    fn primary_key_of(descriptor: &StoreDescriptor, value: &Record) -> Result<String> {
        value
            .get(&descriptor.key_path)
            .map(key_to_string)
            .ok_or_else(|| {
                Error::InvalidState(format!(
                    "record missing primary key field '{}'",
                    descriptor.key_path
                ))
            })
    }

    /// Compare `existing` against `incoming` per spec §4.2.4. Public so
    /// callers (and the 2PC conflict-aware resource adapter) can inspect
    /// the decision before `put` applies it.
    pub fn detect_write_conflict(
        &self,
        existing: Option<&Record>,
        incoming: &Record,
    ) -> conflict::ConflictOutcome {
        conflict::detect_write_conflict(existing, incoming)
    }

    /// Add or update the record keyed by its declared primary key.
    /// Stamps the vector clock unless `opts.skip_write_epoch`; respects
    /// the write-authority gate unless `opts.bypass_authority`. Rejects the
    /// write with [`Error::Conflict`] if `detect_write_conflict` flags one.
    pub async fn put(&self, store: &str, mut value: Record, opts: PutOptions) -> Result<()> {
        self.with_timeout(async {
            if self.is_using_fallback() {
                let descriptor = self
                    .tables
                    .descriptor(store)
                    .ok_or_else(|| Error::NotFound(store.to_string()))?;
                if !self.check_authority(store, opts.bypass_authority)? {
                    return Ok(());
                }
                let key = Self::primary_key_of(&descriptor, &value)?;
                if !opts.skip_write_epoch {
                    let mut clock = self.clock.lock();
                    clock.tick(&self.writer_id);
                    stamp(&mut value, &clock.snapshot(), &self.writer_id);
                }
                return self.fallback.put(store, key, value);
            }

            let table = self.tables.table(store)?;
            let descriptor = table.descriptor.read().clone();
            if !self.check_authority(store, opts.bypass_authority)? {
                return Ok(());
            }
            let key = Self::primary_key_of(&descriptor, &value)?;

            let existing = table.get(&key);
            if !opts.skip_write_epoch {
                let mut clock = self.clock.lock();
                clock.tick(&self.writer_id);
                stamp(&mut value, &clock.snapshot(), &self.writer_id);
            }

            if !opts.bypass_conflict {
                let decision = conflict::detect_write_conflict(existing.as_ref(), &value);
                if decision.has_conflict && decision.winner == Winner::Existing {
                    return Err(Error::Conflict {
                        store: store.to_string(),
                        key,
                        reason: decision.reason.to_string(),
                    });
                }
            }

            table.put(key, value);
            Ok(())
        })
        .await
    }

    /// Fetch a record by primary key.
    pub async fn get(&self, store: &str, key: &str) -> Result<Option<Record>> {
        self.with_timeout(async {
            if self.is_using_fallback() {
                return self.fallback.get(store, key);
            }
            let table = self.tables.table(store)?;
            Ok(table.get(key))
        })
        .await
    }

    /// Every record in `store`, order unspecified.
    pub async fn get_all(&self, store: &str) -> Result<Vec<Record>> {
        self.with_timeout(async {
            if self.is_using_fallback() {
                return self.fallback.get_all(store);
            }
            let table = self.tables.table(store)?;
            Ok(table.get_all())
        })
        .await
    }

    /// Delete a record by primary key. Authority-gated.
    pub async fn delete(&self, store: &str, key: &str, opts: WriteOptions) -> Result<()> {
        self.with_timeout(async {
            if !self.check_authority(store, opts.bypass_authority)? {
                return Ok(());
            }
            if self.is_using_fallback() {
                self.fallback.delete(store, key)?;
                return Ok(());
            }
            let table = self.tables.table(store)?;
            table.delete(key);
            Ok(())
        })
        .await
    }

    /// Remove every record in `store`. Authority-gated.
    pub async fn clear(&self, store: &str, opts: WriteOptions) -> Result<()> {
        self.with_timeout(async {
            if !self.check_authority(store, opts.bypass_authority)? {
                return Ok(());
            }
            if self.is_using_fallback() {
                return self.fallback.clear(store);
            }
            let table = self.tables.table(store)?;
            table.clear();
            Ok(())
        })
        .await
    }

    /// Number of records currently in `store`.
    pub async fn count(&self, store: &str) -> Result<usize> {
        self.with_timeout(async {
            if self.is_using_fallback() {
                return self.fallback.count(store);
            }
            let table = self.tables.table(store)?;
            Ok(table.count())
        })
        .await
    }

    /// Records ordered by a pre-declared secondary index. When the
    /// fallback engine is in use, records are sorted in-process over a
    /// pre-registered field instead of a true index.
    pub async fn get_all_by_index(
        &self,
        store: &str,
        index: &str,
        direction: Direction,
    ) -> Result<Vec<Record>> {
        let ascending = direction == Direction::Forward;
        self.with_timeout(async {
            if self.is_using_fallback() {
                return self.fallback.get_all_by_index(store, index, ascending);
            }
            let table = self.tables.table(store)?;
            let descriptor = table.descriptor.read();
            let declared = descriptor
                .index(index)
                .ok_or_else(|| Error::NotFound(format!("index '{index}' on store '{store}'")))?;
            let key_path = declared.key_path.clone();
            drop(descriptor);
            Ok(table.get_all_by_index(&key_path, ascending))
        })
        .await
    }

    /// Run `ops` inside one native transaction against `store`. The pool
    /// entry for `(store, mode)` is acquired (and immediately invalidated,
    /// per spec §4.2.2) for the duration; writes staged by `ops` are only
    /// applied to the live table if `ops` returns `Ok`, giving the whole
    /// batch atomicity against readers observing the table mid-callback.
    pub async fn transaction<F>(&self, store: &str, mode: TxMode, ops: F) -> Result<()>
    where
        F: FnOnce(&mut TransactionHandle<'_>) -> Result<()>,
    {
        if self.is_using_fallback() {
            // Fallback transactions are best-effort per-operation: there is
            // no isolation to provide, so `ops` runs directly against the
            // fallback engine through the same handle shape.
            let txn = self.pool.acquire(store, mode);
            let mut handle = TransactionHandle::Fallback {
                store,
                engine: &self.fallback,
                writer_id: &self.writer_id,
                clock: &self.clock,
            };
            let result = ops(&mut handle);
            txn.invalidate();
            self.pool.release(txn);
            return result;
        }

        let table = self.tables.table(store)?;
        let txn = self.pool.acquire(store, mode);
        let staged = Mutex::new(BTreeMap::<String, Staged>::new());
        let mut handle = TransactionHandle::Native {
            table: table.clone(),
            staged: &staged,
            writer_id: &self.writer_id,
            clock: &self.clock,
        };

        let result = ops(&mut handle);
        txn.invalidate();
        self.pool.release(txn);

        match result {
            Ok(()) => {
                for (key, change) in staged.into_inner() {
                    match change {
                        Staged::Put(value) => table.put(key, value),
                        Staged::Delete => {
                            table.delete(&key);
                        }
                    }
                }
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Read-modify-write `store[key]` under a single transaction. The
    /// modifier receives a deep clone of the current value so a thrown
    /// error never leaves a partially mutated object visible anywhere;
    /// if it returns `Err`, the transaction aborts and the original state
    /// is preserved exactly.
    pub async fn atomic_update<F>(&self, store: &str, key: &str, modifier: F) -> Result<Record>
    where
        F: FnOnce(Record) -> Result<Record>,
    {
        let current = self.get(store, key).await?.unwrap_or_default();
        let cloned = current.clone();
        let updated = modifier(cloned)?;
        self.transaction(store, TxMode::ReadWrite, |handle| {
            handle.put(key.to_string(), updated.clone())
        })
        .await?;
        Ok(updated)
    }

    /// Current schema version.
    pub fn version(&self) -> u32 {
        self.version.load(Ordering::SeqCst)
    }

    /// Direct table access for [`crate::migration`]/bootstrap callers that
    /// need to declare stores outside the `init` migration chain (used by
    /// `recover_from_journal`'s private pending-table scans in the engine
    /// crate).
    pub fn tables(&self) -> &StoreTables {
        &self.tables
    }

    /// Mint a fresh transaction id local to this store (used by adapters
    /// that need a private scratch table keyed by transaction id).
    pub fn next_txn_id(&self) -> u64 {
        self.txn_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// This store's writer id, used when stamping records.
    pub fn writer_id(&self) -> &str {
        &self.writer_id
    }
}

enum Staged {
    Put(Record),
    Delete,
}

/// The batch handle passed to a `RecordStore::transaction` callback.
pub enum TransactionHandle<'a> {
    /// Against the primary store: writes are staged and only applied if
    /// the callback succeeds.
    Native {
        table: Arc<crate::tables::StoreTable>,
        staged: &'a Mutex<BTreeMap<String, Staged>>,
        writer_id: &'a str,
        clock: &'a Mutex<VectorClock>,
    },
    /// Against the fallback engine: writes apply immediately,
    /// best-effort, with no rollback on later failure within the same
    /// callback.
    Fallback {
        store: &'a str,
        engine: &'a FallbackEngine,
        writer_id: &'a str,
        clock: &'a Mutex<VectorClock>,
    },
}

impl<'a> TransactionHandle<'a> {
    /// Stage (or, in fallback mode, immediately apply) a put.
    pub fn put(&mut self, key: String, mut value: Record) -> Result<()> {
        match self {
            TransactionHandle::Native {
                staged,
                writer_id,
                clock,
                ..
            } => {
                let mut clock = clock.lock();
                clock.tick(writer_id);
                stamp(&mut value, &clock.snapshot(), writer_id);
                staged.lock().insert(key, Staged::Put(value));
                Ok(())
            }
            TransactionHandle::Fallback {
                store,
                engine,
                writer_id,
                clock,
            } => {
                let mut clock = clock.lock();
                clock.tick(writer_id);
                stamp(&mut value, &clock.snapshot(), writer_id);
                engine.put(store, key, value)
            }
        }
    }

    /// Stage (or immediately apply) a delete.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        match self {
            TransactionHandle::Native { staged, .. } => {
                staged.lock().insert(key.to_string(), Staged::Delete);
                Ok(())
            }
            TransactionHandle::Fallback { store, engine, .. } => {
                engine.delete(store, key)?;
                Ok(())
            }
        }
    }

    /// Read the current value of `key`, including any not-yet-applied
    /// staged change from earlier in this same transaction.
    pub fn get(&self, key: &str) -> Option<Record> {
        match self {
            TransactionHandle::Native { table, staged, .. } => {
                match staged.lock().get(key) {
                    Some(Staged::Put(v)) => Some(v.clone()),
                    Some(Staged::Delete) => None,
                    None => table.get(key),
                }
            }
            TransactionHandle::Fallback { store, engine, .. } => {
                engine.get(store, key).ok().flatten()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: serde_json::Value) -> Record {
        v.as_object().unwrap().clone()
    }

    fn steps() -> Vec<MigrationStep> {
        vec![MigrationStep::declare_store(
            1,
            "v1",
            StoreDescriptor::new("users", "id").with_index(txstore_core::IndexDescriptor::new(
                "by_age",
                "age",
            )),
        )]
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = RecordStore::with_defaults("p1", 1, &steps(), &[]).unwrap();
        store
            .put("users", rec(json!({"id": "u1", "age": 30})), PutOptions::default())
            .await
            .unwrap();
        let got = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(got["age"], json!(30));
        assert!(txstore_core::is_stamped(&got));
    }

    #[tokio::test]
    async fn skip_write_epoch_leaves_record_unstamped() {
        let store = RecordStore::with_defaults("p1", 1, &steps(), &[]).unwrap();
        store
            .put(
                "users",
                rec(json!({"id": "u1", "age": 30})),
                PutOptions {
                    skip_write_epoch: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let got = store.get("users", "u1").await.unwrap().unwrap();
        assert!(!txstore_core::is_stamped(&got));
    }

    #[tokio::test]
    async fn delete_then_get_is_absent() {
        let store = RecordStore::with_defaults("p1", 1, &steps(), &[]).unwrap();
        store
            .put("users", rec(json!({"id": "u1"})), PutOptions::default())
            .await
            .unwrap();
        store.delete("users", "u1", WriteOptions::default()).await.unwrap();
        assert!(store.get("users", "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_all_by_index_orders_by_declared_field() {
        let store = RecordStore::with_defaults("p1", 1, &steps(), &[]).unwrap();
        store
            .put("users", rec(json!({"id": "a", "age": 40})), PutOptions::default())
            .await
            .unwrap();
        store
            .put("users", rec(json!({"id": "b", "age": 10})), PutOptions::default())
            .await
            .unwrap();
        let ordered = store
            .get_all_by_index("users", "by_age", Direction::Forward)
            .await
            .unwrap();
        let ids: Vec<_> = ordered.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["b", "a"]);

        let reversed = store
            .get_all_by_index("users", "by_age", Direction::Reverse)
            .await
            .unwrap();
        let ids: Vec<_> = reversed.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn atomic_update_is_noop_on_modifier_error() {
        let store = RecordStore::with_defaults("p1", 1, &steps(), &[]).unwrap();
        store
            .put("users", rec(json!({"id": "u1", "age": 1})), PutOptions::default())
            .await
            .unwrap();
        let before = store.get("users", "u1").await.unwrap().unwrap();
        let result = store
            .atomic_update("users", "u1", |_| Err(Error::InvalidState("nope".into())))
            .await;
        assert!(result.is_err());
        let after = store.get("users", "u1").await.unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn strict_authority_denial_blocks_write() {
        let store = RecordStore::init(
            "p1",
            1,
            &steps(),
            &[],
            Arc::new(crate::write_authority::AlwaysDeny),
            AuthorityMode::Strict,
            ExemptStores::default(),
            Arc::new(NoopEventSink),
        )
        .unwrap();
        let result = store
            .put("users", rec(json!({"id": "u1"})), PutOptions::default())
            .await;
        assert!(matches!(result, Err(Error::WriteAuthorityDenied { .. })));
        assert!(store.get("users", "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn permissive_authority_denial_is_a_silent_noop() {
        let store = RecordStore::init(
            "p1",
            1,
            &steps(),
            &[],
            Arc::new(crate::write_authority::AlwaysDeny),
            AuthorityMode::Permissive,
            ExemptStores::default(),
            Arc::new(NoopEventSink),
        )
        .unwrap();
        store
            .put("users", rec(json!({"id": "u1"})), PutOptions::default())
            .await
            .unwrap();
        assert!(store.get("users", "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transaction_rolls_back_on_callback_error() {
        let store = RecordStore::with_defaults("p1", 1, &steps(), &[]).unwrap();
        let result = store
            .transaction("users", TxMode::ReadWrite, |handle| {
                handle.put("u1".to_string(), rec(json!({"id": "u1"})))?;
                Err(Error::InvalidState("abort".into()))
            })
            .await;
        assert!(result.is_err());
        assert!(store.get("users", "u1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn conflicting_write_is_rejected() {
        let store = RecordStore::with_defaults("p1", 1, &steps(), &[]).unwrap();
        store
            .put("users", rec(json!({"id": "u1", "age": 1})), PutOptions::default())
            .await
            .unwrap();
        let mut stale = rec(json!({"id": "u1", "age": 2}));
        // Stamp it with a clock that does not dominate the stored one.
        stamp(&mut stale, &BTreeMap::new(), "p2");
        let result = store
            .put(
                "users",
                stale,
                PutOptions {
                    skip_write_epoch: true,
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(Error::Conflict { .. })));
    }
}
