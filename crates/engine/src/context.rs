//! [`TransactionContext`] and [`Operation`]: the 2PC-sense bookkeeping a
//! [`crate::coordinator::TransactionCoordinator`] carries through a single
//! run (spec §3, §4.3.1).
//!
//! Grounded on the teacher's `concurrency/manager.rs` commit-sequence doc
//! comment shape (numbered steps, explicit state-transition callouts),
//! re-targeted here from single-branch OCC state to the phase booleans
//! (`prepared`/`journaled`/`committed`/`rolled_back`) this design's
//! `TransactionContext` carries instead.

use std::time::Instant;

use txstore_core::constants::MAX_OPS;
use txstore_core::{Backend, Error, Result};

/// Put or delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    /// Add or overwrite a value.
    Put,
    /// Remove a value.
    Delete,
}

/// A single enqueued write, with the pre-image captured at enqueue time
/// (spec §9: "capturing the pre-image at enqueue time... trades a small
/// read per operation for a simple rollback").
#[derive(Debug, Clone)]
pub struct Operation {
    /// Which backend this targets.
    pub backend: Backend,
    /// Put or delete.
    pub kind: OpKind,
    /// Target store name.
    pub store: String,
    /// Target key.
    pub key: String,
    /// New value, for `Put`. `None` for `Delete`.
    pub value: Option<serde_json::Value>,
    /// Value the key held immediately before this operation, if any.
    pub previous_value: Option<serde_json::Value>,
    /// Credential-store-specific pre-image options (device binding, etc.),
    /// captured alongside `previous_value` for backends that need them.
    pub previous_options: Option<serde_json::Value>,
    /// Set true once the target backend has acknowledged the write during
    /// commit; cleared back to false once a rollback has undone it.
    pub committed: bool,
}

impl Operation {
    /// Construct a `put` operation.
    pub fn put(
        backend: Backend,
        store: impl Into<String>,
        key: impl Into<String>,
        value: serde_json::Value,
        previous_value: Option<serde_json::Value>,
        previous_options: Option<serde_json::Value>,
    ) -> Self {
        Operation {
            backend,
            kind: OpKind::Put,
            store: store.into(),
            key: key.into(),
            value: Some(value),
            previous_value,
            previous_options,
            committed: false,
        }
    }

    /// Construct a `delete` operation.
    pub fn delete(
        backend: Backend,
        store: impl Into<String>,
        key: impl Into<String>,
        previous_value: Option<serde_json::Value>,
        previous_options: Option<serde_json::Value>,
    ) -> Self {
        Operation {
            backend,
            kind: OpKind::Delete,
            store: store.into(),
            key: key.into(),
            value: None,
            previous_value,
            previous_options,
            committed: false,
        }
    }
}

/// A single transaction's worth of 2PC state (spec §3). Exclusively owned
/// by one logical caller flow; the coordinator borrows it for protocol
/// execution (spec §3 "Ownership").
#[derive(Debug)]
pub struct TransactionContext {
    /// Collision-resistant transaction id (spec §3).
    pub id: String,
    /// Enqueued operations, in enqueue order.
    pub operations: Vec<Operation>,
    /// True once every resource has voted yes in the prepare phase.
    pub prepared: bool,
    /// True once the commit marker has been durably written.
    pub journaled: bool,
    /// True once the commit phase has completed for every resource.
    pub committed: bool,
    /// True once a rollback has been driven to completion.
    pub rolled_back: bool,
    /// When collection began, for `TX_TIMEOUT` accounting.
    start_time: Instant,
}

impl TransactionContext {
    /// Construct an empty context with a fresh id.
    pub fn new() -> Self {
        TransactionContext {
            id: uuid::Uuid::new_v4().to_string(),
            operations: Vec::new(),
            prepared: false,
            journaled: false,
            committed: false,
            rolled_back: false,
            start_time: Instant::now(),
        }
    }

    /// Append `op`, enforcing `MAX_OPS` and the post-decision append lock
    /// (spec §3: "once any of committed/rolled_back is true, no further
    /// operations may be appended").
    pub fn enqueue(&mut self, op: Operation) -> Result<()> {
        if self.committed || self.rolled_back {
            return Err(Error::InvalidState(
                "cannot enqueue into a completed transaction".to_string(),
            ));
        }
        if self.operations.len() >= MAX_OPS {
            return Err(Error::MaxOperationsExceeded { max: MAX_OPS });
        }
        self.operations.push(op);
        Ok(())
    }

    /// Elapsed time since collection began.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    /// Reset every operation's `committed` flag and the phase booleans
    /// ahead of a retry, while preserving the operations and their
    /// pre-images (spec §4.3.2: "a retry resets per-operation committed
    /// flags but preserves the original operations and their pre-images").
    pub fn reset_for_retry(&mut self) {
        self.prepared = false;
        self.journaled = false;
        self.committed = false;
        self.rolled_back = false;
        for op in &mut self.operations {
            op.committed = false;
        }
    }

    /// Operations targeting `backend`, with their original indices.
    pub fn operations_for(&self, backend: Backend) -> impl Iterator<Item = (usize, &Operation)> {
        self.operations
            .iter()
            .enumerate()
            .filter(move |(_, op)| op.backend == backend)
    }
}

impl Default for TransactionContext {
    fn default() -> Self {
        TransactionContext::new()
    }
}
