//! The two-phase commit engine: [`TransactionContext`], the
//! [`TransactionalResource`] capability set, the [`TransactionCoordinator`]
//! that drives both through prepare/decision/commit/cleanup/rollback, and
//! the process-wide [`FatalState`] and [`NestedTxStack`] singletons that
//! guard reentrancy and total-failure escalation (spec §3, §4.3).
//!
//! Backend adapters (record store, flat store, credential store) live one
//! layer up in `txstore-primitives`, which implements
//! [`TransactionalResource`] against the concrete backends in
//! `txstore-storage`.

#![warn(missing_docs)]

pub mod context;
pub mod coordinator;
pub mod fatal;
pub mod nested;
pub mod recovery;
pub mod resource;

pub use context::{OpKind, Operation, TransactionContext};
pub use coordinator::{CoordinatorConfig, RunOutcome, TransactionCoordinator};
pub use fatal::{FatalInfo, FatalState};
pub use nested::{NestedGuard, NestedTxStack};
pub use recovery::{recover_from_journal, RecoveredMarker, RecoveryReport};
pub use resource::{PendingPredicate, ResourceFuture, TransactionalResource};
