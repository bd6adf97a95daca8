//! Error types for txstore.
//!
//! `Error` is the single unified error type surfaced across the facade.
//! We use `thiserror` for `Display`/`std::error::Error` and keep enough
//! structured context on each variant (sub-reason lists, by-backend
//! summaries) that callers can act on a failure without re-parsing a
//! message string.

use std::collections::HashMap;
use thiserror::Error;

/// Result type alias used throughout txstore.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the transactional storage core.
#[derive(Debug, Error)]
pub enum Error {
    /// A write was attempted against a non-exempt store while the
    /// write-authority collaborator denied it, in strict mode.
    #[error("write authority denied for store '{store}'")]
    WriteAuthorityDenied {
        /// Store the write targeted.
        store: String,
    },

    /// `run`/`begin` was called while a transaction was already active on
    /// the same logical flow.
    #[error("nested transactions are not supported (current depth {depth})")]
    NestedNotSupported {
        /// Depth at the time of the rejected call.
        depth: usize,
        /// Transaction ids currently on the nested-transaction stack.
        stack: Vec<String>,
    },

    /// The process-wide fatal latch is set; no new transactions may start.
    #[error("storage core is in a fatal state: {reason}")]
    FatalState {
        /// Reason recorded when the latch was entered.
        reason: String,
    },

    /// A transaction enqueued more than `MAX_OPS` operations.
    #[error("transaction exceeded the maximum of {max} operations")]
    MaxOperationsExceeded {
        /// The configured cap.
        max: usize,
    },

    /// A resource voted no during the prepare phase.
    #[error("prepare failed: {0:?}")]
    PrepareFailed(Vec<PrepareFailure>),

    /// The collection-phase callback exceeded its timeout.
    #[error("callback phase timed out")]
    CallbackTimeout,

    /// The prepare phase exceeded its timeout.
    #[error("prepare phase timed out")]
    PrepareTimeout,

    /// The commit phase exceeded its timeout.
    #[error("commit phase timed out")]
    CommitTimeout,

    /// All retries of the commit phase were exhausted and the transaction
    /// is left partially committed.
    #[error("partial commit after retries: {summary:?}")]
    PartialCommitAfterRetries {
        /// By-backend counts and per-operation diagnostics.
        summary: PartialCommitSummary,
    },

    /// One or more rollback steps failed; a compensation log entry was
    /// (or was attempted to be) persisted.
    #[error("rollback incomplete for transaction {tx_id}: {failed_count} operation(s) failed to undo")]
    RollbackIncomplete {
        /// Transaction whose rollback did not fully complete.
        tx_id: String,
        /// Number of operations that could not be undone.
        failed_count: usize,
    },

    /// `RecordStore::init` exhausted its retry budget and fallback is
    /// disabled (or unavailable).
    #[error("connection unavailable after {attempts} attempt(s): {cause}")]
    ConnectionUnavailable {
        /// Number of attempts made.
        attempts: u32,
        /// Underlying cause.
        cause: String,
    },

    /// The requested store or index was never declared by a migration.
    #[error("unknown store or index: {0}")]
    NotFound(String),

    /// A conflicting concurrent write was detected and the incoming write
    /// lost (see `detect_write_conflict`).
    #[error("write conflict on '{store}'/'{key}': {reason}")]
    Conflict {
        /// Store the conflicting write targeted.
        store: String,
        /// Key the conflicting write targeted.
        key: String,
        /// Human-readable reason tag (`concurrent_update`, `existing_newer`, ...).
        reason: String,
    },

    /// An operation was attempted against a `TransactionContext` after it
    /// had already committed or rolled back, or some other state-machine
    /// invariant was violated.
    #[error("invalid transaction state: {0}")]
    InvalidState(String),

    /// A primitive backend request did not complete within `OP_TIMEOUT`.
    #[error("operation timed out after {0:?}")]
    OperationTimeout(std::time::Duration),

    /// Lower-level I/O failure from a backend implementation.
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization failure (commit markers, compensation
    /// entries, record maps).
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Catch-all for backend-specific failures that do not map onto a more
    /// specific variant above.
    #[error("backend error: {0}")]
    Backend(String),
}

impl Error {
    /// True if this error represents a transient condition the transaction
    /// level should retry (as opposed to quota exhaustion, invalid state,
    /// or the fatal latch, which must not be retried).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Backend(_)
                | Error::Io(_)
                | Error::CommitTimeout
                | Error::PrepareTimeout
                | Error::OperationTimeout(_)
        )
    }

    /// True if this is a write-conflict error (useful for metrics/logging).
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// True if this error means the process is now latched into a fatal
    /// state and requires operator intervention.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::FatalState { .. })
    }
}

/// One resource's vote-no reason during the prepare phase.
#[derive(Debug, Clone)]
pub struct PrepareFailure {
    /// Which resource rejected prepare (`record_store`, `flat_store`,
    /// `credential_store`, or a caller-supplied resource's name).
    pub resource: String,
    /// Why it rejected.
    pub reason: String,
}

/// By-backend counts and per-operation diagnostics for a partially
/// committed transaction, surfaced on `partial_commit_after_retries`.
#[derive(Debug, Clone, Default)]
pub struct PartialCommitSummary {
    /// Operations that successfully committed, by backend tag.
    pub succeeded_by_backend: HashMap<String, usize>,
    /// Operations that failed to commit, by backend tag.
    pub failed_by_backend: HashMap<String, usize>,
    /// Total operations in the transaction.
    pub total: usize,
    /// Free-form diagnostic lines, one per failed operation.
    pub diagnostics: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification_matches_retry_policy() {
        assert!(Error::Backend("x".into()).is_transient());
        assert!(!Error::MaxOperationsExceeded { max: 100 }.is_transient());
        assert!(!Error::FatalState { reason: "x".into() }.is_transient());
        assert!(!Error::InvalidState("x".into()).is_transient());
    }

    #[test]
    fn fatal_and_conflict_classification() {
        assert!(Error::FatalState { reason: "x".into() }.is_fatal());
        assert!(!Error::Backend("x".into()).is_fatal());
        assert!(Error::Conflict {
            store: "s".into(),
            key: "k".into(),
            reason: "concurrent_update".into()
        }
        .is_conflict());
    }
}
