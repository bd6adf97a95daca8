//! [`FatalState`]: the process-wide latch entered when all compensation
//! tiers fail to persist a rollback failure (spec §3, §4.3.3, P4).
//!
//! Grounded on the teacher's `concurrency/manager.rs` commit-sequence doc
//! comment style of naming the exact invariant guarded by a lock, applied
//! here to spec §9's "model as explicit singletons... expose only named
//! operations" guidance for process-wide mutable state.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Snapshot of why the latch was entered.
#[derive(Debug, Clone, PartialEq)]
pub struct FatalInfo {
    /// Operator-facing reason.
    pub reason: String,
    /// The transaction whose rollback failure triggered the latch, if any.
    pub transaction_id: Option<String>,
    /// Number of compensation entries outstanding at latch time.
    pub compensation_count: usize,
    /// When the latch was entered.
    pub timestamp: DateTime<Utc>,
}

/// Process-wide latch blocking all new transactions once entered (spec
/// P4: "once fatal is latched, every subsequent run/begin fails fast;
/// `clear_fatal_state` unlatches exactly once"). Reads are lock-free in
/// spirit (a cheap `RwLock` read guard); writes go only through
/// [`FatalState::enter`] and [`FatalState::clear`].
#[derive(Debug, Default)]
pub struct FatalState {
    inner: RwLock<Option<FatalInfo>>,
}

impl FatalState {
    /// Construct an unlatched state.
    pub fn new() -> Self {
        FatalState::default()
    }

    /// True if the latch is currently set.
    pub fn is_fatal(&self) -> bool {
        self.inner.read().is_some()
    }

    /// The current latch info, if set.
    pub fn info(&self) -> Option<FatalInfo> {
        self.inner.read().clone()
    }

    /// Latch the state. Idempotent: entering while already latched
    /// overwrites the recorded info (the newest failure is the one worth
    /// surfacing to an operator).
    pub fn enter(&self, reason: impl Into<String>, transaction_id: Option<String>, compensation_count: usize) {
        *self.inner.write() = Some(FatalInfo {
            reason: reason.into(),
            transaction_id,
            compensation_count,
            timestamp: Utc::now(),
        });
    }

    /// Clear the latch. Returns `true` if it had been set (an operator
    /// clearing an already-clear latch is a no-op, not an error).
    pub fn clear(&self, _reason: impl Into<String>) -> bool {
        self.inner.write().take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unlatched() {
        let state = FatalState::new();
        assert!(!state.is_fatal());
        assert!(state.info().is_none());
    }

    #[test]
    fn enter_then_clear_round_trips() {
        let state = FatalState::new();
        state.enter("rollback failed", Some("tx1".into()), 1);
        assert!(state.is_fatal());
        assert_eq!(state.info().unwrap().transaction_id.as_deref(), Some("tx1"));

        assert!(state.clear("operator ack"));
        assert!(!state.is_fatal());
    }

    #[test]
    fn clearing_an_unlatched_state_is_a_harmless_no_op() {
        let state = FatalState::new();
        assert!(!state.clear("nothing to clear"));
    }

    #[test]
    fn re_entering_overwrites_with_latest_reason() {
        let state = FatalState::new();
        state.enter("first", Some("tx1".into()), 1);
        state.enter("second", Some("tx2".into()), 2);
        let info = state.info().unwrap();
        assert_eq!(info.reason, "second");
        assert_eq!(info.transaction_id.as_deref(), Some("tx2"));
    }
}
