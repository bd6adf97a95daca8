//! Write-conflict detection: should an incoming write, whose author read
//! the store at some prior clock, be allowed to overwrite what is stored
//! now?

use crate::clock::{ClockOrder, VectorClock};

/// Why a write was rejected (or would have been, had the caller asked).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictReason {
    /// The stored record's write-epoch strictly dominates the incoming
    /// write's base clock: the writer read stale data.
    ExistingNewer,
    /// Neither clock dominates the other; the incoming writer lost the
    /// deterministic tiebreak (lower or equal `writer_id`, lexicographically).
    ConcurrentUpdate,
}

impl ConflictReason {
    /// The stable tag used in [`txstore_core::Error::Conflict`] and
    /// compensation-log entries.
    pub fn tag(&self) -> &'static str {
        match self {
            ConflictReason::ExistingNewer => "existing_newer",
            ConflictReason::ConcurrentUpdate => "concurrent_update",
        }
    }
}

/// The outcome of comparing an incoming write against what is currently
/// stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// No existing record, or the incoming write strictly dominates (or
    /// equals) it: accept the write.
    Accept,
    /// Reject the write; the caller should surface [`Error::Conflict`]
    /// with the given reason.
    ///
    /// [`Error::Conflict`]: txstore_core::Error::Conflict
    Reject(ConflictReason),
}

impl ConflictResolution {
    /// True if the write should proceed.
    pub fn is_accept(&self) -> bool {
        matches!(self, ConflictResolution::Accept)
    }
}

/// Decide whether an incoming write may overwrite the currently stored
/// record.
///
/// `existing` is the stored record's write-epoch and writer id, or `None`
/// if the key does not yet exist (always accepted). `incoming` is the
/// write-epoch the incoming writer computed *before* this write (its last
/// observed clock, merged with its own tick), and `incoming_writer` is its
/// writer id.
///
/// Concurrent writes (neither clock dominates the other — two writers who
/// never observed each other's update) are resolved deterministically by
/// comparing `writer_id`s lexicographically: the lesser id wins. This
/// keeps the resolution a pure function of the two records rather than of
/// arrival order, so replaying the same pair of writes in any order (e.g.
/// during recovery) reaches the same outcome.
pub fn detect_write_conflict(
    existing: Option<(&VectorClock, &str)>,
    incoming: &VectorClock,
    incoming_writer: &str,
) -> ConflictResolution {
    let (existing_clock, existing_writer) = match existing {
        None => return ConflictResolution::Accept,
        Some(pair) => pair,
    };

    match incoming.compare(existing_clock) {
        ClockOrder::After | ClockOrder::Equal => ConflictResolution::Accept,
        ClockOrder::Before => ConflictResolution::Reject(ConflictReason::ExistingNewer),
        ClockOrder::Concurrent => {
            if incoming_writer < existing_writer {
                ConflictResolution::Accept
            } else {
                ConflictResolution::Reject(ConflictReason::ConcurrentUpdate)
            }
        }
    }
}
