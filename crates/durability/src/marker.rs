//! [`CommitMarker`]: the durable decision record written at the 2PC commit
//! point (spec §3, §4.3.1). Its presence at startup means the transaction
//! had crossed the point of no return; its absence means it had not.
//!
//! Grounded on the teacher's durability `wal/writer.rs`
//! durability-point-first ordering: the marker write must complete before
//! the coordinator proceeds to the commit phase, exactly as the WAL write
//! must complete before a commit is considered durable there.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use txstore_core::Result;

/// Which half of the decision this marker records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    /// All resources voted yes; the decision has not yet been acted on.
    Prepared,
    /// The coordinator has begun the commit phase.
    Committing,
}

/// The durable record of a transaction having crossed the decision point.
/// Deliberately does not carry the transaction's operations (spec §9: "a
/// redo log would be strictly stronger but was explicitly out of scope
/// here") — recovery of a stale marker is detection, not redo.
#[derive(Debug, Clone)]
pub struct CommitMarker {
    /// The transaction this marker belongs to.
    pub transaction_id: String,
    /// Prepared vs. committing.
    pub state: MarkerState,
    /// How many operations the transaction carries, for diagnostics.
    pub operation_count: usize,
    /// When this marker was journaled.
    pub journal_time: DateTime<Utc>,
}

impl CommitMarker {
    /// Age of this marker relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.journal_time
    }
}

/// The durable store backing the commit-marker journal. The real backing
/// store is the record store (spec §4.3.1); this trait keeps the
/// coordinator decoupled from which concrete backend provides durability,
/// matching spec §9's "model as explicit singletons... expose only named
/// operations" guidance applied to storage rather than in-process state.
pub trait JournalStore: Send + Sync {
    /// Durably persist `marker`, overwriting any marker for the same
    /// transaction id.
    fn write(&self, marker: CommitMarker) -> Result<()>;
    /// Remove the marker for `transaction_id`, if present. Not finding one
    /// to remove is not an error (cleanup is idempotent).
    fn remove(&self, transaction_id: &str) -> Result<()>;
    /// Every marker currently journaled, for `recover_from_journal` to
    /// scan at startup.
    fn list(&self) -> Result<Vec<CommitMarker>>;
}

/// Default in-process journal store: a concurrent map standing in for the
/// record store's `TRANSACTION_JOURNAL` table in embedders that don't wire
/// a real one (see `SPEC_FULL.md`'s ambient-stack note on test tooling).
#[derive(Debug, Default)]
pub struct InMemoryJournalStore {
    markers: DashMap<String, CommitMarker>,
}

impl InMemoryJournalStore {
    /// Construct an empty journal.
    pub fn new() -> Self {
        InMemoryJournalStore::default()
    }
}

impl JournalStore for InMemoryJournalStore {
    fn write(&self, marker: CommitMarker) -> Result<()> {
        self.markers.insert(marker.transaction_id.clone(), marker);
        Ok(())
    }

    fn remove(&self, transaction_id: &str) -> Result<()> {
        self.markers.remove(transaction_id);
        Ok(())
    }

    fn list(&self) -> Result<Vec<CommitMarker>> {
        Ok(self.markers.iter().map(|e| e.value().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_list_round_trips() {
        let journal = InMemoryJournalStore::new();
        journal
            .write(CommitMarker {
                transaction_id: "t1".into(),
                state: MarkerState::Prepared,
                operation_count: 2,
                journal_time: Utc::now(),
            })
            .unwrap();
        let markers = journal.list().unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].transaction_id, "t1");
    }

    #[test]
    fn remove_is_idempotent() {
        let journal = InMemoryJournalStore::new();
        journal.remove("ghost").unwrap();
        journal
            .write(CommitMarker {
                transaction_id: "t1".into(),
                state: MarkerState::Committing,
                operation_count: 1,
                journal_time: Utc::now(),
            })
            .unwrap();
        journal.remove("t1").unwrap();
        journal.remove("t1").unwrap();
        assert!(journal.list().unwrap().is_empty());
    }

    #[test]
    fn age_reflects_elapsed_time() {
        let marker = CommitMarker {
            transaction_id: "t1".into(),
            state: MarkerState::Prepared,
            operation_count: 0,
            journal_time: Utc::now() - chrono::Duration::minutes(10),
        };
        assert!(marker.age(Utc::now()) >= chrono::Duration::minutes(9));
    }
}
