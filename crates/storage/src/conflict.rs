//! Full record-level conflict detection (spec §4.2.4): `RecordStore`'s
//! public `detect_write_conflict(existing, incoming)`, which additionally
//! handles legacy (unstamped) records — a case the lower-level
//! `txstore_concurrency::detect_write_conflict` (pure vector-clock compare)
//! doesn't need to know about.

use txstore_concurrency::{ClockOrder, VectorClock};
use txstore_core::{is_stamped, writer_id, write_epoch, Record};

/// Which side should win.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    /// The record already stored wins; reject the incoming write.
    Existing,
    /// The incoming write wins; accept it.
    Incoming,
}

/// Outcome of comparing a stored record against an incoming write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictOutcome {
    /// True if the incoming write should be rejected.
    pub has_conflict: bool,
    /// Which side wins.
    pub winner: Winner,
    /// Stable reason tag, one of the strings in spec §4.2.4's table.
    pub reason: &'static str,
    /// True only for the `concurrent_update` case.
    pub is_concurrent: bool,
}

fn outcome(has_conflict: bool, winner: Winner, reason: &'static str, is_concurrent: bool) -> ConflictOutcome {
    ConflictOutcome {
        has_conflict,
        winner,
        reason,
        is_concurrent,
    }
}

/// Decide whether `incoming` may overwrite `existing` (`None` if the key is
/// new). Exactly mirrors spec §4.2.4's decision table.
pub fn detect_write_conflict(existing: Option<&Record>, incoming: &Record) -> ConflictOutcome {
    let existing = match existing {
        None => return outcome(false, Winner::Incoming, "new_record", false),
        Some(record) => record,
    };

    let existing_stamped = is_stamped(existing);
    let incoming_stamped = is_stamped(incoming);

    match (existing_stamped, incoming_stamped) {
        (false, false) => outcome(false, Winner::Incoming, "legacy_data", false),
        (true, false) => outcome(true, Winner::Existing, "incoming_legacy", false),
        (false, true) => outcome(false, Winner::Incoming, "existing_legacy", false),
        (true, true) => {
            let existing_clock = VectorClock::from_state(write_epoch(existing).unwrap_or_default());
            let incoming_clock = VectorClock::from_state(write_epoch(incoming).unwrap_or_default());
            let existing_writer = writer_id(existing).unwrap_or_default();
            let incoming_writer = writer_id(incoming).unwrap_or_default();

            match incoming_clock.compare(&existing_clock) {
                ClockOrder::Equal => outcome(false, Winner::Incoming, "same_epoch", false),
                ClockOrder::After => outcome(false, Winner::Incoming, "incoming_newer", false),
                ClockOrder::Before => outcome(true, Winner::Existing, "existing_newer", false),
                ClockOrder::Concurrent => {
                    // Lesser writer_id wins the tiebreak (spec §8 scenario 5).
                    if existing_writer < incoming_writer {
                        outcome(true, Winner::Existing, "concurrent_update", true)
                    } else {
                        outcome(false, Winner::Incoming, "concurrent_update", true)
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use txstore_core::stamp;

    fn rec(v: serde_json::Value) -> Record {
        v.as_object().unwrap().clone()
    }

    fn stamped(mut clock_pairs: Vec<(&str, u64)>, writer: &str) -> Record {
        let mut r = rec(json!({"key": "k"}));
        let mut snapshot = std::collections::BTreeMap::new();
        for (w, c) in clock_pairs.drain(..) {
            snapshot.insert(w.to_string(), c);
        }
        stamp(&mut r, &snapshot, writer);
        r
    }

    #[test]
    fn new_record_always_accepted() {
        let incoming = rec(json!({"key": "k"}));
        let out = detect_write_conflict(None, &incoming);
        assert!(!out.has_conflict);
        assert_eq!(out.reason, "new_record");
    }

    #[test]
    fn both_legacy_accepts_incoming() {
        let existing = rec(json!({"key": "k", "a": 1}));
        let incoming = rec(json!({"key": "k", "a": 2}));
        let out = detect_write_conflict(Some(&existing), &incoming);
        assert!(!out.has_conflict);
        assert_eq!(out.reason, "legacy_data");
    }

    #[test]
    fn only_existing_stamped_rejects_incoming_demotion() {
        let existing = stamped(vec![("p1", 1)], "p1");
        let incoming = rec(json!({"key": "k"}));
        let out = detect_write_conflict(Some(&existing), &incoming);
        assert!(out.has_conflict);
        assert_eq!(out.reason, "incoming_legacy");
        assert_eq!(out.winner, Winner::Existing);
    }

    #[test]
    fn only_incoming_stamped_accepts_it() {
        let existing = rec(json!({"key": "k"}));
        let incoming = stamped(vec![("p1", 1)], "p1");
        let out = detect_write_conflict(Some(&existing), &incoming);
        assert!(!out.has_conflict);
        assert_eq!(out.reason, "existing_legacy");
    }

    #[test]
    fn same_epoch_accepts_incoming() {
        let existing = stamped(vec![("p1", 1)], "p1");
        let incoming = stamped(vec![("p1", 1)], "p1");
        let out = detect_write_conflict(Some(&existing), &incoming);
        assert!(!out.has_conflict);
        assert_eq!(out.reason, "same_epoch");
    }

    #[test]
    fn incoming_newer_accepts_incoming() {
        let existing = stamped(vec![("p1", 1)], "p1");
        let incoming = stamped(vec![("p1", 2)], "p1");
        let out = detect_write_conflict(Some(&existing), &incoming);
        assert!(!out.has_conflict);
        assert_eq!(out.reason, "incoming_newer");
    }

    #[test]
    fn existing_newer_rejects_incoming() {
        let existing = stamped(vec![("p1", 2)], "p1");
        let incoming = stamped(vec![("p1", 1)], "p1");
        let out = detect_write_conflict(Some(&existing), &incoming);
        assert!(out.has_conflict);
        assert_eq!(out.reason, "existing_newer");
        assert_eq!(out.winner, Winner::Existing);
    }

    #[test]
    fn concurrent_update_ties_break_on_writer_id_lexicographically() {
        let existing = stamped(vec![("alpha", 1), ("beta", 0)], "alpha");
        let incoming = stamped(vec![("alpha", 0), ("beta", 1)], "beta");
        let out = detect_write_conflict(Some(&existing), &incoming);
        assert!(out.has_conflict);
        assert!(out.is_concurrent);
        assert_eq!(out.reason, "concurrent_update");
        assert_eq!(out.winner, Winner::Existing);

        // Reversed argument order dually accepts.
        let out2 = detect_write_conflict(Some(&incoming), &existing);
        assert!(!out2.has_conflict);
        assert!(out2.is_concurrent);
    }
}
