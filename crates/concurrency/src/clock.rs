//! [`VectorClock`]: a per-writer monotonic counter map and the
//! happens-before relation over it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use txstore_core::ClockSnapshot;

/// The result of comparing two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockOrder {
    /// `self` happened strictly before `other`: every counter in `self` is
    /// `<=` the matching counter in `other`, and at least one is strictly
    /// less.
    Before,
    /// `self` happened strictly after `other` (the mirror of `Before`).
    After,
    /// The two clocks carry identical counters for every writer.
    Equal,
    /// Neither dominates the other — the writes are concurrent and a
    /// conflict-resolution policy must decide.
    Concurrent,
}

/// A vector clock: one monotonic counter per writer process. Clocks are
/// compared structurally — two clocks with the same counters are equal
/// regardless of which process holds the live copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    counters: BTreeMap<String, u64>,
}

impl VectorClock {
    /// A clock with every counter at zero.
    pub fn new() -> Self {
        VectorClock::default()
    }

    /// Rebuild a clock from a previously captured [`ClockSnapshot`] (e.g.
    /// the write-epoch field of a stamped record).
    pub fn from_state(snapshot: ClockSnapshot) -> Self {
        VectorClock { counters: snapshot }
    }

    /// Capture this clock's current state as a plain snapshot, suitable
    /// for stamping a record or persisting.
    pub fn snapshot(&self) -> ClockSnapshot {
        self.counters.clone()
    }

    /// This writer's current counter value, without advancing it.
    pub fn peek(&self, writer_id: &str) -> u64 {
        self.counters.get(writer_id).copied().unwrap_or(0)
    }

    /// Advance `writer_id`'s counter by one and return the new value.
    /// Writers not yet present start at zero and tick to one.
    pub fn tick(&mut self, writer_id: &str) -> u64 {
        let counter = self.counters.entry(writer_id.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Merge `other` into `self`, taking the per-writer maximum of each,
    /// then tick `writer_id`'s own counter once to record the receive-event
    /// itself. Returns the new value of `writer_id`'s counter.
    pub fn merge(&mut self, other: &VectorClock, writer_id: &str) -> u64 {
        for (writer, &count) in &other.counters {
            let entry = self.counters.entry(writer.clone()).or_insert(0);
            if count > *entry {
                *entry = count;
            }
        }
        self.tick(writer_id)
    }

    /// Compare `self` against `other` under the happens-before relation.
    pub fn compare(&self, other: &VectorClock) -> ClockOrder {
        let mut self_ahead = false;
        let mut other_ahead = false;

        let writers = self.counters.keys().chain(other.counters.keys());
        for writer in writers {
            let mine = self.peek(writer);
            let theirs = other.peek(writer);
            match mine.cmp(&theirs) {
                std::cmp::Ordering::Greater => self_ahead = true,
                std::cmp::Ordering::Less => other_ahead = true,
                std::cmp::Ordering::Equal => {}
            }
        }

        match (self_ahead, other_ahead) {
            (false, false) => ClockOrder::Equal,
            (true, false) => ClockOrder::After,
            (false, true) => ClockOrder::Before,
            (true, true) => ClockOrder::Concurrent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_clocks_are_equal() {
        let a = VectorClock::new();
        let b = VectorClock::new();
        assert_eq!(a.compare(&b), ClockOrder::Equal);
    }

    #[test]
    fn tick_advances_only_the_named_writer() {
        let mut clock = VectorClock::new();
        assert_eq!(clock.tick("p1"), 1);
        assert_eq!(clock.tick("p1"), 2);
        assert_eq!(clock.peek("p1"), 2);
        assert_eq!(clock.peek("p2"), 0);
    }

    #[test]
    fn ticking_makes_the_clock_strictly_after_its_former_self() {
        let mut clock = VectorClock::new();
        let before = clock.clone();
        clock.tick("p1");
        assert_eq!(clock.compare(&before), ClockOrder::After);
        assert_eq!(before.compare(&clock), ClockOrder::Before);
    }

    #[test]
    fn independent_ticks_are_concurrent() {
        let mut a = VectorClock::new();
        a.tick("p1");
        let mut b = VectorClock::new();
        b.tick("p2");
        assert_eq!(a.compare(&b), ClockOrder::Concurrent);
    }

    #[test]
    fn merge_takes_the_per_writer_maximum_then_ticks_self() {
        let mut a = VectorClock::new();
        a.tick("p1");
        a.tick("p1");
        let mut b = VectorClock::new();
        b.tick("p1");
        b.tick("p2");

        a.merge(&b, "p1");
        assert_eq!(a.peek("p1"), 3);
        assert_eq!(a.peek("p2"), 1);
    }

    #[test]
    fn merge_result_is_strictly_after_the_remote_clock() {
        // P6: if X is derived from Y only via merge(Y), compare(Y, X) = before.
        let mut remote = VectorClock::new();
        remote.tick("beta");

        let mut local = VectorClock::new();
        local.merge(&remote, "alpha");

        assert_eq!(remote.compare(&local), ClockOrder::Before);
    }

    #[test]
    fn from_state_round_trips_through_snapshot() {
        let mut clock = VectorClock::new();
        clock.tick("p1");
        clock.tick("p2");
        let restored = VectorClock::from_state(clock.snapshot());
        assert_eq!(restored, clock);
    }
}
