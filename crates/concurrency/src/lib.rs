//! Vector clocks and write-conflict detection.
//!
//! Every stamped [`txstore_core::Record`] carries a write-epoch: a vector
//! clock snapshot recording, per writer process, how many writes that
//! process had issued at the moment it wrote the record. `RecordStore`
//! consults [`detect_write_conflict`] before accepting a write whose base
//! clock does not dominate the stored record's clock.

pub mod clock;
pub mod conflict;

pub use clock::{ClockOrder, VectorClock};
pub use conflict::{detect_write_conflict, ConflictReason, ConflictResolution};
