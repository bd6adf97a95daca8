//! Shared types, error model, and constants for the txstore transactional core.
//!
//! This crate is the dependency-free leaf of the workspace: every other
//! crate (`txstore-concurrency`, `txstore-storage`, `txstore-durability`,
//! `txstore-engine`, `txstore-primitives`, `txstore-api`) depends on it, it
//! depends on none of them.
//!
//! What lives here:
//! - [`error::Error`] — the unified error type surfaced across the facade
//! - [`constants`] — every tunable named in the design (timeouts, caps,
//!   backoff schedules), all overridable via `StorageCoreConfig` upstream
//! - [`record`] — the opaque record map, write-epoch stamping, redaction,
//!   and store/index descriptors used by migrations
//! - [`event`] — the external event sink contract and topic payloads

#![warn(missing_docs)]

pub mod constants;
pub mod error;
pub mod event;
pub mod record;

pub use error::{Error, PartialCommitSummary, PrepareFailure, Result};
pub use record::{
    is_stamped, redact_sensitive, sanitize_key, stamp, writer_id, write_epoch, Backend,
    ClockSnapshot, IndexDescriptor, ParseBackendError, Record, StoreDescriptor, REDACTED_MARKER,
    WRITER_ID_FIELD, WRITE_EPOCH_FIELD,
};
pub use event::{
    EventSink, NoopEventSink, TOPIC_COMPENSATION_LOG_IN_MEMORY, TOPIC_COMPENSATION_NEEDED,
    TOPIC_CONNECTION_BLOCKED, TOPIC_CONNECTION_ESTABLISHED, TOPIC_CONNECTION_FAILED,
    TOPIC_CONNECTION_RETRY, TOPIC_FALLBACK_ACTIVATED, TOPIC_FATAL_CLEARED, TOPIC_FATAL_ERROR,
    TOPIC_PARTIAL_COMMIT, TOPIC_STORAGE_ERROR,
};
