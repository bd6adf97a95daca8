//! The external event-broadcasting collaborator.
//!
//! The storage core never consumes events, only publishes them: lifecycle
//! notices (connection established/retried/failed/blocked, fallback
//! activation), error notices, and transaction-protocol notices
//! (compensation needed, fatal error/cleared, partial commit). Topic names
//! match the wire format in the design's event table exactly so a consumer
//! subscribing by string is not surprised.

use serde_json::Value;

/// `storage:connection_established`
pub const TOPIC_CONNECTION_ESTABLISHED: &str = "storage:connection_established";
/// `storage:connection_retry`
pub const TOPIC_CONNECTION_RETRY: &str = "storage:connection_retry";
/// `storage:connection_failed`
pub const TOPIC_CONNECTION_FAILED: &str = "storage:connection_failed";
/// `storage:connection_blocked`
pub const TOPIC_CONNECTION_BLOCKED: &str = "storage:connection_blocked";
/// `storage:fallback_activated`
pub const TOPIC_FALLBACK_ACTIVATED: &str = "storage:fallback_activated";
/// `storage:error`
pub const TOPIC_STORAGE_ERROR: &str = "storage:error";
/// `storage:compensation_needed`
pub const TOPIC_COMPENSATION_NEEDED: &str = "storage:compensation_needed";
/// `storage:compensation_log_in_memory`
pub const TOPIC_COMPENSATION_LOG_IN_MEMORY: &str = "storage:compensation_log_in_memory";
/// `transaction:fatal_error`
pub const TOPIC_FATAL_ERROR: &str = "transaction:fatal_error";
/// `transaction:fatal_cleared`
pub const TOPIC_FATAL_CLEARED: &str = "transaction:fatal_cleared";
/// `transaction:partial_commit`
pub const TOPIC_PARTIAL_COMMIT: &str = "transaction:partial_commit";

/// The event-broadcasting contract consumed by the storage core. Any
/// caller-supplied sink (UI toast pipe, telemetry forwarder, no-op) can
/// implement this; the core only ever calls `publish`.
pub trait EventSink: Send + Sync {
    /// Publish `payload` under `topic`. Implementations must not block the
    /// caller indefinitely; a slow/unbounded sink is the embedder's
    /// problem, not the storage core's.
    fn publish(&self, topic: &str, payload: Value);
}

/// A sink that drops every event. Used as the default when no sink is
/// wired, and in tests that don't care about the event stream.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn publish(&self, _topic: &str, _payload: Value) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct RecordingSink(Arc<Mutex<Vec<(String, Value)>>>);

    impl EventSink for RecordingSink {
        fn publish(&self, topic: &str, payload: Value) {
            self.0.lock().unwrap().push((topic.to_string(), payload));
        }
    }

    #[test]
    fn noop_sink_accepts_any_event() {
        let sink = NoopEventSink;
        sink.publish(TOPIC_STORAGE_ERROR, serde_json::json!({"x": 1}));
    }

    #[test]
    fn recording_sink_preserves_topic_and_payload() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = RecordingSink(log.clone());
        sink.publish(TOPIC_FALLBACK_ACTIVATED, serde_json::json!({"mode": "memory"}));
        let entries = log.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, TOPIC_FALLBACK_ACTIVATED);
    }
}
