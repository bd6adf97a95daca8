//! The opaque record map, write-epoch stamping/redaction helpers, and the
//! store/index descriptors consumed by `RecordStore` migrations.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A vector-clock snapshot as carried inside a stamped [`Record`]:
/// process id → monotonic counter. Lives here (rather than in
/// `txstore-concurrency`, which owns the live `VectorClock` type) so that
/// `txstore-core` stays dependency-free while still being able to describe
/// what a stamped record looks like.
pub type ClockSnapshot = BTreeMap<String, u64>;

/// A caller-supplied record: an opaque JSON object plus the two reserved
/// fields [`WRITE_EPOCH_FIELD`] and [`WRITER_ID_FIELD`]. Records lacking
/// both fields are "legacy" per the conflict-detection rules in
/// `txstore-concurrency`.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Reserved field carrying the vector-clock snapshot at write time.
pub const WRITE_EPOCH_FIELD: &str = "_write_epoch";

/// Reserved field carrying the id of the process that performed the write.
pub const WRITER_ID_FIELD: &str = "_writer_id";

/// Field/store name substrings that mark a value as sensitive. Operation
/// values touching a store or key matching one of these (case-insensitive)
/// are redacted before being persisted to the compensation log.
const SENSITIVE_SUBSTRINGS: [&str; 5] = ["token", "auth", "secret", "password", "credentials"];

/// Placeholder substituted for a sanitized value.
pub const REDACTED_MARKER: &str = "[REDACTED]";

/// True if `record` carries both reserved stamp fields.
pub fn is_stamped(record: &Record) -> bool {
    record.contains_key(WRITE_EPOCH_FIELD) && record.contains_key(WRITER_ID_FIELD)
}

/// Extract the write-epoch snapshot from a stamped record, if present and
/// well-formed.
pub fn write_epoch(record: &Record) -> Option<ClockSnapshot> {
    let value = record.get(WRITE_EPOCH_FIELD)?;
    serde_json::from_value(value.clone()).ok()
}

/// Extract the writer id from a stamped record, if present.
pub fn writer_id(record: &Record) -> Option<&str> {
    record.get(WRITER_ID_FIELD).and_then(|v| v.as_str())
}

/// Stamp `record` in place with the given write-epoch snapshot and writer
/// id, overwriting any previous stamp.
pub fn stamp(record: &mut Record, epoch: &ClockSnapshot, writer_id: &str) {
    record.insert(
        WRITE_EPOCH_FIELD.to_string(),
        serde_json::to_value(epoch).expect("ClockSnapshot is always serializable"),
    );
    record.insert(
        WRITER_ID_FIELD.to_string(),
        serde_json::Value::String(writer_id.to_string()),
    );
}

/// True if `name` (a store or key name) matches one of the sensitive
/// substrings, case-insensitively.
pub fn sanitize_key(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    SENSITIVE_SUBSTRINGS.iter().any(|needle| lower.contains(needle))
}

/// Redact `value` to [`REDACTED_MARKER`] if `store` or `key` is sensitive;
/// otherwise return a clone of `value` unchanged.
pub fn redact_sensitive(
    store: &str,
    key: &str,
    value: &serde_json::Value,
) -> serde_json::Value {
    if sanitize_key(store) || sanitize_key(key) {
        serde_json::Value::String(REDACTED_MARKER.to_string())
    } else {
        value.clone()
    }
}

/// Which of the three backend families an [`crate::record`]-touching
/// operation targets. Transactional resources are keyed by this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// The structured record store (typed stores with optional indexes).
    RecordStore,
    /// The string-keyed flat store.
    FlatStore,
    /// The credential/token custody store.
    CredentialStore,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Backend::RecordStore => "record_store",
            Backend::FlatStore => "flat_store",
            Backend::CredentialStore => "credential_store",
        };
        f.write_str(s)
    }
}

/// Error returned when parsing a [`Backend`] tag that doesn't match one of
/// the three known names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseBackendError(String);

impl fmt::Display for ParseBackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown backend tag: {}", self.0)
    }
}

impl std::error::Error for ParseBackendError {}

impl std::str::FromStr for Backend {
    type Err = ParseBackendError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "record_store" => Ok(Backend::RecordStore),
            "flat_store" => Ok(Backend::FlatStore),
            "credential_store" => Ok(Backend::CredentialStore),
            other => Err(ParseBackendError(other.to_string())),
        }
    }
}

/// Declares a single secondary index on a [`StoreDescriptor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescriptor {
    /// Index name (unique within its store).
    pub name: String,
    /// Field the index is built over.
    pub key_path: String,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

impl IndexDescriptor {
    /// Construct a non-unique index descriptor.
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        IndexDescriptor {
            name: name.into(),
            key_path: key_path.into(),
            unique: false,
        }
    }

    /// Construct a unique index descriptor.
    pub fn unique(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        IndexDescriptor {
            name: name.into(),
            key_path: key_path.into(),
            unique: true,
        }
    }
}

/// Declares a named, keyed store and its secondary indexes. Set at
/// migration time only; never mutated thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreDescriptor {
    /// Store name, unique within the `RecordStore`.
    pub name: String,
    /// Field serving as the primary key.
    pub key_path: String,
    /// Declared secondary indexes.
    pub indexes: Vec<IndexDescriptor>,
}

impl StoreDescriptor {
    /// Construct a store descriptor with no secondary indexes.
    pub fn new(name: impl Into<String>, key_path: impl Into<String>) -> Self {
        StoreDescriptor {
            name: name.into(),
            key_path: key_path.into(),
            indexes: Vec::new(),
        }
    }

    /// Add a secondary index, builder-style.
    pub fn with_index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }

    /// Look up a declared index by name.
    pub fn index(&self, name: &str) -> Option<&IndexDescriptor> {
        self.indexes.iter().find(|i| i.name == name)
    }
}
