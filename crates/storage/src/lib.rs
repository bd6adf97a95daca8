//! The structured record-store engine: connection lifecycle, migrations,
//! transaction pool, write-authority gate, conflict detection, and the
//! fallback engine activated when the primary is unavailable (spec §4.2).
//!
//! Module map:
//! - [`tables`] — in-process row storage backing the primary engine
//! - [`migration`] — ordered upgrade steps + safety sweep
//! - [`pool`] — at most one pooled transaction per `(store, mode)`
//! - [`write_authority`] — the external write-authority contract
//! - [`conflict`] — full record-level `detect_write_conflict`
//! - [`fallback`] — the secondary engine used when the primary is down
//! - [`record_store`] — `RecordStore` itself, tying the above together

pub mod conflict;
pub mod fallback;
pub mod migration;
pub mod pool;
pub mod record_store;
pub mod tables;
pub mod write_authority;

pub use conflict::{detect_write_conflict, ConflictOutcome, Winner};
pub use fallback::FallbackEngine;
pub use migration::{ensure_index, run_migrations, MigrationStep};
pub use pool::{PooledTransaction, TransactionPool, TxMode};
pub use record_store::{
    AlwaysConnect, ConnectOutcome, Connector, Direction, InitRetryOptions, PutOptions,
    RecordStore, TransactionHandle, WriteOptions,
};
pub use tables::{StoreTable, StoreTables};
pub use write_authority::{AlwaysAllow, AlwaysDeny, AuthorityMode, ExemptStores, Togglable, WriteAuthority};
