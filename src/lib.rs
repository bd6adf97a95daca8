//! # txstore
//!
//! A client-side transactional storage core that provides atomic, durable,
//! crash-safe updates across multiple heterogeneous storage backends (a
//! structured record store, a string-keyed flat store, and a credential
//! store) sharing a single process.
//!
//! The underlying primitives each have different atomicity guarantees,
//! different failure modes, and different availability, yet callers need
//! the abstraction of a single transaction that either fully commits or
//! fully rolls back. `txstore` supplies that abstraction via a two-phase
//! commit coordinator, a durable compensation log for rollback failures,
//! and vector-clock-based conflict detection for concurrent writers.
//!
//! # Quick start
//!
//! ```no_run
//! use txstore::{StorageCoreBuilder, Backend, Operation};
//! use txstore_storage::migration::MigrationStep;
//! use txstore_core::StoreDescriptor;
//! use serde_json::json;
//!
//! # async fn run() -> txstore::Result<()> {
//! let core = StorageCoreBuilder::new("node-1", 1)
//!     .migration_step(MigrationStep::declare_store(
//!         1,
//!         "v1",
//!         StoreDescriptor::new("widgets", "id"),
//!     ))
//!     .build()?;
//!
//! let outcome = core
//!     .run(|ctx| async move {
//!         ctx.enqueue(Operation::put(
//!             Backend::RecordStore,
//!             "widgets",
//!             "w1",
//!             json!({"id": "w1", "name": "gizmo"}),
//!             None,
//!             None,
//!         ))?;
//!         Ok(())
//!     })
//!     .await?;
//!
//! assert!(outcome.success);
//! # Ok(())
//! # }
//! ```
//!
//! # Components
//!
//! | Component | Responsibility |
//! |---|---|
//! | [`txstore_concurrency`] | Vector clocks and write-conflict resolution |
//! | [`txstore_storage`] | Record store engine: connections, migrations, pool, fallback |
//! | [`txstore_durability`] | Commit marker journal and three-tier compensation log |
//! | [`txstore_engine`] | Two-phase commit coordinator, nested-tx guard, fatal latch |
//! | [`txstore_primitives`] | Flat/credential store reference implementations and resource adapters |
//! | [`txstore_api`] | The [`StorageCore`] facade and builder |
//!
//! Only the facade types re-exported here are meant to be the stable public
//! surface for embedders; the subsystem crates are exposed for advanced use
//! (custom `TransactionalResource` implementations, alternate backends) but
//! their internals may shift independently.

pub use txstore_api::*;
pub use txstore_core::{Backend, Error, Record, Result, StoreDescriptor};
pub use txstore_engine::context::Operation;

pub use txstore_concurrency as concurrency;
pub use txstore_core as core;
pub use txstore_durability as durability;
pub use txstore_engine as engine;
pub use txstore_primitives as primitives;
pub use txstore_storage as storage;
