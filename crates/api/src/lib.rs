//! `txstore-api`: the embedder-facing facade over the two-phase commit
//! coordinator, the record/flat/credential backend resources, and the
//! durability layer underneath them (spec §6 "Quick Start").
//!
//! ```ignore
//! use txstore_api::StorageCoreBuilder;
//!
//! let core = StorageCoreBuilder::new("node-1", 1).build()?;
//! core.run(|ctx| async move {
//!     // enqueue operations via ctx.enqueue(...)
//!     Ok(())
//! }).await?;
//! ```

#![warn(missing_docs)]

pub mod builder;
pub mod config;
pub mod metrics;
pub mod storage_core;
pub mod tx_handle;

pub use builder::StorageCoreBuilder;
pub use config::StorageCoreConfig;
pub use metrics::{Metrics, MetricsSnapshot};
pub use storage_core::StorageCore;
pub use tx_handle::TxHandle;

pub use txstore_core::{Error, Result};
pub use txstore_engine::coordinator::RunOutcome;
