//! Migration chain: ordered upgrade steps plus the post-chain safety sweep
//! (spec §4.2.1).
//!
//! Grounded on the teacher's durability `RecoveryCoordinator` "plan then
//! execute" split (`recovery/coordinator.rs`): a migration run is planned
//! (which steps fall in `(old_version, new_version]`) before any step
//! executes, so a failure partway through never leaves the plan itself in
//! an inconsistent state — only the stores/indexes the executed prefix
//! created.

use std::sync::Arc;

use txstore_core::{Error, IndexDescriptor, Result, StoreDescriptor};

use crate::tables::StoreTables;

/// One numbered upgrade step. `apply` must be idempotent in "add store /
/// add index" terms: re-running it against a database already at or past
/// its version must be a no-op, because the safety sweep may invoke
/// `ensure_store` again for stores a step also declares.
#[derive(Clone)]
pub struct MigrationStep {
    /// The version this step upgrades *to* (i.e. it runs when
    /// `old_version < version <= current_version`).
    pub version: u32,
    /// Human-readable label for logging.
    pub label: &'static str,
    apply: Arc<dyn Fn(&StoreTables) -> Result<()> + Send + Sync>,
}

impl MigrationStep {
    /// Construct a step that runs `apply` against the live table set.
    pub fn new(
        version: u32,
        label: &'static str,
        apply: impl Fn(&StoreTables) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        MigrationStep {
            version,
            label,
            apply: Arc::new(apply),
        }
    }

    /// A step that does nothing but declare a store (the common case: most
    /// migrations just add a store and/or an index).
    pub fn declare_store(version: u32, label: &'static str, descriptor: StoreDescriptor) -> Self {
        MigrationStep::new(version, label, move |tables| {
            tables.ensure_store(descriptor.clone());
            Ok(())
        })
    }
}

impl std::fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationStep")
            .field("version", &self.version)
            .field("label", &self.label)
            .finish()
    }
}

/// Runs a sequence of [`MigrationStep`]s in ascending version order across
/// `(old_version, current_version]`, then a safety sweep over every
/// store this head version declares (covering additions made without an
/// explicit numbered step).
///
/// On a step failure, the chain aborts immediately and returns the error;
/// stores/indexes created by already-executed steps remain (that's the
/// "idempotent re-application" contract: a retried `init` will simply
/// re-run the same (no-op) `ensure_store` calls for what already exists).
/// The caller's recorded `old_version` is only advanced by the caller once
/// this returns `Ok`.
pub fn run_migrations(
    tables: &StoreTables,
    steps: &[MigrationStep],
    old_version: u32,
    current_version: u32,
    head_stores: &[StoreDescriptor],
) -> Result<()> {
    if current_version < old_version {
        return Err(Error::InvalidState(format!(
            "downgrade from {old_version} to {current_version} is undefined"
        )));
    }

    let mut applied: Vec<&MigrationStep> = steps
        .iter()
        .filter(|step| step.version > old_version && step.version <= current_version)
        .collect();
    applied.sort_by_key(|step| step.version);

    for step in applied {
        (step.apply)(tables)?;
    }

    // Safety sweep: every currently-declared store must exist, covering
    // additions made in the head version without an explicit step.
    for descriptor in head_stores {
        tables.ensure_store(descriptor.clone());
    }

    Ok(())
}

/// Declares a secondary index on an already-registered store, idempotently.
/// Used by steps that add an index to a store an earlier step created.
pub fn ensure_index(tables: &StoreTables, store: &str, index: IndexDescriptor) -> Result<()> {
    tables.ensure_index(store, index)
}
