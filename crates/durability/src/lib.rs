//! Durable bookkeeping for the two-phase commit coordinator: the commit
//! marker journal and the multi-tier compensation log (spec §4.3.1, §4.3.4).
//!
//! This crate deliberately does not depend on `txstore-storage` — the
//! concrete record-store-backed and flat-store-backed tiers live in
//! `txstore-primitives`, which can see both this crate and the storage
//! backends it wires into [`compensation::CompensationTier`] and
//! [`marker::JournalStore`].

#![warn(missing_docs)]

pub mod compensation;
pub mod marker;

pub use compensation::{CappedMemoryTier, CompensationEntry, CompensationLogger, CompensationTier, FailedOperation, TierFuture};
pub use marker::{CommitMarker, InMemoryJournalStore, JournalStore, MarkerState};
