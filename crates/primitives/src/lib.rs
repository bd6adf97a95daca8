//! `TransactionalResource` adapters over the three backend families, and
//! the in-process reference implementations of the two external
//! collaborator contracts ([`flat_store::FlatStore`],
//! [`credential_store::CredentialStore`]) a full embedder would instead
//! wire to its own storage (spec §1, §4.5).
//!
//! Module map:
//! - [`flat_store`] — the string-keyed flat-store contract + in-memory ref
//! - [`credential_store`] — the credential custody contract + in-memory ref
//! - [`record_resource`] — `RecordStoreResource`
//! - [`flat_resource`] — `FlatStoreResource`
//! - [`credential_resource`] — `CredentialStoreResource`
//! - [`compensation_tiers`] — tier 1 (record store) / tier 2 (flat store)
//!   `CompensationTier` backends

#![warn(missing_docs)]

pub mod compensation_tiers;
pub mod credential_resource;
pub mod credential_store;
pub mod flat_resource;
pub mod flat_store;
pub mod record_resource;

pub use compensation_tiers::{
    entry_to_value, value_to_entry, FlatStoreCompensationTier, RecordStoreCompensationTier,
    COMPENSATION_FLAT_KEY, COMPENSATION_STORE,
};
pub use credential_resource::CredentialStoreResource;
pub use credential_store::{CredentialOptions, CredentialStore, InMemoryCredentialStore};
pub use flat_resource::FlatStoreResource;
pub use flat_store::{FlatStore, InMemoryFlatStore};
pub use record_resource::RecordStoreResource;
