//! [`StorageCoreBuilder`]: wires a [`RecordStore`], the flat/credential
//! stores, the durability layer, and the three [`TransactionalResource`]
//! adapters into a [`StorageCore`] (spec §6 "Quick Start").

use std::sync::Arc;

use txstore_core::event::{EventSink, NoopEventSink};
use txstore_core::{Result, StoreDescriptor};
use txstore_durability::{CompensationLogger, InMemoryJournalStore, JournalStore};
use txstore_engine::coordinator::TransactionCoordinator;
use txstore_engine::resource::TransactionalResource;
use txstore_primitives::compensation_tiers::{FlatStoreCompensationTier, RecordStoreCompensationTier, COMPENSATION_STORE};
use txstore_primitives::credential_resource::CredentialStoreResource;
use txstore_primitives::credential_store::{CredentialStore, InMemoryCredentialStore};
use txstore_primitives::flat_resource::FlatStoreResource;
use txstore_primitives::flat_store::{FlatStore, InMemoryFlatStore};
use txstore_primitives::record_resource::RecordStoreResource;
use txstore_storage::migration::MigrationStep;
use txstore_storage::record_store::RecordStore;
use txstore_storage::write_authority::{AlwaysAllow, AuthorityMode, ExemptStores, WriteAuthority};

use crate::config::StorageCoreConfig;
use crate::metrics::Metrics;
use crate::storage_core::StorageCore;

/// Builds a [`StorageCore`]. The record store's migration chain and head
/// stores are the caller's own; the builder appends [`COMPENSATION_STORE`]
/// to the head-store safety sweep so tier 1 of the compensation log always
/// has somewhere to write, without requiring the caller to remember a
/// dedicated migration step for it.
pub struct StorageCoreBuilder {
    writer_id: String,
    current_version: u32,
    steps: Vec<MigrationStep>,
    head_stores: Vec<StoreDescriptor>,
    authority: Arc<dyn WriteAuthority>,
    authority_mode: AuthorityMode,
    exempt: ExemptStores,
    events: Arc<dyn EventSink>,
    config: StorageCoreConfig,
    flat_store: Option<Arc<dyn FlatStore>>,
    credential_store: Option<Arc<dyn CredentialStore>>,
    journal: Option<Arc<dyn JournalStore>>,
    extra_resources: Vec<Arc<dyn TransactionalResource>>,
}

impl StorageCoreBuilder {
    /// Start a builder for a record store owned by `writer_id`, at migration
    /// `current_version`.
    pub fn new(writer_id: impl Into<String>, current_version: u32) -> Self {
        StorageCoreBuilder {
            writer_id: writer_id.into(),
            current_version,
            steps: Vec::new(),
            head_stores: Vec::new(),
            authority: Arc::new(AlwaysAllow),
            authority_mode: AuthorityMode::Permissive,
            exempt: ExemptStores::default(),
            events: Arc::new(NoopEventSink),
            config: StorageCoreConfig::default(),
            flat_store: None,
            credential_store: None,
            journal: None,
            extra_resources: Vec::new(),
        }
    }

    /// Append a migration step to the record store's chain.
    pub fn migration_step(mut self, step: MigrationStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Declare a store that must exist at the current head, independent of
    /// migration version (spec §4.2.1's safety sweep).
    pub fn head_store(mut self, descriptor: StoreDescriptor) -> Self {
        self.head_stores.push(descriptor);
        self
    }

    /// Override the record store's write authority and its enforcement mode.
    pub fn write_authority(mut self, authority: Arc<dyn WriteAuthority>, mode: AuthorityMode) -> Self {
        self.authority = authority;
        self.authority_mode = mode;
        self
    }

    /// Stores exempt from write-authority checks regardless of mode.
    pub fn exempt_stores(mut self, exempt: ExemptStores) -> Self {
        self.exempt = exempt;
        self
    }

    /// Override the event sink every layer publishes through.
    pub fn events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Override the coordinator's timeout/retry tuning.
    pub fn config(mut self, config: StorageCoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Supply a flat store other than the in-memory reference.
    pub fn flat_store(mut self, store: Arc<dyn FlatStore>) -> Self {
        self.flat_store = Some(store);
        self
    }

    /// Supply a credential store other than the in-memory reference.
    pub fn credential_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credential_store = Some(store);
        self
    }

    /// Supply a commit-marker journal other than the in-memory reference.
    pub fn journal(mut self, journal: Arc<dyn JournalStore>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Add an extra `TransactionalResource` beyond the three built-in ones
    /// (record store, flat store, credential store).
    pub fn resource(mut self, resource: Arc<dyn TransactionalResource>) -> Self {
        self.extra_resources.push(resource);
        self
    }

    /// Wire everything together.
    pub fn build(self) -> Result<StorageCore> {
        let mut head_stores = self.head_stores;
        head_stores.push(StoreDescriptor::new(COMPENSATION_STORE, "id"));

        let record_store = Arc::new(RecordStore::init(
            self.writer_id,
            self.current_version,
            &self.steps,
            &head_stores,
            self.authority,
            self.authority_mode,
            self.exempt,
            self.events.clone(),
        )?);

        let flat_store = self.flat_store.unwrap_or_else(|| InMemoryFlatStore::shared() as Arc<dyn FlatStore>);
        let credential_store = self
            .credential_store
            .unwrap_or_else(|| Arc::new(InMemoryCredentialStore::new()) as Arc<dyn CredentialStore>);
        let journal = self.journal.unwrap_or_else(|| Arc::new(InMemoryJournalStore::new()) as Arc<dyn JournalStore>);

        let tier1 = Arc::new(RecordStoreCompensationTier::new(record_store.clone()));
        let tier2 = Arc::new(FlatStoreCompensationTier::new(flat_store.clone()));
        let compensation = Arc::new(CompensationLogger::new(Some(tier1), Some(tier2), self.events.clone()));

        let mut resources: Vec<Arc<dyn TransactionalResource>> = vec![
            Arc::new(RecordStoreResource::new(record_store.clone())),
            Arc::new(FlatStoreResource::new(flat_store.clone())),
            Arc::new(CredentialStoreResource::new(credential_store.clone())),
        ];
        resources.extend(self.extra_resources);

        let coordinator = Arc::new(TransactionCoordinator::with_config(
            resources,
            journal,
            compensation,
            self.events,
            self.config.coordinator_config(),
        ));

        Ok(StorageCore {
            coordinator,
            record_store,
            flat_store,
            credential_store,
            metrics: Metrics::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_auto_declares_compensation_store() {
        let core = StorageCoreBuilder::new("node-1", 0).build().unwrap();
        assert!(core.record_store().tables().contains(COMPENSATION_STORE));
    }

    #[test]
    fn build_declares_caller_migration_steps() {
        let core = StorageCoreBuilder::new("node-1", 1)
            .migration_step(MigrationStep::declare_store(1, "v1", StoreDescriptor::new("widgets", "id")))
            .build()
            .unwrap();
        assert!(core.record_store().tables().contains("widgets"));
    }
}
