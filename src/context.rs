//! Wiring of the provisioning components over one storage backend.

use crate::adapters::AdapterRegistry;
use crate::audit::Tracker;
use crate::config::ProvisioningConfig;
use crate::engine::{HistoryRecorder, ProvisioningEngine};
use crate::events::EventBus;
use crate::reporting::ReportingQueries;
use crate::storage::StorageProvider;
use crate::store::Repository;
use crate::tenancy::{DirectoryControllerRegistration, DirectoryResolver, ScimDirectoryResolver, TenantDirectory};
use std::sync::Arc;

/// Engine, directory and reporting sharing one repository and event bus.
///
/// The bus carries the [`HistoryRecorder`] and the
/// [`DirectoryControllerRegistration`] listener.
pub struct ProvisioningContext<S> {
    pub config: ProvisioningConfig,
    pub repository: Repository<S>,
    pub tracker: Tracker<S>,
    pub engine: ProvisioningEngine<S>,
    pub directory: TenantDirectory<S>,
    pub reporting: ReportingQueries<S>,
}

impl<S: StorageProvider + 'static> ProvisioningContext<S> {
    pub fn new(storage: Arc<S>, adapters: AdapterRegistry, config: ProvisioningConfig) -> Self {
        let resolver = Arc::new(ScimDirectoryResolver::new(config.http.clone()));
        Self::with_resolver(storage, adapters, config, resolver)
    }

    pub fn with_resolver(
        storage: Arc<S>,
        adapters: AdapterRegistry,
        config: ProvisioningConfig,
        resolver: Arc<dyn DirectoryResolver>,
    ) -> Self {
        let repository = Repository::new(storage);
        let bus = EventBus::new()
            .with_handler(Arc::new(HistoryRecorder))
            .with_listener(Arc::new(DirectoryControllerRegistration::new(
                adapters.clone(),
                config.engine.adapter_timeout,
            )));
        let tracker = Tracker::new(repository.clone(), Arc::new(bus));

        Self {
            engine: ProvisioningEngine::new(tracker.clone(), adapters.clone(), config.engine.clone()),
            directory: TenantDirectory::new(tracker.clone(), resolver),
            reporting: ReportingQueries::new(repository.clone(), adapters, config.engine.clone()),
            repository,
            tracker,
            config,
        }
    }
}
