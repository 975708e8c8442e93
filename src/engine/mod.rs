//! The provisioning engine.
//!
//! [`ProvisioningEngine::reconcile`] moves one (user, service) pair from its current
//! set of [`ProvisionRecord`]s to a desired set of [`ItemRef`]s:
//!
//! 1. compute the [`Delta`] between current and desired items;
//! 2. for each change, in [`Delta::ordered`] order, call the service adapter first;
//! 3. when the remote call succeeds, commit one transaction holding the record
//!    change, its audit entry and the history entry opened or closed by the
//!    [`HistoryRecorder`];
//! 4. when it fails, log the failure and move on to the next item.
//!
//! Failures never abort the run; they are reported per item in a [`ReconcileReport`].
//! Running `reconcile` again with the same desired set performs no remote calls once
//! every item has succeeded.

pub mod delta;
pub mod history;
pub mod report;

pub use delta::{Change, Delta, compute_delta};
pub use history::HistoryRecorder;
pub use report::{ItemOutcome, ItemReport, ProvisionRequest, ReconcileReport};

use crate::adapters::{AdapterError, AdapterRegistry, AssetBinding, FailureClass, ServiceAdapter};
use crate::audit::{Editor, Tracker};
use crate::config::EngineConfig;
use crate::error::{ProvisionError, ProvisionResult};
use crate::events::DomainEvent;
use crate::model::{
    Asset, ItemRef, ProvisionRecord, ServiceAssetProperties, ServiceId, Tenant, TenantService, User,
};
use crate::storage::StorageProvider;
use crate::store::{Repository, Transaction};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

pub struct ProvisioningEngine<S> {
    tracker: Tracker<S>,
    adapters: AdapterRegistry,
    config: EngineConfig,
}

impl<S> Clone for ProvisioningEngine<S> {
    fn clone(&self) -> Self {
        Self {
            tracker: self.tracker.clone(),
            adapters: self.adapters.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: StorageProvider> ProvisioningEngine<S> {
    pub fn new(tracker: Tracker<S>, adapters: AdapterRegistry, config: EngineConfig) -> Self {
        Self {
            tracker,
            adapters,
            config,
        }
    }

    pub fn repository(&self) -> &Repository<S> {
        self.tracker.repository()
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    /// Items currently provisioned to the user on the service.
    pub async fn current_records(
        &self,
        user: &User,
        service_id: ServiceId,
    ) -> ProvisionResult<Vec<ProvisionRecord>> {
        let mut records = self.user_records(user).await?;
        records.retain(|record| record.service_id == service_id);
        Ok(records)
    }

    /// Current items of the user on the service that satisfy `keep`.
    async fn current_items(
        &self,
        user: &User,
        service_id: ServiceId,
        keep: impl Fn(&ItemRef) -> bool,
    ) -> ProvisionResult<BTreeSet<ItemRef>> {
        Ok(self
            .current_records(user, service_id)
            .await?
            .into_iter()
            .map(|record| record.item)
            .filter(|item| keep(item))
            .collect())
    }

    async fn user_records(&self, user: &User) -> ProvisionResult<Vec<ProvisionRecord>> {
        self.repository()
            .find(user.tenant_id, "user_id", &user.id.to_string())
            .await
    }

    /// Bring the user's items on one service to `desired`.
    pub async fn reconcile(
        &self,
        user: &User,
        service: &TenantService,
        desired: &BTreeSet<ItemRef>,
        editor: &Editor,
    ) -> ProvisionResult<ReconcileReport> {
        let (tenant, adapter) = self.prepare(user, service).await?;
        let current: BTreeSet<ItemRef> = self
            .current_records(user, service.id)
            .await?
            .into_iter()
            .map(|record| record.item)
            .collect();

        let delta = compute_delta(&current, desired);
        let mut report = ReconcileReport::new(user.id, service.id);
        if delta.is_empty() {
            debug!("{} on {} already converged", user, service);
            return Ok(report);
        }

        debug!(
            "Reconciling {} on {}: {} to add, {} to remove",
            user,
            service,
            delta.to_add.len(),
            delta.to_remove.len()
        );

        for (change, item) in delta.ordered() {
            let outcome = match change {
                Change::Add => self.add_item(&tenant, user, service, adapter.as_ref(), item, editor).await?,
                _ => self.remove_item(&tenant, user, service, adapter.as_ref(), item, editor).await?,
            };
            report.record(item, change, outcome);
        }

        info!("Reconciled {}", report);
        Ok(report)
    }

    /// Provision the full desired state of a user across every active service of
    /// the tenant. Asset items go first; login access is reconciled in a second pass.
    pub async fn provision_user(
        &self,
        user: &User,
        request: &ProvisionRequest,
        editor: &Editor,
    ) -> ProvisionResult<Vec<ReconcileReport>> {
        let services = self.active_services(user).await?;
        let wanted_assets = request.asset_items();
        let mut reports: BTreeMap<ServiceId, ReconcileReport> = BTreeMap::new();

        for service in &services {
            let mut desired = wanted_assets.clone();
            if self.has_platform(user, service.id).await? {
                desired.insert(ItemRef::Platform(service.id));
            }
            let report = self.reconcile(user, service, &desired, editor).await?;
            reports.insert(service.id, report);
        }

        for service in &services {
            let mut desired = self
                .current_items(user, service.id, |item| !item.is_platform())
                .await?;
            if request.platforms.contains(&service.id) {
                desired.insert(ItemRef::Platform(service.id));
            }
            let report = self.reconcile(user, service, &desired, editor).await?;
            reports
                .entry(service.id)
                .or_insert_with(|| ReconcileReport::new(user.id, service.id))
                .merge(report);
        }

        Ok(reports.into_values().collect())
    }

    /// Remove everything from the user and deactivate them on every active service.
    ///
    /// Asset items are removed on every service before any login access is revoked.
    pub async fn deprovision_user_fully(
        &self,
        user: &User,
        editor: &Editor,
    ) -> ProvisionResult<Vec<ReconcileReport>> {
        let mut reports: BTreeMap<ServiceId, ReconcileReport> = BTreeMap::new();

        let mut provisioned: BTreeSet<ServiceId> = BTreeSet::new();
        for record in self.user_records(user).await? {
            provisioned.insert(record.service_id);
        }

        let mut services = Vec::new();
        for service_id in provisioned {
            match self
                .repository()
                .get::<TenantService>(user.tenant_id, &service_id.to_string())
                .await?
            {
                Some(service) => services.push(service),
                None => warn!("Records of {} reference missing service {}", user, service_id),
            }
        }

        for service in &services {
            let platforms = self.current_items(user, service.id, ItemRef::is_platform).await?;
            let report = self.reconcile(user, service, &platforms, editor).await?;
            reports.insert(service.id, report);
        }
        for service in &services {
            let assets = self
                .current_items(user, service.id, |item| !item.is_platform())
                .await?;
            let report = self.reconcile(user, service, &assets, editor).await?;
            reports
                .entry(service.id)
                .or_insert_with(|| ReconcileReport::new(user.id, service.id))
                .merge(report);
        }

        for service in self.active_services(user).await? {
            let report = reports
                .entry(service.id)
                .or_insert_with(|| ReconcileReport::new(user.id, service.id));
            let item = ItemRef::Platform(service.id);
            if report.outcome_of(&item).is_some() {
                continue;
            }
            let outcome = match self.prepare(user, &service).await {
                Ok((_, adapter)) => classify(
                    Change::Remove,
                    self.call("deactivate", adapter.deactivate(user)).await,
                ),
                Err(e) => ItemOutcome::Failed {
                    error: e.to_string(),
                    transient: false,
                },
            };
            log_failure(&outcome, user, &service, &item);
            report.record(item, Change::Remove, outcome);
        }

        Ok(reports.into_values().collect())
    }

    /// Re-issue every current asset assignment of the user on the service, repairing
    /// remote drift, then push each asset's applications to the user's devices.
    /// Local state is left untouched.
    pub async fn resync_user(
        &self,
        user: &User,
        service: &TenantService,
        editor: &Editor,
    ) -> ProvisionResult<ReconcileReport> {
        let (tenant, adapter) = self.prepare(user, service).await?;
        let mut report = ReconcileReport::new(user.id, service.id);
        debug!("Resync of {} on {} requested by {}", user, service, editor);

        for record in self.current_records(user, service.id).await? {
            let Some(asset_id) = record.item.asset_id() else {
                continue;
            };
            let Some(asset) = self
                .repository()
                .get::<Asset>(tenant.id, &asset_id.to_string())
                .await?
            else {
                continue;
            };
            let binding = self.binding(service, asset).await?;
            let mut outcome = classify(
                Change::Add,
                self.call("assign", adapter.assign(&binding, user)).await,
            );
            if !matches!(outcome, ItemOutcome::Failed { .. }) {
                if let Err(e) = self.call("install_apps", adapter.install_apps(&binding, user)).await {
                    outcome = classify(Change::Add, Err(e));
                }
            }
            log_failure(&outcome, user, service, &record.item);
            report.record(record.item, Change::Resync, outcome);
        }
        Ok(report)
    }

    async fn prepare(
        &self,
        user: &User,
        service: &TenantService,
    ) -> ProvisionResult<(Tenant, Arc<dyn ServiceAdapter>)> {
        if user.tenant_id != service.tenant_id {
            return Err(ProvisionError::tenant_mismatch(format!(
                "user {} and service {} belong to different tenants",
                user.id, service.id
            )));
        }
        let tenant: Tenant = self
            .repository()
            .load(user.tenant_id, &user.tenant_id.to_string())
            .await?;
        let adapter = self.adapters.adapter_for(&tenant, service)?;
        Ok((tenant, adapter))
    }

    async fn active_services(&self, user: &User) -> ProvisionResult<Vec<TenantService>> {
        let mut services: Vec<TenantService> = self.repository().list(user.tenant_id).await?;
        services.retain(|service| service.is_active);
        services.sort_by_key(|service| (service.created, service.id));
        Ok(services)
    }

    async fn has_platform(&self, user: &User, service_id: ServiceId) -> ProvisionResult<bool> {
        Ok(self
            .current_records(user, service_id)
            .await?
            .iter()
            .any(|record| record.item == ItemRef::Platform(service_id)))
    }

    async fn binding(&self, service: &TenantService, asset: Asset) -> ProvisionResult<AssetBinding> {
        let key = ServiceAssetProperties::key_for(service.id, asset.id);
        let properties = match self
            .repository()
            .get::<ServiceAssetProperties>(service.tenant_id, &key)
            .await?
        {
            Some(properties) => properties,
            None => ServiceAssetProperties::new(service.tenant_id, service.id, asset.id),
        };
        Ok(AssetBinding { asset, properties })
    }

    /// Run an adapter call under the configured timeout.
    async fn call<T, F>(&self, operation: &str, call: F) -> Result<T, AdapterError>
    where
        F: Future<Output = Result<T, AdapterError>>,
    {
        match tokio::time::timeout(self.config.adapter_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(AdapterError::Timeout {
                operation: operation.to_string(),
                timeout_ms: self.config.adapter_timeout.as_millis() as u64,
            }),
        }
    }

    async fn add_item(
        &self,
        tenant: &Tenant,
        user: &User,
        service: &TenantService,
        adapter: &dyn ServiceAdapter,
        item: ItemRef,
        editor: &Editor,
    ) -> ProvisionResult<ItemOutcome> {
        let result = match item {
            ItemRef::Platform(service_id) => {
                if service_id != service.id {
                    return Ok(ItemOutcome::Filtered);
                }
                self.call("activate", adapter.activate(user)).await
            }
            _ => {
                let Some(asset) = self.asset_for(tenant, &item).await? else {
                    return Ok(ItemOutcome::Filtered);
                };
                if asset.item_ref() != item || !asset.can_be_managed_by(service) {
                    debug!("{} cannot be managed by {}", asset, service);
                    return Ok(ItemOutcome::Filtered);
                }
                let binding = self.binding(service, asset).await?;
                self.call("assign", adapter.assign(&binding, user)).await
            }
        };

        let outcome = classify(Change::Add, result);
        log_failure(&outcome, user, service, &item);
        if outcome.is_success() {
            let record = ProvisionRecord::new(tenant.id, user.id, service.id, item);
            self.commit_change(editor, record, Change::Add).await?;
        }
        Ok(outcome)
    }

    async fn remove_item(
        &self,
        tenant: &Tenant,
        user: &User,
        service: &TenantService,
        adapter: &dyn ServiceAdapter,
        item: ItemRef,
        editor: &Editor,
    ) -> ProvisionResult<ItemOutcome> {
        let result = match item {
            ItemRef::Platform(_) => self.call("deactivate", adapter.deactivate(user)).await,
            _ => match self.asset_for(tenant, &item).await? {
                Some(asset) => {
                    let binding = self.binding(service, asset).await?;
                    self.call("unassign", adapter.unassign(&binding, user)).await
                }
                None => {
                    warn!("{} was removed from the catalog; dropping its record for {}", item, user);
                    Ok(())
                }
            },
        };

        let outcome = classify(Change::Remove, result);
        log_failure(&outcome, user, service, &item);
        if outcome.is_success() {
            let record = self
                .repository()
                .get::<ProvisionRecord>(
                    tenant.id,
                    &ProvisionRecord::key_for(user.id, service.id, &item),
                )
                .await?
                .ok_or_else(|| ProvisionError::not_found("ProvisionRecord", item))?;
            self.commit_change(editor, record, Change::Remove).await?;
        }
        Ok(outcome)
    }

    async fn asset_for(&self, tenant: &Tenant, item: &ItemRef) -> ProvisionResult<Option<Asset>> {
        match item.asset_id() {
            Some(asset_id) => self.repository().get(tenant.id, &asset_id.to_string()).await,
            None => Ok(None),
        }
    }

    /// One transaction: record change, audit entry, history entry.
    async fn commit_change(&self, editor: &Editor, record: ProvisionRecord, change: Change) -> ProvisionResult<()> {
        let mut tx = Transaction::new();
        let event = match change {
            Change::Add => {
                self.tracker.stage_save(Some(editor), &record, &mut tx).await?;
                DomainEvent::ItemProvisioned(record)
            }
            _ => {
                self.tracker.stage_delete(Some(editor), &record, &mut tx).await?;
                DomainEvent::ItemDeprovisioned(record)
            }
        };
        self.tracker
            .bus()
            .publish(event, self.tracker.repository(), &mut tx)
            .await?;
        self.tracker.commit(tx).await
    }
}

/// Turn an adapter result into an item outcome according to its failure class.
fn classify(change: Change, result: Result<(), AdapterError>) -> ItemOutcome {
    match result {
        Ok(()) => ItemOutcome::Applied,
        Err(error) => match (error.class(), change) {
            (FailureClass::AlreadyInDesiredState, _) => ItemOutcome::AlreadyInState,
            (FailureClass::ResourceNotFound, Change::Remove) => ItemOutcome::AlreadyInState,
            _ => ItemOutcome::Failed {
                transient: error.is_transient(),
                error: error.to_string(),
            },
        },
    }
}

fn log_failure(outcome: &ItemOutcome, user: &User, service: &TenantService, item: &ItemRef) {
    if let ItemOutcome::Failed { error, .. } = outcome {
        warn!(
            "Provisioning {} for user {} on service {} failed: {}",
            item, user.id, service.id, error
        );
    }
}
