//! Tenant administration: tenants, services, catalog assets and users.
//!
//! [`TenantDirectory`] enforces the tenant-level rules the storage layer does not
//! know about: one active service per platform type, unique usernames, and keeping
//! users mirrored to the tenant's remote directory when one is configured.

use crate::adapters::AdapterRegistry;
use crate::audit::{ChangeNotification, Editor, Tracker};
use crate::config::HttpClientConfig;
use crate::error::{ProvisionError, ProvisionResult};
use crate::events::{CommitListener, DomainEvent};
use crate::model::{
    Asset, ProvisionRecord, ServiceAssetProperties, ServiceId, AssetId, Tenant, TenantId,
    TenantService, User,
};
use crate::storage::StorageProvider;
use crate::store::{Entity, Repository};
use crate::sync::{
    RemoteDirectory, ScimDirectory, SyncEngine, SyncError, SyncOutcome, UserMirror, load, merge,
};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Finds the remote directory of a tenant.
pub trait DirectoryResolver: Send + Sync {
    fn directory_for(&self, tenant: &Tenant) -> Result<Option<Arc<dyn RemoteDirectory>>, SyncError>;
}

/// Connects to the SCIM endpoint named in the tenant's directory settings.
pub struct ScimDirectoryResolver {
    http: HttpClientConfig,
}

impl ScimDirectoryResolver {
    pub fn new(http: HttpClientConfig) -> Self {
        Self { http }
    }
}

impl DirectoryResolver for ScimDirectoryResolver {
    fn directory_for(&self, tenant: &Tenant) -> Result<Option<Arc<dyn RemoteDirectory>>, SyncError> {
        match &tenant.directory {
            Some(settings) => Ok(Some(Arc::new(ScimDirectory::new(settings, &self.http)?))),
            None => Ok(None),
        }
    }
}

/// Counts of a [`TenantDirectory::load_users`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub created: usize,
    pub merged: usize,
    pub unchanged: usize,
}

pub struct TenantDirectory<S> {
    tracker: Tracker<S>,
    resolver: Arc<dyn DirectoryResolver>,
}

impl<S> Clone for TenantDirectory<S> {
    fn clone(&self) -> Self {
        Self {
            tracker: self.tracker.clone(),
            resolver: Arc::clone(&self.resolver),
        }
    }
}

impl<S: StorageProvider> TenantDirectory<S> {
    pub fn new(tracker: Tracker<S>, resolver: Arc<dyn DirectoryResolver>) -> Self {
        Self { tracker, resolver }
    }

    fn repository(&self) -> &Repository<S> {
        self.tracker.repository()
    }

    pub async fn create_tenant(&self, tenant: Tenant) -> ProvisionResult<Tenant> {
        if self.find_tenant(&tenant.name).await?.is_some() {
            return Err(ProvisionError::configuration(format!(
                "a tenant named '{}' already exists",
                tenant.name
            )));
        }
        self.repository().put(&tenant).await?;
        info!("Created tenant {} ({})", tenant.name, tenant.id);
        Ok(tenant)
    }

    pub async fn tenant(&self, tenant_id: TenantId) -> ProvisionResult<Tenant> {
        self.repository().load(tenant_id, &tenant_id.to_string()).await
    }

    pub async fn tenants(&self) -> ProvisionResult<Vec<Tenant>> {
        let mut tenants = Vec::new();
        for tenant_id in self.repository().tenant_ids().await? {
            if let Some(tenant) = self
                .repository()
                .get::<Tenant>(tenant_id, &tenant_id.to_string())
                .await?
            {
                tenants.push(tenant);
            }
        }
        tenants.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tenants)
    }

    /// Look a tenant up by name or id.
    pub async fn find_tenant(&self, name_or_id: &str) -> ProvisionResult<Option<Tenant>> {
        Ok(self
            .tenants()
            .await?
            .into_iter()
            .find(|tenant| tenant.name == name_or_id || tenant.id.to_string() == name_or_id))
    }

    /// Persist a service, rejecting a second active service for the same platform type.
    pub async fn add_service(
        &self,
        editor: Option<&Editor>,
        service: TenantService,
    ) -> ProvisionResult<TenantService> {
        self.tenant(service.tenant_id).await?;
        if service.is_active {
            let platform = service.platform_type();
            let clash = self
                .services(service.tenant_id)
                .await?
                .into_iter()
                .any(|other| other.id != service.id && other.is_active && other.platform_type() == platform);
            if clash {
                return Err(ProvisionError::DuplicateActiveService {
                    tenant_id: service.tenant_id.to_string(),
                    platform,
                });
            }
        }
        self.tracker.save(editor, &service).await?;
        debug!("Saved {}", service);
        Ok(service)
    }

    pub async fn set_service_active(
        &self,
        editor: Option<&Editor>,
        tenant_id: TenantId,
        service_id: ServiceId,
        active: bool,
    ) -> ProvisionResult<TenantService> {
        let mut service: TenantService = self
            .repository()
            .load(tenant_id, &service_id.to_string())
            .await?;
        service.is_active = active;
        self.add_service(editor, service).await
    }

    pub async fn services(&self, tenant_id: TenantId) -> ProvisionResult<Vec<TenantService>> {
        self.repository().list(tenant_id).await
    }

    pub async fn add_asset(&self, asset: Asset) -> ProvisionResult<Asset> {
        self.tenant(asset.tenant_id).await?;
        if !self.find_assets(asset.tenant_id, &asset.slug).await?.is_empty() {
            return Err(ProvisionError::configuration(format!(
                "asset '{}' already exists",
                asset.slug
            )));
        }
        self.repository().put(&asset).await?;
        Ok(asset)
    }

    pub async fn find_assets(&self, tenant_id: TenantId, slug: &str) -> ProvisionResult<Vec<Asset>> {
        self.repository().find(tenant_id, "slug", slug).await
    }

    /// Integration properties of an asset on a service, created empty when absent.
    pub async fn properties(
        &self,
        tenant_id: TenantId,
        service_id: ServiceId,
        asset_id: AssetId,
    ) -> ProvisionResult<ServiceAssetProperties> {
        let key = ServiceAssetProperties::key_for(service_id, asset_id);
        if let Some(existing) = self.repository().get(tenant_id, &key).await? {
            return Ok(existing);
        }
        let created = ServiceAssetProperties::new(tenant_id, service_id, asset_id);
        self.repository().put(&created).await?;
        Ok(created)
    }

    pub async fn set_property(
        &self,
        tenant_id: TenantId,
        service_id: ServiceId,
        asset_id: AssetId,
        name: &str,
        value: Value,
    ) -> ProvisionResult<ServiceAssetProperties> {
        let mut properties = self.properties(tenant_id, service_id, asset_id).await?;
        properties.set(name, value);
        self.repository().put(&properties).await?;
        Ok(properties)
    }

    pub async fn users(&self, tenant_id: TenantId) -> ProvisionResult<Vec<User>> {
        self.repository().list(tenant_id).await
    }

    pub async fn find_user(&self, tenant_id: TenantId, username: &str) -> ProvisionResult<Option<User>> {
        let found: Vec<User> = self.repository().find(tenant_id, "username", username).await?;
        Ok(found.into_iter().next())
    }

    pub async fn create_user(&self, editor: Option<&Editor>, user: User) -> ProvisionResult<User> {
        self.tenant(user.tenant_id).await?;
        if self.find_user(user.tenant_id, &user.username).await?.is_some() {
            return Err(ProvisionError::DuplicateUsername {
                tenant_id: user.tenant_id.to_string(),
                username: user.username,
            });
        }
        self.save_user(editor, user).await
    }

    /// Save a user and mirror the change to the tenant's directory.
    ///
    /// The local save is committed before the remote push; a failed push leaves
    /// the user marked as needing one.
    pub async fn save_user(&self, editor: Option<&Editor>, mut user: User) -> ProvisionResult<User> {
        user.sync.touch();
        self.tracker.save(editor, &user).await?;
        self.sync_user(&mut user, false, false).await?;
        Ok(user)
    }

    /// Synchronize one user with the remote directory and persist the new stamps.
    pub async fn sync_user(
        &self,
        user: &mut User,
        force_push: bool,
        force_pull: bool,
    ) -> ProvisionResult<SyncOutcome> {
        let tenant = self.tenant(user.tenant_id).await?;
        let Some(directory) = self.resolver.directory_for(&tenant)? else {
            return Ok(SyncOutcome::default());
        };
        let engine = SyncEngine::new(UserMirror::new(directory, tenant.email_domain.clone()));
        let outcome = engine.sync(user, force_push, force_pull).await?;
        if !outcome.is_noop() {
            self.repository().put(&*user).await?;
        }
        Ok(outcome)
    }

    /// Import the tenant's directory: create missing users, merge known ones.
    pub async fn load_users(&self, tenant_id: TenantId, editor: &Editor) -> ProvisionResult<LoadSummary> {
        let tenant = self.tenant(tenant_id).await?;
        let directory = self
            .resolver
            .directory_for(&tenant)?
            .ok_or_else(|| SyncError::NotConfigured {
                tenant_id: tenant_id.to_string(),
            })?;

        let mut summary = LoadSummary::default();
        for entry in directory.list_users().await? {
            match self.find_user(tenant_id, &entry.user_name).await? {
                None => {
                    let user = load(tenant_id, &entry);
                    self.tracker.save(Some(editor), &user).await?;
                    summary.created += 1;
                }
                Some(mut local) => {
                    let before = local.clone();
                    if merge(&mut local, &entry) && local != before {
                        if let Some(stamp) = entry.last_modified {
                            local.sync.mark_synced(stamp);
                        }
                        self.tracker.save(Some(editor), &local).await?;
                        summary.merged += 1;
                    } else {
                        summary.unchanged += 1;
                    }
                }
            }
        }
        info!(
            "Loaded users of {}: {} created, {} merged, {} unchanged",
            tenant.name, summary.created, summary.merged, summary.unchanged
        );
        Ok(summary)
    }

    /// Delete a user who no longer holds any item.
    ///
    /// Records are only removed by a successful remote removal, so a user with
    /// records left (e.g. after a failed deprovisioning) is refused.
    pub async fn delete_user(&self, editor: Option<&Editor>, user: &User) -> ProvisionResult<()> {
        let records: Vec<ProvisionRecord> = self
            .repository()
            .find(user.tenant_id, "user_id", &user.id.to_string())
            .await?;
        if !records.is_empty() {
            return Err(ProvisionError::StillProvisioned {
                username: user.username.clone(),
                records: records.len(),
            });
        }
        self.tracker.delete(editor, user).await?;
        info!("Deleted user {}", user);
        Ok(())
    }
}

/// Registers newly created users with the tenant's directory-controller services.
pub struct DirectoryControllerRegistration {
    adapters: AdapterRegistry,
    timeout: Duration,
}

impl DirectoryControllerRegistration {
    pub fn new(adapters: AdapterRegistry, timeout: Duration) -> Self {
        Self { adapters, timeout }
    }

    async fn register<S: StorageProvider>(
        &self,
        notification: &ChangeNotification,
        repository: &Repository<S>,
    ) -> ProvisionResult<()> {
        let user: User = serde_json::from_value(notification.instance.clone())?;
        let tenant: Tenant = repository
            .load(user.tenant_id, &user.tenant_id.to_string())
            .await?;
        let services: Vec<TenantService> = repository.list(user.tenant_id).await?;

        for service in services
            .iter()
            .filter(|service| service.is_active && service.is_directory_controller())
        {
            let adapter = self.adapters.adapter_for(&tenant, service)?;
            match tokio::time::timeout(self.timeout, adapter.register(&user)).await {
                Ok(Ok(remote)) => debug!("Registered {} on {} as {}", user, service, remote.login),
                Ok(Err(e)) => warn!("Registering {} on {} failed: {}", user, service, e),
                Err(_) => warn!("Registering {} on {} timed out", user, service),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<S: StorageProvider> CommitListener<S> for DirectoryControllerRegistration {
    fn name(&self) -> &str {
        "directory-controller-registration"
    }

    async fn on_commit(&self, event: &DomainEvent, repository: &Repository<S>) -> ProvisionResult<()> {
        match event {
            DomainEvent::TrackableChanged(notification)
                if notification.created && notification.entity_type == User::COLLECTION =>
            {
                self.register(notification, repository).await
            }
            _ => Ok(()),
        }
    }
}
