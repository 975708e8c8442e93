//! Remote service adapters.
//!
//! A [`ServiceAdapter`] speaks to one configured [`TenantService`] on behalf of its
//! tenant. Adapters are created per call by an [`AdapterFactory`] looked up by
//! [`ServiceKind`] in the [`AdapterRegistry`], so tests and deployments choose the
//! implementations explicitly.
//!
//! Adapters report failures as [`AdapterError`]s; the engine decides what to do with
//! them through [`AdapterError::class`]:
//!
//! | Class                   | Additions        | Removals         |
//! |-------------------------|------------------|------------------|
//! | `AlreadyInDesiredState` | success          | success          |
//! | `ResourceNotFound`      | failure, skipped | success          |
//! | `TransientOrUnknown`    | failure, skipped | failure, skipped |
//!
//! A missing account on additions is not a failure: `activate` and `assign` register
//! the user through [`ServiceAdapter::ensure_registered`] first.

pub mod error;
pub mod generic;
pub mod google;
pub mod http;
pub mod mdm;
pub mod sso;

pub use error::{AdapterError, AdapterResult, FailureClass};
pub use generic::{GenericAdapter, GenericAdapterFactory};
pub use google::DeviceInventory;
pub use mdm::{MdmAdapter, MdmAdapterFactory};
pub use sso::{ActivationNotifier, LogActivationNotifier, SsoAdapter, SsoAdapterFactory};

use crate::config::HttpClientConfig;
use crate::error::{ProvisionError, ProvisionResult};
use crate::model::{Asset, ServiceAssetProperties, ServiceKind, Tenant, TenantService, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// An asset together with its per-service integration properties.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetBinding {
    pub asset: Asset,
    pub properties: ServiceAssetProperties,
}

/// The remote account of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceUser {
    pub remote_id: String,
    pub login: String,
    pub active: bool,
}

/// A device known to a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDevice {
    pub remote_id: String,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    /// Login of the enrolled user, if any.
    pub enrolled_user: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Most recent activity of one remote account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserActivity {
    pub login: String,
    pub last_seen: DateTime<Utc>,
}

/// Latest `last_seen` per enrolled user, sorted by login.
pub fn activity_from_devices(devices: Vec<RemoteDevice>) -> Vec<UserActivity> {
    let mut latest: HashMap<String, DateTime<Utc>> = HashMap::new();
    for device in devices {
        if let (Some(login), Some(seen)) = (device.enrolled_user, device.last_seen) {
            let entry = latest.entry(login).or_insert(seen);
            if seen > *entry {
                *entry = seen;
            }
        }
    }
    let mut activity: Vec<UserActivity> = latest
        .into_iter()
        .map(|(login, last_seen)| UserActivity { login, last_seen })
        .collect();
    activity.sort_by(|a, b| a.login.cmp(&b.login));
    activity
}

/// Capability set of a remote platform integration.
#[async_trait]
pub trait ServiceAdapter: Send + Sync {
    fn kind(&self) -> ServiceKind;

    /// Login the user has on this service.
    fn login_for(&self, user: &User) -> String;

    /// Create the remote account if absent; existing accounts are returned as is.
    async fn register(&self, user: &User) -> AdapterResult<ServiceUser>;

    /// Enable login for the user, registering them first if needed.
    async fn activate(&self, user: &User) -> AdapterResult<()>;

    async fn deactivate(&self, user: &User) -> AdapterResult<()>;

    async fn assign(&self, binding: &AssetBinding, user: &User) -> AdapterResult<()>;

    async fn unassign(&self, binding: &AssetBinding, user: &User) -> AdapterResult<()>;

    async fn get_service_user(&self, user: &User) -> AdapterResult<ServiceUser>;

    /// The user's remote account, registered first when the service does not know it.
    async fn ensure_registered(&self, user: &User) -> AdapterResult<ServiceUser> {
        match self.get_service_user(user).await {
            Err(AdapterError::NotFound { .. }) => self.register(user).await,
            found => found,
        }
    }

    /// Push the asset's applications to every device the user has enrolled.
    /// Returns how many installs the service accepted.
    async fn install_apps(&self, _binding: &AssetBinding, _user: &User) -> AdapterResult<usize> {
        Ok(0)
    }

    /// Devices without an enrolled user.
    async fn get_available_devices(&self) -> AdapterResult<Vec<RemoteDevice>> {
        Ok(Vec::new())
    }

    /// Last activity per remote account.
    async fn list_activity(&self) -> AdapterResult<Vec<UserActivity>> {
        Ok(Vec::new())
    }
}

/// Builds adapters for services of one kind.
pub trait AdapterFactory: Send + Sync {
    fn kind(&self) -> ServiceKind;

    fn create(&self, tenant: &Tenant, service: &TenantService) -> AdapterResult<Arc<dyn ServiceAdapter>>;
}

/// Lookup table from service kind to adapter factory.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    factories: HashMap<ServiceKind, Arc<dyn AdapterFactory>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in HTTP adapters.
    pub fn standard(http: &HttpClientConfig) -> Self {
        Self::new()
            .with_factory(Arc::new(SsoAdapterFactory::new(http.clone())))
            .with_factory(Arc::new(MdmAdapterFactory::new(http.clone())))
            .with_factory(Arc::new(GenericAdapterFactory::new(http.clone())))
    }

    /// Install a factory, replacing any previous one for the same kind.
    pub fn with_factory(mut self, factory: Arc<dyn AdapterFactory>) -> Self {
        self.factories.insert(factory.kind(), factory);
        self
    }

    pub fn supports(&self, kind: ServiceKind) -> bool {
        self.factories.contains_key(&kind)
    }

    pub fn adapter_for(
        &self,
        tenant: &Tenant,
        service: &TenantService,
    ) -> ProvisionResult<Arc<dyn ServiceAdapter>> {
        if service.tenant_id != tenant.id {
            return Err(ProvisionError::tenant_mismatch(format!(
                "service {} does not belong to tenant {}",
                service.id, tenant.id
            )));
        }
        let factory = self.factories.get(&service.kind()).ok_or_else(|| {
            ProvisionError::configuration(format!("no adapter registered for {}", service.kind()))
        })?;
        Ok(factory.create(tenant, service)?)
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.factories.keys().collect();
        kinds.sort();
        f.debug_struct("AdapterRegistry").field("kinds", &kinds).finish()
    }
}
