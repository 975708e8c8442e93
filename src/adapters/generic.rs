//! Pass-through adapter for secondary platforms without a rich integration.
//!
//! Registration and activation only record intent in the log; assignments are
//! tracked locally and never pushed anywhere. When the service names a device
//! inventory, its ChromeOS devices back availability and last-seen reports.

use crate::adapters::google::DeviceInventory;
use crate::adapters::{
    AdapterFactory, AdapterResult, AssetBinding, RemoteDevice, ServiceAdapter, ServiceUser,
    UserActivity, activity_from_devices,
};
use crate::config::HttpClientConfig;
use crate::model::{ServiceKind, ServiceSettings, Tenant, TenantService, User};
use async_trait::async_trait;
use log::debug;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct GenericAdapterFactory {
    http: HttpClientConfig,
}

impl GenericAdapterFactory {
    pub fn new(http: HttpClientConfig) -> Self {
        Self { http }
    }
}

impl AdapterFactory for GenericAdapterFactory {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Generic
    }

    fn create(&self, tenant: &Tenant, service: &TenantService) -> AdapterResult<Arc<dyn ServiceAdapter>> {
        let inventory = match &service.settings {
            ServiceSettings::Generic {
                device_inventory: Some(settings),
                ..
            } => Some(DeviceInventory::new(settings, &service.api_token, &self.http)?),
            _ => None,
        };
        Ok(Arc::new(GenericAdapter {
            tenant: tenant.clone(),
            service_name: service.name(),
            inventory,
        }))
    }
}

pub struct GenericAdapter {
    tenant: Tenant,
    service_name: String,
    inventory: Option<DeviceInventory>,
}

impl GenericAdapter {
    async fn devices(&self) -> AdapterResult<Vec<RemoteDevice>> {
        match &self.inventory {
            Some(inventory) => inventory.devices().await,
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl ServiceAdapter for GenericAdapter {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Generic
    }

    fn login_for(&self, user: &User) -> String {
        self.tenant.tenant_email(&user.username)
    }

    async fn register(&self, user: &User) -> AdapterResult<ServiceUser> {
        let login = self.login_for(user);
        debug!("Registering {} on {}", login, self.service_name);
        Ok(ServiceUser {
            remote_id: login.clone(),
            login,
            active: false,
        })
    }

    async fn activate(&self, user: &User) -> AdapterResult<()> {
        debug!("Activating {} on {}", user.username, self.service_name);
        Ok(())
    }

    async fn deactivate(&self, _user: &User) -> AdapterResult<()> {
        Ok(())
    }

    async fn assign(&self, _binding: &AssetBinding, _user: &User) -> AdapterResult<()> {
        Ok(())
    }

    async fn unassign(&self, _binding: &AssetBinding, _user: &User) -> AdapterResult<()> {
        Ok(())
    }

    async fn get_service_user(&self, user: &User) -> AdapterResult<ServiceUser> {
        let login = self.login_for(user);
        Ok(ServiceUser {
            remote_id: login.clone(),
            login,
            active: true,
        })
    }

    async fn get_available_devices(&self) -> AdapterResult<Vec<RemoteDevice>> {
        let mut devices = self.devices().await?;
        devices.retain(|device| device.enrolled_user.is_none());
        Ok(devices)
    }

    async fn list_activity(&self) -> AdapterResult<Vec<UserActivity>> {
        Ok(activity_from_devices(self.devices().await?))
    }
}
