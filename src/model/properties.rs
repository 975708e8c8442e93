//! Per-(service, asset) integration metadata.
//!
//! Adapters need platform-specific identifiers for an asset: the SSO application id,
//! the MDM smart group, the list of mobile app ids to push. These live in a free-form
//! property map keyed by service and asset, created empty on first access.

use crate::model::{AssetId, ServiceId, TenantId};
use crate::store::Entity;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const APPLICATION_ID: &str = "application_id";
pub const PROFILE: &str = "profile";
pub const GROUP_ID: &str = "group_id";
pub const APP_IDS: &str = "app_ids";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceAssetProperties {
    pub tenant_id: TenantId,
    pub service_id: ServiceId,
    pub asset_id: AssetId,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ServiceAssetProperties {
    pub fn new(tenant_id: TenantId, service_id: ServiceId, asset_id: AssetId) -> Self {
        Self {
            tenant_id,
            service_id,
            asset_id,
            metadata: Map::new(),
        }
    }

    pub fn key_for(service_id: ServiceId, asset_id: AssetId) -> String {
        format!("{}:{}", service_id, asset_id)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.metadata.get(name)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.metadata.get(name).and_then(Value::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.metadata.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }
}

impl Entity for ServiceAssetProperties {
    const COLLECTION: &'static str = "service_assets";

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn storage_id(&self) -> String {
        Self::key_for(self.service_id, self.asset_id)
    }
}
