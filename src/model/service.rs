//! Tenant services: configured integrations with remote platforms.
//!
//! Every service is one row with a [`ServiceSettings`] tag carrying the
//! platform-specific connection details. The [`ServiceKind`] derived from that tag
//! selects the adapter factory in [`crate::adapters::AdapterRegistry`].

use crate::audit::Trackable;
use crate::model::{ServiceId, TenantId};
use crate::store::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::str::FromStr;

/// Platform category a service provides access to. A tenant may have at most
/// one active service per platform type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformType {
    Mobile,
    Web,
    Windows,
}

impl PlatformType {
    pub const ALL: [PlatformType; 3] = [PlatformType::Mobile, PlatformType::Web, PlatformType::Windows];
}

impl fmt::Display for PlatformType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlatformType::Mobile => "mobile",
            PlatformType::Web => "web",
            PlatformType::Windows => "windows",
        };
        f.write_str(s)
    }
}

/// The kind of remote platform behind a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    /// SSO provider that also owns the user directory (Okta style).
    DirectorySso,
    /// Mobile device management (AirWatch style).
    Mdm,
    /// Secondary platform without a rich integration.
    Generic,
}

impl ServiceKind {
    pub fn slug(&self) -> &'static str {
        match self {
            ServiceKind::DirectorySso => "directory-sso",
            ServiceKind::Mdm => "mdm",
            ServiceKind::Generic => "generic",
        }
    }

    pub fn default_platform(&self) -> PlatformType {
        match self {
            ServiceKind::DirectorySso => PlatformType::Web,
            ServiceKind::Mdm => PlatformType::Mobile,
            ServiceKind::Generic => PlatformType::Windows,
        }
    }

    /// Whether services of this kind are the source of truth for user registration.
    pub fn is_directory_controller(&self) -> bool {
        matches!(self, ServiceKind::DirectorySso)
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for ServiceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "directory-sso" | "sso" | "okta" => Ok(ServiceKind::DirectorySso),
            "mdm" | "airwatch" | "air-watch" => Ok(ServiceKind::Mdm),
            "generic" | "google" => Ok(ServiceKind::Generic),
            other => Err(format!("Unknown service kind '{}'", other)),
        }
    }
}

/// Platform-specific connection settings.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ServiceSettings {
    DirectorySso {
        /// Organization subdomain, e.g. `acme` for `https://acme.okta.com`.
        domain: String,
        /// Explicit API base URL; overrides the one derived from `domain`.
        #[serde(default)]
        base_url: Option<String>,
    },
    Mdm {
        server_url: String,
        username: String,
        password: String,
        /// Location group new enrollment users are created in.
        group_id: String,
    },
    Generic {
        name: String,
        /// Device inventory read for last-seen reports.
        #[serde(default)]
        device_inventory: Option<DeviceInventorySettings>,
    },
}

/// Google Admin directory holding a customer's ChromeOS devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInventorySettings {
    #[serde(default = "DeviceInventorySettings::default_customer")]
    pub customer_id: String,
    /// Explicit API base URL; defaults to `https://admin.googleapis.com`.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl DeviceInventorySettings {
    fn default_customer() -> String {
        "my_customer".to_string()
    }

    pub fn api_base(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| "https://admin.googleapis.com".to_string())
    }
}

impl Default for DeviceInventorySettings {
    fn default() -> Self {
        Self {
            customer_id: Self::default_customer(),
            base_url: None,
        }
    }
}

impl ServiceSettings {
    pub fn kind(&self) -> ServiceKind {
        match self {
            ServiceSettings::DirectorySso { .. } => ServiceKind::DirectorySso,
            ServiceSettings::Mdm { .. } => ServiceKind::Mdm,
            ServiceSettings::Generic { .. } => ServiceKind::Generic,
        }
    }
}

impl fmt::Debug for ServiceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceSettings::DirectorySso { domain, base_url } => f
                .debug_struct("DirectorySso")
                .field("domain", domain)
                .field("base_url", base_url)
                .finish(),
            ServiceSettings::Mdm {
                server_url,
                username,
                group_id,
                ..
            } => f
                .debug_struct("Mdm")
                .field("server_url", server_url)
                .field("username", username)
                .field("password", &"***")
                .field("group_id", group_id)
                .finish(),
            ServiceSettings::Generic {
                name,
                device_inventory,
            } => f
                .debug_struct("Generic")
                .field("name", name)
                .field("device_inventory", device_inventory)
                .finish(),
        }
    }
}

/// A configured remote platform instance for a tenant.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantService {
    pub id: ServiceId,
    pub tenant_id: TenantId,
    pub is_active: bool,
    pub api_token: String,
    pub settings: ServiceSettings,
    #[serde(default)]
    pub platform_override: Option<PlatformType>,
    pub created: DateTime<Utc>,
}

impl TenantService {
    pub fn new(tenant_id: TenantId, api_token: impl Into<String>, settings: ServiceSettings) -> Self {
        Self {
            id: ServiceId::new(),
            tenant_id,
            is_active: true,
            api_token: api_token.into(),
            settings,
            platform_override: None,
            created: Utc::now(),
        }
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn with_platform(mut self, platform: PlatformType) -> Self {
        self.platform_override = Some(platform);
        self
    }

    pub fn kind(&self) -> ServiceKind {
        self.settings.kind()
    }

    pub fn platform_type(&self) -> PlatformType {
        self.platform_override
            .unwrap_or_else(|| self.kind().default_platform())
    }

    pub fn is_directory_controller(&self) -> bool {
        self.kind().is_directory_controller()
    }

    /// Human facing name of the service.
    pub fn name(&self) -> String {
        match &self.settings {
            ServiceSettings::DirectorySso { domain, .. } => format!("SSO ({})", domain),
            ServiceSettings::Mdm { server_url, .. } => format!("MDM ({})", server_url),
            ServiceSettings::Generic { name, .. } => name.clone(),
        }
    }

    /// End-user portal of the platform, when it has one.
    pub fn portal_url(&self) -> Option<String> {
        match &self.settings {
            ServiceSettings::DirectorySso { domain, base_url } => Some(
                base_url
                    .clone()
                    .unwrap_or_else(|| format!("https://{}.okta.com", domain)),
            ),
            ServiceSettings::Mdm { server_url, .. } => Some(server_url.clone()),
            ServiceSettings::Generic { .. } => None,
        }
    }
}

impl fmt::Debug for TenantService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantService")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("is_active", &self.is_active)
            .field("api_token", &"***")
            .field("settings", &self.settings)
            .field("platform_override", &self.platform_override)
            .finish()
    }
}

impl fmt::Display for TenantService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} service {}", self.kind(), self.id)
    }
}

impl Entity for TenantService {
    const COLLECTION: &'static str = "services";

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn storage_id(&self) -> String {
        self.id.to_string()
    }
}

impl Trackable for TenantService {
    fn tracked_attributes(&self) -> Value {
        json!({
            "is_active": self.is_active,
            "platform_type": self.platform_type(),
        })
    }
}
