//! Provisionable catalog items and the references used to provision them.

use crate::model::{AssetId, PlatformType, ServiceId, TenantId, TenantService};
use crate::store::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Platforms an asset can be delivered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SupportedPlatforms {
    pub web: bool,
    pub mobile: bool,
    pub desktop: bool,
}

impl SupportedPlatforms {
    pub const WEB: Self = Self {
        web: true,
        mobile: false,
        desktop: false,
    };
    pub const MOBILE: Self = Self {
        web: false,
        mobile: true,
        desktop: false,
    };

    pub fn supports(&self, platform: PlatformType) -> bool {
        match platform {
            PlatformType::Web => self.web,
            PlatformType::Mobile => self.mobile,
            PlatformType::Windows => self.desktop,
        }
    }
}

impl Default for SupportedPlatforms {
    fn default() -> Self {
        Self::WEB
    }
}

/// The three asset variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssetKind {
    Software {
        web: bool,
        mobile: bool,
        desktop: bool,
    },
    Device,
    MobileDataPlan,
}

/// A provisionable item from the tenant's catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    pub tenant_id: TenantId,
    pub name: String,
    pub slug: String,
    #[serde(default)]
    pub description: Option<String>,
    pub kind: AssetKind,
    pub created: DateTime<Utc>,
}

impl Asset {
    pub fn new(tenant_id: TenantId, name: impl Into<String>, kind: AssetKind) -> Self {
        let name = name.into();
        Self {
            id: AssetId::new(),
            tenant_id,
            slug: slugify(&name),
            name,
            description: None,
            kind,
            created: Utc::now(),
        }
    }

    pub fn software(tenant_id: TenantId, name: impl Into<String>, platforms: SupportedPlatforms) -> Self {
        Self::new(
            tenant_id,
            name,
            AssetKind::Software {
                web: platforms.web,
                mobile: platforms.mobile,
                desktop: platforms.desktop,
            },
        )
    }

    pub fn device(tenant_id: TenantId, name: impl Into<String>) -> Self {
        Self::new(tenant_id, name, AssetKind::Device)
    }

    pub fn data_plan(tenant_id: TenantId, name: impl Into<String>) -> Self {
        Self::new(tenant_id, name, AssetKind::MobileDataPlan)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn supported_platforms(&self) -> SupportedPlatforms {
        match &self.kind {
            AssetKind::Software {
                web,
                mobile,
                desktop,
            } => SupportedPlatforms {
                web: *web,
                mobile: *mobile,
                desktop: *desktop,
            },
            AssetKind::Device | AssetKind::MobileDataPlan => SupportedPlatforms::MOBILE,
        }
    }

    pub fn item_ref(&self) -> ItemRef {
        match self.kind {
            AssetKind::Software { .. } => ItemRef::Software(self.id),
            AssetKind::Device => ItemRef::Device(self.id),
            AssetKind::MobileDataPlan => ItemRef::DataPlan(self.id),
        }
    }

    /// Platform-capability match between this asset and a service.
    pub fn can_be_managed_by(&self, service: &TenantService) -> bool {
        self.tenant_id == service.tenant_id
            && self.supported_platforms().supports(service.platform_type())
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl Entity for Asset {
    const COLLECTION: &'static str = "assets";

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn storage_id(&self) -> String {
        self.id.to_string()
    }
}

/// Reference to anything that can be provisioned to a user on a service.
///
/// `Platform` stands for login access to the service itself; it is activated or
/// deactivated rather than assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ItemRef {
    Software(AssetId),
    Device(AssetId),
    DataPlan(AssetId),
    Platform(ServiceId),
}

impl ItemRef {
    pub fn kind_str(&self) -> &'static str {
        match self {
            ItemRef::Software(_) => "software",
            ItemRef::Device(_) => "device",
            ItemRef::DataPlan(_) => "data_plan",
            ItemRef::Platform(_) => "platform",
        }
    }

    pub fn id_string(&self) -> String {
        match self {
            ItemRef::Software(id) | ItemRef::Device(id) | ItemRef::DataPlan(id) => id.to_string(),
            ItemRef::Platform(id) => id.to_string(),
        }
    }

    pub fn asset_id(&self) -> Option<AssetId> {
        match self {
            ItemRef::Software(id) | ItemRef::Device(id) | ItemRef::DataPlan(id) => Some(*id),
            ItemRef::Platform(_) => None,
        }
    }

    pub fn is_platform(&self) -> bool {
        matches!(self, ItemRef::Platform(_))
    }
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind_str(), self.id_string())
    }
}

/// Lowercase, alphanumeric runs joined by single dashes.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
