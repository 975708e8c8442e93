//! Domain model of the provisioning platform.
//!
//! Every entity is tenant-scoped and stored as a JSON document through
//! [`crate::store::Repository`].

pub mod asset;
pub mod ids;
pub mod properties;
pub mod provision;
pub mod service;
pub mod tenant;
pub mod user;

pub use asset::{Asset, AssetKind, ItemRef, SupportedPlatforms, slugify};
pub use ids::{AssetId, EntryId, ServiceId, TenantId, UserId};
pub use properties::ServiceAssetProperties;
pub use provision::{LastSeenEvent, ProvisionHistory, ProvisionRecord};
pub use service::{DeviceInventorySettings, PlatformType, ServiceKind, ServiceSettings, TenantService};
pub use tenant::{DEFAULT_EMAIL_DOMAIN, DirectorySettings, Tenant};
pub use user::{User, UserStatus};
