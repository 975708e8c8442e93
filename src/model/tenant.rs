//! Tenant: the isolation boundary for all provisioning data.

use crate::audit::Editor;
use crate::model::TenantId;
use crate::store::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mail domain used for tenant logins when none is configured.
pub const DEFAULT_EMAIL_DOMAIN: &str = "onmicrosoft.com";

/// Connection settings for the tenant's remote user directory.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySettings {
    /// Base URL of the SCIM 2.0 endpoint, e.g. `https://directory.example.com/scim/v2`.
    pub base_url: String,
    pub bearer_token: String,
    /// Organizational unit newly pushed users are placed in, when the directory supports it.
    #[serde(default)]
    pub organization_unit: Option<String>,
}

impl std::fmt::Debug for DirectorySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectorySettings")
            .field("base_url", &self.base_url)
            .field("bearer_token", &"***")
            .field("organization_unit", &self.organization_unit)
            .finish()
    }
}

/// A customer organization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub active: bool,
    /// Account attributed as editor for administrative changes made on the tenant's behalf.
    pub primary_contact: Editor,
    pub email_domain: String,
    #[serde(default)]
    pub directory: Option<DirectorySettings>,
    pub created: DateTime<Utc>,
}

impl Tenant {
    pub fn new(name: impl Into<String>, primary_contact: Editor) -> Self {
        Self {
            id: TenantId::new(),
            name: name.into(),
            active: true,
            primary_contact,
            email_domain: DEFAULT_EMAIL_DOMAIN.to_string(),
            directory: None,
            created: Utc::now(),
        }
    }

    pub fn with_email_domain(mut self, domain: impl Into<String>) -> Self {
        self.email_domain = domain.into();
        self
    }

    pub fn with_directory(mut self, directory: DirectorySettings) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Login used for a user on remote platforms: `username@email_domain`.
    pub fn tenant_email(&self, username: &str) -> String {
        format!("{}@{}", username, self.email_domain)
    }
}

impl Entity for Tenant {
    const COLLECTION: &'static str = "tenants";

    fn tenant_id(&self) -> TenantId {
        self.id
    }

    fn storage_id(&self) -> String {
        self.id.to_string()
    }
}
