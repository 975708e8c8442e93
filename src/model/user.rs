//! Users of a tenant and their lifecycle status.

use crate::audit::Trackable;
use crate::model::{TenantId, UserId};
use crate::store::Entity;
use crate::sync::{SyncState, Synchronizable};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;

/// Lifecycle status of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Staged,
    Pending,
    Active,
    Suspended,
    Disabled,
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UserStatus::Staged => "staged",
            UserStatus::Pending => "pending",
            UserStatus::Active => "active",
            UserStatus::Suspended => "suspended",
            UserStatus::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// An employee of a tenant. Users are never deleted by provisioning, only
/// deactivated and stripped of their assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub tenant_id: TenantId,
    pub username: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mobile_phone_number: Option<String>,
    #[serde(default)]
    pub status: UserStatus,
    #[serde(default)]
    pub sync: SyncState,
}

impl User {
    pub fn new(tenant_id: TenantId, username: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            tenant_id,
            username: username.into(),
            first_name: None,
            last_name: None,
            display_name: None,
            email: None,
            mobile_phone_number: None,
            status: UserStatus::default(),
            sync: SyncState::default(),
        }
    }

    pub fn with_name(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self.last_name = Some(last_name.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_status(mut self, status: UserStatus) -> Self {
        self.status = status;
        self
    }

    /// "First Last", skipping whichever part is missing.
    pub fn default_display_name(&self) -> String {
        [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn effective_display_name(&self) -> String {
        match &self.display_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => self.default_display_name(),
        }
    }
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.username)
    }
}

impl Entity for User {
    const COLLECTION: &'static str = "users";

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn storage_id(&self) -> String {
        self.id.to_string()
    }
}

impl Trackable for User {
    fn tracked_attributes(&self) -> Value {
        json!({
            "first_name": self.first_name,
            "last_name": self.last_name,
            "status": self.status,
        })
    }
}

impl Synchronizable for User {
    fn sync_state(&self) -> &SyncState {
        &self.sync
    }

    fn sync_state_mut(&mut self) -> &mut SyncState {
        &mut self.sync
    }
}
