//! Provisioning bookkeeping: current assignments, their history, and last activity.

use crate::audit::Trackable;
use crate::error::{ProvisionError, ProvisionResult};
use crate::model::{EntryId, ItemRef, ServiceId, TenantId, UserId};
use crate::store::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

fn item_key(user_id: UserId, service_id: ServiceId, item: &ItemRef) -> String {
    format!("{}:{}:{}:{}", user_id, service_id, item.kind_str(), item.id_string())
}

/// The current fact "item X is provisioned to user U on service S".
///
/// At most one record exists per `(user, service, item kind, item id)`; the storage
/// id is derived from that tuple so a second insert overwrites rather than duplicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionRecord {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub service_id: ServiceId,
    pub item: ItemRef,
    pub created: DateTime<Utc>,
}

impl ProvisionRecord {
    pub fn new(tenant_id: TenantId, user_id: UserId, service_id: ServiceId, item: ItemRef) -> Self {
        Self {
            tenant_id,
            user_id,
            service_id,
            item,
            created: Utc::now(),
        }
    }

    pub fn key_for(user_id: UserId, service_id: ServiceId, item: &ItemRef) -> String {
        item_key(user_id, service_id, item)
    }
}

impl Entity for ProvisionRecord {
    const COLLECTION: &'static str = "records";

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn storage_id(&self) -> String {
        item_key(self.user_id, self.service_id, &self.item)
    }
}

impl Trackable for ProvisionRecord {
    fn tracked_attributes(&self) -> Value {
        json!({
            "user_id": self.user_id,
            "service_id": self.service_id,
            "item": self.item,
        })
    }
}

/// One interval during which an item was provisioned. `end` is `None` while the
/// assignment is active; once set the entry never changes again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionHistory {
    pub id: EntryId,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub service_id: ServiceId,
    pub item: ItemRef,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
}

impl ProvisionHistory {
    pub fn open(record: &ProvisionRecord, start: DateTime<Utc>) -> Self {
        Self {
            id: EntryId::new(),
            tenant_id: record.tenant_id,
            user_id: record.user_id,
            service_id: record.service_id,
            item: record.item,
            start,
            end: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    pub fn close(&mut self, end: DateTime<Utc>) -> ProvisionResult<()> {
        if self.end.is_some() {
            return Err(ProvisionError::HistoryClosed {
                entry_id: self.id.to_string(),
            });
        }
        self.end = Some(end);
        Ok(())
    }

    pub fn matches(&self, user_id: UserId, service_id: ServiceId, item: &ItemRef) -> bool {
        self.user_id == user_id && self.service_id == service_id && &self.item == item
    }
}

impl Entity for ProvisionHistory {
    const COLLECTION: &'static str = "history";

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn storage_id(&self) -> String {
        self.id.to_string()
    }
}

/// Most recent activity a service reported for a user and item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastSeenEvent {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub service_id: ServiceId,
    pub item: ItemRef,
    pub last_seen: DateTime<Utc>,
}

impl LastSeenEvent {
    pub fn key_for(user_id: UserId, service_id: ServiceId, item: &ItemRef) -> String {
        item_key(user_id, service_id, item)
    }
}

impl Entity for LastSeenEvent {
    const COLLECTION: &'static str = "last_seen";

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn storage_id(&self) -> String {
        item_key(self.user_id, self.service_id, &self.item)
    }
}
