//! Audit trail for tracked entities.
//!
//! Every mutation of a [`Trackable`] entity goes through a [`Tracker`], which:
//! 1. refuses the change when no [`Editor`] is attributed,
//! 2. stages the new state and an [`AuditLogEntry`] holding the *previous* values of
//!    the tracked attributes (an empty object on creation),
//! 3. publishes a [`ChangeNotification`] on the [`EventBus`],
//!
//! all within one [`Transaction`]. If any write of that transaction fails, none is
//! applied.
//!
//! # Example Usage
//!
//! ```rust
//! use asset_provisioning::audit::{Editor, Tracker};
//! use asset_provisioning::events::EventBus;
//! use asset_provisioning::model::{TenantId, User};
//! use asset_provisioning::storage::InMemoryStorage;
//! use asset_provisioning::store::Repository;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let repository = Repository::new(Arc::new(InMemoryStorage::new()));
//! let tracker = Tracker::new(repository, Arc::new(EventBus::new()));
//!
//! let user = User::new(TenantId::new(), "jdoe").with_name("Jane", "Doe");
//! let editor = Editor::new("admin@example.com");
//! tracker.save(Some(&editor), &user).await?;
//!
//! assert!(tracker.save(None, &user).await.is_err());
//! # Ok(())
//! # }
//! ```

use crate::error::{ProvisionError, ProvisionResult};
use crate::events::{DomainEvent, EventBus};
use crate::model::{EntryId, TenantId};
use crate::storage::StorageProvider;
use crate::store::{Entity, Repository, Transaction};
use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::fmt;
use std::sync::Arc;

/// The account a change is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Editor(String);

impl Editor {
    pub fn new(account: impl Into<String>) -> Self {
        Self(account.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Entities whose changes are audited.
pub trait Trackable: Entity {
    /// Snapshot of the attributes recorded in audit entries.
    fn tracked_attributes(&self) -> Value;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    Created,
    Updated,
    Deleted,
}

/// One audited mutation. `data` holds the tracked attributes as they were before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: EntryId,
    pub tenant_id: TenantId,
    pub entity_type: String,
    pub entity_id: String,
    pub edited_by: Editor,
    pub action: AuditAction,
    pub data: Value,
    pub created: DateTime<Utc>,
}

impl Entity for AuditLogEntry {
    const COLLECTION: &'static str = "audit_log";

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    fn storage_id(&self) -> String {
        self.id.to_string()
    }
}

/// Published after a tracked entity is staged for saving.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    pub editor: Editor,
    pub created: bool,
    pub tenant_id: TenantId,
    pub entity_type: String,
    pub entity_id: String,
    /// New state of the entity.
    pub instance: Value,
    /// Tracked attributes before the change; empty object on creation.
    pub original: Value,
}

/// Performs tracked mutations.
pub struct Tracker<S> {
    repository: Repository<S>,
    bus: Arc<EventBus<S>>,
}

impl<S> Clone for Tracker<S> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            bus: Arc::clone(&self.bus),
        }
    }
}

impl<S: StorageProvider> Tracker<S> {
    pub fn new(repository: Repository<S>, bus: Arc<EventBus<S>>) -> Self {
        Self { repository, bus }
    }

    pub fn repository(&self) -> &Repository<S> {
        &self.repository
    }

    pub fn bus(&self) -> &Arc<EventBus<S>> {
        &self.bus
    }

    /// Save an entity in its own transaction. Returns whether it was created.
    pub async fn save<E: Trackable>(&self, editor: Option<&Editor>, entity: &E) -> ProvisionResult<bool> {
        let mut tx = Transaction::new();
        let created = self.stage_save(editor, entity, &mut tx).await?;
        self.commit(tx).await?;
        Ok(created)
    }

    /// Delete an entity in its own transaction.
    pub async fn delete<E: Trackable>(&self, editor: Option<&Editor>, entity: &E) -> ProvisionResult<()> {
        let mut tx = Transaction::new();
        self.stage_delete(editor, entity, &mut tx).await?;
        self.commit(tx).await
    }

    /// Stage a save into a caller-owned transaction.
    pub async fn stage_save<E: Trackable>(
        &self,
        editor: Option<&Editor>,
        entity: &E,
        tx: &mut Transaction,
    ) -> ProvisionResult<bool> {
        let editor = editor.ok_or_else(|| {
            ProvisionError::untrackable(format!(
                "{} {} saved without an editor",
                E::COLLECTION,
                entity.storage_id()
            ))
        })?;

        let previous: Option<E> = self
            .repository
            .get(entity.tenant_id(), &entity.storage_id())
            .await?;
        let created = previous.is_none();
        let original = previous
            .map(|p| p.tracked_attributes())
            .unwrap_or_else(|| json!({}));

        tx.put(entity)?;
        tx.put(&AuditLogEntry {
            id: EntryId::new(),
            tenant_id: entity.tenant_id(),
            entity_type: E::COLLECTION.to_string(),
            entity_id: entity.storage_id(),
            edited_by: editor.clone(),
            action: if created {
                AuditAction::Created
            } else {
                AuditAction::Updated
            },
            data: original.clone(),
            created: Utc::now(),
        })?;

        debug!(
            "Staged {} of {} {} by {}",
            if created { "creation" } else { "update" },
            E::COLLECTION,
            entity.storage_id(),
            editor
        );

        let notification = ChangeNotification {
            editor: editor.clone(),
            created,
            tenant_id: entity.tenant_id(),
            entity_type: E::COLLECTION.to_string(),
            entity_id: entity.storage_id(),
            instance: serde_json::to_value(entity)?,
            original,
        };
        self.bus
            .publish(DomainEvent::TrackableChanged(notification), &self.repository, tx)
            .await?;

        Ok(created)
    }

    /// Stage a removal into a caller-owned transaction.
    pub async fn stage_delete<E: Trackable>(
        &self,
        editor: Option<&Editor>,
        entity: &E,
        tx: &mut Transaction,
    ) -> ProvisionResult<()> {
        let editor = editor.ok_or_else(|| {
            ProvisionError::untrackable(format!(
                "{} {} deleted without an editor",
                E::COLLECTION,
                entity.storage_id()
            ))
        })?;

        self.bus
            .publish(
                DomainEvent::PreDelete {
                    tenant_id: entity.tenant_id(),
                    entity_type: E::COLLECTION.to_string(),
                    entity_id: entity.storage_id(),
                    instance: serde_json::to_value(entity)?,
                },
                &self.repository,
                tx,
            )
            .await?;

        tx.delete(entity);
        tx.put(&AuditLogEntry {
            id: EntryId::new(),
            tenant_id: entity.tenant_id(),
            entity_type: E::COLLECTION.to_string(),
            entity_id: entity.storage_id(),
            edited_by: editor.clone(),
            action: AuditAction::Deleted,
            data: entity.tracked_attributes(),
            created: Utc::now(),
        })?;

        debug!(
            "Staged removal of {} {} by {}",
            E::COLLECTION,
            entity.storage_id(),
            editor
        );
        Ok(())
    }

    /// Commit a transaction and notify commit listeners.
    pub async fn commit(&self, tx: Transaction) -> ProvisionResult<()> {
        let deferred = self.repository.commit(tx).await?;
        self.bus.dispatch_committed(deferred, &self.repository).await;
        Ok(())
    }

    /// Audit entries of one entity, oldest first.
    pub async fn audit_trail(
        &self,
        tenant_id: TenantId,
        entity_type: &str,
        entity_id: &str,
    ) -> ProvisionResult<Vec<AuditLogEntry>> {
        let mut entries: Vec<AuditLogEntry> = self
            .repository
            .find(tenant_id, "entity_id", entity_id)
            .await?;
        entries.retain(|entry| entry.entity_type == entity_type);
        entries.sort_by_key(|entry| entry.created);
        Ok(entries)
    }
}
