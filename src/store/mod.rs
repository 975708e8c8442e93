//! Typed, tenant-scoped access to entities on top of a [`StorageProvider`].
//!
//! [`Repository`] reads and writes domain entities as JSON documents; [`Transaction`]
//! collects the writes of one unit of work so they can be committed as a single
//! [`WriteBatch`].

use crate::error::{ProvisionError, ProvisionResult};
use crate::events::DomainEvent;
use crate::model::TenantId;
use crate::storage::{StorageKey, StorageProvider, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// A document type persisted in one collection of a tenant.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    /// Collection name, also used as the entity type in audit entries.
    const COLLECTION: &'static str;

    fn tenant_id(&self) -> TenantId;

    fn storage_id(&self) -> String;

    fn storage_key(&self) -> StorageKey {
        StorageKey::new(self.tenant_id().to_string(), Self::COLLECTION, self.storage_id())
    }
}

/// Typed entity access for one storage backend.
pub struct Repository<S> {
    storage: Arc<S>,
}

impl<S> Clone for Repository<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: StorageProvider> Repository<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub async fn get<E: Entity>(&self, tenant_id: TenantId, id: &str) -> ProvisionResult<Option<E>> {
        let key = StorageKey::new(tenant_id.to_string(), E::COLLECTION, id);
        match self.storage.get(key).await.map_err(ProvisionError::storage)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Like [`Repository::get`], but a missing entity is an error.
    pub async fn load<E: Entity>(&self, tenant_id: TenantId, id: &str) -> ProvisionResult<E> {
        self.get(tenant_id, id)
            .await?
            .ok_or_else(|| ProvisionError::not_found(E::COLLECTION, id))
    }

    pub async fn list<E: Entity>(&self, tenant_id: TenantId) -> ProvisionResult<Vec<E>> {
        let prefix = StorageKey::prefix(tenant_id.to_string(), E::COLLECTION);
        let documents = self
            .storage
            .list(prefix, 0, usize::MAX)
            .await
            .map_err(ProvisionError::storage)?;
        documents
            .into_iter()
            .map(|(_, value)| serde_json::from_value(value).map_err(ProvisionError::from))
            .collect()
    }

    /// Entities whose `attribute` (dot notation) equals `value`.
    pub async fn find<E: Entity>(
        &self,
        tenant_id: TenantId,
        attribute: &str,
        value: &str,
    ) -> ProvisionResult<Vec<E>> {
        let prefix = StorageKey::prefix(tenant_id.to_string(), E::COLLECTION);
        let documents = self
            .storage
            .find_by_attribute(prefix, attribute, value)
            .await
            .map_err(ProvisionError::storage)?;
        documents
            .into_iter()
            .map(|(_, value)| serde_json::from_value(value).map_err(ProvisionError::from))
            .collect()
    }

    /// Untracked single write for entities outside the audit trail.
    pub async fn put<E: Entity>(&self, entity: &E) -> ProvisionResult<()> {
        let value = serde_json::to_value(entity)?;
        self.storage
            .put(entity.storage_key(), value)
            .await
            .map_err(ProvisionError::storage)?;
        Ok(())
    }

    pub async fn tenant_ids(&self) -> ProvisionResult<Vec<TenantId>> {
        let tenants = self
            .storage
            .list_tenants()
            .await
            .map_err(ProvisionError::storage)?;
        Ok(tenants.iter().filter_map(|id| id.parse().ok()).collect())
    }

    /// Apply the staged writes of a transaction atomically. Deferred events are
    /// returned for after-commit delivery.
    pub async fn commit(&self, tx: Transaction) -> ProvisionResult<Vec<DomainEvent>> {
        let (batch, deferred) = tx.into_parts();
        if !batch.is_empty() {
            self.storage
                .commit(batch)
                .await
                .map_err(ProvisionError::storage)?;
        }
        Ok(deferred)
    }
}

/// Writes and deferred events of one unit of work.
#[derive(Debug, Default)]
pub struct Transaction {
    batch: WriteBatch,
    deferred: Vec<DomainEvent>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put<E: Entity>(&mut self, entity: &E) -> ProvisionResult<()> {
        let value = serde_json::to_value(entity)?;
        self.batch.put(entity.storage_key(), value);
        Ok(())
    }

    pub fn delete<E: Entity>(&mut self, entity: &E) {
        self.batch.delete(entity.storage_key());
    }

    /// Queue an event for delivery once the transaction is committed.
    pub fn defer(&mut self, event: DomainEvent) {
        self.deferred.push(event);
    }

    pub fn batch(&self) -> &WriteBatch {
        &self.batch
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn into_parts(self) -> (WriteBatch, Vec<DomainEvent>) {
        (self.batch, self.deferred)
    }
}
