//! Storage abstraction layer for provisioning state.
//!
//! The `StorageProvider` trait defines pure data storage operations on JSON documents,
//! keeping persistence concerns apart from provisioning logic. Typed access to entities
//! lives one layer up, in [`crate::store`].
//!
//! # Architecture
//!
//! The storage layer is responsible for:
//! - Pure PUT/GET/DELETE operations on JSON data
//! - Tenant isolation through `tenant/collection/id` keys
//! - Atomic application of a [`WriteBatch`]
//!
//! The storage layer is NOT responsible for:
//! - Audit entries, history entries or any other provisioning bookkeeping
//! - Uniqueness rules beyond key identity
//! - Remote platform calls
//!
//! A batch is the unit of consistency: a tracked mutation, its audit entry and the
//! history entries opened or closed by event handlers are committed together, or not
//! at all.
//!
//! # Example Usage
//!
//! ```rust
//! use asset_provisioning::storage::{InMemoryStorage, StorageKey, StorageProvider, WriteBatch};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = InMemoryStorage::new();
//!
//! let mut batch = WriteBatch::new();
//! batch.put(StorageKey::new("tenant1", "users", "u1"), json!({"username": "jdoe"}));
//! batch.put(StorageKey::new("tenant1", "audit_log", "a1"), json!({"data": {}}));
//! storage.commit(batch).await?;
//!
//! assert!(storage.exists(StorageKey::new("tenant1", "users", "u1")).await?);
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod in_memory;


pub use errors::StorageError;
pub use in_memory::{InMemoryStorage, InMemoryStorageStats};

use serde_json::Value;
use std::fmt;
use std::future::Future;

/// A hierarchical key identifying one stored document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey {
    tenant_id: String,
    collection: String,
    id: String,
}

impl StorageKey {
    pub fn new(
        tenant_id: impl Into<String>,
        collection: impl Into<String>,
        id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Prefix addressing every document of one collection within a tenant.
    pub fn prefix(tenant_id: impl Into<String>, collection: impl Into<String>) -> StoragePrefix {
        StoragePrefix {
            tenant_id: tenant_id.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tenant_id, self.collection, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePrefix {
    tenant_id: String,
    collection: String,
}

impl StoragePrefix {
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for StoragePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant_id, self.collection)
    }
}

/// A single staged write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put { key: StorageKey, data: Value },
    Delete { key: StorageKey },
}

impl WriteOp {
    pub fn key(&self) -> &StorageKey {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Delete { key } => key,
        }
    }
}

/// An ordered set of writes applied all-or-nothing by [`StorageProvider::commit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: StorageKey, data: Value) {
        self.ops.push(WriteOp::Put { key, data });
    }

    pub fn delete(&mut self, key: StorageKey) {
        self.ops.push(WriteOp::Delete { key });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    /// Whether any staged write touches the given collection.
    pub fn touches(&self, collection: &str) -> bool {
        self.ops.iter().any(|op| op.key().collection() == collection)
    }
}

/// Core trait for storage providers.
///
/// Implementations must keep tenants isolated and must apply a [`WriteBatch`]
/// atomically: either every operation in it becomes visible, or none does.
pub trait StorageProvider: Send + Sync {
    /// The error type returned by storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Store a document at the given key, replacing any previous value.
    fn put(
        &self,
        key: StorageKey,
        data: Value,
    ) -> impl Future<Output = Result<Value, Self::Error>> + Send;

    /// Retrieve the document stored at the given key.
    fn get(
        &self,
        key: StorageKey,
    ) -> impl Future<Output = Result<Option<Value>, Self::Error>> + Send;

    /// Delete the document at the given key. Returns whether it existed.
    fn delete(&self, key: StorageKey) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// List documents under a prefix, ordered by id, with pagination.
    fn list(
        &self,
        prefix: StoragePrefix,
        offset: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<(StorageKey, Value)>, Self::Error>> + Send;

    /// Find documents under a prefix whose attribute (dot notation) equals `value`.
    fn find_by_attribute(
        &self,
        prefix: StoragePrefix,
        attribute: &str,
        value: &str,
    ) -> impl Future<Output = Result<Vec<(StorageKey, Value)>, Self::Error>> + Send;

    /// Check whether a document exists.
    fn exists(&self, key: StorageKey) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Count documents under a prefix.
    fn count(
        &self,
        prefix: StoragePrefix,
    ) -> impl Future<Output = Result<usize, Self::Error>> + Send;

    /// List every tenant id with stored data.
    fn list_tenants(&self) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send;

    /// Apply every operation of the batch atomically, in order.
    fn commit(&self, batch: WriteBatch) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Remove all stored data.
    fn clear(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
