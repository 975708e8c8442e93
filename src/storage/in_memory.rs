//! In-memory storage implementation.
//!
//! Thread-safe implementation of [`StorageProvider`] using nested HashMaps behind a
//! tokio `RwLock`. A [`WriteBatch`] is applied while holding the write lock once, so
//! concurrent readers observe either none or all of it.
//!
//! The whole store can be exported to and restored from a JSON snapshot, which is how
//! the `provisionctl` binary keeps state between invocations.
//!
//! # Example Usage
//!
//! ```rust
//! use asset_provisioning::storage::{InMemoryStorage, StorageKey, StorageProvider};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = InMemoryStorage::new();
//! let key = StorageKey::new("tenant1", "users", "u1");
//! storage.put(key.clone(), json!({"username": "jdoe", "tenant_id": "tenant1"})).await?;
//!
//! let prefix = StorageKey::prefix("tenant1", "users");
//! let found = storage.find_by_attribute(prefix, "username", "jdoe").await?;
//! assert_eq!(found.len(), 1);
//!
//! let snapshot = storage.snapshot().await;
//! let restored = InMemoryStorage::from_snapshot(snapshot)?;
//! assert!(restored.get(key).await?.is_some());
//! # Ok(())
//! # }
//! ```

use crate::storage::{StorageError, StorageKey, StoragePrefix, StorageProvider, WriteBatch, WriteOp};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type Collections = HashMap<String, HashMap<String, Value>>;

/// Thread-safe in-memory storage.
///
/// Structure: `tenant_id` → `collection` → `id` → `data`.
#[derive(Clone)]
pub struct InMemoryStorage {
    data: Arc<RwLock<HashMap<String, Collections>>>,
}

impl InMemoryStorage {
    /// Create a new empty in-memory storage instance.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Restore a storage instance from a snapshot produced by [`InMemoryStorage::snapshot`].
    pub fn from_snapshot(snapshot: Value) -> Result<Self, StorageError> {
        let data: HashMap<String, Collections> = match snapshot {
            Value::Null => HashMap::new(),
            other => serde_json::from_value(other).map_err(|e| {
                StorageError::invalid_data("storage snapshot", Some(e.to_string()))
            })?,
        };
        Ok(Self {
            data: Arc::new(RwLock::new(data)),
        })
    }

    /// Export the complete store as a JSON document.
    pub async fn snapshot(&self) -> Value {
        let data_guard = self.data.read().await;
        serde_json::to_value(&*data_guard).unwrap_or(Value::Null)
    }

    /// Get storage statistics for debugging and monitoring.
    pub async fn stats(&self) -> InMemoryStorageStats {
        let data_guard = self.data.read().await;
        let mut collection_count = 0;
        let mut total_documents = 0;

        for tenant_data in data_guard.values() {
            for docs in tenant_data.values() {
                collection_count += 1;
                total_documents += docs.len();
            }
        }

        InMemoryStorageStats {
            tenant_count: data_guard.len(),
            collection_count,
            total_documents,
        }
    }

    /// Extract a nested attribute value from JSON data using dot notation.
    fn extract_attribute_value(data: &Value, attribute_path: &str) -> Option<String> {
        let mut current = data;

        for part in attribute_path.split('.') {
            if let Ok(index) = part.parse::<usize>() {
                current = current.get(index)?;
            } else {
                current = current.get(part)?;
            }
        }

        match current {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    fn apply(data: &mut HashMap<String, Collections>, op: WriteOp) {
        match op {
            WriteOp::Put { key, data: value } => {
                data.entry(key.tenant_id().to_string())
                    .or_default()
                    .entry(key.collection().to_string())
                    .or_default()
                    .insert(key.id().to_string(), value);
            }
            WriteOp::Delete { key } => {
                if let Some(docs) = data
                    .get_mut(key.tenant_id())
                    .and_then(|tenant_data| tenant_data.get_mut(key.collection()))
                {
                    docs.remove(key.id());
                }
            }
        }
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageProvider for InMemoryStorage {
    type Error = StorageError;

    async fn put(&self, key: StorageKey, data: Value) -> Result<Value, Self::Error> {
        let mut data_guard = self.data.write().await;
        Self::apply(
            &mut data_guard,
            WriteOp::Put {
                key,
                data: data.clone(),
            },
        );
        Ok(data)
    }

    async fn get(&self, key: StorageKey) -> Result<Option<Value>, Self::Error> {
        let data_guard = self.data.read().await;

        let result = data_guard
            .get(key.tenant_id())
            .and_then(|tenant_data| tenant_data.get(key.collection()))
            .and_then(|docs| docs.get(key.id()))
            .cloned();

        Ok(result)
    }

    async fn delete(&self, key: StorageKey) -> Result<bool, Self::Error> {
        let mut data_guard = self.data.write().await;

        let existed = data_guard
            .get_mut(key.tenant_id())
            .and_then(|tenant_data| tenant_data.get_mut(key.collection()))
            .map(|docs| docs.remove(key.id()).is_some())
            .unwrap_or(false);

        Ok(existed)
    }

    async fn list(
        &self,
        prefix: StoragePrefix,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<(StorageKey, Value)>, Self::Error> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let data_guard = self.data.read().await;

        let docs = match data_guard
            .get(prefix.tenant_id())
            .and_then(|tenant_data| tenant_data.get(prefix.collection()))
        {
            Some(docs) => docs,
            None => return Ok(Vec::new()),
        };

        let mut ids: Vec<_> = docs.keys().collect();
        ids.sort();

        let results = ids
            .into_iter()
            .skip(offset)
            .take(limit)
            .filter_map(|id| {
                docs.get(id).map(|data| {
                    (
                        StorageKey::new(prefix.tenant_id(), prefix.collection(), id),
                        data.clone(),
                    )
                })
            })
            .collect();

        Ok(results)
    }

    async fn find_by_attribute(
        &self,
        prefix: StoragePrefix,
        attribute: &str,
        value: &str,
    ) -> Result<Vec<(StorageKey, Value)>, Self::Error> {
        let data_guard = self.data.read().await;

        let docs = match data_guard
            .get(prefix.tenant_id())
            .and_then(|tenant_data| tenant_data.get(prefix.collection()))
        {
            Some(docs) => docs,
            None => return Ok(Vec::new()),
        };

        let mut results: Vec<(StorageKey, Value)> = docs
            .iter()
            .filter(|(_, doc)| {
                Self::extract_attribute_value(doc, attribute).as_deref() == Some(value)
            })
            .map(|(id, doc)| {
                (
                    StorageKey::new(prefix.tenant_id(), prefix.collection(), id),
                    doc.clone(),
                )
            })
            .collect();

        results.sort_by(|a, b| a.0.id().cmp(b.0.id()));

        Ok(results)
    }

    async fn exists(&self, key: StorageKey) -> Result<bool, Self::Error> {
        let data_guard = self.data.read().await;

        Ok(data_guard
            .get(key.tenant_id())
            .and_then(|tenant_data| tenant_data.get(key.collection()))
            .is_some_and(|docs| docs.contains_key(key.id())))
    }

    async fn count(&self, prefix: StoragePrefix) -> Result<usize, Self::Error> {
        let data_guard = self.data.read().await;

        Ok(data_guard
            .get(prefix.tenant_id())
            .and_then(|tenant_data| tenant_data.get(prefix.collection()))
            .map(|docs| docs.len())
            .unwrap_or(0))
    }

    async fn list_tenants(&self) -> Result<Vec<String>, Self::Error> {
        let data_guard = self.data.read().await;
        let mut tenants: Vec<String> = data_guard.keys().cloned().collect();
        tenants.sort();
        Ok(tenants)
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), Self::Error> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut data_guard = self.data.write().await;
        for op in batch.into_ops() {
            Self::apply(&mut data_guard, op);
        }

        Ok(())
    }

    async fn clear(&self) -> Result<(), Self::Error> {
        let mut data_guard = self.data.write().await;
        data_guard.clear();
        Ok(())
    }
}

/// Statistics about the current state of in-memory storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryStorageStats {
    /// Number of tenants with data
    pub tenant_count: usize,
    /// Number of collections across all tenants
    pub collection_count: usize,
    /// Total number of stored documents
    pub total_documents: usize,
}
