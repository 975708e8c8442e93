//! Error types for provisioning operations.
//!
//! [`ProvisionError`] is the error of every engine, tracker and directory operation.
//! Remote failures carry an [`AdapterError`] whose [`FailureClass`](crate::adapters::FailureClass)
//! tells the engine whether the failure is benign.

use crate::adapters::AdapterError;
use crate::model::PlatformType;
use crate::storage::StorageError;
use crate::sync::SyncError;

/// Main error type for provisioning operations.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// A trackable mutation was attempted without an editor
    #[error("Untrackable change: {message}")]
    UntrackableChange { message: String },

    /// Errors from the storage provider
    #[error("Storage error: {0}")]
    Storage(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// User, service or asset belong to different tenants
    #[error("Tenant mismatch: {message}")]
    TenantMismatch { message: String },

    #[error("Tenant {tenant_id} already has an active {platform} service")]
    DuplicateActiveService {
        tenant_id: String,
        platform: PlatformType,
    },

    #[error("Tenant {tenant_id} already has a user named '{username}'")]
    DuplicateUsername { tenant_id: String, username: String },

    /// Local records would outlive a remote assignment nobody removed
    #[error("User '{username}' still has {records} provisioned item(s)")]
    StillProvisioned { username: String, records: usize },

    /// Attempt to modify a history entry that already has an end date
    #[error("History entry {entry_id} is already closed")]
    HistoryClosed { entry_id: String },

    /// Remote service failures
    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Directory synchronization failures
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisionError {
    /// Wrap any storage provider error.
    pub fn storage<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Storage(Box::new(error))
    }

    pub fn untrackable(message: impl Into<String>) -> Self {
        Self::UntrackableChange {
            message: message.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    pub fn tenant_mismatch(message: impl Into<String>) -> Self {
        Self::TenantMismatch {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

impl From<StorageError> for ProvisionError {
    fn from(error: StorageError) -> Self {
        Self::storage(error)
    }
}

/// Result type for provisioning operations.
pub type ProvisionResult<T> = Result<T, ProvisionError>;
