//! Failures of the persistence layer.
//!
//! These errors know nothing about provisioning semantics; the engine wraps them in
//! [`ProvisionError::Storage`](crate::error::ProvisionError::Storage).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    /// Stored or supplied data has the wrong shape.
    #[error("malformed data: {message}{}", parenthesized(.cause))]
    InvalidData {
        message: String,
        cause: Option<String>,
    },

    /// A write batch was refused as a whole. Nothing from the batch was applied.
    #[error("commit of {operations} operation(s) rejected: {message}")]
    CommitRejected { message: String, operations: usize },

    #[error("storage backend unavailable: {message}")]
    Unavailable { message: String },

    #[error("document (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage failure: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

fn parenthesized(cause: &Option<String>) -> String {
    cause.as_deref().map(|c| format!(" ({})", c)).unwrap_or_default()
}

impl StorageError {
    pub fn invalid_data(message: impl Into<String>, cause: Option<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
            cause,
        }
    }

    pub fn commit_rejected(message: impl Into<String>, operations: usize) -> Self {
        Self::CommitRejected {
            message: message.into(),
            operations,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Whether retrying the same operation later could succeed.
    pub fn is_temporary(&self) -> bool {
        matches!(self, StorageError::Unavailable { .. })
    }
}
