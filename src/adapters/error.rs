//! Adapter errors and their classification.

use thiserror::Error;

/// How the engine should treat a failed adapter call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// The remote already reflects the requested state; treat as success.
    AlreadyInDesiredState,
    /// The remote resource is gone; benign for removals.
    ResourceNotFound,
    /// Anything else. The item is skipped and retried on a later run.
    TransientOrUnknown,
}

/// Error raised by a [`ServiceAdapter`](super::ServiceAdapter) call.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("already in desired state: {message}")]
    AlreadyInDesiredState { message: String },

    #[error("remote resource not found: {resource}")]
    NotFound { resource: String },

    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("remote returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("unexpected response: {message}")]
    InvalidResponse { message: String },

    /// Asset has no value for a property the adapter needs.
    #[error("asset '{asset}' has no '{property}' property for this service")]
    MissingProperty { asset: String, property: String },

    #[error("invalid adapter configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl AdapterError {
    pub fn class(&self) -> FailureClass {
        match self {
            AdapterError::AlreadyInDesiredState { .. } => FailureClass::AlreadyInDesiredState,
            AdapterError::NotFound { .. } => FailureClass::ResourceNotFound,
            _ => FailureClass::TransientOrUnknown,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            AdapterError::Timeout { .. } | AdapterError::Transport { .. } => true,
            AdapterError::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    pub fn already(message: impl Into<String>) -> Self {
        Self::AlreadyInDesiredState {
            message: message.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    pub fn missing_property(asset: impl Into<String>, property: impl Into<String>) -> Self {
        Self::MissingProperty {
            asset: asset.into(),
            property: property.into(),
        }
    }

    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            message: message.into(),
        }
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;
