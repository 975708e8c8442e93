//! Runtime configuration for the provisioning engine and its HTTP adapters.
//!
//! Configuration is a plain serde document; missing sections fall back to their
//! defaults, so an empty JSON object is a valid configuration file.
//!
//! ```rust
//! use asset_provisioning::config::ProvisioningConfig;
//! use std::time::Duration;
//!
//! let config = ProvisioningConfig::default()
//!     .with_adapter_timeout(Duration::from_secs(5))
//!     .with_user_agent("provisionctl-test");
//! assert_eq!(config.engine.adapter_timeout, Duration::from_secs(5));
//! ```

use crate::error::{ProvisionError, ProvisionResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProvisioningConfig {
    pub engine: EngineConfig,
    pub http: HttpClientConfig,
}

impl ProvisioningConfig {
    /// Read a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> ProvisionResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| {
            ProvisionError::configuration(format!("{}: {}", path.display(), e))
        })
    }

    pub fn with_adapter_timeout(mut self, timeout: Duration) -> Self {
        self.engine.adapter_timeout = timeout;
        self
    }

    pub fn with_daemon_interval(mut self, interval: Duration) -> Self {
        self.engine.daemon_interval = interval;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.http.request_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.http.user_agent = user_agent.into();
        self
    }
}

/// Engine behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on a single adapter call, in milliseconds when serialized.
    #[serde(with = "duration_millis")]
    pub adapter_timeout: Duration,
    /// Pause between polling daemon passes.
    #[serde(with = "duration_millis")]
    pub daemon_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            adapter_timeout: Duration::from_secs(30),
            daemon_interval: Duration::from_secs(300),
        }
    }
}

/// Settings shared by every HTTP-backed adapter and remote directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HttpClientConfig {
    #[serde(with = "duration_millis")]
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(20),
            user_agent: format!("asset-provisioning/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
