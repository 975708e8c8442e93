//! Multi-tenant IT asset provisioning engine.
//!
//! Tracks which software, devices and mobile data plans are assigned to which users
//! of a tenant, and keeps those assignments in step with the tenant's SSO, MDM and
//! directory services.
//!
//! # Core Components
//!
//! - [`ProvisioningEngine`] - Reconciles a user's items on a service with a desired set
//! - [`ServiceAdapter`] - Trait for remote platform integrations
//! - [`Tracker`] - Audited mutation of tracked entities
//! - [`SyncEngine`] - Push/pull decision for directory synchronization
//! - [`ReportingQueries`] - Current items, history and last-seen queries
//! - [`TenantDirectory`] - Tenants, services, assets and users
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use asset_provisioning::{AdapterRegistry, ProvisioningConfig, ProvisioningContext};
//! use asset_provisioning::audit::Editor;
//! use asset_provisioning::model::{Tenant, User};
//! use asset_provisioning::storage::InMemoryStorage;
//! use std::collections::BTreeSet;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProvisioningConfig::default();
//! let adapters = AdapterRegistry::standard(&config.http);
//! let context = ProvisioningContext::new(Arc::new(InMemoryStorage::new()), adapters, config);
//!
//! let admin = Editor::new("admin@acme.test");
//! let tenant = context.directory.create_tenant(Tenant::new("Acme", admin.clone())).await?;
//! let user = context
//!     .directory
//!     .create_user(Some(&admin), User::new(tenant.id, "jdoe").with_name("Jane", "Doe"))
//!     .await?;
//!
//! for service in context.directory.services(tenant.id).await? {
//!     let report = context.engine.reconcile(&user, &service, &BTreeSet::new(), &admin).await?;
//!     println!("{}", report);
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod audit;
pub mod config;
pub mod context;
pub mod daemon;
pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod reporting;
pub mod storage;
pub mod store;
pub mod sync;
pub mod tenancy;

// Re-export commonly used types for convenience
pub use adapters::{AdapterError, AdapterRegistry, FailureClass, ServiceAdapter};
pub use audit::{Editor, Trackable, Tracker};
pub use config::ProvisioningConfig;
pub use context::ProvisioningContext;
pub use daemon::PollingDaemon;
pub use engine::{ItemOutcome, ProvisionRequest, ProvisioningEngine, ReconcileReport};
pub use error::{ProvisionError, ProvisionResult};
pub use reporting::ReportingQueries;
pub use sync::{SyncEngine, SyncState, Synchronizable};
pub use tenancy::TenantDirectory;
