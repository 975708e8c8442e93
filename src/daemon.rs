//! Periodic drift repair for one kind of service.
//!
//! Every pass walks all tenants, and for each active service of the configured kind
//! re-issues the assignments of every user holding login access there.

use crate::engine::ProvisioningEngine;
use crate::error::ProvisionResult;
use crate::model::{ItemRef, ProvisionRecord, ServiceKind, Tenant, TenantService, User};
use crate::storage::StorageProvider;
use log::{debug, info, warn};
use std::future::Future;
use std::time::Duration;

/// Counts of one daemon pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub users: usize,
    pub failures: usize,
}

pub struct PollingDaemon<S> {
    engine: ProvisioningEngine<S>,
    kind: ServiceKind,
    interval: Duration,
}

impl<S: StorageProvider> PollingDaemon<S> {
    pub fn new(engine: ProvisioningEngine<S>, kind: ServiceKind, interval: Duration) -> Self {
        Self {
            engine,
            kind,
            interval,
        }
    }

    /// Run passes until `shutdown` resolves. A failing pass is logged and the loop
    /// continues.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!(
            "Polling {} services every {}s",
            self.kind,
            self.interval.as_secs()
        );
        tokio::pin!(shutdown);
        loop {
            match self.run_once().await {
                Ok(summary) => debug!(
                    "Pass finished: {} user(s), {} failure(s)",
                    summary.users, summary.failures
                ),
                Err(e) => warn!("Polling pass failed: {}", e),
            }
            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        info!("Polling of {} services stopped", self.kind);
    }

    /// One pass over every tenant, processed sequentially. A user that cannot be
    /// resynced is counted as a failure and the pass moves on.
    pub async fn run_once(&self) -> ProvisionResult<PassSummary> {
        let repository = self.engine.repository();
        let mut summary = PassSummary::default();

        for tenant_id in repository.tenant_ids().await? {
            let Some(tenant) = repository
                .get::<Tenant>(tenant_id, &tenant_id.to_string())
                .await?
            else {
                continue;
            };
            let services: Vec<TenantService> = repository.list(tenant_id).await?;
            for service in services
                .iter()
                .filter(|service| service.is_active && service.kind() == self.kind)
            {
                let holders: Vec<ProvisionRecord> = repository
                    .find(tenant_id, "service_id", &service.id.to_string())
                    .await?;
                for record in holders
                    .iter()
                    .filter(|record| record.item == ItemRef::Platform(service.id))
                {
                    let Some(user) = repository
                        .get::<User>(tenant_id, &record.user_id.to_string())
                        .await?
                    else {
                        continue;
                    };
                    summary.users += 1;
                    match self
                        .engine
                        .resync_user(&user, service, &tenant.primary_contact)
                        .await
                    {
                        Ok(report) => summary.failures += report.failed().count(),
                        Err(e) => {
                            warn!("Resync of {} on {} failed: {}", user, service, e);
                            summary.failures += 1;
                        }
                    }
                }
            }
        }
        Ok(summary)
    }
}
