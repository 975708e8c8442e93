//! Read-side queries over provisioning state.

use crate::adapters::AdapterRegistry;
use crate::config::EngineConfig;
use crate::error::ProvisionResult;
use crate::model::{
    ItemRef, LastSeenEvent, ProvisionHistory, ProvisionRecord, ServiceId, ServiceKind, Tenant,
    TenantId, TenantService, User,
};
use crate::storage::StorageProvider;
use crate::store::{Entity, Repository};
use chrono::{DateTime, Utc};
use log::{debug, warn};
use std::collections::{BTreeSet, HashMap};

/// Counts of a [`ReportingQueries::refresh_last_seen`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LastSeenSummary {
    pub services: usize,
    pub updated: usize,
    pub failed_services: usize,
}

pub struct ReportingQueries<S> {
    repository: Repository<S>,
    adapters: AdapterRegistry,
    config: EngineConfig,
}

impl<S> Clone for ReportingQueries<S> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            adapters: self.adapters.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: StorageProvider> ReportingQueries<S> {
    pub fn new(repository: Repository<S>, adapters: AdapterRegistry, config: EngineConfig) -> Self {
        Self {
            repository,
            adapters,
            config,
        }
    }

    /// Everything currently provisioned to the user, on every service.
    pub async fn current_items(&self, user: &User) -> ProvisionResult<Vec<ProvisionRecord>> {
        let mut records: Vec<ProvisionRecord> = self
            .repository
            .find(user.tenant_id, "user_id", &user.id.to_string())
            .await?;
        records.sort_by(|a, b| (a.service_id, a.item).cmp(&(b.service_id, b.item)));
        Ok(records)
    }

    /// Full provisioning history of the user, oldest first.
    pub async fn history_for(&self, user: &User) -> ProvisionResult<Vec<ProvisionHistory>> {
        let mut entries: Vec<ProvisionHistory> = self
            .repository
            .find(user.tenant_id, "user_id", &user.id.to_string())
            .await?;
        entries.sort_by_key(|entry| (entry.start, entry.end));
        Ok(entries)
    }

    /// Latest evidence of the user: reported activity, or else provisioning history.
    pub async fn last_seen(&self, user: &User) -> ProvisionResult<Option<DateTime<Utc>>> {
        let events: Vec<LastSeenEvent> = self
            .repository
            .find(user.tenant_id, "user_id", &user.id.to_string())
            .await?;
        let history = self.history_for(user).await?;
        Ok(latest(&events, &history))
    }

    /// Latest evidence of one item of the user on one service.
    pub async fn last_seen_item(
        &self,
        user: &User,
        service_id: ServiceId,
        item: ItemRef,
    ) -> ProvisionResult<Option<DateTime<Utc>>> {
        let key = LastSeenEvent::key_for(user.id, service_id, &item);
        let event: Option<LastSeenEvent> = self.repository.get(user.tenant_id, &key).await?;
        let mut history = self.history_for(user).await?;
        history.retain(|entry| entry.service_id == service_id && entry.item == item);
        Ok(latest(event.as_slice(), &history))
    }

    /// Pull activity from every active service of the tenant, skipping the given
    /// kinds, and store it as [`LastSeenEvent`]s. A failing service is logged and
    /// skipped.
    pub async fn refresh_last_seen(
        &self,
        tenant_id: TenantId,
        skip: &BTreeSet<ServiceKind>,
    ) -> ProvisionResult<LastSeenSummary> {
        let tenant: Tenant = self.repository.load(tenant_id, &tenant_id.to_string()).await?;
        let services: Vec<TenantService> = self.repository.list(tenant_id).await?;
        let users: Vec<User> = self.repository.list(tenant_id).await?;
        let mut summary = LastSeenSummary::default();

        for service in services
            .iter()
            .filter(|service| service.is_active && !skip.contains(&service.kind()))
        {
            summary.services += 1;
            let adapter = self.adapters.adapter_for(&tenant, service)?;
            let activity =
                match tokio::time::timeout(self.config.adapter_timeout, adapter.list_activity()).await {
                    Ok(Ok(activity)) => activity,
                    Ok(Err(e)) => {
                        warn!("Reading activity from {} failed: {}", service, e);
                        summary.failed_services += 1;
                        continue;
                    }
                    Err(_) => {
                        warn!("Reading activity from {} timed out", service);
                        summary.failed_services += 1;
                        continue;
                    }
                };

            let by_login: HashMap<String, &User> = users
                .iter()
                .map(|user| (adapter.login_for(user), user))
                .collect();

            for entry in activity {
                let Some(user) = by_login.get(&entry.login) else {
                    debug!("Activity for unknown login {} on {}", entry.login, service);
                    continue;
                };
                if self.record_activity(user, service, entry.last_seen).await? {
                    summary.updated += 1;
                }
            }
        }
        Ok(summary)
    }

    async fn record_activity(
        &self,
        user: &User,
        service: &TenantService,
        last_seen: DateTime<Utc>,
    ) -> ProvisionResult<bool> {
        let event = LastSeenEvent {
            tenant_id: user.tenant_id,
            user_id: user.id,
            service_id: service.id,
            item: ItemRef::Platform(service.id),
            last_seen,
        };
        let existing: Option<LastSeenEvent> = self
            .repository
            .get(user.tenant_id, &event.storage_id())
            .await?;
        if existing.is_some_and(|previous| previous.last_seen >= last_seen) {
            return Ok(false);
        }
        self.repository.put(&event).await?;
        Ok(true)
    }
}

fn latest(events: &[LastSeenEvent], history: &[ProvisionHistory]) -> Option<DateTime<Utc>> {
    events
        .iter()
        .map(|event| event.last_seen)
        .chain(history.iter().filter_map(|entry| entry.end))
        .chain(history.iter().map(|entry| entry.start))
        .max()
}
