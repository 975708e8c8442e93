//! Keeps [`ProvisionHistory`] in step with provisioning events.
//!
//! Runs inside the transaction that creates or deletes the [`ProvisionRecord`], so a
//! record and its history entry are always committed together.

use crate::error::ProvisionResult;
use crate::events::{DomainEvent, TransactionHandler};
use crate::model::{ProvisionHistory, ProvisionRecord, TenantId, User, UserId};
use crate::storage::StorageProvider;
use crate::store::{Entity, Repository, Transaction};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, warn};

#[derive(Debug, Default)]
pub struct HistoryRecorder;

impl HistoryRecorder {
    async fn open_entries<S: StorageProvider>(
        repository: &Repository<S>,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> ProvisionResult<Vec<ProvisionHistory>> {
        let mut entries: Vec<ProvisionHistory> = repository
            .find(tenant_id, "user_id", &user_id.to_string())
            .await?;
        entries.retain(ProvisionHistory::is_open);
        Ok(entries)
    }

    async fn opened<S: StorageProvider>(
        repository: &Repository<S>,
        tx: &mut Transaction,
        record: &ProvisionRecord,
    ) -> ProvisionResult<()> {
        let open = Self::open_entries(repository, record.tenant_id, record.user_id).await?;
        if open
            .iter()
            .any(|entry| entry.matches(record.user_id, record.service_id, &record.item))
        {
            debug!("History for {} already open", record.item);
            return Ok(());
        }
        tx.put(&ProvisionHistory::open(record, Utc::now()))
    }

    async fn closed<S: StorageProvider>(
        repository: &Repository<S>,
        tx: &mut Transaction,
        record: &ProvisionRecord,
    ) -> ProvisionResult<()> {
        let open = Self::open_entries(repository, record.tenant_id, record.user_id).await?;
        let mut matched = false;
        for mut entry in open
            .into_iter()
            .filter(|entry| entry.matches(record.user_id, record.service_id, &record.item))
        {
            entry.close(Utc::now())?;
            tx.put(&entry)?;
            matched = true;
        }
        if !matched {
            warn!(
                "No open history entry for {} of user {} on service {}",
                record.item, record.user_id, record.service_id
            );
        }
        Ok(())
    }

    /// A deleted user keeps no open intervals.
    async fn user_deleted<S: StorageProvider>(
        repository: &Repository<S>,
        tx: &mut Transaction,
        tenant_id: TenantId,
        user_id: UserId,
    ) -> ProvisionResult<()> {
        let now = Utc::now();
        for mut entry in Self::open_entries(repository, tenant_id, user_id).await? {
            entry.close(now)?;
            tx.put(&entry)?;
        }
        Ok(())
    }
}

#[async_trait]
impl<S: StorageProvider> TransactionHandler<S> for HistoryRecorder {
    async fn handle(
        &self,
        event: &DomainEvent,
        repository: &Repository<S>,
        tx: &mut Transaction,
    ) -> ProvisionResult<()> {
        match event {
            DomainEvent::ItemProvisioned(record) => Self::opened(repository, tx, record).await,
            DomainEvent::ItemDeprovisioned(record) => Self::closed(repository, tx, record).await,
            DomainEvent::PreDelete {
                tenant_id,
                entity_type,
                entity_id,
                ..
            } if entity_type == User::COLLECTION => match entity_id.parse::<UserId>() {
                Ok(user_id) => Self::user_deleted(repository, tx, *tenant_id, user_id).await,
                Err(_) => Ok(()),
            },
            _ => Ok(()),
        }
    }
}
