//! In-process domain events and the handler registry that dispatches them.
//!
//! Handlers come in two flavors:
//! - [`TransactionHandler`]s run while the originating [`Transaction`] is still open
//!   and may stage further writes into it. Their errors abort the unit of work.
//! - [`CommitListener`]s run after the transaction has been applied. Their errors
//!   are logged and never reach the caller.

use crate::audit::ChangeNotification;
use crate::error::ProvisionResult;
use crate::model::{ProvisionRecord, TenantId};
use crate::storage::StorageProvider;
use crate::store::{Repository, Transaction};
use async_trait::async_trait;
use log::{trace, warn};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    /// A tracked entity was created or updated.
    TrackableChanged(ChangeNotification),
    /// A tracked entity is about to be removed.
    PreDelete {
        tenant_id: TenantId,
        entity_type: String,
        entity_id: String,
        instance: Value,
    },
    ItemProvisioned(ProvisionRecord),
    ItemDeprovisioned(ProvisionRecord),
}

impl DomainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::TrackableChanged(_) => "trackable_changed",
            DomainEvent::PreDelete { .. } => "pre_delete",
            DomainEvent::ItemProvisioned(_) => "item_provisioned",
            DomainEvent::ItemDeprovisioned(_) => "item_deprovisioned",
        }
    }
}

#[async_trait]
pub trait TransactionHandler<S: StorageProvider>: Send + Sync {
    async fn handle(
        &self,
        event: &DomainEvent,
        repository: &Repository<S>,
        tx: &mut Transaction,
    ) -> ProvisionResult<()>;
}

#[async_trait]
pub trait CommitListener<S: StorageProvider>: Send + Sync {
    fn name(&self) -> &str;

    async fn on_commit(&self, event: &DomainEvent, repository: &Repository<S>) -> ProvisionResult<()>;
}

/// Registry of event handlers.
pub struct EventBus<S> {
    handlers: Vec<Arc<dyn TransactionHandler<S>>>,
    listeners: Vec<Arc<dyn CommitListener<S>>>,
}

impl<S: StorageProvider> EventBus<S> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            listeners: Vec::new(),
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn TransactionHandler<S>>) -> Self {
        self.handlers.push(handler);
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn CommitListener<S>>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Run in-transaction handlers and queue the event for commit listeners.
    pub async fn publish(
        &self,
        event: DomainEvent,
        repository: &Repository<S>,
        tx: &mut Transaction,
    ) -> ProvisionResult<()> {
        trace!("Publishing {} event", event.name());
        for handler in &self.handlers {
            handler.handle(&event, repository, tx).await?;
        }
        if !self.listeners.is_empty() {
            tx.defer(event);
        }
        Ok(())
    }

    /// Deliver events of a committed transaction.
    pub async fn dispatch_committed(&self, events: Vec<DomainEvent>, repository: &Repository<S>) {
        for event in &events {
            for listener in &self.listeners {
                if let Err(e) = listener.on_commit(event, repository).await {
                    warn!(
                        "Listener '{}' failed on {} event: {}",
                        listener.name(),
                        event.name(),
                        e
                    );
                }
            }
        }
    }
}

impl<S: StorageProvider> Default for EventBus<S> {
    fn default() -> Self {
        Self::new()
    }
}
