//! Timestamp-driven synchronization with a remote user directory.
//!
//! Each [`Synchronizable`] entity carries a [`SyncState`]. Comparing its two stamps
//! decides the direction:
//!
//! | State                              | Action          |
//! |------------------------------------|-----------------|
//! | never synced                       | pull, then push |
//! | `last_modified > last_synced_at`   | push            |
//! | `last_modified < last_synced_at`   | pull            |
//! | equal                              | nothing         |
//!
//! After any action both stamps are set to the same instant, so syncing again
//! without an intervening change does nothing. Conflicting remote edits are not
//! merged: the last writer wins.

pub mod directory;

pub use directory::{DirectoryEntry, RemoteDirectory, ScimDirectory, UserMirror, load, merge};

use crate::store::Entity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Synchronization bookkeeping stamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    pub last_modified: DateTime<Utc>,
}

impl SyncState {
    pub fn needs_push(&self) -> bool {
        match self.last_synced_at {
            None => true,
            Some(synced) => self.last_modified > synced,
        }
    }

    pub fn needs_pull(&self) -> bool {
        match self.last_synced_at {
            None => true,
            Some(synced) => self.last_modified < synced,
        }
    }

    /// Record a local modification.
    pub fn touch(&mut self) {
        self.last_modified = Utc::now();
    }

    pub fn mark_synced(&mut self, at: DateTime<Utc>) {
        self.last_synced_at = Some(at);
        self.last_modified = at;
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            last_synced_at: None,
            last_modified: Utc::now(),
        }
    }
}

/// Entities mirrored to a remote directory.
pub trait Synchronizable: Entity {
    fn sync_state(&self) -> &SyncState;

    fn sync_state_mut(&mut self) -> &mut SyncState;
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("remote directory returned HTTP {status}: {message}")]
    Remote { status: u16, message: String },

    #[error("remote directory unreachable: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("unexpected directory response: {message}")]
    InvalidResponse { message: String },

    #[error("directory synchronization is not configured for tenant {tenant_id}")]
    NotConfigured { tenant_id: String },
}

impl SyncError {
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

/// Moves one entity type between local storage and a remote directory.
#[async_trait]
pub trait DirectoryMirror<E: Synchronizable>: Send + Sync {
    /// Write the local state to the remote directory, creating or updating it.
    async fn push(&self, entity: &E) -> Result<(), SyncError>;

    /// Refresh the local state from the remote directory. Does nothing by default.
    async fn pull(&self, _entity: &mut E) -> Result<(), SyncError> {
        Ok(())
    }
}

/// What a [`SyncEngine::sync`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub pulled: bool,
    pub pushed: bool,
}

impl SyncOutcome {
    pub fn is_noop(&self) -> bool {
        !self.pulled && !self.pushed
    }
}

/// Applies the push/pull policy through a [`DirectoryMirror`].
pub struct SyncEngine<M> {
    mirror: M,
}

impl<M> SyncEngine<M> {
    pub fn new(mirror: M) -> Self {
        Self { mirror }
    }

    pub fn mirror(&self) -> &M {
        &self.mirror
    }

    /// Synchronize one entity. Only its [`SyncState`] is updated here; persisting the
    /// entity afterwards is up to the caller.
    pub async fn sync<E>(&self, entity: &mut E, force_push: bool, force_pull: bool) -> Result<SyncOutcome, SyncError>
    where
        E: Synchronizable,
        M: DirectoryMirror<E>,
    {
        let state = *entity.sync_state();
        let mut outcome = SyncOutcome::default();

        if force_pull || state.needs_pull() {
            trace!("Pulling {} {}", E::COLLECTION, entity.storage_id());
            self.mirror.pull(entity).await?;
            outcome.pulled = true;
        }
        if force_push || state.needs_push() {
            trace!("Pushing {} {}", E::COLLECTION, entity.storage_id());
            self.mirror.push(entity).await?;
            outcome.pushed = true;
        }

        if !outcome.is_noop() {
            entity.sync_state_mut().mark_synced(Utc::now());
            debug!(
                "Synchronized {} {} (pulled: {}, pushed: {})",
                E::COLLECTION,
                entity.storage_id(),
                outcome.pulled,
                outcome.pushed
            );
        }
        Ok(outcome)
    }
}
