//! Requests and per-item results of provisioning runs.

use crate::engine::delta::Change;
use crate::model::{AssetId, ItemRef, ServiceId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// What happened to one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// The remote call succeeded and local state was updated.
    Applied,
    /// The remote already matched; local state was updated.
    AlreadyInState,
    /// The item cannot be managed by the service and was skipped.
    Filtered,
    /// The remote call failed; nothing changed locally.
    Failed { error: String, transient: bool },
}

impl ItemOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Applied | ItemOutcome::AlreadyInState)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub item: ItemRef,
    pub change: Change,
    pub outcome: ItemOutcome,
}

/// Result of reconciling one (user, service) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub user_id: UserId,
    pub service_id: ServiceId,
    pub items: Vec<ItemReport>,
}

impl ReconcileReport {
    pub fn new(user_id: UserId, service_id: ServiceId) -> Self {
        Self {
            user_id,
            service_id,
            items: Vec::new(),
        }
    }

    pub fn record(&mut self, item: ItemRef, change: Change, outcome: ItemOutcome) {
        self.items.push(ItemReport {
            item,
            change,
            outcome,
        });
    }

    /// Append the items of a later pass over the same pair.
    pub fn merge(&mut self, other: ReconcileReport) {
        self.items.extend(other.items);
    }

    pub fn is_noop(&self) -> bool {
        self.items.is_empty()
    }

    pub fn outcome_of(&self, item: &ItemRef) -> Option<&ItemOutcome> {
        self.items
            .iter()
            .rev()
            .find(|report| &report.item == item)
            .map(|report| &report.outcome)
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ItemReport> {
        self.items.iter().filter(|report| report.outcome.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ItemReport> {
        self.items
            .iter()
            .filter(|report| matches!(report.outcome, ItemOutcome::Failed { .. }))
    }

    pub fn filtered(&self) -> impl Iterator<Item = &ItemReport> {
        self.items
            .iter()
            .filter(|report| report.outcome == ItemOutcome::Filtered)
    }

    pub fn has_failures(&self) -> bool {
        self.failed().next().is_some()
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "user {} on service {}: {} succeeded, {} filtered, {} failed",
            self.user_id,
            self.service_id,
            self.succeeded().count(),
            self.filtered().count(),
            self.failed().count()
        )
    }
}

/// Full desired state of a user across the tenant's services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionRequest {
    /// Services the user should have login access to.
    pub platforms: BTreeSet<ServiceId>,
    pub software: BTreeSet<AssetId>,
    pub devices: BTreeSet<AssetId>,
    pub data_plans: BTreeSet<AssetId>,
}

impl ProvisionRequest {
    pub fn asset_items(&self) -> BTreeSet<ItemRef> {
        self.software
            .iter()
            .map(|id| ItemRef::Software(*id))
            .chain(self.devices.iter().map(|id| ItemRef::Device(*id)))
            .chain(self.data_plans.iter().map(|id| ItemRef::DataPlan(*id)))
            .collect()
    }

    pub fn with_platform(mut self, service_id: ServiceId) -> Self {
        self.platforms.insert(service_id);
        self
    }

    pub fn with_software(mut self, asset_id: AssetId) -> Self {
        self.software.insert(asset_id);
        self
    }

    pub fn with_device(mut self, asset_id: AssetId) -> Self {
        self.devices.insert(asset_id);
        self
    }

    pub fn with_data_plan(mut self, asset_id: AssetId) -> Self {
        self.data_plans.insert(asset_id);
        self
    }
}
