//! Set difference between provisioned and desired items.

use crate::model::ItemRef;
use std::collections::BTreeSet;

/// Direction of a single change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    Add,
    Remove,
    /// Re-issue of an existing assignment.
    Resync,
}

/// Items to add and remove to move from the current to the desired state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub to_add: BTreeSet<ItemRef>,
    pub to_remove: BTreeSet<ItemRef>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }

    pub fn len(&self) -> usize {
        self.to_add.len() + self.to_remove.len()
    }

    /// Changes in execution order: asset removals, asset additions, then the
    /// platform removal and addition.
    pub fn ordered(&self) -> Vec<(Change, ItemRef)> {
        let (platform_removals, asset_removals): (Vec<ItemRef>, Vec<ItemRef>) =
            self.to_remove.iter().copied().partition(|item| item.is_platform());
        let (platform_additions, asset_additions): (Vec<ItemRef>, Vec<ItemRef>) =
            self.to_add.iter().copied().partition(|item| item.is_platform());

        asset_removals
            .into_iter()
            .map(|item| (Change::Remove, item))
            .chain(asset_additions.into_iter().map(|item| (Change::Add, item)))
            .chain(platform_removals.into_iter().map(|item| (Change::Remove, item)))
            .chain(platform_additions.into_iter().map(|item| (Change::Add, item)))
            .collect()
    }
}

pub fn compute_delta(current: &BTreeSet<ItemRef>, desired: &BTreeSet<ItemRef>) -> Delta {
    Delta {
        to_add: desired.difference(current).copied().collect(),
        to_remove: current.difference(desired).copied().collect(),
    }
}
