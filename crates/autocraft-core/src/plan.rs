//! The user-facing outcome of a finished job: what to pull, what to craft,
//! what could not be sourced.
//!
//! Every delivered unit lands in exactly one bucket. A unit counted under
//! `to_pull` was present in storage when the job started; a unit under
//! `to_craft` is produced while the plan runs. The split is what lets a host
//! show "4 in stock, 12 crafted" without re-deriving it from the tree.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::cost::ByteCost;
use crate::stack::{StackId, StackList};

/// Per-stack breakdown inside a [`CraftingPlan`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub to_pull: u64,
    pub to_craft: u64,
}

impl PlanEntry {
    pub fn total(&self) -> u64 {
        self.to_pull.saturating_add(self.to_craft)
    }
}

/// Aggregated plan, keyed by stack identity in stable order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CraftingPlan {
    entries: BTreeMap<StackId, PlanEntry>,
    missing: StackList,
    simulated: bool,
    total_cost: ByteCost,
}

impl CraftingPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_pull(&mut self, id: &StackId, amount: u64) {
        if amount == 0 {
            return;
        }
        let entry = self.entries.entry(id.clone()).or_default();
        entry.to_pull = entry.to_pull.saturating_add(amount);
    }

    pub fn add_craft(&mut self, id: &StackId, amount: u64) {
        if amount == 0 {
            return;
        }
        let entry = self.entries.entry(id.clone()).or_default();
        entry.to_craft = entry.to_craft.saturating_add(amount);
    }

    pub fn add_missing(&mut self, id: &StackId, amount: u64) {
        if amount == 0 {
            return;
        }
        self.missing.add_amount(id.clone(), amount);
    }

    /// Marks the plan as containing fabricated stock. Sticky.
    pub fn mark_simulated(&mut self) {
        self.simulated = true;
    }

    pub fn add_cost(&mut self, cost: ByteCost) {
        self.total_cost = self.total_cost.saturating_add(cost);
    }

    pub fn entry(&self, id: &StackId) -> PlanEntry {
        self.entries.get(id).copied().unwrap_or_default()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&StackId, &PlanEntry)> {
        self.entries.iter()
    }

    pub fn missing(&self) -> &StackList {
        &self.missing
    }

    pub fn is_simulated(&self) -> bool {
        self.simulated
    }

    pub fn total_cost(&self) -> ByteCost {
        self.total_cost
    }

    pub fn pulled_total(&self) -> u64 {
        self.entries
            .values()
            .fold(0u64, |acc, e| acc.saturating_add(e.to_pull))
    }

    pub fn crafted_total(&self) -> u64 {
        self.entries
            .values()
            .fold(0u64, |acc, e| acc.saturating_add(e.to_craft))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.missing.is_empty()
    }
}
