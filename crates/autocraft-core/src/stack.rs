//! Stack identities and merged stack lists.
//!
//! A [`StackId`] is the full identity of a stack: the numeric type plus
//! everything that makes two stacks non-interchangeable (variant group
//! membership, custom label). Identity comparison covers every field, so a
//! relabeled stack is a distinct thing that never matches storage entries or
//! pattern lookups keyed by the unlabeled identity.

use crate::id::{FluidTypeId, ItemTypeId, VariantGroupId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Full identity of an item stack.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub item: ItemTypeId,
    /// Fuzzy-match family. `None` means the item belongs to no group and can
    /// only be matched exactly.
    pub group: Option<VariantGroupId>,
    /// Custom display label. A labeled stack never satisfies lookups keyed
    /// by the unlabeled identity, and never fuzzy-matches a group.
    pub label: Option<String>,
}

impl ItemKey {
    pub fn new(item: ItemTypeId) -> Self {
        Self {
            item,
            group: None,
            label: None,
        }
    }

    pub fn with_group(item: ItemTypeId, group: VariantGroupId) -> Self {
        Self {
            item,
            group: Some(group),
            label: None,
        }
    }

    /// Return the same key carrying a custom label.
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Full identity of a fluid stack. Fluids carry no label or group; amounts
/// are in millibuckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FluidKey {
    pub fluid: FluidTypeId,
}

impl FluidKey {
    pub fn new(fluid: FluidTypeId) -> Self {
        Self { fluid }
    }
}

/// Closed identity enum covering everything the engine can store or craft.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StackId {
    Item(ItemKey),
    Fluid(FluidKey),
}

impl StackId {
    pub fn item(item: ItemTypeId) -> Self {
        StackId::Item(ItemKey::new(item))
    }

    pub fn fluid(fluid: FluidTypeId) -> Self {
        StackId::Fluid(FluidKey::new(fluid))
    }

    /// The fuzzy-match group this identity belongs to, if any. Labeled
    /// stacks report `None`: a renamed item is matched exactly or not at all.
    pub fn group(&self) -> Option<VariantGroupId> {
        match self {
            StackId::Item(k) if k.label.is_none() => k.group,
            _ => None,
        }
    }

    /// Whether this identity carries a custom label.
    pub fn is_labeled(&self) -> bool {
        matches!(self, StackId::Item(k) if k.label.is_some())
    }
}

// ---------------------------------------------------------------------------
// Stack
// ---------------------------------------------------------------------------

/// An identity plus an amount. Items count in units, fluids in millibuckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    pub id: StackId,
    pub amount: u64,
}

impl Stack {
    pub fn new(id: StackId, amount: u64) -> Self {
        Self { id, amount }
    }

    pub fn of_item(item: ItemTypeId, amount: u64) -> Self {
        Self::new(StackId::item(item), amount)
    }

    pub fn of_fluid(fluid: FluidTypeId, amount: u64) -> Self {
        Self::new(StackId::fluid(fluid), amount)
    }

    /// The same identity with a different amount.
    pub fn with_amount(&self, amount: u64) -> Self {
        Self {
            id: self.id.clone(),
            amount,
        }
    }
}

// ---------------------------------------------------------------------------
// StackList
// ---------------------------------------------------------------------------

/// A merged multiset of stacks keyed by full identity.
///
/// Backed by a `BTreeMap` so iteration order is deterministic, which every
/// plan-equality and determinism guarantee leans on. Zero-amount entries are
/// dropped eagerly.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackList {
    entries: BTreeMap<StackId, u64>,
}

impl StackList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a stack into the list.
    pub fn add(&mut self, stack: &Stack) {
        self.add_amount(stack.id.clone(), stack.amount);
    }

    /// Merge an (identity, amount) pair into the list. Amounts saturate at
    /// `u64::MAX` rather than wrapping.
    pub fn add_amount(&mut self, id: StackId, amount: u64) {
        if amount == 0 {
            return;
        }
        let entry = self.entries.entry(id).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Remove up to `amount` of an identity. Returns the amount actually
    /// removed, which may be less than requested.
    #[must_use = "returns the amount actually removed, which may be less than requested"]
    pub fn remove(&mut self, id: &StackId, amount: u64) -> u64 {
        match self.entries.get_mut(id) {
            Some(have) => {
                let taken = amount.min(*have);
                *have -= taken;
                if *have == 0 {
                    self.entries.remove(id);
                }
                taken
            }
            None => 0,
        }
    }

    /// Amount stored under an exact identity.
    pub fn amount_of(&self, id: &StackId) -> u64 {
        self.entries.get(id).copied().unwrap_or(0)
    }

    /// Iterate entries in deterministic (identity) order.
    pub fn iter(&self) -> impl Iterator<Item = (&StackId, u64)> {
        self.entries.iter().map(|(id, &n)| (id, n))
    }

    /// Iterate the unlabeled members of a variant group, in identity order.
    pub fn iter_group(
        &self,
        group: VariantGroupId,
    ) -> impl Iterator<Item = (&StackId, u64)> {
        self.entries
            .iter()
            .filter(move |(id, _)| id.group() == Some(group))
            .map(|(id, &n)| (id, n))
    }

    /// Merge every entry of `other` into `self`.
    pub fn merge(&mut self, other: &StackList) {
        for (id, n) in other.iter() {
            self.add_amount(id.clone(), n);
        }
    }

    /// Number of distinct identities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total amount across all identities, saturating at `u64::MAX`.
    pub fn total(&self) -> u64 {
        self.entries
            .values()
            .fold(0, |acc, &n| acc.saturating_add(n))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl FromIterator<Stack> for StackList {
    fn from_iter<T: IntoIterator<Item = Stack>>(iter: T) -> Self {
        let mut list = StackList::new();
        for stack in iter {
            list.add(&stack);
        }
        list
    }
}
