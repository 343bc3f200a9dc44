//! The unit of planning work: one unsatisfied demand for a stack.

use crate::id::VariantGroupId;
use crate::stack::StackId;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// What a request asks for: one exact identity, or any unlabeled member of a
/// variant group (the fuzzy form pattern inputs use).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StackTarget {
    Exact(StackId),
    Group(VariantGroupId),
}

impl StackTarget {
    /// Whether a concrete identity satisfies this target. Exact targets
    /// compare full identity (label included); group targets accept any
    /// unlabeled member.
    pub fn matches(&self, id: &StackId) -> bool {
        match self {
            StackTarget::Exact(want) => want == id,
            StackTarget::Group(group) => id.group() == Some(*group),
        }
    }

    /// The concrete identity, when the target names one.
    pub fn exact_id(&self) -> Option<&StackId> {
        match self {
            StackTarget::Exact(id) => Some(id),
            StackTarget::Group(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// One resolver's contribution toward satisfying a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsedResolverEntry {
    pub resolver: &'static str,
    pub amount: u64,
}

/// An unsatisfied demand, plus the record of how it got satisfied.
///
/// `remaining` only ever decreases, by exactly what tasks deliver; the sum
/// of recorded contributions never exceeds the original amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CraftingRequest {
    target: StackTarget,
    amount: u64,
    remaining: u64,
    /// Whether a conjure fallback may satisfy this branch. True only for
    /// top-level requests of standard-mode jobs.
    allow_simulation: bool,
    used: Vec<UsedResolverEntry>,
}

impl CraftingRequest {
    pub fn new(target: StackTarget, amount: u64, allow_simulation: bool) -> Self {
        Self {
            target,
            amount,
            remaining: amount,
            allow_simulation,
            used: Vec::new(),
        }
    }

    /// Rebuild a request in a post-resolution state. Used when decoding a
    /// transmitted plan tree; the contribution list is not carried over the
    /// wire.
    pub(crate) fn restore(
        target: StackTarget,
        amount: u64,
        remaining: u64,
        allow_simulation: bool,
    ) -> Self {
        Self {
            target,
            amount,
            remaining: remaining.min(amount),
            allow_simulation,
            used: Vec::new(),
        }
    }

    pub fn target(&self) -> &StackTarget {
        &self.target
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn allow_simulation(&self) -> bool {
        self.allow_simulation
    }

    pub fn is_satisfied(&self) -> bool {
        self.remaining == 0
    }

    /// Record a task's delivery. Clamped to the remaining demand; returns
    /// the accepted amount.
    #[must_use = "returns the accepted amount, which may be clamped"]
    pub fn deliver(&mut self, resolver: &'static str, amount: u64) -> u64 {
        let accepted = amount.min(self.remaining);
        if accepted > 0 {
            self.remaining -= accepted;
            self.used.push(UsedResolverEntry {
                resolver,
                amount: accepted,
            });
        }
        accepted
    }

    /// Which resolvers contributed, in delivery order.
    pub fn used(&self) -> &[UsedResolverEntry] {
        &self.used
    }
}

// ===========================================================================
// Tests
// ===========================================================================
