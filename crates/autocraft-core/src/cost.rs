//! Byte-cost accounting.
//!
//! Every plan step is charged a byte cost, the capacity-accounting unit the
//! surrounding system bills against storage cells. Costs only ever *order*
//! candidate tasks (cheap real sources before expensive fabricated ones), so
//! all arithmetic saturates instead of overflowing.

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits. Deterministic
/// across platforms, unlike floats.
pub type Fixed64 = I32F32;

/// Which kind of work a task performs. Determines its cost constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Extract,
    Conjure,
    Emit,
    Craft,
    IgnoreMissing,
}

/// A saturating byte cost. Ordered; lower is preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ByteCost(pub Fixed64);

/// Fabricated results must lose every tie against real sources, so their
/// base cost dwarfs any realistic storage-backed plan step.
const CONJURE_BASE: i64 = 1 << 24;
const IGNORE_BASE: i64 = 1 << 25;

impl ByteCost {
    pub const ZERO: ByteCost = ByteCost(Fixed64::ZERO);

    /// Estimated cost of one task: a per-kind base plus a per-unit charge.
    pub fn for_task(kind: TaskKind, amount: u64) -> ByteCost {
        let units = Fixed64::saturating_from_num(amount);
        let (base, per_unit) = match kind {
            // Emitted sources are free: the network produces the item on
            // demand without touching cell capacity.
            TaskKind::Emit => (Fixed64::ZERO, Fixed64::ZERO),
            // One type header plus one byte per unit, matching cell
            // accounting for stored stacks.
            TaskKind::Extract => (Fixed64::from_num(8), Fixed64::ONE),
            // A pattern step carries its own header and doubles the
            // per-unit charge, so real stock always beats a craftable
            // substitute of equal amount.
            TaskKind::Craft => (Fixed64::from_num(16), Fixed64::from_num(2)),
            TaskKind::Conjure => (Fixed64::from_num(CONJURE_BASE), Fixed64::ONE),
            TaskKind::IgnoreMissing => (Fixed64::from_num(IGNORE_BASE), Fixed64::ONE),
        };
        ByteCost(base.saturating_add(per_unit.saturating_mul(units)))
    }

    pub fn saturating_add(self, other: ByteCost) -> ByteCost {
        ByteCost(self.0.saturating_add(other.0))
    }

    /// Whole bytes, rounded toward zero. For display only.
    pub fn bytes(self) -> i64 {
        self.0.to_num()
    }
}

impl Default for ByteCost {
    fn default() -> Self {
        ByteCost::ZERO
    }
}

impl std::iter::Sum for ByteCost {
    fn sum<I: Iterator<Item = ByteCost>>(iter: I) -> Self {
        iter.fold(ByteCost::ZERO, ByteCost::saturating_add)
    }
}
