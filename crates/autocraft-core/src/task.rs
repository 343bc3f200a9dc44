//! Task variants: the concrete ways one request gets satisfied.
//!
//! Tasks are plain data; the job orchestrator drives them across steps.
//! The set is closed (no reflection, no open registry of node types), which
//! is also what lets the wire format key on short tags with a `match`-based
//! factory.

use crate::cost::TaskKind;
use crate::id::PatternId;
use crate::stack::StackId;

/// Execution state of a task or request node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    NotStarted,
    InProgress,
    Done,
    Failed,
}

/// The concrete work one candidate performs. Amount fields are planned
/// quantities; `delivered` fields are filled in as the task runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskPayload {
    /// Pull directly from available storage (or from units crafted earlier
    /// in the plan; the split is recorded for the flattened plan).
    Extract {
        id: StackId,
        planned: u64,
        delivered: u64,
        from_crafted: u64,
    },
    /// Fabricate a placeholder because nothing real can satisfy the branch.
    /// Marks the whole job as a simulation.
    Conjure {
        id: StackId,
        amount: u64,
        delivered: u64,
    },
    /// Satisfy from a zero-cost emitted source rather than stored inventory.
    Emit {
        id: StackId,
        amount: u64,
        delivered: u64,
    },
    /// Expand a pattern's inputs as sub-requests. `crafts` is the count the
    /// current attempt is trying; when the task finishes it is the count
    /// actually performed.
    Craft {
        pattern: PatternId,
        output: StackId,
        per_craft: u64,
        crafts: u64,
        delivered: u64,
    },
    /// Terminal fallback: record the shortfall as missing without failing
    /// the plan.
    IgnoreMissing { id: StackId, amount: u64 },
}

impl TaskPayload {
    pub fn kind(&self) -> TaskKind {
        match self {
            TaskPayload::Extract { .. } => TaskKind::Extract,
            TaskPayload::Conjure { .. } => TaskKind::Conjure,
            TaskPayload::Emit { .. } => TaskKind::Emit,
            TaskPayload::Craft { .. } => TaskKind::Craft,
            TaskPayload::IgnoreMissing { .. } => TaskKind::IgnoreMissing,
        }
    }

    /// The identity this task puts toward its request.
    pub fn output_id(&self) -> &StackId {
        match self {
            TaskPayload::Extract { id, .. }
            | TaskPayload::Conjure { id, .. }
            | TaskPayload::Emit { id, .. }
            | TaskPayload::IgnoreMissing { id, .. } => id,
            TaskPayload::Craft { output, .. } => output,
        }
    }

    /// What the task has actually contributed so far.
    pub fn delivered(&self) -> u64 {
        match self {
            TaskPayload::Extract { delivered, .. }
            | TaskPayload::Conjure { delivered, .. }
            | TaskPayload::Emit { delivered, .. }
            | TaskPayload::Craft { delivered, .. } => *delivered,
            TaskPayload::IgnoreMissing { amount, .. } => *amount,
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
