//! Shared planning state for one job.
//!
//! One [`CraftingContext`] is created per top-level job and threaded by
//! `&mut` through every resolution step. It owns the layer arena, the step
//! and tree-size accounting, the in-flight cycle guard, the memoized pattern
//! lookups, and the notice buffer. No two jobs ever share one.

use crate::id::{LayerId, PatternId};
use crate::inventory::{LayerArena, LayerLogging};
use crate::network::NetworkSnapshot;
use crate::notice::{Notice, NoticeBuffer};
use crate::pattern::PatternLibrary;
use crate::request::StackTarget;
use crate::stack::StackId;
use std::collections::{BTreeSet, HashMap};

/// How a job treats unsatisfiable demands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobMode {
    /// The top-level request may fall back to conjuring placeholders (the
    /// result is then a simulation); sub-requests fail instead, which is
    /// what drives backtracking between candidates.
    Standard,
    /// No conjuring anywhere. Shortfalls are recorded as missing and the
    /// plan proceeds; commits run under the missing policy.
    IgnoreMissing,
}

/// Termination policy. Either limit tripping forces the remaining plan into
/// conjure/ignore-missing termination instead of further search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverLimits {
    pub max_steps: u64,
    pub max_tree_size: usize,
}

pub const DEFAULT_STEP_LIMIT: u64 = 10_000;
pub const DEFAULT_TREE_SIZE_LIMIT: usize = 4_096;

impl Default for SolverLimits {
    fn default() -> Self {
        Self {
            max_steps: DEFAULT_STEP_LIMIT,
            max_tree_size: DEFAULT_TREE_SIZE_LIMIT,
        }
    }
}

/// Request-tree-scoped mutable state.
#[derive(Debug)]
pub struct CraftingContext {
    pub(crate) arena: LayerArena,
    pub(crate) root_layer: LayerId,
    pub(crate) notices: NoticeBuffer,
    mode: JobMode,
    limits: SolverLimits,
    steps: u64,
    tree_size: usize,
    exploded: bool,
    /// Targets with a craft attempt currently open somewhere on the path
    /// from the root. The craft resolver refuses to open a second attempt
    /// for a target already here, which is what breaks pattern cycles.
    in_flight: Vec<StackTarget>,
    /// Memoized pattern lookups, target to providing pattern ids. Pure
    /// library queries, safe to reuse across branches.
    pattern_memo: HashMap<StackTarget, Vec<PatternId>>,
    emitable: BTreeSet<StackId>,
}

impl CraftingContext {
    pub fn new(snapshot: &NetworkSnapshot, mode: JobMode, limits: SolverLimits) -> Self {
        let mut arena = LayerArena::new();
        let root_layer = arena.root(&snapshot.available, LayerLogging::ALL);
        Self {
            arena,
            root_layer,
            notices: NoticeBuffer::default(),
            mode,
            limits,
            steps: 0,
            tree_size: 0,
            exploded: false,
            in_flight: Vec::new(),
            pattern_memo: HashMap::new(),
            emitable: snapshot.emitable.clone(),
        }
    }

    pub fn mode(&self) -> JobMode {
        self.mode
    }

    pub fn limits(&self) -> SolverLimits {
        self.limits
    }

    pub fn root_layer(&self) -> LayerId {
        self.root_layer
    }

    pub fn arena(&self) -> &LayerArena {
        &self.arena
    }

    pub fn arena_mut(&mut self) -> &mut LayerArena {
        &mut self.arena
    }

    // -----------------------------------------------------------------------
    // Step and size accounting
    // -----------------------------------------------------------------------

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Count one solver step. Trips the explosion flag (once, with a
    /// notice) when the step limit is reached.
    pub fn bump_step(&mut self) -> u64 {
        self.steps += 1;
        if !self.exploded && self.steps >= self.limits.max_steps {
            self.exploded = true;
            self.notices.push(Notice::StepLimitReached {
                limit: self.limits.max_steps,
                step: self.steps,
            });
        }
        self.steps
    }

    /// Count one plan-tree node. The count is cumulative over the job and
    /// never decreases, so discarded attempts still pay for the nodes they
    /// created.
    pub fn register_node(&mut self) {
        self.tree_size += 1;
        if !self.exploded && self.tree_size >= self.limits.max_tree_size {
            self.exploded = true;
            self.notices.push(Notice::SizeLimitReached {
                limit: self.limits.max_tree_size,
                step: self.steps,
            });
        }
    }

    pub fn tree_size(&self) -> usize {
        self.tree_size
    }

    /// Whether a limit has tripped. Once set, pending requests are forced
    /// into conjure/ignore-missing termination instead of further search.
    pub fn exploded(&self) -> bool {
        self.exploded
    }

    // -----------------------------------------------------------------------
    // Cycle guard
    // -----------------------------------------------------------------------

    pub fn push_in_flight(&mut self, target: StackTarget) {
        self.in_flight.push(target);
    }

    pub fn pop_in_flight(&mut self) {
        self.in_flight.pop();
    }

    pub fn is_in_flight(&self, target: &StackTarget) -> bool {
        self.in_flight.contains(target)
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn is_emitable(&self, id: &StackId) -> bool {
        self.emitable.contains(id)
    }

    /// Emitable identities matching a target, in identity order.
    pub fn emitable_matching(&self, target: &StackTarget) -> Vec<StackId> {
        self.emitable
            .iter()
            .filter(|id| target.matches(id))
            .cloned()
            .collect()
    }

    /// Patterns whose outputs satisfy `target`, memoized per target.
    pub fn patterns_providing(
        &mut self,
        library: &PatternLibrary,
        target: &StackTarget,
    ) -> Vec<PatternId> {
        if let Some(hit) = self.pattern_memo.get(target) {
            return hit.clone();
        }
        let found: Vec<PatternId> = match target {
            StackTarget::Exact(id) => library.providing(id).to_vec(),
            StackTarget::Group(group) => library.providing_group(*group).to_vec(),
        };
        self.pattern_memo.insert(target.clone(), found.clone());
        found
    }

    // -----------------------------------------------------------------------
    // Notices
    // -----------------------------------------------------------------------

    pub fn push_notice(&mut self, notice: Notice) {
        self.notices.push(notice);
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
