//! Job orchestration: the budget-driven planner that turns one request
//! into a finished task tree.
//!
//! A [`Job`] owns a [`PlanTree`] and an explicit frame stack. Each call to
//! [`Job::simulate_for`] pops frames until the time budget runs out or the
//! stack drains; every pop is one planning step, so a host can spread an
//! expensive plan across ticks without the engine holding a thread. The
//! three frame kinds mirror the lifecycle of a request: resolve it into
//! candidates, try candidates in cost order, and close out a pattern
//! attempt once its input requests settle.
//!
//! Pattern attempts are where backtracking lives. An attempt branches a
//! fresh inventory layer, expands one child request per pattern input, and
//! on failure shrinks: a binary search over the craft count finds the
//! largest batch the available inputs support, discarding the layers of
//! failed probes and folding only the final one. The in-flight target list
//! keeps recursive patterns (logs from planks from logs) from expanding
//! forever; whatever a cycle cannot supply is conjured or recorded missing
//! depending on the job mode.

use std::time::{Duration, Instant};

use slotmap::{SecondaryMap, SlotMap};

use crate::context::{CraftingContext, JobMode, SolverLimits};
use crate::cost::{ByteCost, TaskKind};
use crate::id::{LayerId, PatternId, PlanNodeId};
use crate::inventory::{
    ActionSource, BackingInventory, CommitError, CommitOutcome, CommitPolicy, LayerLogging, Mode,
};
use crate::network::NetworkSnapshot;
use crate::notice::Notice;
use crate::pattern::{PatternInput, PatternLibrary};
use crate::plan::CraftingPlan;
use crate::request::{CraftingRequest, StackTarget};
use crate::resolver::{CandidateTask, ResolveView, ResolverRegistry};
use crate::stack::{Stack, StackId};
use crate::task::{TaskPayload, TaskState};

// ---------------------------------------------------------------------------
// Job state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    NotStarted,
    Running,
    Done,
    Cancelled,
}

// ---------------------------------------------------------------------------
// Plan tree
// ---------------------------------------------------------------------------

/// A request node: something the plan must produce, and the tasks chosen
/// to produce it.
#[derive(Debug)]
pub struct RequestNode {
    pub request: CraftingRequest,
    pub state: TaskState,
    pub children: Vec<PlanNodeId>,
    pub parent: Option<PlanNodeId>,
}

/// A task node: one concrete step. Pattern tasks carry their input
/// requests as children.
#[derive(Debug)]
pub struct TaskNode {
    pub payload: TaskPayload,
    pub state: TaskState,
    pub cost: ByteCost,
    pub resolver: &'static str,
    pub children: Vec<PlanNodeId>,
    pub parent: Option<PlanNodeId>,
}

#[derive(Debug)]
pub enum PlanNode {
    Request(RequestNode),
    Task(TaskNode),
}

impl PlanNode {
    pub fn state(&self) -> TaskState {
        match self {
            PlanNode::Request(r) => r.state,
            PlanNode::Task(t) => t.state,
        }
    }

    pub fn children(&self) -> &[PlanNodeId] {
        match self {
            PlanNode::Request(r) => &r.children,
            PlanNode::Task(t) => &t.children,
        }
    }

    pub fn parent(&self) -> Option<PlanNodeId> {
        match self {
            PlanNode::Request(r) => r.parent,
            PlanNode::Task(t) => t.parent,
        }
    }

    fn children_mut(&mut self) -> &mut Vec<PlanNodeId> {
        match self {
            PlanNode::Request(r) => &mut r.children,
            PlanNode::Task(t) => &mut t.children,
        }
    }
}

/// The tree a job builds. Request and task nodes alternate by depth: a
/// request's children are tasks, a task's children are the requests for its
/// pattern inputs.
#[derive(Debug)]
pub struct PlanTree {
    nodes: SlotMap<PlanNodeId, PlanNode>,
    root: PlanNodeId,
}

impl PlanTree {
    pub fn new(request: CraftingRequest) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(PlanNode::Request(RequestNode {
            request,
            state: TaskState::NotStarted,
            children: Vec::new(),
            parent: None,
        }));
        Self { nodes, root }
    }

    pub fn root(&self) -> PlanNodeId {
        self.root
    }

    pub fn get(&self, id: PlanNodeId) -> Option<&PlanNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub(crate) fn insert_request(
        &mut self,
        parent: PlanNodeId,
        request: CraftingRequest,
    ) -> PlanNodeId {
        let id = self.nodes.insert(PlanNode::Request(RequestNode {
            request,
            state: TaskState::NotStarted,
            children: Vec::new(),
            parent: Some(parent),
        }));
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children_mut().push(id);
        }
        id
    }

    pub(crate) fn insert_task(
        &mut self,
        parent: PlanNodeId,
        payload: TaskPayload,
        cost: ByteCost,
        resolver: &'static str,
        state: TaskState,
    ) -> PlanNodeId {
        let id = self.nodes.insert(PlanNode::Task(TaskNode {
            payload,
            state,
            cost,
            resolver,
            children: Vec::new(),
            parent: Some(parent),
        }));
        if let Some(node) = self.nodes.get_mut(parent) {
            node.children_mut().push(id);
        }
        id
    }

    pub(crate) fn request(&self, id: PlanNodeId) -> Option<&RequestNode> {
        match self.nodes.get(id) {
            Some(PlanNode::Request(r)) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn request_mut(&mut self, id: PlanNodeId) -> Option<&mut RequestNode> {
        match self.nodes.get_mut(id) {
            Some(PlanNode::Request(r)) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn task(&self, id: PlanNodeId) -> Option<&TaskNode> {
        match self.nodes.get(id) {
            Some(PlanNode::Task(t)) => Some(t),
            _ => None,
        }
    }

    pub(crate) fn task_mut(&mut self, id: PlanNodeId) -> Option<&mut TaskNode> {
        match self.nodes.get_mut(id) {
            Some(PlanNode::Task(t)) => Some(t),
            _ => None,
        }
    }

    /// Remove `id` and its whole subtree, detaching it from its parent.
    /// Returns every removed id so callers can clean up side tables.
    pub(crate) fn remove_subtree(&mut self, id: PlanNodeId) -> Vec<PlanNodeId> {
        if let Some(parent) = self.nodes.get(id).and_then(PlanNode::parent) {
            if let Some(node) = self.nodes.get_mut(parent) {
                node.children_mut().retain(|c| *c != id);
            }
        }
        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(next) {
                stack.extend(node.children().iter().copied());
                removed.push(next);
            }
        }
        removed
    }

    /// Every node id, children before parents, siblings left to right. Uses
    /// an explicit stack; plan trees can be deep enough to overflow a
    /// recursive walk.
    pub fn post_order(&self) -> Vec<PlanNodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(id) = stack.pop() {
            out.push(id);
            if let Some(node) = self.nodes.get(id) {
                stack.extend(node.children().iter().copied());
            }
        }
        out.reverse();
        out
    }

    /// Content equality, ignoring node keys. Two trees that decode from the
    /// same bytes get different slotmap keys but compare equal here. The
    /// per-request resolver usage log is transient state and is ignored.
    pub fn structurally_equal(&self, other: &PlanTree) -> bool {
        let mut stack = vec![(self.root, other.root)];
        while let Some((a, b)) = stack.pop() {
            match (self.nodes.get(a), other.nodes.get(b)) {
                (Some(PlanNode::Request(ra)), Some(PlanNode::Request(rb))) => {
                    if ra.request.target() != rb.request.target()
                        || ra.request.amount() != rb.request.amount()
                        || ra.request.remaining() != rb.request.remaining()
                        || ra.request.allow_simulation() != rb.request.allow_simulation()
                        || ra.state != rb.state
                        || ra.children.len() != rb.children.len()
                    {
                        return false;
                    }
                    stack.extend(ra.children.iter().copied().zip(rb.children.iter().copied()));
                }
                (Some(PlanNode::Task(ta)), Some(PlanNode::Task(tb))) => {
                    if ta.payload != tb.payload
                        || ta.state != tb.state
                        || ta.cost != tb.cost
                        || ta.resolver != tb.resolver
                        || ta.children.len() != tb.children.len()
                    {
                        return false;
                    }
                    stack.extend(ta.children.iter().copied().zip(tb.children.iter().copied()));
                }
                _ => return false,
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// One unit of pending work. The stack replaces recursion so a job can
/// suspend between any two steps.
enum Frame {
    /// Resolve a request into candidate tasks.
    StartRequest { node: PlanNodeId },
    /// Try the next candidate for a request, cheapest first.
    RunCandidates {
        node: PlanNodeId,
        candidates: Vec<CandidateTask>,
        next: usize,
    },
    /// All input requests of a pattern attempt have settled; fold or
    /// shrink the attempt.
    FinishCraft { node: PlanNodeId },
}

/// Binary-search state for one pattern task. `known_good` crafts fit the
/// available inputs, `known_bad` do not; `probe` is the count the current
/// attempt is testing.
#[derive(Debug, Clone, Copy)]
struct CraftProgress {
    probe: u64,
    known_good: u64,
    known_bad: Option<u64>,
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// A single crafting request being planned. Create with [`Job::new`], drive
/// with [`Job::simulate_for`], then read the plan or commit it.
pub struct Job {
    ctx: CraftingContext,
    tree: PlanTree,
    frames: Vec<Frame>,
    /// The inventory layer each live node resolves against. Requests map to
    /// the layer they draw from; pattern tasks map to their attempt branch.
    layers: SecondaryMap<PlanNodeId, LayerId>,
    craft_progress: SecondaryMap<PlanNodeId, CraftProgress>,
    state: JobState,
    conjured: bool,
    output: Stack,
}

impl Job {
    pub fn new(
        output: Stack,
        mode: JobMode,
        limits: SolverLimits,
        snapshot: &NetworkSnapshot,
    ) -> Self {
        let mut ctx = CraftingContext::new(snapshot, mode, limits);
        let allow_simulation = mode == JobMode::Standard;
        let request = CraftingRequest::new(
            StackTarget::Exact(output.id.clone()),
            output.amount,
            allow_simulation,
        );
        ctx.register_node();
        let tree = PlanTree::new(request);
        let mut layers = SecondaryMap::new();
        layers.insert(tree.root(), ctx.root_layer());
        let frames = vec![Frame::StartRequest { node: tree.root() }];
        Self {
            ctx,
            tree,
            frames,
            layers,
            craft_progress: SecondaryMap::new(),
            state: JobState::NotStarted,
            conjured: false,
            output,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == JobState::Done
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == JobState::Cancelled
    }

    /// True once any part of the plan rests on fabricated stock. Simulated
    /// plans preview what a craft *would* need and can never be committed.
    pub fn is_simulation(&self) -> bool {
        self.conjured
    }

    pub fn mode(&self) -> JobMode {
        self.ctx.mode()
    }

    pub fn output(&self) -> &Stack {
        &self.output
    }

    pub fn tree(&self) -> &PlanTree {
        &self.tree
    }

    pub fn steps(&self) -> u64 {
        self.ctx.steps()
    }

    pub fn tree_size(&self) -> usize {
        self.ctx.tree_size()
    }

    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.ctx.drain_notices()
    }

    /// Stop planning. Idempotent; a finished job cannot be cancelled.
    pub fn cancel(&mut self) {
        if matches!(self.state, JobState::Done | JobState::Cancelled) {
            return;
        }
        self.frames.clear();
        let step = self.ctx.steps();
        self.ctx.push_notice(Notice::JobCancelled { step });
        self.state = JobState::Cancelled;
    }

    /// Run planning steps until `budget` elapses or the plan completes.
    /// Always makes progress: at least one step runs even with a zero
    /// budget. Returns the state after this slice of work.
    pub fn simulate_for(
        &mut self,
        registry: &ResolverRegistry,
        library: &PatternLibrary,
        budget: Duration,
    ) -> JobState {
        if matches!(self.state, JobState::Done | JobState::Cancelled) {
            return self.state;
        }
        self.state = JobState::Running;
        let start = Instant::now();
        loop {
            let Some(frame) = self.frames.pop() else {
                self.state = JobState::Done;
                break;
            };
            self.ctx.bump_step();
            self.dispatch(frame, registry, library);
            if start.elapsed() >= budget {
                if self.frames.is_empty() {
                    self.state = JobState::Done;
                }
                break;
            }
        }
        self.state
    }

    fn dispatch(&mut self, frame: Frame, registry: &ResolverRegistry, library: &PatternLibrary) {
        match frame {
            Frame::StartRequest { node } => self.begin_request(node, registry, library),
            Frame::RunCandidates {
                node,
                candidates,
                next,
            } => self.advance_request(node, candidates, next, library),
            Frame::FinishCraft { node } => self.finish_craft(node, library),
        }
    }

    // -----------------------------------------------------------------------
    // Request lifecycle
    // -----------------------------------------------------------------------

    fn begin_request(
        &mut self,
        node: PlanNodeId,
        registry: &ResolverRegistry,
        library: &PatternLibrary,
    ) {
        let Some(req) = self.tree.request_mut(node) else {
            return;
        };
        req.state = TaskState::InProgress;
        if req.request.is_satisfied() {
            req.state = TaskState::Done;
            return;
        }
        if self.attempt_already_failed(node) {
            if let Some(req) = self.tree.request_mut(node) {
                req.state = TaskState::Failed;
            }
            return;
        }
        if self.ctx.exploded() {
            self.force_terminate(node);
            return;
        }
        let Some(layer) = self.layers.get(node).copied() else {
            return;
        };
        let view = {
            let Some(req) = self.tree.request(node) else {
                return;
            };
            ResolveView {
                target: req.request.target().clone(),
                remaining: req.request.remaining(),
                allow_simulation: req.request.allow_simulation(),
                layer,
            }
        };
        let candidates = registry.resolve(&view, &mut self.ctx, library);
        self.frames.push(Frame::RunCandidates {
            node,
            candidates,
            next: 0,
        });
    }

    fn advance_request(
        &mut self,
        node: PlanNodeId,
        candidates: Vec<CandidateTask>,
        next: usize,
        library: &PatternLibrary,
    ) {
        let Some(satisfied) = self.tree.request(node).map(|r| r.request.is_satisfied()) else {
            return;
        };
        if satisfied {
            if let Some(req) = self.tree.request_mut(node) {
                req.state = TaskState::Done;
            }
            return;
        }
        if self.ctx.exploded() {
            self.force_terminate(node);
            return;
        }
        let Some(candidate) = candidates.get(next).cloned() else {
            if let Some(req) = self.tree.request_mut(node) {
                req.state = TaskState::Failed;
            }
            return;
        };
        self.frames.push(Frame::RunCandidates {
            node,
            candidates,
            next: next + 1,
        });
        self.execute_candidate(node, candidate, library);
    }

    /// A sibling request under the same pattern attempt has already failed,
    /// so this one is moot: the attempt will shrink or fail regardless.
    fn attempt_already_failed(&self, node: PlanNodeId) -> bool {
        let Some(parent) = self.tree.request(node).and_then(|r| r.parent) else {
            return false;
        };
        let Some(task) = self.tree.task(parent) else {
            return false;
        };
        task.children.iter().any(|c| {
            self.tree
                .request(*c)
                .map(|r| r.state == TaskState::Failed)
                .unwrap_or(false)
        })
    }

    /// Terminal path once a limit trips: stop exploring and close every
    /// remaining request the cheapest way the mode allows.
    fn force_terminate(&mut self, node: PlanNodeId) {
        let (satisfied, exact) = match self.tree.request(node) {
            Some(r) => (
                r.request.is_satisfied(),
                r.request.target().exact_id().cloned(),
            ),
            None => return,
        };
        if satisfied {
            if let Some(req) = self.tree.request_mut(node) {
                req.state = TaskState::Done;
            }
            return;
        }
        match (exact, self.ctx.mode()) {
            (Some(id), JobMode::Standard) => {
                self.run_conjure(node, id);
                if let Some(req) = self.tree.request_mut(node) {
                    req.state = TaskState::Done;
                }
            }
            (Some(id), JobMode::IgnoreMissing) => {
                self.run_ignore(node, id);
                if let Some(req) = self.tree.request_mut(node) {
                    req.state = TaskState::Done;
                }
            }
            // A bare group demand names nothing fabricable; let the owning
            // attempt fail upward until an exact target can absorb it.
            (None, _) => {
                if let Some(req) = self.tree.request_mut(node) {
                    req.state = TaskState::Failed;
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Task execution
    // -----------------------------------------------------------------------

    fn execute_candidate(
        &mut self,
        node: PlanNodeId,
        candidate: CandidateTask,
        library: &PatternLibrary,
    ) {
        match candidate.payload {
            TaskPayload::Extract { id, planned, .. } => self.run_extract(node, id, planned),
            TaskPayload::Conjure { id, .. } => self.run_conjure(node, id),
            TaskPayload::Emit { id, .. } => self.run_emit(node, id),
            TaskPayload::Craft {
                pattern,
                output,
                per_craft,
                ..
            } => self.begin_craft(node, pattern, output, per_craft, library),
            TaskPayload::IgnoreMissing { id, .. } => self.run_ignore(node, id),
        }
    }

    /// Pull from the request's layer. Amounts are re-checked here because a
    /// cheaper candidate may have run since this one was proposed.
    fn run_extract(&mut self, node: PlanNodeId, id: StackId, planned: u64) {
        let Some(layer) = self.layers.get(node).copied() else {
            return;
        };
        let Some(remaining) = self.tree.request(node).map(|r| r.request.remaining()) else {
            return;
        };
        let avail = self.ctx.arena().visible(layer, &id);
        let take = planned.min(remaining).min(avail);
        if take == 0 {
            return;
        }
        let got = self.ctx.arena_mut().extract(layer, &id, take, Mode::Modulate);
        let Some(req) = self.tree.request_mut(node) else {
            return;
        };
        let granted = req.request.deliver("extract", got.amount);
        self.add_task(
            node,
            TaskPayload::Extract {
                id,
                planned: take,
                delivered: granted,
                from_crafted: got.from_crafted,
            },
            ByteCost::for_task(TaskKind::Extract, granted),
            "extract",
            TaskState::Done,
        );
    }

    /// Fabricate the remainder out of thin air. Marks the whole job as a
    /// simulation; nothing touches the inventory, so a commit can never
    /// move stock that exists only on paper.
    fn run_conjure(&mut self, node: PlanNodeId, id: StackId) {
        let Some(req) = self.tree.request_mut(node) else {
            return;
        };
        let remaining = req.request.remaining();
        if remaining == 0 {
            return;
        }
        let granted = req.request.deliver("conjure", remaining);
        self.conjured = true;
        self.add_task(
            node,
            TaskPayload::Conjure {
                id,
                amount: granted,
                delivered: granted,
            },
            ByteCost::for_task(TaskKind::Conjure, granted),
            "conjure",
            TaskState::Done,
        );
    }

    /// Satisfy from an emitted source. The emitter produces on demand at
    /// run time, so planning neither reserves nor consumes anything.
    fn run_emit(&mut self, node: PlanNodeId, id: StackId) {
        let Some(req) = self.tree.request_mut(node) else {
            return;
        };
        let remaining = req.request.remaining();
        if remaining == 0 {
            return;
        }
        let granted = req.request.deliver("emit", remaining);
        self.add_task(
            node,
            TaskPayload::Emit {
                id,
                amount: granted,
                delivered: granted,
            },
            ByteCost::for_task(TaskKind::Emit, granted),
            "emit",
            TaskState::Done,
        );
    }

    /// Accept the shortfall: mark the identity unavailable in this layer
    /// and record it missing, so the finished plan reports what to restock.
    fn run_ignore(&mut self, node: PlanNodeId, id: StackId) {
        let Some(layer) = self.layers.get(node).copied() else {
            return;
        };
        let Some(req) = self.tree.request_mut(node) else {
            return;
        };
        let remaining = req.request.remaining();
        if remaining == 0 {
            return;
        }
        let granted = req.request.deliver("ignore-missing", remaining);
        self.ctx.arena_mut().ignore(layer, &id);
        self.ctx.arena_mut().record_missing(layer, &id, granted);
        self.add_task(
            node,
            TaskPayload::IgnoreMissing {
                id,
                amount: granted,
            },
            ByteCost::for_task(TaskKind::IgnoreMissing, granted),
            "ignore-missing",
            TaskState::Done,
        );
    }

    // -----------------------------------------------------------------------
    // Pattern attempts
    // -----------------------------------------------------------------------

    fn begin_craft(
        &mut self,
        node: PlanNodeId,
        pattern: PatternId,
        output: StackId,
        per_craft: u64,
        library: &PatternLibrary,
    ) {
        let Some(req) = self.tree.request(node) else {
            return;
        };
        let remaining = req.request.remaining();
        if remaining == 0 || per_craft == 0 {
            return;
        }
        let target = req.request.target().clone();
        let probe = remaining.div_ceil(per_craft);
        let task = self.add_task(
            node,
            TaskPayload::Craft {
                pattern,
                output,
                per_craft,
                crafts: probe,
                delivered: 0,
            },
            ByteCost::for_task(TaskKind::Craft, remaining),
            "craft",
            TaskState::InProgress,
        );
        self.craft_progress.insert(
            task,
            CraftProgress {
                probe,
                known_good: 0,
                known_bad: None,
            },
        );
        self.ctx.push_in_flight(target);
        self.start_attempt(task, probe, library);
    }

    /// Open one attempt at `probe` crafts: branch a layer, expand the
    /// scaled input requests, and queue the frames that will run them.
    fn start_attempt(&mut self, task: PlanNodeId, probe: u64, library: &PatternLibrary) {
        let Some(owner) = self.tree.task(task).and_then(|t| t.parent) else {
            return;
        };
        let old_children: Vec<PlanNodeId> = self
            .tree
            .task(task)
            .map(|t| t.children.clone())
            .unwrap_or_default();
        for child in old_children {
            self.remove_subtree(child);
        }
        let pattern_id = match self.tree.task(task).map(|t| &t.payload) {
            Some(TaskPayload::Craft { pattern, .. }) => *pattern,
            _ => return,
        };
        let Some(pattern) = library.get(pattern_id) else {
            self.fail_craft(task);
            return;
        };
        let inputs: Vec<(StackTarget, u64)> = pattern
            .inputs
            .iter()
            .map(|input| match input {
                PatternInput::Exact(stack) => (
                    StackTarget::Exact(stack.id.clone()),
                    stack.amount.saturating_mul(probe),
                ),
                PatternInput::Fuzzy { group, amount } => {
                    (StackTarget::Group(*group), amount.saturating_mul(probe))
                }
            })
            .collect();

        let Some(parent_layer) = self.layers.get(owner).copied() else {
            return;
        };
        let branch = self.ctx.arena_mut().branch(parent_layer, LayerLogging::ALL);
        self.layers.insert(task, branch);
        if let Some(progress) = self.craft_progress.get_mut(task) {
            progress.probe = probe;
        }
        if let Some(t) = self.tree.task_mut(task) {
            if let TaskPayload::Craft { crafts, .. } = &mut t.payload {
                *crafts = probe;
            }
        }

        let mut children = Vec::with_capacity(inputs.len());
        for (target, amount) in inputs {
            // Input requests may not fabricate; their failure is the signal
            // that drives the shrink search and candidate backtracking.
            let child = self.add_request(task, CraftingRequest::new(target, amount, false));
            self.layers.insert(child, branch);
            children.push(child);
        }
        self.frames.push(Frame::FinishCraft { node: task });
        for child in children.into_iter().rev() {
            self.frames.push(Frame::StartRequest { node: child });
        }
    }

    /// All input requests of the current attempt have settled. Fold a
    /// final success, shrink after a failure, or keep bisecting toward the
    /// largest feasible craft count.
    fn finish_craft(&mut self, task: PlanNodeId, library: &PatternLibrary) {
        let Some(children) = self.tree.task(task).map(|t| t.children.clone()) else {
            return;
        };
        let Some(progress) = self.craft_progress.get(task).copied() else {
            return;
        };
        let all_done = children.iter().all(|c| {
            self.tree
                .request(*c)
                .map(|r| r.state == TaskState::Done)
                .unwrap_or(false)
        });

        if all_done {
            match progress.known_bad {
                // Full requested count fit on the first try.
                None => self.finalize_craft(task, library),
                // The search interval is closed: this probe is the maximum.
                Some(bad) if progress.probe + 1 == bad => self.finalize_craft(task, library),
                Some(bad) => {
                    if let Some(p) = self.craft_progress.get_mut(task) {
                        p.known_good = progress.probe;
                    }
                    let next = progress.probe + (bad - progress.probe) / 2;
                    self.retry_attempt(task, next, library);
                }
            }
        } else if self.ctx.exploded() {
            // No shrink search once a limit has tripped; fail fast so the
            // forced-termination path can close the tree.
            self.fail_craft(task);
        } else {
            let bad = progress.probe;
            if let Some(p) = self.craft_progress.get_mut(task) {
                p.known_bad = Some(bad);
            }
            let next = progress.known_good + (bad - progress.known_good) / 2;
            if next == 0 {
                self.fail_craft(task);
            } else {
                self.retry_attempt(task, next, library);
            }
        }
    }

    fn retry_attempt(&mut self, task: PlanNodeId, probe: u64, library: &PatternLibrary) {
        if let Some(layer) = self.layers.remove(task) {
            self.ctx.arena_mut().discard(layer);
        }
        self.start_attempt(task, probe, library);
    }

    /// Keep the current attempt: deliver its output, bank surplus and
    /// byproducts as crafted stock, and fold the branch into the parent
    /// layer.
    fn finalize_craft(&mut self, task: PlanNodeId, library: &PatternLibrary) {
        let Some(owner) = self.tree.task(task).and_then(|t| t.parent) else {
            return;
        };
        let (pattern_id, output, per_craft, probe) = match self.tree.task(task).map(|t| &t.payload)
        {
            Some(TaskPayload::Craft {
                pattern,
                output,
                per_craft,
                crafts,
                ..
            }) => (*pattern, output.clone(), *per_craft, *crafts),
            _ => return,
        };
        let produced = probe.saturating_mul(per_craft);
        let granted = match self.tree.request_mut(owner) {
            Some(req) => req.request.deliver("craft", produced),
            None => return,
        };
        let excess = produced - granted;

        if let Some(branch) = self.layers.get(task).copied() {
            if excess > 0 {
                self.ctx.arena_mut().inject_crafted(
                    branch,
                    &Stack::new(output.clone(), excess),
                    Mode::Modulate,
                );
            }
            if let Some(pattern) = library.get(pattern_id) {
                for extra in &pattern.outputs {
                    if extra.id != output {
                        self.ctx.arena_mut().inject_crafted(
                            branch,
                            &Stack::new(extra.id.clone(), extra.amount.saturating_mul(probe)),
                            Mode::Modulate,
                        );
                    }
                }
            }
            self.ctx.arena_mut().fold_into_parent(branch);
        }
        self.layers.remove(task);
        self.craft_progress.remove(task);
        self.ctx.pop_in_flight();
        if let Some(t) = self.tree.task_mut(task) {
            t.state = TaskState::Done;
            t.cost = ByteCost::for_task(TaskKind::Craft, produced);
            if let TaskPayload::Craft { delivered, .. } = &mut t.payload {
                *delivered = granted;
            }
        }
    }

    /// Abandon the attempt entirely: no craft count works (or a limit
    /// tripped). The discarded subtree still counts against the tree-size
    /// limit, but leaves no trace in the plan.
    fn fail_craft(&mut self, task: PlanNodeId) {
        if let Some(layer) = self.layers.remove(task) {
            self.ctx.arena_mut().discard(layer);
        }
        self.craft_progress.remove(task);
        self.ctx.pop_in_flight();
        self.remove_subtree(task);
    }

    // -----------------------------------------------------------------------
    // Node bookkeeping
    // -----------------------------------------------------------------------

    fn add_task(
        &mut self,
        parent: PlanNodeId,
        payload: TaskPayload,
        cost: ByteCost,
        resolver: &'static str,
        state: TaskState,
    ) -> PlanNodeId {
        self.ctx.register_node();
        self.tree.insert_task(parent, payload, cost, resolver, state)
    }

    fn add_request(&mut self, parent: PlanNodeId, request: CraftingRequest) -> PlanNodeId {
        self.ctx.register_node();
        self.tree.insert_request(parent, request)
    }

    fn remove_subtree(&mut self, id: PlanNodeId) {
        for removed in self.tree.remove_subtree(id) {
            self.layers.remove(removed);
            self.craft_progress.remove(removed);
        }
    }

    // -----------------------------------------------------------------------
    // Outputs
    // -----------------------------------------------------------------------

    /// Flatten the finished tree into per-stack pull/craft/missing buckets.
    /// Every delivered unit lands in exactly one bucket: extractions split
    /// by provenance, pattern and emit deliveries count as crafted, and
    /// conjured stock counts as a (simulated) pull.
    pub fn populate_plan(&self, plan: &mut CraftingPlan) {
        for id in self.tree.post_order() {
            let Some(PlanNode::Task(task)) = self.tree.get(id) else {
                continue;
            };
            if task.state != TaskState::Done {
                continue;
            }
            plan.add_cost(task.cost);
            match &task.payload {
                TaskPayload::Extract {
                    id,
                    delivered,
                    from_crafted,
                    ..
                } => {
                    plan.add_pull(id, delivered - from_crafted);
                    plan.add_craft(id, *from_crafted);
                }
                TaskPayload::Conjure { id, delivered, .. } => {
                    plan.add_pull(id, *delivered);
                    plan.mark_simulated();
                }
                TaskPayload::Emit { id, delivered, .. } => {
                    plan.add_craft(id, *delivered);
                }
                TaskPayload::Craft {
                    output, delivered, ..
                } => {
                    plan.add_craft(output, *delivered);
                }
                TaskPayload::IgnoreMissing { id, amount } => {
                    plan.add_missing(id, *amount);
                }
            }
        }
    }

    pub fn plan(&self) -> CraftingPlan {
        let mut plan = CraftingPlan::new();
        self.populate_plan(&mut plan);
        plan
    }

    /// Replay the finished plan against real storage. Standard jobs commit
    /// strictly (any shortfall rolls the whole commit back); ignore-missing
    /// jobs record shortfalls and apply the rest.
    pub fn commit(
        &mut self,
        backing: &mut dyn BackingInventory,
        source: &ActionSource,
    ) -> Result<CommitOutcome, JobError> {
        if self.state != JobState::Done {
            return Err(JobError::NotDone);
        }
        if self.conjured {
            return Err(JobError::SimulatedPlan);
        }
        let policy = match self.ctx.mode() {
            JobMode::Standard => CommitPolicy::Strict,
            JobMode::IgnoreMissing => CommitPolicy::RecordMissing,
        };
        let root = self.ctx.root_layer();
        let step = self.ctx.steps();
        let ctx = &mut self.ctx;
        let outcome = ctx
            .arena
            .commit_root(root, backing, policy, source, &mut ctx.notices, step)?;
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job has not finished planning")]
    NotDone,
    #[error("plan rests on simulated stock and cannot be committed")]
    SimulatedPlan,
    #[error(transparent)]
    Commit(#[from] CommitError),
}

// ===========================================================================
// Tests
// ===========================================================================
