//! Priority-aware recursive network aggregation.
//!
//! Storage is a forest of networks. Each network holds local contents, a set
//! of emitable identities, and prioritized, possibly-filtered links to other
//! networks. Reading availability walks the graph recursively; a visited set
//! threaded through the recursion as a value guards against cycles, and a
//! per-walk [`IterationToken`] stamp makes re-entrant reads through external
//! boundaries serve nothing twice within one logical pass.
//!
//! Duplicate counting over diamond-shaped link graphs is resolved
//! first-path-wins: a network's contents count at the first path that reaches
//! it (highest priority, earliest edge); later paths contribute nothing.

use crate::id::{IterationToken, NetworkId, VariantGroupId};
use crate::inventory::{ActionSource, BackingInventory, Mode};
use crate::stack::{Stack, StackId, StackList};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::{BTreeMap, BTreeSet};

/// Band assigned to a network's own contents when it is the walk root.
const DEFAULT_PRIORITY: i32 = 0;

// ---------------------------------------------------------------------------
// Filters and link configuration
// ---------------------------------------------------------------------------

/// What a link (or a network's own storage) lets through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackFilter {
    All,
    /// Only the listed identities pass.
    AnyOf(BTreeSet<StackId>),
    /// Only unlabeled members of the group pass.
    InGroup(VariantGroupId),
}

impl StackFilter {
    pub fn allows(&self, id: &StackId) -> bool {
        match self {
            StackFilter::All => true,
            StackFilter::AnyOf(ids) => ids.contains(id),
            StackFilter::InGroup(group) => id.group() == Some(*group),
        }
    }
}

/// Which way bands are ordered in a [`PriorityView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriorityOrder {
    Ascending,
    Descending,
}

/// A one-way edge to another network. Everything beyond the edge is seen
/// through `filter`; the target's own contents land in the `priority` band.
#[derive(Debug, Clone)]
pub struct NetworkLink {
    pub target: NetworkId,
    pub priority: i32,
    pub filter: StackFilter,
}

// ---------------------------------------------------------------------------
// Priority view
// ---------------------------------------------------------------------------

/// One merged availability list per distinct priority value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityBand {
    pub priority: i32,
    pub stacks: StackList,
}

/// Aggregated availability grouped into priority bands. Bands with equal
/// priority are merged; distinct values appear in the requested order.
#[derive(Debug, Clone, Default)]
pub struct PriorityView {
    bands: Vec<PriorityBand>,
}

impl PriorityView {
    pub fn bands(&self) -> &[PriorityBand] {
        &self.bands
    }

    /// Collapse all bands into one merged list.
    pub fn flatten(&self) -> StackList {
        let mut out = StackList::new();
        for band in &self.bands {
            out.merge(&band.stacks);
        }
        out
    }
}

/// Everything a job needs to know about a network at planning time: a
/// snapshot of merged availability plus the emitable identities. Taken once
/// at job start; planning never reads the live network again.
#[derive(Debug, Clone, Default)]
pub struct NetworkSnapshot {
    pub available: StackList,
    pub emitable: BTreeSet<StackId>,
}

// ---------------------------------------------------------------------------
// StorageNetwork
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct NetworkNode {
    contents: StackList,
    /// Identities this network can produce on demand at zero storage cost.
    emitable: BTreeSet<StackId>,
    /// What this network's own storage accepts on injection.
    accepts: StackFilter,
    links: Vec<NetworkLink>,
    /// Token of the last walk that served this node. Guards re-entrant reads
    /// within one pass.
    last_seen: Option<IterationToken>,
}

/// The forest of linked storage networks plus the per-engine iteration
/// counter.
#[derive(Debug, Default)]
pub struct StorageNetwork {
    nodes: SlotMap<NetworkId, NetworkNode>,
    next_iteration: u64,
}

impl StorageNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_network(&mut self, contents: StackList) -> NetworkId {
        self.nodes.insert(NetworkNode {
            contents,
            emitable: BTreeSet::new(),
            accepts: StackFilter::All,
            links: Vec::new(),
            last_seen: None,
        })
    }

    /// Link `from` to `to`. Links are walked highest priority first; equal
    /// priorities keep registration order.
    pub fn link(&mut self, from: NetworkId, to: NetworkId, priority: i32, filter: StackFilter) {
        if let Some(node) = self.nodes.get_mut(from) {
            node.links.push(NetworkLink {
                target: to,
                priority,
                filter,
            });
        }
    }

    pub fn mark_emitable(&mut self, network: NetworkId, id: StackId) {
        if let Some(node) = self.nodes.get_mut(network) {
            node.emitable.insert(id);
        }
    }

    pub fn set_accepts(&mut self, network: NetworkId, filter: StackFilter) {
        if let Some(node) = self.nodes.get_mut(network) {
            node.accepts = filter;
        }
    }

    pub fn add_to(&mut self, network: NetworkId, stack: &Stack) {
        if let Some(node) = self.nodes.get_mut(network) {
            node.contents.add(stack);
        }
    }

    pub fn contents_of(&self, network: NetworkId) -> Option<&StackList> {
        self.nodes.get(network).map(|n| &n.contents)
    }

    /// Mint a fresh iteration token. One token per logical read pass.
    pub fn next_token(&mut self) -> IterationToken {
        self.next_iteration += 1;
        IterationToken(self.next_iteration)
    }

    /// Borrow the forest as a [`BackingInventory`] rooted at `root`.
    pub fn backing(&mut self, root: NetworkId) -> NetworkBacking<'_> {
        NetworkBacking { grid: self, root }
    }

    // -----------------------------------------------------------------------
    // Aggregation
    // -----------------------------------------------------------------------

    /// Walk the forest from `root`, merging availability into priority bands.
    /// A network that already served `iteration` contributes nothing.
    pub fn available_stacks_with_priority(
        &mut self,
        root: NetworkId,
        order: PriorityOrder,
        iteration: IterationToken,
    ) -> PriorityView {
        let mut bands: BTreeMap<i32, StackList> = BTreeMap::new();
        let mut emitable = BTreeSet::new();
        let mut filters = Vec::new();
        let _ = self.collect(
            root,
            DEFAULT_PRIORITY,
            &mut filters,
            iteration,
            BTreeSet::new(),
            &mut bands,
            &mut emitable,
        );
        let mut bands: Vec<PriorityBand> = bands
            .into_iter()
            .map(|(priority, stacks)| PriorityBand { priority, stacks })
            .collect();
        if order == PriorityOrder::Descending {
            bands.reverse();
        }
        PriorityView { bands }
    }

    /// One-token convenience: merged availability plus emitables, for
    /// seeding a planning job.
    pub fn snapshot(&mut self, root: NetworkId) -> NetworkSnapshot {
        let iteration = self.next_token();
        let mut bands: BTreeMap<i32, StackList> = BTreeMap::new();
        let mut emitable = BTreeSet::new();
        let mut filters = Vec::new();
        let _ = self.collect(
            root,
            DEFAULT_PRIORITY,
            &mut filters,
            iteration,
            BTreeSet::new(),
            &mut bands,
            &mut emitable,
        );
        let mut available = StackList::new();
        for stacks in bands.into_values() {
            available.merge(&stacks);
        }
        NetworkSnapshot {
            available,
            emitable,
        }
    }

    /// The recursive walk. `visited` is taken by value, extended going down,
    /// and threaded through the return so sibling subtrees see what earlier
    /// siblings already consumed (first-path-wins).
    #[allow(clippy::too_many_arguments)]
    fn collect(
        &mut self,
        node: NetworkId,
        band: i32,
        filters: &mut Vec<StackFilter>,
        iteration: IterationToken,
        mut visited: BTreeSet<NetworkId>,
        bands: &mut BTreeMap<i32, StackList>,
        emitable: &mut BTreeSet<StackId>,
    ) -> BTreeSet<NetworkId> {
        if !visited.insert(node) {
            return visited;
        }
        let Some(entry) = self.nodes.get_mut(node) else {
            return visited;
        };
        if entry.last_seen == Some(iteration) {
            return visited;
        }
        entry.last_seen = Some(iteration);

        let band_list = bands.entry(band).or_default();
        for (id, amount) in self.nodes[node].contents.iter() {
            if filters.iter().all(|f| f.allows(id)) {
                band_list.add_amount(id.clone(), amount);
            }
        }
        for id in &self.nodes[node].emitable {
            if filters.iter().all(|f| f.allows(id)) {
                emitable.insert(id.clone());
            }
        }

        let mut links = self.nodes[node].links.clone();
        links.sort_by(|a, b| b.priority.cmp(&a.priority));
        for link in links {
            filters.push(link.filter.clone());
            visited = self.collect(
                link.target,
                link.priority,
                filters,
                iteration,
                visited,
                bands,
                emitable,
            );
            filters.pop();
        }
        visited
    }

    // -----------------------------------------------------------------------
    // Extraction / injection
    // -----------------------------------------------------------------------

    /// Extract up to `amount` of `id` starting at `root`. Local contents
    /// first, then links highest priority first.
    pub fn extract_from(
        &mut self,
        root: NetworkId,
        id: &StackId,
        amount: u64,
        mode: Mode,
    ) -> u64 {
        self.extract_rec(root, id, amount, mode, BTreeSet::new()).0
    }

    fn extract_rec(
        &mut self,
        node: NetworkId,
        id: &StackId,
        amount: u64,
        mode: Mode,
        mut visited: BTreeSet<NetworkId>,
    ) -> (u64, BTreeSet<NetworkId>) {
        if amount == 0 || !visited.insert(node) {
            return (0, visited);
        }
        let Some(entry) = self.nodes.get_mut(node) else {
            return (0, visited);
        };
        let mut got = match mode {
            Mode::Simulate => amount.min(entry.contents.amount_of(id)),
            Mode::Modulate => entry.contents.remove(id, amount),
        };
        let mut links = entry.links.clone();
        links.sort_by(|a, b| b.priority.cmp(&a.priority));
        for link in links {
            if got == amount {
                break;
            }
            if !link.filter.allows(id) {
                continue;
            }
            let (more, v) = self.extract_rec(link.target, id, amount - got, mode, visited);
            visited = v;
            got += more;
        }
        (got, visited)
    }

    /// Inject a stack starting at `root`. Returns the leftover amount no
    /// reachable network accepted.
    pub fn inject_into(&mut self, root: NetworkId, stack: &Stack, mode: Mode) -> u64 {
        self.inject_rec(root, stack, mode, BTreeSet::new()).0
    }

    fn inject_rec(
        &mut self,
        node: NetworkId,
        stack: &Stack,
        mode: Mode,
        mut visited: BTreeSet<NetworkId>,
    ) -> (u64, BTreeSet<NetworkId>) {
        if stack.amount == 0 {
            return (0, visited);
        }
        if !visited.insert(node) {
            return (stack.amount, visited);
        }
        let Some(entry) = self.nodes.get_mut(node) else {
            return (stack.amount, visited);
        };
        if entry.accepts.allows(&stack.id) {
            if mode == Mode::Modulate {
                entry.contents.add(stack);
            }
            return (0, visited);
        }
        let mut remaining = stack.amount;
        let mut links = entry.links.clone();
        links.sort_by(|a, b| b.priority.cmp(&a.priority));
        for link in links {
            if remaining == 0 {
                break;
            }
            if !link.filter.allows(&stack.id) {
                continue;
            }
            let (left, v) =
                self.inject_rec(link.target, &stack.with_amount(remaining), mode, visited);
            visited = v;
            remaining = left;
        }
        (remaining, visited)
    }
}

// ---------------------------------------------------------------------------
// Backing adapter
// ---------------------------------------------------------------------------

/// A [`StorageNetwork`] rooted at one network, seen through the narrow
/// backing-inventory contract.
pub struct NetworkBacking<'a> {
    grid: &'a mut StorageNetwork,
    root: NetworkId,
}

impl BackingInventory for NetworkBacking<'_> {
    fn extract(&mut self, id: &StackId, amount: u64, mode: Mode, _source: &ActionSource) -> u64 {
        self.grid.extract_from(self.root, id, amount, mode)
    }

    fn inject(&mut self, stack: &Stack, mode: Mode, _source: &ActionSource) -> u64 {
        self.grid.inject_into(self.root, stack, mode)
    }

    fn available_stacks(&mut self, out: &mut StackList, iteration: IterationToken) {
        let view =
            self.grid
                .available_stacks_with_priority(self.root, PriorityOrder::Descending, iteration);
        out.merge(&view.flatten());
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// A flat in-memory store. The simplest backing inventory; used by tests,
/// benches, and hosts that have no network topology.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    contents: StackList,
    emitable: BTreeSet<StackId>,
    reject: Option<StackFilter>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: StackList) -> Self {
        Self {
            contents,
            ..Self::default()
        }
    }

    pub fn insert(&mut self, stack: &Stack) {
        self.contents.add(stack);
    }

    pub fn mark_emitable(&mut self, id: StackId) {
        self.emitable.insert(id);
    }

    /// Make the store refuse injections matching `filter`.
    pub fn reject_matching(&mut self, filter: StackFilter) {
        self.reject = Some(filter);
    }

    pub fn contents(&self) -> &StackList {
        &self.contents
    }

    pub fn snapshot(&self) -> NetworkSnapshot {
        NetworkSnapshot {
            available: self.contents.clone(),
            emitable: self.emitable.clone(),
        }
    }
}

impl BackingInventory for MemoryStore {
    fn extract(&mut self, id: &StackId, amount: u64, mode: Mode, _source: &ActionSource) -> u64 {
        match mode {
            Mode::Simulate => amount.min(self.contents.amount_of(id)),
            Mode::Modulate => self.contents.remove(id, amount),
        }
    }

    fn inject(&mut self, stack: &Stack, mode: Mode, _source: &ActionSource) -> u64 {
        if let Some(filter) = &self.reject {
            if filter.allows(&stack.id) {
                return stack.amount;
            }
        }
        if mode == Mode::Modulate {
            self.contents.add(stack);
        }
        0
    }

    fn available_stacks(&mut self, out: &mut StackList, _iteration: IterationToken) {
        out.merge(&self.contents);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
