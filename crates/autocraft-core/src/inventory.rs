//! The transactional layered planning inventory.
//!
//! Planning never mutates real storage. Instead each job owns a
//! [`LayerArena`]: the root layer is seeded with a snapshot of network
//! availability, and every speculative branch (a pattern attempt) gets a
//! child layer that sees its parent's totals through a copy-on-write
//! overlay. Extractions and injections touch only the branch layer and are
//! logged; a successful branch folds its logs into its parent, a failed one
//! is discarded. Committing the root replays the accumulated logs against
//! the real backing store atomically.
//!
//! Layers also track which visible units were *crafted* during planning
//! (excess and byproducts injected by craft steps) as opposed to seeded from
//! storage. Extraction consumes crafted units first and reports the split,
//! so the flattened plan can count every unit exactly once as either
//! pulled-from-storage or crafted.
//!
//! # Commit modes
//!
//! Top-level interactive crafts fail atomically and loudly (strict), while
//! branches exploring "what if some inputs are missing" degrade gracefully
//! (missing): shortfalls are recorded rather than fatal. See
//! [`LayerArena::commit_root`].

use crate::id::{IterationToken, LayerId, VariantGroupId};
use crate::notice::{Notice, NoticeBuffer};
use crate::stack::{Stack, StackId, StackList};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::HashMap;

// ---------------------------------------------------------------------------
// Modes and sources
// ---------------------------------------------------------------------------

/// Whether an operation should observe or mutate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Report what would happen without changing anything.
    Simulate,
    /// Actually move the items.
    Modulate,
}

/// Who is driving an operation. Strict commits surface shortfall notices
/// only for player sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionSource {
    Automation,
    Player { id: u64 },
}

/// How a root commit treats extraction shortfalls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitPolicy {
    /// Any shortfall fails the whole commit and rolls everything back.
    Strict,
    /// Shortfalls are recorded into the missing list; the commit proceeds.
    RecordMissing,
}

// ---------------------------------------------------------------------------
// Backing inventory contract
// ---------------------------------------------------------------------------

/// The narrow interface to real storage. The engine consumes this; it never
/// owns the devices behind it.
pub trait BackingInventory {
    /// Extract up to `amount` of `id`. Returns the amount extracted (or
    /// extractable, in [`Mode::Simulate`]).
    fn extract(&mut self, id: &StackId, amount: u64, mode: Mode, source: &ActionSource) -> u64;

    /// Inject a stack. Returns the leftover amount that was not accepted.
    fn inject(&mut self, stack: &Stack, mode: Mode, source: &ActionSource) -> u64;

    /// Accumulate everything visible into `out`. `iteration` lets recursive
    /// network reads detect and break re-entrant traversal within one pass.
    fn available_stacks(&mut self, out: &mut StackList, iteration: IterationToken);
}

// ---------------------------------------------------------------------------
// Layers
// ---------------------------------------------------------------------------

/// Which logs a layer keeps. Folding a child into its parent and committing
/// the root both replay logs, so branch layers must log extractions and
/// injections; the missing log is only needed where shortfalls are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerLogging {
    pub extracted: bool,
    pub injected: bool,
    pub missing: bool,
}

impl LayerLogging {
    pub const ALL: LayerLogging = LayerLogging {
        extracted: true,
        injected: true,
        missing: true,
    };
}

/// Result of one extraction: the total taken and how much of it was
/// crafted during planning rather than seeded from storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extracted {
    pub amount: u64,
    pub from_crafted: u64,
}

impl Extracted {
    pub fn from_storage(&self) -> u64 {
        self.amount - self.from_crafted
    }
}

#[derive(Debug)]
struct Layer {
    parent: Option<LayerId>,
    /// Copy-on-write overlay. An identity present here shadows every parent;
    /// an absent identity reads through the parent chain.
    counts: HashMap<StackId, u64>,
    /// The crafted subset of `counts`, shadowing in lockstep: every write to
    /// `counts` for an identity writes `crafted` for it too, so the two
    /// overlays always resolve at the same depth.
    crafted: HashMap<StackId, u64>,
    log_extracted: Option<StackList>,
    log_injected: Option<StackList>,
    /// The crafted subset of `log_injected`.
    log_injected_crafted: Option<StackList>,
    log_missing: Option<StackList>,
}

impl Layer {
    fn new(parent: Option<LayerId>, logging: LayerLogging) -> Self {
        Self {
            parent,
            counts: HashMap::new(),
            crafted: HashMap::new(),
            log_extracted: logging.extracted.then(StackList::new),
            log_injected: logging.injected.then(StackList::new),
            log_injected_crafted: logging.injected.then(StackList::new),
            log_missing: logging.missing.then(StackList::new),
        }
    }
}

// ---------------------------------------------------------------------------
// LayerArena
// ---------------------------------------------------------------------------

/// All layers of one job, referenced by [`LayerId`]. Branching never copies
/// counts; reads walk the parent chain until they hit an overlay entry.
#[derive(Debug, Default)]
pub struct LayerArena {
    layers: SlotMap<LayerId, Layer>,
}

/// Outcome of a successful root commit.
#[derive(Debug, Default)]
pub struct CommitOutcome {
    /// Shortfalls recorded under [`CommitPolicy::RecordMissing`]. Empty in
    /// strict mode.
    pub missing: StackList,
}

impl LayerArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a root layer seeded with a snapshot of availability. Seeded
    /// units count as storage units, not crafted ones.
    pub fn root(&mut self, initial: &StackList, logging: LayerLogging) -> LayerId {
        let mut layer = Layer::new(None, logging);
        for (id, amount) in initial.iter() {
            layer.counts.insert(id.clone(), amount);
            layer.crafted.insert(id.clone(), 0);
        }
        self.layers.insert(layer)
    }

    /// Create a child layer over `parent`. The child sees the parent's
    /// visible totals; the parent cannot see the child's tentative changes
    /// until [`Self::fold_into_parent`].
    pub fn branch(&mut self, parent: LayerId, logging: LayerLogging) -> LayerId {
        debug_assert!(self.layers.contains_key(parent));
        self.layers.insert(Layer::new(Some(parent), logging))
    }

    /// Discard a branch and everything it logged. The rollback path.
    pub fn discard(&mut self, layer: LayerId) {
        self.layers.remove(layer);
    }

    /// The amount of `id` visible from `layer`.
    pub fn visible(&self, layer: LayerId, id: &StackId) -> u64 {
        let mut cursor = Some(layer);
        while let Some(current) = cursor {
            let layer = &self.layers[current];
            if let Some(&n) = layer.counts.get(id) {
                return n;
            }
            cursor = layer.parent;
        }
        0
    }

    /// The crafted portion of the visible amount.
    pub fn visible_crafted(&self, layer: LayerId, id: &StackId) -> u64 {
        let mut cursor = Some(layer);
        while let Some(current) = cursor {
            let layer = &self.layers[current];
            if let Some(&n) = layer.crafted.get(id) {
                return n;
            }
            cursor = layer.parent;
        }
        0
    }

    /// Every visible unlabeled member of `group`, in identity order.
    pub fn visible_in_group(&self, layer: LayerId, group: VariantGroupId) -> Vec<(StackId, u64)> {
        let mut seen: std::collections::BTreeMap<StackId, u64> = Default::default();
        let mut cursor = Some(layer);
        while let Some(current) = cursor {
            let layer = &self.layers[current];
            for (id, &n) in &layer.counts {
                if id.group() == Some(group) {
                    // The deepest overlay entry wins; parents only fill gaps.
                    seen.entry(id.clone()).or_insert(n);
                }
            }
            cursor = layer.parent;
        }
        seen.into_iter().filter(|(_, n)| *n > 0).collect()
    }

    /// Extract up to `amount` of `id` from `layer`, crafted units first.
    ///
    /// [`Mode::Simulate`] reports the satisfiable prefix without mutating;
    /// two consecutive simulate calls return the same value.
    pub fn extract(&mut self, layer: LayerId, id: &StackId, amount: u64, mode: Mode) -> Extracted {
        let have = self.visible(layer, id);
        let crafted_have = self.visible_crafted(layer, id);
        let taken = amount.min(have);
        let from_crafted = taken.min(crafted_have);
        let result = Extracted {
            amount: taken,
            from_crafted,
        };
        if taken == 0 || mode == Mode::Simulate {
            return result;
        }
        let entry = &mut self.layers[layer];
        entry.counts.insert(id.clone(), have - taken);
        entry.crafted.insert(id.clone(), crafted_have - from_crafted);
        if let Some(log) = entry.log_extracted.as_mut() {
            log.add_amount(id.clone(), taken);
        }
        result
    }

    /// Inject a storage-bound stack into `layer`. The planning inventory is
    /// a best-effort sink; everything is always accepted.
    pub fn inject(&mut self, layer: LayerId, stack: &Stack, mode: Mode) {
        self.inject_inner(layer, stack, mode, false);
    }

    /// Inject units produced by a craft step (excess output, byproducts).
    /// They stay extractable like anything else, but extraction reports them
    /// as crafted so the plan never double-counts them as pulls.
    pub fn inject_crafted(&mut self, layer: LayerId, stack: &Stack, mode: Mode) {
        self.inject_inner(layer, stack, mode, true);
    }

    fn inject_inner(&mut self, layer: LayerId, stack: &Stack, mode: Mode, crafted: bool) {
        if stack.amount == 0 || mode == Mode::Simulate {
            return;
        }
        let have = self.visible(layer, &stack.id);
        let crafted_have = self.visible_crafted(layer, &stack.id);
        let entry = &mut self.layers[layer];
        entry
            .counts
            .insert(stack.id.clone(), have.saturating_add(stack.amount));
        let crafted_now = if crafted {
            crafted_have.saturating_add(stack.amount)
        } else {
            crafted_have
        };
        entry.crafted.insert(stack.id.clone(), crafted_now);
        if let Some(log) = entry.log_injected.as_mut() {
            log.add_amount(stack.id.clone(), stack.amount);
        }
        if crafted {
            if let Some(log) = entry.log_injected_crafted.as_mut() {
                log.add_amount(stack.id.clone(), stack.amount);
            }
        }
    }

    /// Zero out a stack's visible count so later resolution treats it as
    /// unavailable, without logging and without touching the backing store.
    pub fn ignore(&mut self, layer: LayerId, id: &StackId) {
        let entry = &mut self.layers[layer];
        entry.counts.insert(id.clone(), 0);
        entry.crafted.insert(id.clone(), 0);
    }

    /// Record a shortfall against `layer`'s missing log.
    pub fn record_missing(&mut self, layer: LayerId, id: &StackId, amount: u64) {
        if let Some(log) = self.layers[layer].log_missing.as_mut() {
            log.add_amount(id.clone(), amount);
        }
    }

    /// What a layer has logged so far. Each log defaults to empty when
    /// disabled.
    pub fn logged_extracted(&self, layer: LayerId) -> StackList {
        self.layers[layer].log_extracted.clone().unwrap_or_default()
    }

    pub fn logged_injected(&self, layer: LayerId) -> StackList {
        self.layers[layer].log_injected.clone().unwrap_or_default()
    }

    fn logged_injected_crafted(&self, layer: LayerId) -> StackList {
        self.layers[layer]
            .log_injected_crafted
            .clone()
            .unwrap_or_default()
    }

    pub fn logged_missing(&self, layer: LayerId) -> StackList {
        self.layers[layer].log_missing.clone().unwrap_or_default()
    }

    /// Fold a successful child into its parent: replay the child's logged
    /// injections, then its logged extractions, against the parent layer,
    /// and merge its missing log upward. The child is removed.
    ///
    /// Sibling branches run sequentially, so the parent is unchanged since
    /// the child branched and replay is exact; injections go first so
    /// extractions of self-injected byproducts find them.
    pub fn fold_into_parent(&mut self, child: LayerId) {
        let parent = self.layers[child]
            .parent
            .expect("fold_into_parent on a root layer");
        let injected = self.logged_injected(child);
        let injected_crafted = self.logged_injected_crafted(child);
        let extracted = self.logged_extracted(child);
        let missing = self.logged_missing(child);
        self.discard(child);

        for (id, amount) in injected.iter() {
            let crafted_part = injected_crafted.amount_of(id).min(amount);
            if crafted_part > 0 {
                self.inject_crafted(
                    parent,
                    &Stack::new(id.clone(), crafted_part),
                    Mode::Modulate,
                );
            }
            if amount > crafted_part {
                self.inject(
                    parent,
                    &Stack::new(id.clone(), amount - crafted_part),
                    Mode::Modulate,
                );
            }
        }
        for (id, amount) in extracted.iter() {
            let got = self.extract(parent, id, amount, Mode::Modulate);
            debug_assert_eq!(got.amount, amount, "parent diverged from branch snapshot");
        }
        for (id, amount) in missing.iter() {
            self.record_missing(parent, id, amount);
        }
    }

    // -----------------------------------------------------------------------
    // Root commit
    // -----------------------------------------------------------------------

    /// Replay the root layer's logs against the real backing store.
    ///
    /// Injections are applied first; a rejected injection rolls back the
    /// already-applied ones (by extracting them back out) and fails the
    /// commit in either policy. Extractions follow; a shortfall fails the
    /// commit in [`CommitPolicy::Strict`] (all effects rolled back, notice
    /// pushed for player sources) or is recorded under
    /// [`CommitPolicy::RecordMissing`].
    pub fn commit_root(
        &mut self,
        root: LayerId,
        backing: &mut dyn BackingInventory,
        policy: CommitPolicy,
        source: &ActionSource,
        notices: &mut NoticeBuffer,
        step: u64,
    ) -> Result<CommitOutcome, CommitError> {
        debug_assert!(self.layers[root].parent.is_none());
        let injected = self.logged_injected(root);
        let extracted = self.logged_extracted(root);

        // Phase 1: injections, all-or-nothing.
        let mut applied_injections: Vec<Stack> = Vec::new();
        for (id, amount) in injected.iter() {
            let stack = Stack::new(id.clone(), amount);
            let leftover = backing.inject(&stack, Mode::Modulate, source);
            if leftover > 0 {
                let accepted = amount - leftover;
                if accepted > 0 {
                    applied_injections.push(Stack::new(id.clone(), accepted));
                }
                for stack in &applied_injections {
                    let _ = backing.extract(&stack.id, stack.amount, Mode::Modulate, source);
                }
                return Err(CommitError::InjectRejected {
                    id: id.clone(),
                    leftover,
                });
            }
            applied_injections.push(stack);
        }

        // Phase 2: extractions, policy-dependent.
        let mut applied_extractions: Vec<Stack> = Vec::new();
        let mut outcome = CommitOutcome::default();
        for (id, amount) in extracted.iter() {
            let got = backing.extract(id, amount, Mode::Modulate, source);
            if got > 0 {
                applied_extractions.push(Stack::new(id.clone(), got));
            }
            if got < amount {
                match policy {
                    CommitPolicy::Strict => {
                        for stack in &applied_extractions {
                            let _ = backing.inject(stack, Mode::Modulate, source);
                        }
                        for stack in &applied_injections {
                            let _ =
                                backing.extract(&stack.id, stack.amount, Mode::Modulate, source);
                        }
                        if matches!(source, ActionSource::Player { .. }) {
                            notices.push(Notice::CommitShortfall {
                                id: id.clone(),
                                requested: amount,
                                got,
                                step,
                            });
                        }
                        return Err(CommitError::Shortfall {
                            id: id.clone(),
                            requested: amount,
                            got,
                        });
                    }
                    CommitPolicy::RecordMissing => {
                        outcome.missing.add_amount(id.clone(), amount - got);
                        self.record_missing(root, id, amount - got);
                    }
                }
            }
        }

        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("backing store rejected injection of {id:?} ({leftover} left over)")]
    InjectRejected { id: StackId, leftover: u64 },
    #[error("extraction shortfall for {id:?}: requested {requested}, got {got}")]
    Shortfall {
        id: StackId,
        requested: u64,
        got: u64,
    },
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ItemTypeId;

    fn sticks() -> StackId {
        StackId::item(ItemTypeId(0))
    }

    fn diamonds() -> StackId {
        StackId::item(ItemTypeId(1))
    }

    fn seeded_arena(pairs: &[(StackId, u64)]) -> (LayerArena, LayerId) {
        let mut initial = StackList::new();
        for (id, n) in pairs {
            initial.add_amount(id.clone(), *n);
        }
        let mut arena = LayerArena::new();
        let root = arena.root(&initial, LayerLogging::ALL);
        (arena, root)
    }

    // -----------------------------------------------------------------------
    // A minimal backing store for commit tests.
    // -----------------------------------------------------------------------

    struct TestStore {
        contents: StackList,
        /// Identities this store refuses to accept.
        reject: Vec<StackId>,
    }

    impl TestStore {
        fn with(pairs: &[(StackId, u64)]) -> Self {
            let mut contents = StackList::new();
            for (id, n) in pairs {
                contents.add_amount(id.clone(), *n);
            }
            Self {
                contents,
                reject: Vec::new(),
            }
        }
    }

    impl BackingInventory for TestStore {
        fn extract(
            &mut self,
            id: &StackId,
            amount: u64,
            mode: Mode,
            _source: &ActionSource,
        ) -> u64 {
            match mode {
                Mode::Simulate => amount.min(self.contents.amount_of(id)),
                Mode::Modulate => self.contents.remove(id, amount),
            }
        }

        fn inject(&mut self, stack: &Stack, mode: Mode, _source: &ActionSource) -> u64 {
            if self.reject.contains(&stack.id) {
                return stack.amount;
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

    #[test]
    fn simulate_is_idempotent() {
        let (mut arena, root) = seeded_arena(&[(sticks(), 10)]);
        let first = arena.extract(root, &sticks(), 6, Mode::Simulate);
        let second = arena.extract(root, &sticks(), 6, Mode::Simulate);
        assert_eq!(first.amount, 6);
        assert_eq!(second.amount, 6);
        assert_eq!(arena.visible(root, &sticks()), 10);
    }

    #[test]
    fn modulate_decrements_and_logs() {
        let (mut arena, root) = seeded_arena(&[(sticks(), 10)]);
        let got = arena.extract(root, &sticks(), 6, Mode::Modulate);
        assert_eq!(got.amount, 6);
        assert_eq!(got.from_crafted, 0);
        assert_eq!(arena.visible(root, &sticks()), 4);
        assert_eq!(arena.logged_extracted(root).amount_of(&sticks()), 6);
    }

    #[test]
    fn extract_returns_largest_prefix() {
        let (mut arena, root) = seeded_arena(&[(sticks(), 3)]);
        assert_eq!(arena.extract(root, &sticks(), 10, Mode::Modulate).amount, 3);
        assert_eq!(arena.extract(root, &sticks(), 10, Mode::Modulate).amount, 0);
    }

    #[test]
    fn crafted_units_are_consumed_first_and_reported() {
        let (mut arena, root) = seeded_arena(&[(sticks(), 10)]);
        arena.inject_crafted(root, &Stack::new(sticks(), 4), Mode::Modulate);
        assert_eq!(arena.visible(root, &sticks()), 14);
        assert_eq!(arena.visible_crafted(root, &sticks()), 4);

        let got = arena.extract(root, &sticks(), 6, Mode::Modulate);
        assert_eq!(got.amount, 6);
        assert_eq!(got.from_crafted, 4);
        assert_eq!(got.from_storage(), 2);
        assert_eq!(arena.visible_crafted(root, &sticks()), 0);
    }

    #[test]
    fn branch_sees_parent_totals() {
        let (mut arena, root) = seeded_arena(&[(sticks(), 10)]);
        let child = arena.branch(root, LayerLogging::ALL);
        assert_eq!(arena.visible(child, &sticks()), 10);
    }

    #[test]
    fn sibling_branches_are_isolated() {
        let (mut arena, root) = seeded_arena(&[(sticks(), 10)]);
        let a = arena.branch(root, LayerLogging::ALL);
        let b = arena.branch(root, LayerLogging::ALL);
        assert_eq!(arena.extract(a, &sticks(), 7, Mode::Modulate).amount, 7);
        // b still sees the full parent total.
        assert_eq!(arena.visible(b, &sticks()), 10);
        assert_eq!(arena.visible(root, &sticks()), 10);
    }

    #[test]
    fn discard_rolls_back_a_branch() {
        let (mut arena, root) = seeded_arena(&[(sticks(), 10)]);
        let child = arena.branch(root, LayerLogging::ALL);
        let _ = arena.extract(child, &sticks(), 10, Mode::Modulate);
        arena.discard(child);
        assert_eq!(arena.visible(root, &sticks()), 10);
        assert!(arena.logged_extracted(root).is_empty());
    }

    #[test]
    fn fold_replays_into_parent() {
        let (mut arena, root) = seeded_arena(&[(sticks(), 10)]);
        let child = arena.branch(root, LayerLogging::ALL);
        let _ = arena.extract(child, &sticks(), 4, Mode::Modulate);
        arena.inject(child, &Stack::new(diamonds(), 2), Mode::Modulate);
        arena.fold_into_parent(child);

        assert_eq!(arena.visible(root, &sticks()), 6);
        assert_eq!(arena.visible(root, &diamonds()), 2);
        assert_eq!(arena.logged_extracted(root).amount_of(&sticks()), 4);
        assert_eq!(arena.logged_injected(root).amount_of(&diamonds()), 2);
    }

    #[test]
    fn fold_preserves_crafted_provenance() {
        let (mut arena, root) = seeded_arena(&[]);
        let child = arena.branch(root, LayerLogging::ALL);
        arena.inject_crafted(child, &Stack::new(sticks(), 5), Mode::Modulate);
        arena.fold_into_parent(child);

        assert_eq!(arena.visible(root, &sticks()), 5);
        assert_eq!(arena.visible_crafted(root, &sticks()), 5);
        let got = arena.extract(root, &sticks(), 3, Mode::Modulate);
        assert_eq!(got.from_crafted, 3);
    }

    #[test]
    fn fold_handles_byproduct_consumption() {
        // Child injects byproducts, then a deeper operation consumes one of
        // them. Replay injects first so the consuming extraction succeeds.
        let (mut arena, root) = seeded_arena(&[]);
        let child = arena.branch(root, LayerLogging::ALL);
        arena.inject_crafted(child, &Stack::new(sticks(), 3), Mode::Modulate);
        assert_eq!(arena.extract(child, &sticks(), 1, Mode::Modulate).amount, 1);
        arena.fold_into_parent(child);
        assert_eq!(arena.visible(root, &sticks()), 2);
        assert_eq!(arena.visible_crafted(root, &sticks()), 2);
    }

    #[test]
    fn ignore_zeroes_without_logging() {
        let (mut arena, root) = seeded_arena(&[(sticks(), 10)]);
        arena.ignore(root, &sticks());
        assert_eq!(arena.visible(root, &sticks()), 0);
        assert!(arena.logged_extracted(root).is_empty());
    }

    #[test]
    fn ignore_in_branch_leaves_parent_visible() {
        let (mut arena, root) = seeded_arena(&[(sticks(), 10)]);
        let child = arena.branch(root, LayerLogging::ALL);
        arena.ignore(child, &sticks());
        assert_eq!(arena.visible(child, &sticks()), 0);
        assert_eq!(arena.visible(root, &sticks()), 10);
    }

    #[test]
    fn commit_applies_extractions() {
        let (mut arena, root) = seeded_arena(&[(sticks(), 10)]);
        let _ = arena.extract(root, &sticks(), 6, Mode::Modulate);

        let mut store = TestStore::with(&[(sticks(), 10)]);
        let mut notices = NoticeBuffer::default();
        let outcome = arena
            .commit_root(
                root,
                &mut store,
                CommitPolicy::Strict,
                &ActionSource::Automation,
                &mut notices,
                0,
            )
            .unwrap();
        assert!(outcome.missing.is_empty());
        assert_eq!(store.contents.amount_of(&sticks()), 4);
    }

    #[test]
    fn strict_commit_shortfall_rolls_back_and_notifies_player() {
        let (mut arena, root) = seeded_arena(&[(sticks(), 10), (diamonds(), 5)]);
        let _ = arena.extract(root, &diamonds(), 5, Mode::Modulate);
        let _ = arena.extract(root, &sticks(), 10, Mode::Modulate);

        // Storage lost sticks between planning and commit.
        let mut store = TestStore::with(&[(sticks(), 4), (diamonds(), 5)]);
        let mut notices = NoticeBuffer::default();
        let result = arena.commit_root(
            root,
            &mut store,
            CommitPolicy::Strict,
            &ActionSource::Player { id: 1 },
            &mut notices,
            7,
        );
        assert!(matches!(result, Err(CommitError::Shortfall { .. })));
        // Everything restored.
        assert_eq!(store.contents.amount_of(&sticks()), 4);
        assert_eq!(store.contents.amount_of(&diamonds()), 5);
        let drained = notices.drain();
        assert_eq!(drained.len(), 1);
        assert!(matches!(
            drained[0],
            Notice::CommitShortfall {
                requested: 10,
                got: 4,
                ..
            }
        ));
    }

    #[test]
    fn strict_commit_shortfall_is_silent_for_automation() {
        let (mut arena, root) = seeded_arena(&[(sticks(), 10)]);
        let _ = arena.extract(root, &sticks(), 10, Mode::Modulate);
        let mut store = TestStore::with(&[(sticks(), 1)]);
        let mut notices = NoticeBuffer::default();
        let result = arena.commit_root(
            root,
            &mut store,
            CommitPolicy::Strict,
            &ActionSource::Automation,
            &mut notices,
            0,
        );
        assert!(result.is_err());
        assert!(notices.is_empty());
    }

    #[test]
    fn missing_mode_records_shortfall_and_proceeds() {
        let (mut arena, root) = seeded_arena(&[(sticks(), 10), (diamonds(), 5)]);
        let _ = arena.extract(root, &sticks(), 10, Mode::Modulate);
        let _ = arena.extract(root, &diamonds(), 5, Mode::Modulate);

        let mut store = TestStore::with(&[(sticks(), 4), (diamonds(), 5)]);
        let mut notices = NoticeBuffer::default();
        let outcome = arena
            .commit_root(
                root,
                &mut store,
                CommitPolicy::RecordMissing,
                &ActionSource::Automation,
                &mut notices,
                0,
            )
            .unwrap();
        assert_eq!(outcome.missing.amount_of(&sticks()), 6);
        // The satisfiable parts were applied.
        assert_eq!(store.contents.amount_of(&sticks()), 0);
        assert_eq!(store.contents.amount_of(&diamonds()), 0);
        assert_eq!(arena.logged_missing(root).amount_of(&sticks()), 6);
    }

    #[test]
    fn rejected_injection_fails_commit_and_rolls_back() {
        let (mut arena, root) = seeded_arena(&[]);
        arena.inject(root, &Stack::new(sticks(), 3), Mode::Modulate);
        arena.inject(root, &Stack::new(diamonds(), 2), Mode::Modulate);

        let mut store = TestStore::with(&[]);
        store.reject.push(diamonds());
        let mut notices = NoticeBuffer::default();
        let result = arena.commit_root(
            root,
            &mut store,
            CommitPolicy::RecordMissing,
            &ActionSource::Automation,
            &mut notices,
            0,
        );
        assert!(matches!(result, Err(CommitError::InjectRejected { .. })));
        // The stick injection was rolled back.
        assert_eq!(store.contents.amount_of(&sticks()), 0);
    }

    #[test]
    fn visible_in_group_walks_the_chain() {
        use crate::stack::ItemKey;
        let group = VariantGroupId(4);
        let oak = StackId::Item(ItemKey::with_group(ItemTypeId(10), group));
        let birch = StackId::Item(ItemKey::with_group(ItemTypeId(11), group));

        let (mut arena, root) = seeded_arena(&[(oak.clone(), 8), (birch.clone(), 2)]);
        let child = arena.branch(root, LayerLogging::ALL);
        let _ = arena.extract(child, &oak, 5, Mode::Modulate);

        let members = arena.visible_in_group(child, group);
        assert_eq!(members, vec![(oak, 3), (birch, 2)]);
    }
}
