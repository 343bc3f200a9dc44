//! Resolver registry and the five built-in resolution strategies.
//!
//! A resolver turns one unsatisfied request into zero or more candidate
//! tasks. The registry is an explicit value constructed at startup and
//! passed by reference into the orchestrator; nothing here is global.
//! Candidates are ordered by estimated byte cost, ties broken by
//! registration order, which is what makes real stock win over a craftable
//! substitute and keeps conjuring a last resort.

use crate::context::{CraftingContext, JobMode};
use crate::cost::{ByteCost, TaskKind};
use crate::id::LayerId;
use crate::notice::Notice;
use crate::pattern::PatternLibrary;
use crate::request::StackTarget;
use crate::task::TaskPayload;

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

/// The slice of request state resolvers may inspect.
#[derive(Debug, Clone)]
pub struct ResolveView {
    pub target: StackTarget,
    pub remaining: u64,
    pub allow_simulation: bool,
    /// The layer the request resolves against.
    pub layer: LayerId,
}

/// A proposed way to satisfy (part of) a request.
#[derive(Debug, Clone)]
pub struct CandidateTask {
    pub payload: TaskPayload,
    pub cost: ByteCost,
    pub resolver: &'static str,
}

/// An error inside one resolver's candidate generation. Recovered locally:
/// the registry records a notice and treats the resolver as having produced
/// zero candidates.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ResolverError(pub String);

pub trait CraftingResolver {
    fn name(&self) -> &'static str;

    fn candidates(
        &self,
        view: &ResolveView,
        ctx: &mut CraftingContext,
        library: &PatternLibrary,
    ) -> Result<Vec<CandidateTask>, ResolverError>;
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Ordered resolver list. Constructed once, then only read.
pub struct ResolverRegistry {
    resolvers: Vec<Box<dyn CraftingResolver>>,
}

impl ResolverRegistry {
    /// An empty registry, for hosts wiring a custom strategy set.
    pub fn new() -> Self {
        Self {
            resolvers: Vec::new(),
        }
    }

    /// The five built-ins in priority order: extract, conjure, emit,
    /// craft-from-pattern, ignore-missing.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(ExtractResolver));
        registry.register(Box::new(ConjureResolver));
        registry.register(Box::new(EmitResolver));
        registry.register(Box::new(CraftResolver));
        registry.register(Box::new(IgnoreMissingResolver));
        registry
    }

    pub fn register(&mut self, resolver: Box<dyn CraftingResolver>) {
        self.resolvers.push(resolver);
    }

    pub fn resolver_count(&self) -> usize {
        self.resolvers.len()
    }

    /// Collect candidates from every resolver, sorted by cost. The sort is
    /// stable, so equal costs keep registration order. A resolver error
    /// becomes a notice and zero candidates; sibling resolvers still run.
    pub fn resolve(
        &self,
        view: &ResolveView,
        ctx: &mut CraftingContext,
        library: &PatternLibrary,
    ) -> Vec<CandidateTask> {
        let mut out = Vec::new();
        for resolver in &self.resolvers {
            match resolver.candidates(view, ctx, library) {
                Ok(mut found) => out.append(&mut found),
                Err(err) => {
                    let step = ctx.steps();
                    ctx.push_notice(Notice::ResolverFailed {
                        resolver: resolver.name().to_string(),
                        detail: err.0,
                        step,
                    });
                }
            }
        }
        out.sort_by(|a, b| a.cost.cmp(&b.cost));
        out
    }
}

impl Default for ResolverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

// ---------------------------------------------------------------------------
// Built-ins
// ---------------------------------------------------------------------------

/// Pulls from what the layer already sees. For group targets, one candidate
/// per visible member so the dispatcher can cost them independently.
pub struct ExtractResolver;

impl CraftingResolver for ExtractResolver {
    fn name(&self) -> &'static str {
        "extract"
    }

    fn candidates(
        &self,
        view: &ResolveView,
        ctx: &mut CraftingContext,
        _library: &PatternLibrary,
    ) -> Result<Vec<CandidateTask>, ResolverError> {
        let mut out = Vec::new();
        let mut push = |id: crate::stack::StackId, avail: u64| {
            let amount = avail.min(view.remaining);
            if amount > 0 {
                out.push(CandidateTask {
                    payload: TaskPayload::Extract {
                        id,
                        planned: amount,
                        delivered: 0,
                        from_crafted: 0,
                    },
                    cost: ByteCost::for_task(TaskKind::Extract, amount),
                    resolver: "extract",
                });
            }
        };
        match &view.target {
            StackTarget::Exact(id) => {
                let avail = ctx.arena().visible(view.layer, id);
                push(id.clone(), avail);
            }
            StackTarget::Group(group) => {
                for (id, avail) in ctx.arena().visible_in_group(view.layer, *group) {
                    push(id, avail);
                }
            }
        }
        Ok(out)
    }
}

/// Fabricates a placeholder when the branch permits simulation. Exact
/// targets only; a group demand with no concrete member cannot name what to
/// fabricate.
pub struct ConjureResolver;

impl CraftingResolver for ConjureResolver {
    fn name(&self) -> &'static str {
        "conjure"
    }

    fn candidates(
        &self,
        view: &ResolveView,
        _ctx: &mut CraftingContext,
        _library: &PatternLibrary,
    ) -> Result<Vec<CandidateTask>, ResolverError> {
        if !view.allow_simulation {
            return Ok(Vec::new());
        }
        let Some(id) = view.target.exact_id() else {
            return Ok(Vec::new());
        };
        Ok(vec![CandidateTask {
            payload: TaskPayload::Conjure {
                id: id.clone(),
                amount: view.remaining,
                delivered: 0,
            },
            cost: ByteCost::for_task(TaskKind::Conjure, view.remaining),
            resolver: self.name(),
        }])
    }
}

/// Satisfies from an emitted source recorded in the job's snapshot.
pub struct EmitResolver;

impl CraftingResolver for EmitResolver {
    fn name(&self) -> &'static str {
        "emit"
    }

    fn candidates(
        &self,
        view: &ResolveView,
        ctx: &mut CraftingContext,
        _library: &PatternLibrary,
    ) -> Result<Vec<CandidateTask>, ResolverError> {
        let out = ctx
            .emitable_matching(&view.target)
            .into_iter()
            .map(|id| CandidateTask {
                payload: TaskPayload::Emit {
                    id,
                    amount: view.remaining,
                    delivered: 0,
                },
                cost: ByteCost::for_task(TaskKind::Emit, view.remaining),
                resolver: "emit",
            })
            .collect();
        Ok(out)
    }
}

/// Expands patterns whose outputs satisfy the target. Skips entirely when a
/// craft attempt for this target is already open on the path (the cycle
/// guard). Among equal-cost candidates, higher pattern priority goes first.
pub struct CraftResolver;

impl CraftingResolver for CraftResolver {
    fn name(&self) -> &'static str {
        "craft"
    }

    fn candidates(
        &self,
        view: &ResolveView,
        ctx: &mut CraftingContext,
        library: &PatternLibrary,
    ) -> Result<Vec<CandidateTask>, ResolverError> {
        if ctx.is_in_flight(&view.target) {
            return Ok(Vec::new());
        }
        let mut hits: Vec<(i32, CandidateTask)> = Vec::new();
        for pid in ctx.patterns_providing(library, &view.target) {
            let Some(pattern) = library.get(pid) else {
                continue;
            };
            let (output, per_craft) = match &view.target {
                StackTarget::Exact(id) => (id.clone(), pattern.output_amount(id)),
                StackTarget::Group(group) => match pattern.output_in_group(*group) {
                    Some(stack) => (stack.id.clone(), stack.amount),
                    None => continue,
                },
            };
            if per_craft == 0 {
                continue;
            }
            let crafts = view.remaining.div_ceil(per_craft);
            hits.push((
                pattern.priority,
                CandidateTask {
                    payload: TaskPayload::Craft {
                        pattern: pid,
                        output,
                        per_craft,
                        crafts,
                        delivered: 0,
                    },
                    cost: ByteCost::for_task(TaskKind::Craft, view.remaining),
                    resolver: self.name(),
                },
            ));
        }
        hits.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(hits.into_iter().map(|(_, candidate)| candidate).collect())
    }
}

/// Terminal fallback in ignore-missing jobs: accept the shortfall, record
/// it, move on. Costed above everything so it only fires when nothing else
/// can.
pub struct IgnoreMissingResolver;

impl CraftingResolver for IgnoreMissingResolver {
    fn name(&self) -> &'static str {
        "ignore-missing"
    }

    fn candidates(
        &self,
        view: &ResolveView,
        ctx: &mut CraftingContext,
        _library: &PatternLibrary,
    ) -> Result<Vec<CandidateTask>, ResolverError> {
        if ctx.mode() != JobMode::IgnoreMissing {
            return Ok(Vec::new());
        }
        let Some(id) = view.target.exact_id() else {
            return Ok(Vec::new());
        };
        Ok(vec![CandidateTask {
            payload: TaskPayload::IgnoreMissing {
                id: id.clone(),
                amount: view.remaining,
            },
            cost: ByteCost::for_task(TaskKind::IgnoreMissing, view.remaining),
            resolver: self.name(),
        }])
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::SolverLimits;
    use crate::id::{ItemTypeId, VariantGroupId};
    use crate::network::NetworkSnapshot;
    use crate::notice::NoticeKind;
    use crate::pattern::PatternInput;
    use crate::stack::{ItemKey, Stack, StackId, StackList};

    fn sticks() -> StackId {
        StackId::item(ItemTypeId(1))
    }

    fn diamonds() -> StackId {
        StackId::item(ItemTypeId(2))
    }

    fn context_with_stock(pairs: &[(StackId, u64)], mode: JobMode) -> CraftingContext {
        let mut available = StackList::new();
        for (id, n) in pairs {
            available.add_amount(id.clone(), *n);
        }
        let snapshot = NetworkSnapshot {
            available,
            ..NetworkSnapshot::default()
        };
        CraftingContext::new(&snapshot, mode, SolverLimits::default())
    }

    fn view_for(ctx: &CraftingContext, target: StackTarget, remaining: u64) -> ResolveView {
        ResolveView {
            target,
            remaining,
            allow_simulation: true,
            layer: ctx.root_layer(),
        }
    }

    fn stick_pattern(library: &mut PatternLibrary) {
        library
            .register(
                vec![PatternInput::Exact(Stack::new(diamonds(), 1))],
                vec![Stack::new(sticks(), 1)],
                0,
            )
            .unwrap();
    }

    #[test]
    fn defaults_register_five_resolvers() {
        assert_eq!(ResolverRegistry::with_defaults().resolver_count(), 5);
    }

    #[test]
    fn stock_sorts_before_craft_before_conjure() {
        let mut library = PatternLibrary::new();
        stick_pattern(&mut library);
        let mut ctx = context_with_stock(&[(sticks(), 64)], JobMode::Standard);
        let registry = ResolverRegistry::with_defaults();

        let view = view_for(&ctx, StackTarget::Exact(sticks()), 13);
        let candidates = registry.resolve(&view, &mut ctx, &library);
        let names: Vec<&str> = candidates.iter().map(|c| c.resolver).collect();
        assert_eq!(names, vec!["extract", "craft", "conjure"]);
    }

    #[test]
    fn conjure_absent_when_simulation_disallowed() {
        let mut ctx = context_with_stock(&[], JobMode::Standard);
        let registry = ResolverRegistry::with_defaults();
        let view = ResolveView {
            target: StackTarget::Exact(sticks()),
            remaining: 5,
            allow_simulation: false,
            layer: ctx.root_layer(),
        };
        let candidates = registry.resolve(&view, &mut ctx, &PatternLibrary::new());
        assert!(candidates.is_empty());
    }

    #[test]
    fn craft_skips_in_flight_targets() {
        let mut library = PatternLibrary::new();
        stick_pattern(&mut library);
        let mut ctx = context_with_stock(&[], JobMode::Standard);
        let target = StackTarget::Exact(sticks());
        ctx.push_in_flight(target.clone());

        let view = ResolveView {
            target,
            remaining: 5,
            allow_simulation: false,
            layer: ctx.root_layer(),
        };
        let candidates = CraftResolver
            .candidates(&view, &mut ctx, &library)
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn group_target_yields_one_extract_candidate_per_member() {
        let group = VariantGroupId(9);
        let oak = StackId::Item(ItemKey::with_group(ItemTypeId(10), group));
        let birch = StackId::Item(ItemKey::with_group(ItemTypeId(11), group));
        let mut ctx =
            context_with_stock(&[(oak.clone(), 8), (birch.clone(), 8)], JobMode::Standard);

        let view = view_for(&ctx, StackTarget::Group(group), 4);
        let candidates = ExtractResolver
            .candidates(&view, &mut ctx, &PatternLibrary::new())
            .unwrap();
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn emit_offers_for_emitable_targets() {
        let snapshot = NetworkSnapshot {
            available: StackList::new(),
            emitable: [sticks()].into_iter().collect(),
        };
        let mut ctx = CraftingContext::new(&snapshot, JobMode::Standard, SolverLimits::default());
        let view = view_for(&ctx, StackTarget::Exact(sticks()), 3);
        let candidates = EmitResolver
            .candidates(&view, &mut ctx, &PatternLibrary::new())
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].cost, ByteCost::ZERO);
    }

    #[test]
    fn ignore_missing_requires_job_mode() {
        let mut standard = context_with_stock(&[], JobMode::Standard);
        let view = view_for(&standard, StackTarget::Exact(sticks()), 2);
        assert!(IgnoreMissingResolver
            .candidates(&view, &mut standard, &PatternLibrary::new())
            .unwrap()
            .is_empty());

        let mut missing = context_with_stock(&[], JobMode::IgnoreMissing);
        let view = view_for(&missing, StackTarget::Exact(sticks()), 2);
        assert_eq!(
            IgnoreMissingResolver
                .candidates(&view, &mut missing, &PatternLibrary::new())
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn pattern_priority_breaks_equal_cost_ties() {
        let mut library = PatternLibrary::new();
        let low = library
            .register(
                vec![PatternInput::Exact(Stack::new(diamonds(), 1))],
                vec![Stack::new(sticks(), 1)],
                0,
            )
            .unwrap();
        let high = library
            .register(
                vec![PatternInput::Exact(Stack::new(diamonds(), 2))],
                vec![Stack::new(sticks(), 1)],
                5,
            )
            .unwrap();

        let mut ctx = context_with_stock(&[], JobMode::Standard);
        let view = view_for(&ctx, StackTarget::Exact(sticks()), 4);
        let candidates = CraftResolver
            .candidates(&view, &mut ctx, &library)
            .unwrap();
        let patterns: Vec<_> = candidates
            .iter()
            .map(|c| match &c.payload {
                TaskPayload::Craft { pattern, .. } => *pattern,
                other => panic!("unexpected payload {other:?}"),
            })
            .collect();
        assert_eq!(patterns, vec![high, low]);
    }

    #[test]
    fn labeled_target_finds_no_patterns() {
        let mut library = PatternLibrary::new();
        stick_pattern(&mut library);
        let labeled = StackId::Item(ItemKey::new(ItemTypeId(1)).labeled("Heirloom"));
        let mut ctx = context_with_stock(&[], JobMode::Standard);

        let view = view_for(&ctx, StackTarget::Exact(labeled), 1);
        let candidates = CraftResolver
            .candidates(&view, &mut ctx, &library)
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn failing_resolver_records_notice_and_spares_siblings() {
        struct Broken;
        impl CraftingResolver for Broken {
            fn name(&self) -> &'static str {
                "broken"
            }
            fn candidates(
                &self,
                _view: &ResolveView,
                _ctx: &mut CraftingContext,
                _library: &PatternLibrary,
            ) -> Result<Vec<CandidateTask>, ResolverError> {
                Err(ResolverError("malformed pattern".into()))
            }
        }

        let mut registry = ResolverRegistry::new();
        registry.register(Box::new(Broken));
        registry.register(Box::new(ExtractResolver));

        let mut ctx = context_with_stock(&[(sticks(), 10)], JobMode::Standard);
        let view = view_for(&ctx, StackTarget::Exact(sticks()), 4);
        let candidates = registry.resolve(&view, &mut ctx, &PatternLibrary::new());
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].resolver, "extract");

        let notices = ctx.drain_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind(), NoticeKind::ResolverFailed);
    }
}
