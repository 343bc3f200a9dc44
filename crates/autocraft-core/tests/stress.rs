//! Large-scale planning runs: deep chains, wide fan-outs, and the
//! recursion-meets-shrink-search interaction at realistic storage sizes.

use autocraft_core::context::{JobMode, SolverLimits};
use autocraft_core::job::Job;
use autocraft_core::resolver::ResolverRegistry;
use autocraft_core::stack::Stack;
use autocraft_core::test_utils::*;

#[test]
fn two_hundred_level_chain_plans_clean() {
    let registry = ResolverRegistry::with_defaults();
    let (library, snapshot, target) = build_chain_catalog(200);
    let limits = SolverLimits {
        max_steps: 100_000,
        max_tree_size: 10_000,
    };

    let mut job = Job::new(
        Stack::new(target.clone(), 1),
        JobMode::Standard,
        limits,
        &snapshot,
    );
    run_to_done(&mut job, &registry, &library);

    let plan = job.plan();
    assert!(!plan.is_simulated());
    assert_eq!(plan.entry(&target).to_craft, 1);
    assert!(plan.missing().is_empty());
}

#[test]
fn wide_fanout_extracts_every_input_line() {
    let registry = ResolverRegistry::with_defaults();
    let (library, snapshot, target) = build_wide_catalog(256);

    let mut job = standard_job(Stack::new(target.clone(), 4), &snapshot);
    run_to_done(&mut job, &registry, &library);

    let plan = job.plan();
    assert!(!plan.is_simulated());
    assert_eq!(plan.entry(&target).to_craft, 4);
    // 256 distinct inputs, 4 units each.
    assert_eq!(plan.pulled_total(), 1_024);
}

#[test]
fn recursive_catalog_shrinks_to_exact_stock_at_scale() {
    // 4096 logs cap crafting at 16384 planks. A 20000-plank request must
    // land on that cap exactly, then fabricate the remainder, with the
    // inverse recipe never luring the search into a loop.
    let registry = ResolverRegistry::with_defaults();
    let library = recursive_plank_library();
    let snapshot = snapshot_with(&[(logs(), 4_096)]);

    let mut job = standard_job(Stack::new(planks(), 20_000), &snapshot);
    run_to_done(&mut job, &registry, &library);

    let plan = job.plan();
    assert_eq!(plan.entry(&planks()).to_craft, 16_384);
    assert_eq!(plan.entry(&planks()).to_pull, 20_000 - 16_384);
    assert_eq!(plan.entry(&logs()).to_pull, 4_096);
    assert!(plan.is_simulated());
}
