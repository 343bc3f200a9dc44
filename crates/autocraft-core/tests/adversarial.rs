//! Hostile-input tests: pathological catalogs, resource-limit explosions,
//! saturating amounts, and corrupted wire bytes. None of these may hang,
//! panic, or leave a job unfinished.

use autocraft_core::context::{JobMode, SolverLimits};
use autocraft_core::id::ItemTypeId;
use autocraft_core::inventory::ActionSource;
use autocraft_core::job::{Job, JobState};
use autocraft_core::network::MemoryStore;
use autocraft_core::notice::{Notice, NoticeKind};
use autocraft_core::pattern::PatternLibrary;
use autocraft_core::resolver::ResolverRegistry;
use autocraft_core::stack::{Stack, StackId};
use autocraft_core::test_utils::*;
use autocraft_core::wire;
use std::time::Duration;

fn sawdust() -> StackId {
    StackId::item(ItemTypeId(9))
}

#[test]
fn self_referential_pattern_terminates() {
    // One plank in, two planks out. The output is its own input, so the
    // in-flight guard must cut the recursion on the first descent.
    let registry = ResolverRegistry::with_defaults();
    let mut library = PatternLibrary::new();
    register_pattern(&mut library, &[(planks(), 1)], &[(planks(), 2)], 0);
    let snapshot = snapshot_with(&[]);

    let mut job = standard_job(Stack::new(planks(), 8), &snapshot);
    run_to_done(&mut job, &registry, &library);

    let plan = job.plan();
    assert!(plan.is_simulated());
    assert_eq!(plan.entry(&planks()).total(), 8);
}

#[test]
fn mutually_recursive_patterns_terminate_empty_handed() {
    // Planks from logs, logs from planks, nothing stored. Every branch of
    // the cycle dead-ends and the job falls back to fabrication.
    let registry = ResolverRegistry::with_defaults();
    let library = recursive_plank_library();
    let snapshot = snapshot_with(&[]);

    let mut job = standard_job(Stack::new(planks(), 8), &snapshot);
    run_to_done(&mut job, &registry, &library);

    let plan = job.plan();
    assert!(plan.is_simulated());
    assert_eq!(plan.entry(&planks()).to_pull, 8);
    assert_eq!(plan.entry(&planks()).to_craft, 0);
}

#[test]
fn oversized_request_shrinks_to_real_stock() {
    // Ten million planks against a thousand logs. The first probe is two
    // and a half million crafts; the shrink search must land on exactly
    // the thousand the logs feed and fabricate the rest.
    let registry = ResolverRegistry::with_defaults();
    let library = plank_library();
    let snapshot = snapshot_with(&[(logs(), 1_000)]);

    let mut job = standard_job(Stack::new(planks(), 10_000_000), &snapshot);
    run_to_done(&mut job, &registry, &library);

    let plan = job.plan();
    assert_eq!(plan.entry(&planks()).to_craft, 4_000);
    assert_eq!(plan.entry(&planks()).to_pull, 10_000_000 - 4_000);
    assert_eq!(plan.entry(&logs()).to_pull, 1_000);
    assert!(plan.is_simulated());
}

#[test]
fn maximal_request_completes_without_overflow() {
    // The full u64 range saturates every cost computation. The job must
    // still finish, deliver the whole amount on paper, and touch nothing.
    let registry = ResolverRegistry::with_defaults();
    let library = plank_library();
    let snapshot = snapshot_with(&[(logs(), 1_000)]);

    let mut job = standard_job(Stack::new(planks(), u64::MAX), &snapshot);
    run_to_done(&mut job, &registry, &library);

    let plan = job.plan();
    assert_eq!(plan.entry(&planks()).total(), u64::MAX);
    assert!(plan.is_simulated());
}

#[test]
fn huge_byproducts_saturate_instead_of_wrapping() {
    // Two nested crafts each shed half the u64 range of sawdust into the
    // same branch. The banked amount caps at u64::MAX instead of wrapping,
    // and the capped surplus still commits into real storage.
    let registry = ResolverRegistry::with_defaults();
    let mut library = PatternLibrary::new();
    register_pattern(
        &mut library,
        &[(logs(), 1)],
        &[(planks(), 1), (sawdust(), 1u64 << 63)],
        0,
    );
    register_pattern(
        &mut library,
        &[(planks(), 1)],
        &[(shelf(), 1), (sawdust(), 1u64 << 63)],
        0,
    );
    let snapshot = snapshot_with(&[(logs(), 1)]);

    let mut job = standard_job(Stack::new(shelf(), 1), &snapshot);
    run_to_done(&mut job, &registry, &library);

    let plan = job.plan();
    assert!(!plan.is_simulated());
    assert_eq!(plan.entry(&shelf()).to_craft, 1);
    assert_eq!(plan.entry(&logs()).to_pull, 1);

    let mut store = MemoryStore::new();
    store.insert(&Stack::new(logs(), 1));
    let outcome = job.commit(&mut store, &ActionSource::Automation).unwrap();
    assert!(outcome.missing.is_empty());
    assert_eq!(store.contents().amount_of(&logs()), 0);
    assert_eq!(store.contents().amount_of(&sawdust()), u64::MAX);
}

#[test]
fn step_limit_explosion_closes_the_whole_tree() {
    // A 100-level chain cannot finish inside 64 steps. Once the limit
    // trips, every open request closes simulated and the job still ends.
    let registry = ResolverRegistry::with_defaults();
    let (library, snapshot, target) = build_chain_catalog(100);
    let limits = SolverLimits {
        max_steps: 64,
        max_tree_size: 4_096,
    };

    let mut job = Job::new(Stack::new(target, 1), JobMode::Standard, limits, &snapshot);
    run_to_done(&mut job, &registry, &library);

    assert!(job.is_done());
    let plan = job.plan();
    assert!(plan.is_simulated());
    let notices = job.drain_notices();
    assert!(
        notices
            .iter()
            .any(|n| n.kind() == NoticeKind::StepLimitReached),
        "expected a step-limit notice, got {notices:?}"
    );
}

#[test]
fn tree_size_explosion_closes_the_whole_tree() {
    // Sixty-four input lines against an eight-node cap: the size limit
    // trips mid-expansion and the remaining inputs are fabricated.
    let registry = ResolverRegistry::with_defaults();
    let (library, snapshot, target) = build_wide_catalog(64);
    let limits = SolverLimits {
        max_steps: 10_000,
        max_tree_size: 8,
    };

    let mut job = Job::new(Stack::new(target, 1), JobMode::Standard, limits, &snapshot);
    run_to_done(&mut job, &registry, &library);

    assert!(job.is_done());
    assert!(job.plan().is_simulated());
    let notices = job.drain_notices();
    assert!(notices
        .iter()
        .any(|n| n.kind() == NoticeKind::SizeLimitReached));
}

#[test]
fn ignore_missing_explosion_records_instead_of_conjuring() {
    // The same starved chain in ignore-missing mode reports shortfalls
    // rather than fabricating stock.
    let registry = ResolverRegistry::with_defaults();
    let (library, snapshot, target) = build_chain_catalog(100);
    let limits = SolverLimits {
        max_steps: 64,
        max_tree_size: 4_096,
    };

    let mut job = Job::new(
        Stack::new(target, 1),
        JobMode::IgnoreMissing,
        limits,
        &snapshot,
    );
    run_to_done(&mut job, &registry, &library);

    assert!(job.is_done());
    let plan = job.plan();
    assert!(!plan.missing().is_empty());
    assert!(!plan.is_simulated());
}

#[test]
fn cancelled_jobs_stay_cancelled() {
    let registry = ResolverRegistry::with_defaults();
    let library = plank_library();
    let snapshot = snapshot_with(&[(logs(), 4)]);

    let mut job = standard_job(Stack::new(planks(), 8), &snapshot);
    job.cancel();
    assert!(job.is_cancelled());

    // Further driving is a no-op; the notice survives to the caller.
    let state = job.simulate_for(&registry, &library, Duration::from_millis(5));
    assert_eq!(state, JobState::Cancelled);
    let notices = job.drain_notices();
    assert!(notices
        .iter()
        .any(|n| matches!(n, Notice::JobCancelled { .. })));
}

// ===========================================================================
// Wire corruption
// ===========================================================================

fn encoded_sample() -> Vec<u8> {
    let registry = ResolverRegistry::with_defaults();
    let library = plank_library();
    let snapshot = snapshot_with(&[(logs(), 4), (planks(), 3)]);
    let mut job = standard_job(Stack::new(planks(), 11), &snapshot);
    run_to_done(&mut job, &registry, &library);
    wire::encode_tree(job.tree())
}

#[test]
fn every_truncation_of_a_valid_stream_errors() {
    let bytes = encoded_sample();
    assert!(wire::decode_tree(&bytes).is_ok());
    for cut in 0..bytes.len() {
        assert!(
            wire::decode_tree(&bytes[..cut]).is_err(),
            "prefix of {cut} bytes decoded"
        );
    }
}

#[test]
fn single_byte_corruption_never_panics() {
    let bytes = encoded_sample();
    for pos in 0..bytes.len() {
        let mut mutated = bytes.clone();
        mutated[pos] ^= 0xff;
        // Err or a different-but-valid tree are both acceptable; only a
        // panic or hang would be a defect.
        let _ = wire::decode_tree(&mutated);
    }
}

#[test]
fn garbage_buffers_are_rejected() {
    assert!(wire::decode_tree(&[]).is_err());
    assert!(wire::decode_tree(&[0xff; 64]).is_err());
    assert!(wire::decode_tree(&[0x00; 64]).is_err());
}
