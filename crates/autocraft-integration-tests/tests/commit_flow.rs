//! Committing finished plans back to real storage: linked-network pulls,
//! surplus routing, strict rollback, and recorded shortfalls.

use autocraft_core::context::{JobMode, SolverLimits};
use autocraft_core::inventory::{ActionSource, CommitError};
use autocraft_core::job::{Job, JobError};
use autocraft_core::network::{MemoryStore, StackFilter, StorageNetwork};
use autocraft_core::notice::Notice;
use autocraft_core::resolver::ResolverRegistry;
use autocraft_core::stack::{Stack, StackId, StackList};
use autocraft_core::test_utils::*;
use std::collections::BTreeSet;

fn list(pairs: &[(StackId, u64)]) -> StackList {
    let mut out = StackList::new();
    for (id, n) in pairs {
        out.add_amount(id.clone(), *n);
    }
    out
}

#[test]
fn commit_pulls_planned_amounts_across_linked_networks() {
    // Planks sit in the root network, logs one link away. The plan pulls
    // three planks and crafts the other eight from two logs; committing
    // moves exactly that much out of each network.
    let mut grid = StorageNetwork::new();
    let root = grid.add_network(list(&[(planks(), 3)]));
    let depot = grid.add_network(list(&[(logs(), 10)]));
    grid.link(root, depot, 5, StackFilter::All);

    let registry = ResolverRegistry::with_defaults();
    let library = plank_library();
    let snapshot = grid.snapshot(root);
    assert_eq!(snapshot.available.amount_of(&logs()), 10);

    let mut job = standard_job(Stack::new(planks(), 11), &snapshot);
    run_to_done(&mut job, &registry, &library);

    let plan = job.plan();
    assert_eq!(plan.entry(&planks()).to_pull, 3);
    assert_eq!(plan.entry(&planks()).to_craft, 8);
    assert_eq!(plan.entry(&logs()).to_pull, 2);

    let mut backing = grid.backing(root);
    let outcome = job.commit(&mut backing, &ActionSource::Automation).unwrap();
    assert!(outcome.missing.is_empty());

    assert_eq!(grid.contents_of(root).unwrap().amount_of(&planks()), 0);
    assert_eq!(grid.contents_of(depot).unwrap().amount_of(&logs()), 8);
}

#[test]
fn craft_surplus_falls_through_to_an_accepting_network() {
    // Ten planks out of three logs overshoots by two. The root network
    // refuses all injections, so the surplus lands in the linked sink.
    let mut grid = StorageNetwork::new();
    let root = grid.add_network(list(&[(logs(), 3)]));
    let sink = grid.add_network(StackList::new());
    grid.set_accepts(root, StackFilter::AnyOf(BTreeSet::new()));
    grid.link(root, sink, 0, StackFilter::All);

    let registry = ResolverRegistry::with_defaults();
    let library = plank_library();
    let snapshot = grid.snapshot(root);

    let mut job = standard_job(Stack::new(planks(), 10), &snapshot);
    run_to_done(&mut job, &registry, &library);

    let mut backing = grid.backing(root);
    job.commit(&mut backing, &ActionSource::Automation).unwrap();

    assert_eq!(grid.contents_of(root).unwrap().amount_of(&logs()), 0);
    assert_eq!(grid.contents_of(sink).unwrap().amount_of(&planks()), 2);
}

#[test]
fn strict_commit_rolls_back_when_stock_vanished() {
    // The snapshot promised five planks but only two remain by commit
    // time. A standard job commits all-or-nothing: the error reports the
    // shortfall and the partial extraction is put back.
    let registry = ResolverRegistry::with_defaults();
    let library = plank_library();
    let snapshot = snapshot_with(&[(planks(), 5)]);

    let mut job = standard_job(Stack::new(planks(), 5), &snapshot);
    run_to_done(&mut job, &registry, &library);

    let mut store = MemoryStore::with_contents(list(&[(planks(), 2)]));
    let err = job
        .commit(&mut store, &ActionSource::Player { id: 7 })
        .unwrap_err();
    match err {
        JobError::Commit(CommitError::Shortfall { requested, got, .. }) => {
            assert_eq!(requested, 5);
            assert_eq!(got, 2);
        }
        other => panic!("expected a shortfall, got {other:?}"),
    }
    assert_eq!(store.contents().amount_of(&planks()), 2, "rolled back");

    // Player-sourced commits surface the shortfall as a notice too.
    let notices = job.drain_notices();
    assert!(notices
        .iter()
        .any(|n| matches!(n, Notice::CommitShortfall { requested: 5, got: 2, .. })));
}

#[test]
fn ignore_missing_commit_records_and_proceeds() {
    // The same vanished stock under an ignore-missing job: the commit
    // applies what it can and reports the rest as missing.
    let registry = ResolverRegistry::with_defaults();
    let library = plank_library();
    let snapshot = snapshot_with(&[(planks(), 5)]);

    let mut job = Job::new(
        Stack::new(planks(), 5),
        JobMode::IgnoreMissing,
        SolverLimits::default(),
        &snapshot,
    );
    run_to_done(&mut job, &registry, &library);

    let mut store = MemoryStore::with_contents(list(&[(planks(), 2)]));
    let outcome = job
        .commit(&mut store, &ActionSource::Automation)
        .unwrap();
    assert_eq!(outcome.missing.amount_of(&planks()), 3);
    assert_eq!(store.contents().amount_of(&planks()), 0);
}

#[test]
fn emitted_sources_commit_without_touching_storage() {
    // Emitted identities are produced on demand by the network itself, so
    // a plan fed entirely by an emitter moves nothing at commit time.
    let registry = ResolverRegistry::with_defaults();
    let library = plank_library();
    let snapshot = snapshot_with_emitable(&[], &[torches()]);

    let mut job = standard_job(Stack::new(torches(), 5), &snapshot);
    run_to_done(&mut job, &registry, &library);

    let plan = job.plan();
    assert_eq!(plan.entry(&torches()).to_craft, 5);
    assert!(!plan.is_simulated());

    let mut store = MemoryStore::new();
    let outcome = job.commit(&mut store, &ActionSource::Automation).unwrap();
    assert!(outcome.missing.is_empty());
    assert!(store.contents().is_empty());
}
