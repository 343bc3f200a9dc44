//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use std::time::Duration;

use crate::context::{JobMode, SolverLimits};
use crate::id::{FluidTypeId, ItemTypeId, PatternId, VariantGroupId};
use crate::job::{Job, JobState};
use crate::network::NetworkSnapshot;
use crate::pattern::{PatternInput, PatternLibrary};
use crate::resolver::ResolverRegistry;
use crate::stack::{ItemKey, Stack, StackId};

// ===========================================================================
// Identity constructors
// ===========================================================================

pub fn logs() -> StackId {
    StackId::item(ItemTypeId(1))
}
pub fn planks() -> StackId {
    StackId::item(ItemTypeId(2))
}
pub fn sticks() -> StackId {
    StackId::item(ItemTypeId(3))
}
pub fn shelf() -> StackId {
    StackId::item(ItemTypeId(4))
}
pub fn coal() -> StackId {
    StackId::item(ItemTypeId(5))
}
pub fn torches() -> StackId {
    StackId::item(ItemTypeId(6))
}
pub fn iron_ore() -> StackId {
    StackId::item(ItemTypeId(7))
}
pub fn iron_ingot() -> StackId {
    StackId::item(ItemTypeId(8))
}

pub fn water() -> StackId {
    StackId::fluid(FluidTypeId(1))
}

// ===========================================================================
// Variant-group constructors
// ===========================================================================

pub fn plank_group() -> VariantGroupId {
    VariantGroupId(1)
}
pub fn oak_planks() -> StackId {
    StackId::Item(ItemKey::with_group(ItemTypeId(20), plank_group()))
}
pub fn birch_planks() -> StackId {
    StackId::Item(ItemKey::with_group(ItemTypeId(21), plank_group()))
}

// ===========================================================================
// Snapshot builders
// ===========================================================================

/// A snapshot seeded with fixed contents and nothing emitable.
pub fn snapshot_with(contents: &[(StackId, u64)]) -> NetworkSnapshot {
    let mut snapshot = NetworkSnapshot::default();
    for (id, amount) in contents {
        snapshot.available.add_amount(id.clone(), *amount);
    }
    snapshot
}

pub fn snapshot_with_emitable(
    contents: &[(StackId, u64)],
    emitable: &[StackId],
) -> NetworkSnapshot {
    let mut snapshot = snapshot_with(contents);
    for id in emitable {
        snapshot.emitable.insert(id.clone());
    }
    snapshot
}

// ===========================================================================
// Pattern helpers
// ===========================================================================

/// Register a pattern whose inputs all match exactly.
pub fn register_pattern(
    library: &mut PatternLibrary,
    inputs: &[(StackId, u64)],
    outputs: &[(StackId, u64)],
    priority: i32,
) -> PatternId {
    let inputs = inputs
        .iter()
        .map(|(id, amount)| PatternInput::Exact(Stack::new(id.clone(), *amount)))
        .collect();
    let outputs = outputs
        .iter()
        .map(|(id, amount)| Stack::new(id.clone(), *amount))
        .collect();
    library.register(inputs, outputs, priority).unwrap()
}

/// One log in, four planks out.
pub fn plank_library() -> PatternLibrary {
    let mut library = PatternLibrary::new();
    register_pattern(&mut library, &[(logs(), 1)], &[(planks(), 4)], 0);
    library
}

/// The plank pattern plus its inverse (four planks back into a log). The
/// pair is mutually recursive, so plans against it exercise the in-flight
/// cycle guard.
pub fn recursive_plank_library() -> PatternLibrary {
    let mut library = plank_library();
    register_pattern(&mut library, &[(planks(), 4)], &[(logs(), 1)], 0);
    library
}

// ===========================================================================
// Job helpers
// ===========================================================================

pub fn standard_job(output: Stack, snapshot: &NetworkSnapshot) -> Job {
    Job::new(output, JobMode::Standard, SolverLimits::default(), snapshot)
}

/// Drive a job in small time slices until it finishes. Panics if the job is
/// still running after far more slices than any test plan needs.
pub fn run_to_done(job: &mut Job, registry: &ResolverRegistry, library: &PatternLibrary) {
    for _ in 0..10_000 {
        if job.simulate_for(registry, library, Duration::from_millis(5)) == JobState::Done {
            return;
        }
    }
    panic!("job did not finish within the slice budget");
}

// ===========================================================================
// Catalog builders (for benchmarks, stress tests, and proptests)
// ===========================================================================

/// Build a linear pattern chain of the given depth: the target is crafted
/// from an intermediate, which is crafted from another, down to a base item
/// held in storage. Returns the library, a stocked snapshot, and the target.
pub fn build_chain_catalog(depth: usize) -> (PatternLibrary, NetworkSnapshot, StackId) {
    let mut library = PatternLibrary::new();
    let item = |i: usize| StackId::item(ItemTypeId(100 + i as u32));

    for i in 0..depth {
        register_pattern(&mut library, &[(item(i + 1), 1)], &[(item(i), 1)], 0);
    }
    let snapshot = snapshot_with(&[(item(depth), 1_000_000)]);
    (library, snapshot, item(0))
}

/// Build a wide catalog: one target pattern consuming `fan_out` distinct
/// inputs, each stocked. 2 tree levels, best case for candidate dispatch.
pub fn build_wide_catalog(fan_out: usize) -> (PatternLibrary, NetworkSnapshot, StackId) {
    let mut library = PatternLibrary::new();
    let target = StackId::item(ItemTypeId(50));
    let input = |i: usize| StackId::item(ItemTypeId(200 + i as u32));

    let inputs: Vec<(StackId, u64)> = (0..fan_out).map(|i| (input(i), 1)).collect();
    register_pattern(&mut library, &inputs, &[(target.clone(), 1)], 0);

    let stocked: Vec<(StackId, u64)> = (0..fan_out).map(|i| (input(i), 1_000)).collect();
    let snapshot = snapshot_with(&stocked);
    (library, snapshot, target)
}
