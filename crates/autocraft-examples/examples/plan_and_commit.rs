//! Plan-and-commit example: request sticks, preview the plan, apply it.
//!
//! Stocks a single store with logs, registers two patterns (logs into
//! planks, planks into sticks), plans a stick request in budgeted slices,
//! and commits the result. A second, oversized request shows a simulated
//! preview that refuses to commit, and a third runs the same request in
//! ignore-missing mode so the shortfall is recorded instead.
//!
//! Run with: `cargo run -p autocraft-examples --example plan_and_commit`

use std::time::Duration;

use autocraft_core::context::{JobMode, SolverLimits};
use autocraft_core::id::ItemTypeId;
use autocraft_core::inventory::ActionSource;
use autocraft_core::job::Job;
use autocraft_core::network::MemoryStore;
use autocraft_core::pattern::{PatternInput, PatternLibrary};
use autocraft_core::plan::CraftingPlan;
use autocraft_core::resolver::ResolverRegistry;
use autocraft_core::stack::{Stack, StackId, StackList};

fn display_name<'a>(names: &'a [(StackId, &'a str)], id: &StackId) -> &'a str {
    names
        .iter()
        .find(|(known, _)| known == id)
        .map(|(_, name)| *name)
        .unwrap_or("?")
}

fn print_plan(plan: &CraftingPlan, names: &[(StackId, &str)]) {
    println!("Simulated preview: {}", plan.is_simulated());
    for (id, entry) in plan.entries() {
        println!(
            "  {:>7}: pull {:>3}, craft {:>3}",
            display_name(names, id),
            entry.to_pull,
            entry.to_craft
        );
    }
    println!("  Total cost: {} bytes", plan.total_cost().bytes());
}

fn run_to_done(job: &mut Job, registry: &ResolverRegistry, library: &PatternLibrary) -> u32 {
    // Drive planning in small slices, the way a game loop would between
    // frames.
    let mut slices = 0;
    while !job.is_done() {
        job.simulate_for(registry, library, Duration::from_millis(2));
        slices += 1;
    }
    slices
}

fn main() {
    let logs = StackId::item(ItemTypeId(1));
    let planks = StackId::item(ItemTypeId(2));
    let sticks = StackId::item(ItemTypeId(3));
    let names = [
        (logs.clone(), "logs"),
        (planks.clone(), "planks"),
        (sticks.clone(), "sticks"),
    ];

    // --- Storage and patterns ---

    let mut contents = StackList::new();
    contents.add(&Stack::new(logs.clone(), 30));
    let mut store = MemoryStore::with_contents(contents);

    let mut library = PatternLibrary::new();
    library
        .register(
            vec![PatternInput::Exact(Stack::new(logs.clone(), 1))],
            vec![Stack::new(planks.clone(), 4)],
            0,
        )
        .expect("register plank pattern");
    library
        .register(
            vec![PatternInput::Exact(Stack::new(planks.clone(), 2))],
            vec![Stack::new(sticks.clone(), 4)],
            0,
        )
        .expect("register stick pattern");

    let registry = ResolverRegistry::with_defaults();

    // --- Scenario 1: 10 sticks from 30 logs ---

    println!("=== Scenario 1: Request 10 sticks (30 logs stored) ===\n");

    let mut job = Job::new(
        Stack::new(sticks.clone(), 10),
        JobMode::Standard,
        SolverLimits::default(),
        &store.snapshot(),
    );
    let slices = run_to_done(&mut job, &registry, &library);
    println!(
        "Planned in {} slice(s), {} steps, {} tree nodes.",
        slices,
        job.steps(),
        job.tree_size()
    );

    print_plan(&job.plan(), &names);

    let outcome = job
        .commit(&mut store, &ActionSource::Automation)
        .expect("commit plan");
    println!("\nCommitted; {} missing.", outcome.missing.total());

    // Pattern by-products round up to whole crafts, so the surplus planks
    // and sticks land back in storage.
    println!("Store after commit:");
    for (id, amount) in store.contents().iter() {
        println!("  {:>7}: {}", display_name(&names, id), amount);
    }

    // --- Scenario 2: more sticks than the stock supports ---

    println!("\n=== Scenario 2: Request 500 sticks ===\n");

    let mut job = Job::new(
        Stack::new(sticks.clone(), 500),
        JobMode::Standard,
        SolverLimits::default(),
        &store.snapshot(),
    );
    run_to_done(&mut job, &registry, &library);
    print_plan(&job.plan(), &names);

    // The log pull includes fabricated stock, so this plan is preview-only.
    match job.commit(&mut store, &ActionSource::Automation) {
        Err(err) => println!("\nCommit refused: {}", err),
        Ok(_) => println!("\nUnexpected commit"),
    }

    // --- Scenario 3: same request, ignore-missing mode ---

    println!("\n=== Scenario 3: 500 sticks, ignore-missing ===\n");

    let mut job = Job::new(
        Stack::new(sticks.clone(), 500),
        JobMode::IgnoreMissing,
        SolverLimits::default(),
        &store.snapshot(),
    );
    run_to_done(&mut job, &registry, &library);

    let plan = job.plan();
    print_plan(&plan, &names);
    for (id, amount) in plan.missing().iter() {
        println!("  short {} {}", amount, display_name(&names, id));
    }

    let outcome = job
        .commit(&mut store, &ActionSource::Automation)
        .expect("commit with recorded shortfall");
    println!("\nCommitted. Recorded missing:");
    for (id, amount) in outcome.missing.iter() {
        println!("  {:>7}: {}", display_name(&names, id), amount);
    }
    println!("Store after commit:");
    for (id, amount) in store.contents().iter() {
        println!("  {:>7}: {}", display_name(&names, id), amount);
    }

    println!("\nPlan-and-commit demo complete.");
}
