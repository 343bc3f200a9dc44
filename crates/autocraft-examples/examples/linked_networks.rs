//! Linked storage networks: priority bands, filtered links, cycle safety.
//!
//! Builds a small forest around a terminal network: a vault linked at high
//! priority, a bulk depot at low priority, and a deliberate cycle back to
//! the terminal. Shows banded availability, the merged planning snapshot,
//! a plan committed across the links, and injection routed by per-network
//! accept filters.
//!
//! Run with: `cargo run -p autocraft-examples --example linked_networks`

use std::collections::BTreeSet;
use std::time::Duration;

use autocraft_core::context::{JobMode, SolverLimits};
use autocraft_core::id::{FluidTypeId, ItemTypeId};
use autocraft_core::inventory::{ActionSource, Mode};
use autocraft_core::job::Job;
use autocraft_core::network::{PriorityOrder, StackFilter, StorageNetwork};
use autocraft_core::pattern::{PatternInput, PatternLibrary};
use autocraft_core::resolver::ResolverRegistry;
use autocraft_core::stack::{Stack, StackId, StackList};

fn display_name<'a>(names: &'a [(StackId, &'a str)], id: &StackId) -> &'a str {
    names
        .iter()
        .find(|(known, _)| known == id)
        .map(|(_, name)| *name)
        .unwrap_or("?")
}

fn main() {
    let logs = StackId::item(ItemTypeId(1));
    let planks = StackId::item(ItemTypeId(2));
    let diamonds = StackId::item(ItemTypeId(10));
    let water = StackId::fluid(FluidTypeId(1));
    let names = [
        (logs.clone(), "logs"),
        (planks.clone(), "planks"),
        (diamonds.clone(), "diamonds"),
        (water.clone(), "water"),
    ];

    // --- Build the forest ---

    let mut grid = StorageNetwork::new();

    let mut terminal_stock = StackList::new();
    terminal_stock.add(&Stack::new(planks.clone(), 2));
    let terminal = grid.add_network(terminal_stock);

    let mut vault_stock = StackList::new();
    vault_stock.add(&Stack::new(diamonds.clone(), 12));
    let vault = grid.add_network(vault_stock);

    let mut depot_stock = StackList::new();
    depot_stock.add(&Stack::new(logs.clone(), 50));
    let depot = grid.add_network(depot_stock);

    grid.link(terminal, vault, 10, StackFilter::All);
    grid.link(terminal, depot, -5, StackFilter::All);
    // A loop back to the terminal. The walk token keeps aggregation finite
    // and counts each store once.
    grid.link(depot, terminal, 0, StackFilter::All);

    // The terminal can produce water on demand at no storage cost.
    grid.mark_emitable(terminal, water.clone());

    // --- Banded availability ---

    println!("=== Availability by priority (descending) ===\n");
    let token = grid.next_token();
    let view = grid.available_stacks_with_priority(terminal, PriorityOrder::Descending, token);
    for band in view.bands() {
        println!("Priority {:>3}:", band.priority);
        for (id, amount) in band.stacks.iter() {
            println!("    {:>8}: {}", display_name(&names, id), amount);
        }
    }

    // --- Plan against the merged snapshot ---

    println!("\n=== Request 20 planks across the forest ===\n");

    let mut library = PatternLibrary::new();
    library
        .register(
            vec![PatternInput::Exact(Stack::new(logs.clone(), 1))],
            vec![Stack::new(planks.clone(), 4)],
            0,
        )
        .expect("register plank pattern");
    let registry = ResolverRegistry::with_defaults();

    let snapshot = grid.snapshot(terminal);
    println!(
        "Merged snapshot: {} identities, emitable {:?}.",
        snapshot.available.len(),
        snapshot
            .emitable
            .iter()
            .map(|id| display_name(&names, id))
            .collect::<Vec<_>>()
    );

    let mut job = Job::new(
        Stack::new(planks.clone(), 20),
        JobMode::Standard,
        SolverLimits::default(),
        &snapshot,
    );
    while !job.is_done() {
        job.simulate_for(&registry, &library, Duration::from_millis(2));
    }
    let plan = job.plan();
    for (id, entry) in plan.entries() {
        println!(
            "  {:>8}: pull {:>2}, craft {:>2}",
            display_name(&names, id),
            entry.to_pull,
            entry.to_craft
        );
    }

    // --- Commit through the link structure ---

    job.commit(&mut grid.backing(terminal), &ActionSource::Player { id: 1 })
        .expect("commit across links");

    // The log pull lands on the depot; the two surplus planks from the
    // rounded-up craft return to the terminal.
    println!("\nAfter commit:");
    for (label, network) in [("terminal", terminal), ("vault", vault), ("depot", depot)] {
        let contents = grid.contents_of(network).expect("network exists");
        print!("  {:>8}:", label);
        if contents.is_empty() {
            print!(" (empty)");
        }
        for (id, amount) in contents.iter() {
            print!(" {} {}", amount, display_name(&names, id));
        }
        println!();
    }

    // --- Injection respects per-network accept filters ---

    println!("\n=== Injection routing ===\n");

    grid.set_accepts(terminal, StackFilter::AnyOf(BTreeSet::from([planks.clone()])));
    let leftover = grid.inject_into(terminal, &Stack::new(diamonds.clone(), 3), Mode::Modulate);
    println!(
        "Injected 3 diamonds at the terminal (which only accepts planks); leftover {}.",
        leftover
    );
    println!(
        "Vault now holds {} diamonds.",
        grid.contents_of(vault)
            .expect("vault exists")
            .amount_of(&diamonds)
    );

    println!("\nLinked networks demo complete.");
}
