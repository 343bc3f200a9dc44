//! Wire round trip: serialize a finished plan tree and read it back.
//!
//! Plans a torch request through a three-level pattern chain, prints the
//! resulting tree, encodes it into the length-delimited record stream,
//! decodes the copy, and verifies the two trees match. Ends with damaged
//! streams to show that corruption is reported instead of yielding a
//! partial tree.
//!
//! Run with: `cargo run -p autocraft-examples --example plan_wire`

use std::time::Duration;

use autocraft_core::context::{JobMode, SolverLimits};
use autocraft_core::id::{ItemTypeId, PlanNodeId};
use autocraft_core::job::{Job, PlanNode, PlanTree};
use autocraft_core::network::MemoryStore;
use autocraft_core::pattern::{PatternInput, PatternLibrary};
use autocraft_core::request::StackTarget;
use autocraft_core::resolver::ResolverRegistry;
use autocraft_core::stack::{Stack, StackId, StackList};
use autocraft_core::wire::{decode_tree, encode_tree};

fn display_name<'a>(names: &'a [(StackId, &'a str)], id: &StackId) -> &'a str {
    names
        .iter()
        .find(|(known, _)| known == id)
        .map(|(_, name)| *name)
        .unwrap_or("?")
}

fn print_tree(tree: &PlanTree, root: PlanNodeId, names: &[(StackId, &str)]) {
    // Same walk the engine uses everywhere: an explicit pre-order stack,
    // children pushed in reverse so siblings print top to bottom.
    let mut stack = vec![(root, 0usize)];
    while let Some((node, depth)) = stack.pop() {
        let Some(entry) = tree.get(node) else {
            continue;
        };
        let pad = "  ".repeat(depth);
        match entry {
            PlanNode::Request(r) => {
                let target = match r.request.target() {
                    StackTarget::Exact(id) => display_name(names, id).to_string(),
                    StackTarget::Group(group) => format!("{:?}", group),
                };
                println!(
                    "{}request {} x{} [{:?}]",
                    pad,
                    target,
                    r.request.amount(),
                    r.state
                );
            }
            PlanNode::Task(t) => {
                println!(
                    "{}{} task, {} bytes [{:?}]",
                    pad,
                    t.resolver,
                    t.cost.bytes(),
                    t.state
                );
            }
        }
        for child in entry.children().iter().rev() {
            stack.push((*child, depth + 1));
        }
    }
}

fn main() {
    let logs = StackId::item(ItemTypeId(1));
    let planks = StackId::item(ItemTypeId(2));
    let sticks = StackId::item(ItemTypeId(3));
    let coal = StackId::item(ItemTypeId(4));
    let torches = StackId::item(ItemTypeId(5));
    let names = [
        (logs.clone(), "logs"),
        (planks.clone(), "planks"),
        (sticks.clone(), "sticks"),
        (coal.clone(), "coal"),
        (torches.clone(), "torches"),
    ];

    // --- Plan a torch request ---

    let mut contents = StackList::new();
    contents.add(&Stack::new(logs.clone(), 16));
    contents.add(&Stack::new(coal.clone(), 8));
    let store = MemoryStore::with_contents(contents);

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
    library
        .register(
            vec![
                PatternInput::Exact(Stack::new(coal.clone(), 1)),
                PatternInput::Exact(Stack::new(sticks.clone(), 4)),
            ],
            vec![Stack::new(torches.clone(), 4)],
            0,
        )
        .expect("register torch pattern");
    let registry = ResolverRegistry::with_defaults();

    let mut job = Job::new(
        Stack::new(torches.clone(), 8),
        JobMode::Standard,
        SolverLimits::default(),
        &store.snapshot(),
    );
    while !job.is_done() {
        job.simulate_for(&registry, &library, Duration::from_millis(2));
    }

    println!("=== Finished plan tree ({} nodes) ===\n", job.tree().len());
    print_tree(job.tree(), job.tree().root(), &names);

    // --- Encode and decode ---

    println!("\n=== Wire round trip ===\n");

    let bytes = encode_tree(job.tree());
    println!("Encoded {} nodes into {} bytes.", job.tree().len(), bytes.len());

    let copy = decode_tree(&bytes).expect("decode the stream we just wrote");
    println!(
        "Decoded {} nodes; structurally equal: {}.",
        copy.len(),
        copy.structurally_equal(job.tree())
    );

    // --- Damaged streams are rejected outright ---

    println!("\n=== Damaged streams ===\n");

    let mut wrong_version = bytes.clone();
    wrong_version[4] ^= 0xff;
    match decode_tree(&wrong_version) {
        Err(err) => println!("  version flip : {}", err),
        Ok(_) => println!("  version flip : unexpectedly decoded"),
    }

    let truncated = &bytes[..bytes.len() - 3];
    match decode_tree(truncated) {
        Err(err) => println!("  truncation   : {}", err),
        Ok(_) => println!("  truncation   : unexpectedly decoded"),
    }

    let mut trailing = bytes.clone();
    trailing.push(0);
    match decode_tree(&trailing) {
        Err(err) => println!("  trailing byte: {}", err),
        Ok(_) => println!("  trailing byte: unexpectedly decoded"),
    }

    println!("\nWire demo complete.");
}
