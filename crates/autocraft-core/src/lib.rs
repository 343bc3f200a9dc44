//! Autocraft Core -- the crafting-request resolution engine.
//!
//! This crate plans how to produce a requested stack out of a storage
//! network: pulling what is already stored, crafting the shortfall through
//! registered patterns (recursively, for pattern inputs that must themselves
//! be crafted), and falling back to simulated sources when the network
//! cannot provide. Planning is incremental and time-budgeted, runs against a
//! layered copy of the network so nothing moves until commit, and produces
//! an explicit tree of what would happen.
//!
//! # Planning Loop
//!
//! Each call to [`job::Job::simulate_for`] pops work frames until the time
//! budget runs out:
//!
//! 1. **Start** -- A request node opens. Satisfied requests complete on the
//!    spot; otherwise every registered resolver proposes candidate tasks.
//! 2. **Candidates** -- Candidates execute cheapest-first. The first one to
//!    satisfy the request wins; the rest stay queued as fallbacks.
//! 3. **Craft** -- A pattern task branches the inventory, spawns one request
//!    per input, and probes a craft count. When inputs run short it bisects
//!    down to the largest count the network can actually feed.
//! 4. **Fold** -- A finished attempt folds its inventory layer into its
//!    parent; a failed subtree is discarded whole, layer and all.
//! 5. **Finish** -- The frame stack empties. The tree holds only completed
//!    nodes and the job can be read as a [`plan::CraftingPlan`] or committed
//!    back to real storage.
//!
//! # Budgeted Stepping Pattern
//!
//! Jobs never run to completion in one call; callers drive them in slices:
//!
//! ```rust,ignore
//! let mut job = Job::new(output, JobMode::Standard, SolverLimits::default(), &snapshot);
//! while job.simulate_for(&registry, &library, Duration::from_millis(5)) != JobState::Done {}
//! let plan = job.plan();
//! ```
//!
//! # Key Types
//!
//! - [`job::Job`] -- Planning job: frame stack, plan tree, commit.
//! - [`resolver::ResolverRegistry`] -- Dispatches requests to the extract,
//!   conjure, emit, craft, and ignore-missing resolvers.
//! - [`inventory::LayerArena`] -- Copy-on-branch inventory layers with
//!   crafted/stored provenance and atomic commit.
//! - [`pattern::PatternLibrary`] -- Registered crafting patterns indexed by
//!   output and by variant group.
//! - [`network::StorageNetwork`] -- Linked storage networks with priority
//!   bands and recursive aggregation.
//! - [`cost::ByteCost`] -- Q32.32 fixed-point cost assigned to every task.
//! - [`wire`] -- Length-prefixed tag serialization for finished plan trees.
//! - [`notice::NoticeBuffer`] -- Bounded ring of planning diagnostics.

pub mod context;
pub mod cost;
pub mod id;
pub mod inventory;
pub mod job;
pub mod network;
pub mod notice;
pub mod pattern;
pub mod plan;
pub mod request;
pub mod resolver;
pub mod stack;
pub mod task;
pub mod wire;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
