use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies a storage network in the network forest.
    pub struct NetworkId;

    /// Identifies a layer in the transactional inventory arena.
    pub struct LayerId;

    /// Identifies a node (request or task) in a resolved plan tree.
    pub struct PlanNodeId;
}

/// Identifies an item type. Cheap to copy and compare. The engine assigns no
/// meaning to the value; host code owns the mapping to concrete items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemTypeId(pub u32);

/// Identifies a fluid type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FluidTypeId(pub u32);

/// Identifies a family of interchangeable item variants (e.g. "planks").
/// Fuzzy pattern inputs match any unlabeled member of the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariantGroupId(pub u32);

/// Identifies a pattern in a [`PatternLibrary`](crate::pattern::PatternLibrary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PatternId(pub u32);

/// A network-read token. Monotonically increasing per [`StorageNetwork`];
/// recursive reads carrying the same token skip networks that already served
/// it, breaking re-entrant traversal within one logical pass.
///
/// [`StorageNetwork`]: crate::network::StorageNetwork
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IterationToken(pub u64);
