//! Transformation patterns and the pattern library.
//!
//! A [`Pattern`] declares how a set of input stacks becomes a set of output
//! stacks. Inputs are either exact identities or fuzzy (any unlabeled member
//! of a variant group). The [`PatternLibrary`] indexes patterns by exact
//! output identity and by output group so resolvers can answer "what crafts
//! this?" without scanning.
//!
//! Libraries persist to bytes via `bitcode` behind a magic/version header,
//! allowing hosts to save or transmit pattern catalogs.

use crate::id::{PatternId, VariantGroupId};
use crate::stack::{Stack, StackId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Magic number identifying a serialized pattern catalog.
pub const CATALOG_MAGIC: u32 = 0xCAF7_0001;

/// Current catalog format version. Increment when breaking the format.
pub const CATALOG_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Pattern
// ---------------------------------------------------------------------------

/// One input requirement of a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternInput {
    /// Requires exactly this identity.
    Exact(Stack),
    /// Accepts any unlabeled member of the group (substitution-tolerant).
    Fuzzy { group: VariantGroupId, amount: u64 },
}

impl PatternInput {
    /// Amount consumed per craft, whichever the matching mode.
    pub fn amount(&self) -> u64 {
        match self {
            PatternInput::Exact(stack) => stack.amount,
            PatternInput::Fuzzy { amount, .. } => *amount,
        }
    }
}

/// A declared transformation from inputs to outputs.
///
/// `outputs[0]` is the primary output; further entries are byproducts that
/// are injected back into the planning inventory when the pattern runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    pub inputs: Vec<PatternInput>,
    pub outputs: Vec<Stack>,
    /// User-assigned priority. Higher values are preferred among patterns
    /// with equal estimated cost.
    pub priority: i32,
}

impl Pattern {
    /// Amount of `id` produced per craft, or 0 if this pattern does not
    /// produce that exact identity. Duplicate outputs sum, saturating.
    pub fn output_amount(&self, id: &StackId) -> u64 {
        self.outputs
            .iter()
            .filter(|out| &out.id == id)
            .map(|out| out.amount)
            .fold(0, u64::saturating_add)
    }

    /// The output stack belonging to `group`, if any. Labeled outputs never
    /// match.
    pub fn output_in_group(&self, group: VariantGroupId) -> Option<&Stack> {
        self.outputs.iter().find(|out| out.id.group() == Some(group))
    }
}

// ---------------------------------------------------------------------------
// PatternLibrary
// ---------------------------------------------------------------------------

/// All patterns known to one planning engine, with output indexes.
///
/// Lookups key on the full stack identity: a labeled (renamed) identity is
/// distinct from its unlabeled form and finds nothing unless a pattern was
/// registered with that exact label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternLibrary {
    patterns: Vec<Pattern>,
    by_output: HashMap<StackId, Vec<PatternId>>,
    by_group: HashMap<VariantGroupId, Vec<PatternId>>,
}

impl PatternLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pattern. Returns its id. Registration order is preserved
    /// in the indexes, which makes candidate ordering deterministic.
    pub fn register(
        &mut self,
        inputs: Vec<PatternInput>,
        outputs: Vec<Stack>,
        priority: i32,
    ) -> Result<PatternId, LibraryError> {
        if outputs.is_empty() {
            return Err(LibraryError::NoOutputs);
        }
        if outputs.iter().any(|out| out.amount == 0) {
            return Err(LibraryError::ZeroAmountOutput);
        }
        if inputs.iter().any(|input| input.amount() == 0) {
            return Err(LibraryError::ZeroAmountInput);
        }

        let id = PatternId(self.patterns.len() as u32);
        for out in &outputs {
            self.by_output.entry(out.id.clone()).or_default().push(id);
            if let Some(group) = out.id.group() {
                self.by_group.entry(group).or_default().push(id);
            }
        }
        self.patterns.push(Pattern {
            id,
            inputs,
            outputs,
            priority,
        });
        Ok(id)
    }

    pub fn get(&self, id: PatternId) -> Option<&Pattern> {
        self.patterns.get(id.0 as usize)
    }

    /// Patterns producing this exact identity, in registration order.
    pub fn providing(&self, id: &StackId) -> &[PatternId] {
        self.by_output.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Patterns producing any member of the group, in registration order.
    pub fn providing_group(&self, group: VariantGroupId) -> &[PatternId] {
        self.by_group.get(&group).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    // -----------------------------------------------------------------------
    // Persistence
    // -----------------------------------------------------------------------

    /// Serialize the catalog to bytes (bitcode payload behind a header).
    pub fn to_bytes(&self) -> Result<Vec<u8>, LibraryError> {
        let catalog = Catalog {
            magic: CATALOG_MAGIC,
            version: CATALOG_VERSION,
            patterns: self.patterns.clone(),
        };
        bitcode::serialize(&catalog).map_err(|e| LibraryError::Encode(e.to_string()))
    }

    /// Rebuild a library from bytes produced by [`Self::to_bytes`].
    /// Indexes are reconstructed; they are not part of the payload.
    pub fn from_bytes(data: &[u8]) -> Result<Self, LibraryError> {
        let catalog: Catalog =
            bitcode::deserialize(data).map_err(|e| LibraryError::Decode(e.to_string()))?;
        if catalog.magic != CATALOG_MAGIC {
            return Err(LibraryError::InvalidMagic(catalog.magic));
        }
        if catalog.version != CATALOG_VERSION {
            return Err(LibraryError::UnsupportedVersion(catalog.version));
        }

        let mut library = PatternLibrary::new();
        for pattern in catalog.patterns {
            library.register(pattern.inputs, pattern.outputs, pattern.priority)?;
        }
        Ok(library)
    }
}

/// The serialized form of a library: header fields plus the flat pattern
/// list. Ids are re-assigned positionally on load.
#[derive(Debug, Serialize, Deserialize)]
struct Catalog {
    magic: u32,
    version: u32,
    patterns: Vec<Pattern>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("pattern has no outputs")]
    NoOutputs,
    #[error("pattern output with zero amount")]
    ZeroAmountOutput,
    #[error("pattern input with zero amount")]
    ZeroAmountInput,
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[error("invalid catalog magic: expected 0x{:08X}, got 0x{:08X}", CATALOG_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported catalog version: expected {}, got {}", CATALOG_VERSION, .0)]
    UnsupportedVersion(u32),
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ItemTypeId;
    use crate::stack::ItemKey;

    fn diamond() -> StackId {
        StackId::item(ItemTypeId(0))
    }

    fn stick() -> StackId {
        StackId::item(ItemTypeId(1))
    }

    fn planks_group() -> VariantGroupId {
        VariantGroupId(0)
    }

    fn oak_planks() -> StackId {
        StackId::Item(ItemKey::with_group(ItemTypeId(2), planks_group()))
    }

    fn stick_pattern(library: &mut PatternLibrary) -> PatternId {
        library
            .register(
                vec![PatternInput::Exact(Stack::new(diamond(), 1))],
                vec![Stack::new(stick(), 1)],
                0,
            )
            .unwrap()
    }

    #[test]
    fn register_and_lookup_by_output() {
        let mut library = PatternLibrary::new();
        let id = stick_pattern(&mut library);
        assert_eq!(library.providing(&stick()), &[id]);
        assert!(library.providing(&diamond()).is_empty());
    }

    #[test]
    fn lookup_by_group() {
        let mut library = PatternLibrary::new();
        let id = library
            .register(
                vec![PatternInput::Exact(Stack::of_item(ItemTypeId(9), 1))],
                vec![Stack::new(oak_planks(), 4)],
                0,
            )
            .unwrap();
        assert_eq!(library.providing_group(planks_group()), &[id]);
        assert!(library.providing_group(VariantGroupId(99)).is_empty());
    }

    #[test]
    fn labeled_identity_finds_nothing() {
        let mut library = PatternLibrary::new();
        stick_pattern(&mut library);
        let renamed = StackId::Item(ItemKey::new(ItemTypeId(1)).labeled("Pointy"));
        assert!(library.providing(&renamed).is_empty());
    }

    #[test]
    fn zero_amount_entries_are_rejected() {
        let mut library = PatternLibrary::new();
        assert!(matches!(
            library.register(vec![], vec![Stack::new(stick(), 0)], 0),
            Err(LibraryError::ZeroAmountOutput)
        ));
        assert!(matches!(
            library.register(
                vec![PatternInput::Exact(Stack::new(diamond(), 0))],
                vec![Stack::new(stick(), 1)],
                0,
            ),
            Err(LibraryError::ZeroAmountInput)
        ));
        assert!(matches!(
            library.register(vec![], vec![], 0),
            Err(LibraryError::NoOutputs)
        ));
    }

    #[test]
    fn output_amount_sums_duplicate_outputs() {
        let mut library = PatternLibrary::new();
        let id = library
            .register(
                vec![PatternInput::Exact(Stack::new(diamond(), 1))],
                vec![Stack::new(stick(), 2), Stack::new(stick(), 3)],
                0,
            )
            .unwrap();
        let pattern = library.get(id).unwrap();
        assert_eq!(pattern.output_amount(&stick()), 5);
        assert_eq!(pattern.output_amount(&diamond()), 0);
    }

    #[test]
    fn duplicate_outputs_saturate_at_the_cap() {
        let mut library = PatternLibrary::new();
        let id = library
            .register(
                vec![PatternInput::Exact(Stack::new(diamond(), 1))],
                vec![
                    Stack::new(stick(), 1u64 << 63),
                    Stack::new(stick(), 1u64 << 63),
                ],
                0,
            )
            .unwrap();
        assert_eq!(library.get(id).unwrap().output_amount(&stick()), u64::MAX);
    }

    #[test]
    fn catalog_round_trip() {
        let mut library = PatternLibrary::new();
        stick_pattern(&mut library);
        library
            .register(
                vec![PatternInput::Fuzzy {
                    group: planks_group(),
                    amount: 8,
                }],
                vec![Stack::of_item(ItemTypeId(5), 1)],
                3,
            )
            .unwrap();

        let bytes = library.to_bytes().unwrap();
        let restored = PatternLibrary::from_bytes(&bytes).unwrap();
        assert_eq!(restored.pattern_count(), 2);
        assert_eq!(restored.providing(&stick()).len(), 1);
        let second = restored.get(PatternId(1)).unwrap();
        assert_eq!(second.priority, 3);
        assert_eq!(second.inputs.len(), 1);
    }

    #[test]
    fn catalog_rejects_garbage() {
        assert!(PatternLibrary::from_bytes(&[0x00, 0x01, 0x02]).is_err());
    }
}
