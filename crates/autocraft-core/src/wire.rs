//! Wire codec for resolved plan trees.
//!
//! A finished [`PlanTree`] crosses the client boundary as a little-endian
//! byte stream: a magic/version header, then one record per node in
//! depth-first order. Each record is a length-prefixed one-or-two character
//! type tag, the node's scalar fields, and a varint child count; children
//! follow their parent immediately, so the stream needs no offsets. Both
//! directions walk with an explicit stack; plan trees for deeply nested
//! patterns can outgrow the call stack.
//!
//! The tag set is closed. An unknown tag, a malformed stack byte, or any
//! truncation is a hard error and no partial tree is returned; the format
//! carries no forward-compatibility beyond the version word.

use crate::cost::{ByteCost, Fixed64};
use crate::id::{FluidTypeId, ItemTypeId, PatternId, PlanNodeId, VariantGroupId};
use crate::job::{PlanNode, PlanTree};
use crate::request::{CraftingRequest, StackTarget};
use crate::stack::{FluidKey, ItemKey, StackId};
use crate::task::{TaskPayload, TaskState};

pub const PLAN_MAGIC: u32 = 0xCAF7_0002;
pub const PLAN_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("bad plan magic 0x{found:08X}")]
    BadMagic { found: u32 },
    #[error("unsupported plan version {found}")]
    VersionMismatch { found: u32 },
    #[error("unknown node tag {tag:?}")]
    UnknownTag { tag: String },
    #[error("node tag length {len} out of range")]
    BadTagLength { len: u8 },
    #[error("input truncated")]
    Truncated,
    #[error("malformed varint")]
    MalformedVarint,
    #[error("malformed stack byte {byte}")]
    MalformedStackByte { byte: u8 },
    #[error("malformed target byte {byte}")]
    MalformedTargetByte { byte: u8 },
    #[error("bad state ordinal {byte}")]
    BadStateOrdinal { byte: u8 },
    #[error("label is not valid UTF-8")]
    MalformedLabel,
    #[error("root record must be a request")]
    RootMustBeRequest,
    #[error("tag {tag:?} does not carry children")]
    UnexpectedChildren { tag: String },
    #[error("{trailing} trailing bytes after plan")]
    TrailingBytes { trailing: usize },
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// The closed set of node tags. Decoding is a direct match on these; there
/// is no runtime registry to poison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeTag {
    Request,
    Extract,
    Conjure,
    Emit,
    Craft,
    IgnoreMissing,
}

impl NodeTag {
    fn as_str(self) -> &'static str {
        match self {
            NodeTag::Request => "rq",
            NodeTag::Extract => "ex",
            NodeTag::Conjure => "cj",
            NodeTag::Emit => "em",
            NodeTag::Craft => "cf",
            NodeTag::IgnoreMissing => "ig",
        }
    }

    fn from_bytes(tag: &[u8]) -> Option<NodeTag> {
        match tag {
            b"rq" => Some(NodeTag::Request),
            b"ex" => Some(NodeTag::Extract),
            b"cj" => Some(NodeTag::Conjure),
            b"em" => Some(NodeTag::Emit),
            b"cf" => Some(NodeTag::Craft),
            b"ig" => Some(NodeTag::IgnoreMissing),
            _ => None,
        }
    }

    /// The resolver a decoded task is attributed to.
    fn resolver(self) -> &'static str {
        match self {
            NodeTag::Request => "",
            NodeTag::Extract => "extract",
            NodeTag::Conjure => "conjure",
            NodeTag::Emit => "emit",
            NodeTag::Craft => "craft",
            NodeTag::IgnoreMissing => "ignore-missing",
        }
    }

    fn for_payload(payload: &TaskPayload) -> NodeTag {
        match payload {
            TaskPayload::Extract { .. } => NodeTag::Extract,
            TaskPayload::Conjure { .. } => NodeTag::Conjure,
            TaskPayload::Emit { .. } => NodeTag::Emit,
            TaskPayload::Craft { .. } => NodeTag::Craft,
            TaskPayload::IgnoreMissing { .. } => NodeTag::IgnoreMissing,
        }
    }
}

// ---------------------------------------------------------------------------
// Primitive writers
// ---------------------------------------------------------------------------

fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            break;
        }
        out.push(byte | 0x80);
    }
}

fn put_tag(out: &mut Vec<u8>, tag: NodeTag) {
    let s = tag.as_str();
    out.push(s.len() as u8);
    out.extend_from_slice(s.as_bytes());
}

fn put_state(out: &mut Vec<u8>, state: TaskState) {
    out.push(match state {
        TaskState::NotStarted => 0,
        TaskState::InProgress => 1,
        TaskState::Done => 2,
        TaskState::Failed => 3,
    });
}

fn put_stack_id(out: &mut Vec<u8>, id: &StackId) {
    match id {
        StackId::Item(key) => {
            out.push(1);
            put_u32(out, key.item.0);
            match key.group {
                Some(group) => {
                    out.push(1);
                    put_u32(out, group.0);
                }
                None => out.push(0),
            }
            match &key.label {
                Some(label) => {
                    out.push(1);
                    put_varint(out, label.len() as u64);
                    out.extend_from_slice(label.as_bytes());
                }
                None => out.push(0),
            }
        }
        StackId::Fluid(key) => {
            out.push(2);
            put_u32(out, key.fluid.0);
        }
    }
}

/// Targets reuse the stack lead byte, with 0 ("no concrete stack") marking
/// a fuzzy group demand.
fn put_target(out: &mut Vec<u8>, target: &StackTarget) {
    match target {
        StackTarget::Group(group) => {
            out.push(0);
            put_u32(out, group.0);
        }
        StackTarget::Exact(id) => put_stack_id(out, id),
    }
}

// ---------------------------------------------------------------------------
// Primitive reader
// ---------------------------------------------------------------------------

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::Truncated);
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, WireError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(buf))
    }

    fn u64(&mut self) -> Result<u64, WireError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn i64(&mut self) -> Result<i64, WireError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(i64::from_le_bytes(buf))
    }

    fn varint(&mut self) -> Result<u64, WireError> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.u8()?;
            if shift >= 64 {
                return Err(WireError::MalformedVarint);
            }
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                break;
            }
            shift += 7;
        }
        Ok(value)
    }
}

fn read_state(r: &mut Reader<'_>) -> Result<TaskState, WireError> {
    match r.u8()? {
        0 => Ok(TaskState::NotStarted),
        1 => Ok(TaskState::InProgress),
        2 => Ok(TaskState::Done),
        3 => Ok(TaskState::Failed),
        byte => Err(WireError::BadStateOrdinal { byte }),
    }
}

fn read_stack_id_with(kind: u8, r: &mut Reader<'_>) -> Result<StackId, WireError> {
    match kind {
        1 => {
            let item = ItemTypeId(r.u32()?);
            let group = match r.u8()? {
                0 => None,
                1 => Some(VariantGroupId(r.u32()?)),
                byte => return Err(WireError::MalformedStackByte { byte }),
            };
            let label = match r.u8()? {
                0 => None,
                1 => {
                    let len = r.varint()? as usize;
                    let bytes = r.take(len)?;
                    Some(
                        String::from_utf8(bytes.to_vec())
                            .map_err(|_| WireError::MalformedLabel)?,
                    )
                }
                byte => return Err(WireError::MalformedStackByte { byte }),
            };
            let mut key = match group {
                Some(group) => ItemKey::with_group(item, group),
                None => ItemKey::new(item),
            };
            if let Some(label) = label {
                key = key.labeled(label);
            }
            Ok(StackId::Item(key))
        }
        2 => Ok(StackId::Fluid(FluidKey::new(FluidTypeId(r.u32()?)))),
        byte => Err(WireError::MalformedStackByte { byte }),
    }
}

fn read_stack_id(r: &mut Reader<'_>) -> Result<StackId, WireError> {
    let kind = r.u8()?;
    read_stack_id_with(kind, r)
}

fn read_target(r: &mut Reader<'_>) -> Result<StackTarget, WireError> {
    match r.u8()? {
        0 => Ok(StackTarget::Group(VariantGroupId(r.u32()?))),
        kind @ (1 | 2) => Ok(StackTarget::Exact(read_stack_id_with(kind, r)?)),
        byte => Err(WireError::MalformedTargetByte { byte }),
    }
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Serialize a plan tree. Infallible: every reachable tree state has a
/// representation.
pub fn encode_tree(tree: &PlanTree) -> Vec<u8> {
    let mut out = Vec::new();
    put_u32(&mut out, PLAN_MAGIC);
    put_u32(&mut out, PLAN_VERSION);

    let mut stack = vec![tree.root()];
    while let Some(id) = stack.pop() {
        let Some(node) = tree.get(id) else {
            continue;
        };
        match node {
            PlanNode::Request(req) => {
                put_tag(&mut out, NodeTag::Request);
                put_target(&mut out, req.request.target());
                put_u64(&mut out, req.request.amount());
                put_u64(&mut out, req.request.remaining());
                out.push(u8::from(req.request.allow_simulation()));
                put_state(&mut out, req.state);
            }
            PlanNode::Task(task) => {
                put_tag(&mut out, NodeTag::for_payload(&task.payload));
                match &task.payload {
                    TaskPayload::Extract {
                        id,
                        planned,
                        delivered,
                        from_crafted,
                    } => {
                        put_stack_id(&mut out, id);
                        put_u64(&mut out, *planned);
                        put_u64(&mut out, *delivered);
                        put_u64(&mut out, *from_crafted);
                    }
                    TaskPayload::Conjure {
                        id,
                        amount,
                        delivered,
                    }
                    | TaskPayload::Emit {
                        id,
                        amount,
                        delivered,
                    } => {
                        put_stack_id(&mut out, id);
                        put_u64(&mut out, *amount);
                        put_u64(&mut out, *delivered);
                    }
                    TaskPayload::Craft {
                        pattern,
                        output,
                        per_craft,
                        crafts,
                        delivered,
                    } => {
                        put_u32(&mut out, pattern.0);
                        put_stack_id(&mut out, output);
                        put_u64(&mut out, *per_craft);
                        put_u64(&mut out, *crafts);
                        put_u64(&mut out, *delivered);
                    }
                    TaskPayload::IgnoreMissing { id, amount } => {
                        put_stack_id(&mut out, id);
                        put_u64(&mut out, *amount);
                    }
                }
                put_state(&mut out, task.state);
                put_i64(&mut out, task.cost.0.to_bits());
            }
        }
        put_varint(&mut out, node.children().len() as u64);
        for child in node.children().iter().rev() {
            stack.push(*child);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

enum DecodedNode {
    Request {
        request: CraftingRequest,
        state: TaskState,
    },
    Task {
        payload: TaskPayload,
        state: TaskState,
        cost: ByteCost,
        resolver: &'static str,
    },
}

struct Record {
    node: DecodedNode,
    children: u64,
}

fn read_record(r: &mut Reader<'_>) -> Result<Record, WireError> {
    let len = r.u8()?;
    if len == 0 || len > 2 {
        return Err(WireError::BadTagLength { len });
    }
    let raw = r.take(len as usize)?;
    let Some(tag) = NodeTag::from_bytes(raw) else {
        return Err(WireError::UnknownTag {
            tag: String::from_utf8_lossy(raw).into_owned(),
        });
    };

    let node = match tag {
        NodeTag::Request => {
            let target = read_target(r)?;
            let amount = r.u64()?;
            let remaining = r.u64()?;
            let allow_simulation = r.u8()? != 0;
            let state = read_state(r)?;
            DecodedNode::Request {
                request: CraftingRequest::restore(target, amount, remaining, allow_simulation),
                state,
            }
        }
        NodeTag::Extract => {
            let id = read_stack_id(r)?;
            let planned = r.u64()?;
            let delivered = r.u64()?;
            let from_crafted = r.u64()?;
            let state = read_state(r)?;
            let cost = ByteCost(Fixed64::from_bits(r.i64()?));
            DecodedNode::Task {
                payload: TaskPayload::Extract {
                    id,
                    planned,
                    delivered,
                    from_crafted,
                },
                state,
                cost,
                resolver: tag.resolver(),
            }
        }
        NodeTag::Conjure | NodeTag::Emit => {
            let id = read_stack_id(r)?;
            let amount = r.u64()?;
            let delivered = r.u64()?;
            let state = read_state(r)?;
            let cost = ByteCost(Fixed64::from_bits(r.i64()?));
            let payload = if tag == NodeTag::Conjure {
                TaskPayload::Conjure {
                    id,
                    amount,
                    delivered,
                }
            } else {
                TaskPayload::Emit {
                    id,
                    amount,
                    delivered,
                }
            };
            DecodedNode::Task {
                payload,
                state,
                cost,
                resolver: tag.resolver(),
            }
        }
        NodeTag::Craft => {
            let pattern = PatternId(r.u32()?);
            let output = read_stack_id(r)?;
            let per_craft = r.u64()?;
            let crafts = r.u64()?;
            let delivered = r.u64()?;
            let state = read_state(r)?;
            let cost = ByteCost(Fixed64::from_bits(r.i64()?));
            DecodedNode::Task {
                payload: TaskPayload::Craft {
                    pattern,
                    output,
                    per_craft,
                    crafts,
                    delivered,
                },
                state,
                cost,
                resolver: tag.resolver(),
            }
        }
        NodeTag::IgnoreMissing => {
            let id = read_stack_id(r)?;
            let amount = r.u64()?;
            let state = read_state(r)?;
            let cost = ByteCost(Fixed64::from_bits(r.i64()?));
            DecodedNode::Task {
                payload: TaskPayload::IgnoreMissing { id, amount },
                state,
                cost,
                resolver: tag.resolver(),
            }
        }
    };

    let children = r.varint()?;
    // Only requests and pattern tasks branch; a child count on any other
    // record means the stream is corrupt.
    if children > 0 && !matches!(tag, NodeTag::Request | NodeTag::Craft) {
        return Err(WireError::UnexpectedChildren {
            tag: tag.as_str().to_string(),
        });
    }
    Ok(Record { node, children })
}

/// Rebuild a plan tree from bytes. Any malformation is fatal; no partial
/// tree is ever returned.
pub fn decode_tree(bytes: &[u8]) -> Result<PlanTree, WireError> {
    let mut r = Reader::new(bytes);
    let magic = r.u32()?;
    if magic != PLAN_MAGIC {
        return Err(WireError::BadMagic { found: magic });
    }
    let version = r.u32()?;
    if version != PLAN_VERSION {
        return Err(WireError::VersionMismatch { found: version });
    }

    let first = read_record(&mut r)?;
    let DecodedNode::Request { request, state } = first.node else {
        return Err(WireError::RootMustBeRequest);
    };
    let mut tree = PlanTree::new(request);
    if let Some(root) = tree.request_mut(tree.root()) {
        root.state = state;
    }

    // (parent, children still to read) pairs; the stream is pre-order, so
    // the top of the stack is always the parent of the next record.
    let mut pending: Vec<(PlanNodeId, u64)> = Vec::new();
    if first.children > 0 {
        pending.push((tree.root(), first.children));
    }
    while !pending.is_empty() {
        let record = read_record(&mut r)?;
        let Some(&(parent, _)) = pending.last() else {
            break;
        };
        let id = match record.node {
            DecodedNode::Request { request, state } => {
                let id = tree.insert_request(parent, request);
                if let Some(node) = tree.request_mut(id) {
                    node.state = state;
                }
                id
            }
            DecodedNode::Task {
                payload,
                state,
                cost,
                resolver,
            } => tree.insert_task(parent, payload, cost, resolver, state),
        };
        if let Some(top) = pending.last_mut() {
            top.1 -= 1;
            if top.1 == 0 {
                pending.pop();
            }
        }
        if record.children > 0 {
            pending.push((id, record.children));
        }
    }

    if r.remaining() > 0 {
        return Err(WireError::TrailingBytes {
            trailing: r.remaining(),
        });
    }
    Ok(tree)
}

// ===========================================================================
// Tests
// ===========================================================================
