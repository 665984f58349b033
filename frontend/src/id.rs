// id.rs — Stable identifiers for specification tree nodes and raw documents
//
// Node identity is an index into the owning `Tree` arena. Raw identity is
// the address of a shared raw map/list and is only meaningful while the raw
// document that produced it is alive (i.e. for the duration of one build).

use std::fmt;

/// Index of a node inside its owning `Tree`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Physical identity of a raw sub-document (a shared map or list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawId(pub usize);

/// Allocator for node ids. Produces monotonically increasing ids in
/// allocation order so that tree construction is deterministic.
#[derive(Debug, Default, Clone)]
pub struct IdAllocator {
    next_node: u32,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc_node(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    pub fn allocated(&self) -> usize {
        self.next_node as usize
    }
}
