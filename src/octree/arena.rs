//! Slot arenas backing the octree.
//!
//! Nodes and normal histograms are allocated from flat growable arrays
//! and addressed by integer handles instead of pointers. Resetting is
//! O(1) in the logical sense: lengths drop to zero while the backing
//! allocations (and, for histograms, the bin vectors) stay warm for the
//! next cloud. Both arenas carry a hard capacity; running past it is a
//! configuration error, not a runtime condition, and panics.

use std::ops::{Index, IndexMut};

use crate::octree::node::OctreeNode;
use crate::saliency::DirectionHistogram;

/// Handle of a node slot in the [`NodeArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    #[inline]
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Slot index in the arena.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle of a histogram slot in the [`HistogramPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HistogramId(u32);

impl HistogramId {
    /// Slot index in the pool.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Growable, capacity-capped arena of octree nodes.
pub struct NodeArena {
    nodes: Vec<OctreeNode>,
    capacity: usize,
}

impl NodeArena {
    /// Create an arena allowed to hold up to `capacity` nodes.
    pub fn new(capacity: usize) -> Self {
        Self { nodes: Vec::new(), capacity }
    }

    /// Allocate a slot for a node.
    ///
    /// # Panics
    /// Panics when the arena is at capacity. Capacity is sized from
    /// [`DetectorConfig::node_capacity`](crate::DetectorConfig); hitting
    /// it means the configuration does not fit the input.
    pub fn alloc(&mut self, node: OctreeNode) -> NodeId {
        assert!(
            self.nodes.len() < self.capacity,
            "octree node arena exhausted at {} nodes",
            self.capacity
        );
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(node);
        id
    }

    /// Number of live nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena holds no nodes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Maximum number of nodes the arena may hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Drop all nodes, keeping the backing allocation.
    pub fn reset(&mut self) {
        self.nodes.clear();
    }

    /// Change the capacity and drop all nodes.
    pub fn resize(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.nodes.clear();
        self.nodes.shrink_to(capacity);
    }
}

impl Index<NodeId> for NodeArena {
    type Output = OctreeNode;

    #[inline]
    fn index(&self, id: NodeId) -> &OctreeNode {
        &self.nodes[id.index()]
    }
}

impl IndexMut<NodeId> for NodeArena {
    #[inline]
    fn index_mut(&mut self, id: NodeId) -> &mut OctreeNode {
        &mut self.nodes[id.index()]
    }
}

/// Reusable pool of direction histograms.
///
/// Slots are handed out in order; a logical reset rewinds the cursor so
/// the same slots (and their bin vectors) serve the next cloud. Each
/// node carries at most one histogram, so a pool capped at the node
/// capacity can never run dry first; slots are allocated lazily, so an
/// untouched capacity costs nothing.
pub struct HistogramPool {
    slots: Vec<DirectionHistogram>,
    in_use: usize,
    capacity: usize,
    rows: usize,
}

impl HistogramPool {
    /// Create a pool of histograms with `rows` elevation rows each,
    /// allowed to grow to `capacity` slots.
    pub fn new(capacity: usize, rows: usize) -> Self {
        Self { slots: Vec::new(), in_use: 0, capacity, rows }
    }

    /// Hand out a cleared histogram slot.
    ///
    /// # Panics
    /// Panics when the pool is at capacity.
    pub fn alloc(&mut self) -> HistogramId {
        assert!(
            self.in_use < self.capacity,
            "histogram pool exhausted at {} slots",
            self.capacity
        );
        if self.in_use < self.slots.len() {
            self.slots[self.in_use].reset();
        } else {
            self.slots.push(DirectionHistogram::new(self.rows));
        }
        let id = HistogramId(self.in_use as u32);
        self.in_use += 1;
        id
    }

    /// Number of slots handed out since the last reset.
    #[inline]
    pub fn len(&self) -> usize {
        self.in_use
    }

    /// Whether no slots are handed out.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.in_use == 0
    }

    /// Rewind the slot cursor, keeping the allocated histograms.
    pub fn reset(&mut self) {
        self.in_use = 0;
    }

    /// Change capacity or bin layout and drop all slots.
    pub fn resize(&mut self, capacity: usize, rows: usize) {
        self.capacity = capacity;
        self.rows = rows;
        self.slots.clear();
        self.in_use = 0;
    }
}

impl Index<HistogramId> for HistogramPool {
    type Output = DirectionHistogram;

    #[inline]
    fn index(&self, id: HistogramId) -> &DirectionHistogram {
        debug_assert!(id.index() < self.in_use, "stale histogram handle");
        &self.slots[id.index()]
    }
}

impl IndexMut<HistogramId> for HistogramPool {
    #[inline]
    fn index_mut(&mut self, id: HistogramId) -> &mut DirectionHistogram {
        debug_assert!(id.index() < self.in_use, "stale histogram handle");
        &mut self.slots[id.index()]
    }
}
