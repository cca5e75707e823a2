//! Per-depth sampling maps over the octree.
//!
//! The pipeline never walks raw points; it walks the sampling map of some
//! depth. For each depth the map lists a complete, non-overlapping
//! covering of the occupied volume: every node sitting exactly at that
//! depth, plus every shallower leaf (an unsplit subtree stands in as one
//! aggregate node). The listing order comes from a fixed octant-order
//! traversal, so iteration is deterministic across runs of the same
//! input. The map also records the average cell extent per depth, which
//! the normal stage uses to pick between node statistics and radius
//! queries.

use crate::octree::arena::{NodeArena, NodeId};

/// Ordered per-depth coverings of the occupied octree volume.
#[derive(Default)]
pub struct SamplingMap {
    levels: Vec<Vec<NodeId>>,
    avg_extent: Vec<f32>,
    total_sampled: usize,
}

impl SamplingMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all level listings, keeping their allocations.
    pub fn clear(&mut self) {
        for level in &mut self.levels {
            level.clear();
        }
        self.avg_extent.clear();
        self.total_sampled = 0;
    }

    /// Rebuild the coverings for every depth `0..=max_depth`.
    pub fn rebuild(&mut self, arena: &NodeArena, root: Option<NodeId>, max_depth: u32) {
        self.clear();
        let depths = max_depth as usize + 1;
        self.levels.resize_with(depths, Vec::new);
        self.avg_extent.resize(depths, 0.0);

        let Some(root) = root else {
            return;
        };
        for depth in 0..=max_depth {
            let level = &mut self.levels[depth as usize];
            collect_covering(arena, root, depth, level);

            let mut extent_sum = 0.0;
            for &id in level.iter() {
                extent_sum += arena[id].bounds.extent();
            }
            self.avg_extent[depth as usize] = if level.is_empty() {
                0.0
            } else {
                extent_sum / level.len() as f32
            };
            self.total_sampled += level.len();
        }
    }

    /// Covering of the occupied volume at a depth, in traversal order.
    ///
    /// Unknown depths yield an empty slice.
    #[inline]
    pub fn nodes(&self, depth: u32) -> &[NodeId] {
        self.levels.get(depth as usize).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Average cell extent of the covering at a depth (0 when unknown).
    #[inline]
    pub fn average_extent(&self, depth: u32) -> f32 {
        self.avg_extent.get(depth as usize).copied().unwrap_or(0.0)
    }

    /// Number of depths the map covers.
    #[inline]
    pub fn depth_count(&self) -> usize {
        self.levels.len()
    }

    /// Total number of sampled nodes across all depths.
    #[inline]
    pub fn total_sampled(&self) -> usize {
        self.total_sampled
    }
}

/// Collect the covering of `depth`: nodes at that depth plus shallower
/// leaves, in octant order.
fn collect_covering(arena: &NodeArena, id: NodeId, depth: u32, out: &mut Vec<NodeId>) {
    let node = &arena[id];
    if node.depth >= depth || node.is_leaf() {
        out.push(id);
        return;
    }
    for child in node.children() {
        collect_covering(arena, child, depth, out);
    }
}
