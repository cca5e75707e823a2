//! The aggregating octree.
//!
//! # Algorithm
//!
//! The root cube is centered on the origin. A point descends from the
//! root toward its octant, creating cells on demand, and deposits its
//! statistics into every cell it passes through. Descent stops once the
//! cell edge reaches the point's target extent, which the caller derives
//! from the sensor accuracy model, or the hard depth limit. Because every
//! cell aggregates its whole subtree, queries can stop at any depth and
//! still see all points.
//!
//! # Performance
//!
//! Insertion is O(depth) with no per-point heap allocation once the path
//! exists. Region queries prune by cell bounds; an unsplit subtree is
//! answered by its aggregate without visiting children.

use log::debug;
use nalgebra::Vector3;

use crate::config::DetectorConfig;
use crate::core::{Aabb, Color, CubeBounds};
use crate::octree::arena::{HistogramId, HistogramPool, NodeArena, NodeId};
use crate::octree::node::{NodeStats, OctreeNode, PointOrigin};
use crate::octree::sampling::SamplingMap;
use crate::saliency::DirectionHistogram;

/// Arena-backed octree with per-cell aggregate statistics.
pub struct Octree {
    arena: NodeArena,
    histograms: HistogramPool,
    sampling: SamplingMap,
    root: Option<NodeId>,
    root_bounds: CubeBounds,
    max_depth_limit: u32,
    occupied_depth: u32,
}

impl Octree {
    /// Create an empty octree sized by the configuration.
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            arena: NodeArena::new(config.node_capacity),
            histograms: HistogramPool::new(config.node_capacity, config.histogram_bins),
            sampling: SamplingMap::new(),
            root: None,
            root_bounds: CubeBounds::new(Vector3::zeros(), config.root_extent * 0.5),
            max_depth_limit: config.max_depth(),
            occupied_depth: 0,
        }
    }

    /// Drop all nodes, histograms, and sampling maps, keeping the backing
    /// allocations warm for the next cloud.
    pub fn reset(&mut self) {
        self.arena.reset();
        self.histograms.reset();
        self.sampling.clear();
        self.root = None;
        self.occupied_depth = 0;
    }

    /// Reallocate the arenas for a new node capacity and histogram
    /// layout. Implies a reset.
    pub fn resize(&mut self, node_capacity: usize, histogram_rows: usize) {
        self.arena.resize(node_capacity);
        self.histograms.resize(node_capacity, histogram_rows);
        self.sampling.clear();
        self.root = None;
        self.occupied_depth = 0;
        debug!("octree arenas resized to {node_capacity} nodes");
    }

    /// Insert a point, depositing its statistics into every cell along
    /// the descent path.
    ///
    /// `target_extent` is the cell edge at which descent stops. Returns
    /// the terminal cell, or `None` when the position is non-finite or
    /// outside the root cube.
    pub fn insert(
        &mut self,
        position: &Vector3<f32>,
        color: Option<Color>,
        origin: PointOrigin,
        input_index: Option<u32>,
        target_extent: f32,
    ) -> Option<NodeId> {
        if !position.iter().all(|c| c.is_finite()) || !self.root_bounds.contains(position) {
            return None;
        }

        let mut id = self.ensure_root();
        loop {
            let was_empty = self.arena[id].stats.count == 0;
            self.arena[id].stats.add_point(position, color, input_index);
            self.arena[id].merge_origin(origin, was_empty);

            let (bounds, depth) = {
                let node = &self.arena[id];
                (node.bounds, node.depth)
            };
            if bounds.extent() <= target_extent || depth >= self.max_depth_limit {
                self.occupied_depth = self.occupied_depth.max(depth);
                return Some(id);
            }

            let octant = bounds.octant_of(position);
            id = match self.arena[id].child(octant) {
                Some(child) => child,
                None => {
                    let child = self
                        .arena
                        .alloc(OctreeNode::new(bounds.child(octant), depth + 1, Some(id)));
                    self.arena[id].children[octant] = Some(child);
                    child
                }
            };
        }
    }

    /// Rebuild the per-depth sampling maps after insertion finished.
    pub fn rebuild_sampling(&mut self) {
        self.sampling.rebuild(&self.arena, self.root, self.occupied_depth);
    }

    /// Sampled nodes whose cells overlap an axis-aligned region, at the
    /// given depth. A shallower unsplit subtree is reported as one
    /// aggregate node. Results are written into `out` in traversal order.
    pub fn query_region(&self, region: &Aabb, depth: u32, out: &mut Vec<NodeId>) {
        out.clear();
        if let Some(root) = self.root {
            collect_region(&self.arena, root, region, depth, out);
        }
    }

    /// Merged statistics of all points inside a region.
    ///
    /// Descends until a cell is fully contained (merged wholesale) or the
    /// resolution floor `min_extent` is reached; a partially overlapping
    /// cell at the floor contributes iff its centroid lies inside.
    pub fn query_aggregate(&self, region: &Aabb, min_extent: f32) -> NodeStats {
        let mut stats = NodeStats::default();
        if let Some(root) = self.root {
            aggregate_region(&self.arena, root, region, min_extent, &mut stats);
        }
        stats
    }

    /// The sampled node at `depth` containing the position, or failing
    /// that, the sampled node with the closest representative position.
    ///
    /// Requires [`rebuild_sampling`](Self::rebuild_sampling) to have run.
    pub fn nearest_node(&self, position: &Vector3<f32>, depth: u32) -> Option<NodeId> {
        let covering = self.sampling.nodes(depth);
        for &id in covering {
            if self.arena[id].bounds.contains(position) {
                return Some(id);
            }
        }
        covering
            .iter()
            .copied()
            .min_by(|&a, &b| {
                let da = (self.arena[a].representative() - position).norm_squared();
                let db = (self.arena[b].representative() - position).norm_squared();
                da.total_cmp(&db)
            })
    }

    /// Borrow a node.
    #[inline]
    pub fn node(&self, id: NodeId) -> &OctreeNode {
        &self.arena[id]
    }

    /// Mutably borrow a node.
    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut OctreeNode {
        &mut self.arena[id]
    }

    /// Borrow a histogram.
    #[inline]
    pub fn histogram(&self, id: HistogramId) -> &DirectionHistogram {
        &self.histograms[id]
    }

    /// Mutably borrow a histogram.
    #[inline]
    pub fn histogram_mut(&mut self, id: HistogramId) -> &mut DirectionHistogram {
        &mut self.histograms[id]
    }

    /// Hand the node a cleared histogram, reusing its previous slot when
    /// it already had one.
    pub fn attach_histogram(&mut self, node: NodeId) -> HistogramId {
        match self.arena[node].histogram {
            Some(id) => {
                self.histograms[id].reset();
                id
            }
            None => {
                let id = self.histograms.alloc();
                self.arena[node].histogram = Some(id);
                id
            }
        }
    }

    /// The sampling maps.
    #[inline]
    pub fn sampling(&self) -> &SamplingMap {
        &self.sampling
    }

    /// Root node id, if any point was inserted.
    #[inline]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Number of allocated cells.
    #[inline]
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    /// Whether no points were inserted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Total number of inserted points.
    #[inline]
    pub fn point_count(&self) -> u32 {
        self.root.map(|r| self.arena[r].stats.count).unwrap_or(0)
    }

    /// Deepest occupied level.
    #[inline]
    pub fn occupied_depth(&self) -> u32 {
        self.occupied_depth
    }

    /// Number of histograms handed out since the last reset.
    #[inline]
    pub fn histogram_count(&self) -> usize {
        self.histograms.len()
    }

    fn ensure_root(&mut self) -> NodeId {
        match self.root {
            Some(root) => root,
            None => {
                let root = self.arena.alloc(OctreeNode::new(self.root_bounds, 0, None));
                self.root = Some(root);
                root
            }
        }
    }
}

fn collect_region(arena: &NodeArena, id: NodeId, region: &Aabb, depth: u32, out: &mut Vec<NodeId>) {
    let node = &arena[id];
    if !region.intersects_cube(&node.bounds) {
        return;
    }
    if node.depth >= depth || node.is_leaf() {
        out.push(id);
        return;
    }
    for child in node.children() {
        collect_region(arena, child, region, depth, out);
    }
}

fn aggregate_region(
    arena: &NodeArena,
    id: NodeId,
    region: &Aabb,
    min_extent: f32,
    out: &mut NodeStats,
) {
    let node = &arena[id];
    if !region.intersects_cube(&node.bounds) {
        return;
    }
    if region.contains_cube(&node.bounds) {
        out.merge(&node.stats);
        return;
    }
    if node.is_leaf() || node.bounds.extent() <= min_extent {
        if let Some(centroid) = node.stats.centroid()
            && region.contains(&centroid)
        {
            out.merge(&node.stats);
        }
        return;
    }
    for child in node.children() {
        aggregate_region(arena, child, region, min_extent, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn test_config() -> DetectorConfig {
        DetectorConfig::default()
            .with_root_extent(6.4)
            .with_min_cell_extent(0.05)
            .with_sampling_rate(0.2)
            .with_normal_sampling_rate(0.1)
            .with_node_capacity(1 << 16)
    }

    fn insert_measured(octree: &mut Octree, position: Vector3<f32>, index: u32) -> Option<NodeId> {
        octree.insert(&position, None, PointOrigin::Measured, Some(index), 0.05)
    }

    fn random_cloud(n: usize, seed: u64) -> Vec<Vector3<f32>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                Vector3::new(
                    rng.random_range(-2.5..2.5),
                    rng.random_range(-2.5..2.5),
                    rng.random_range(-2.5..2.5),
                )
            })
            .collect()
    }

    #[test]
    fn path_accumulates_statistics() {
        let config = test_config();
        let mut octree = Octree::new(&config);
        let p = Vector3::new(1.0, -0.5, 2.0);
        let terminal = insert_measured(&mut octree, p, 3).unwrap();

        // Terminal cell contains the point and hit the target extent.
        let node = octree.node(terminal);
        assert!(node.bounds.contains(&p));
        assert!(node.bounds.extent() <= 0.05 + 1e-6);
        assert_eq!(node.stats.count, 1);
        assert_eq!(node.stats.first_index, Some(3));

        // Every ancestor up to the root saw the point too.
        let mut id = terminal;
        let mut hops = 0;
        while let Some(parent) = octree.node(id).parent {
            id = parent;
            hops += 1;
            assert_eq!(octree.node(id).stats.count, 1);
        }
        assert_eq!(Some(id), octree.root());
        assert_eq!(hops, octree.occupied_depth());
    }

    #[test]
    fn rejects_non_finite_and_out_of_root() {
        let config = test_config();
        let mut octree = Octree::new(&config);
        assert!(octree
            .insert(
                &Vector3::new(f32::NAN, 0.0, 0.0),
                None,
                PointOrigin::Measured,
                None,
                0.05
            )
            .is_none());
        assert!(insert_measured(&mut octree, Vector3::new(10.0, 0.0, 0.0), 0).is_none());
        assert!(octree.is_empty());
    }

    #[test]
    fn coverings_partition_the_points() {
        let config = test_config();
        let mut octree = Octree::new(&config);
        let cloud = random_cloud(500, 7);
        for (i, p) in cloud.iter().enumerate() {
            insert_measured(&mut octree, *p, i as u32).unwrap();
        }
        octree.rebuild_sampling();

        assert_eq!(octree.point_count(), 500);
        // Each depth's covering is disjoint and complete: counts sum to
        // the number of inserted points.
        for depth in 0..=octree.occupied_depth() {
            let total: u32 = octree
                .sampling()
                .nodes(depth)
                .iter()
                .map(|&id| octree.node(id).stats.count)
                .sum();
            assert_eq!(total, 500, "covering at depth {depth} lost points");
        }
    }

    #[test]
    fn full_root_aggregate_matches_direct_sums() {
        let config = test_config();
        let mut octree = Octree::new(&config);
        let cloud = random_cloud(200, 11);
        let mut direct = NodeStats::default();
        for (i, p) in cloud.iter().enumerate() {
            insert_measured(&mut octree, *p, i as u32).unwrap();
            direct.add_point(p, None, Some(i as u32));
        }

        let region = Aabb::cube_around(Vector3::zeros(), 3.2);
        let aggregate = octree.query_aggregate(&region, 0.0);
        assert_eq!(aggregate.count, direct.count);
        assert_relative_eq!(
            (aggregate.summed_position - direct.summed_position).norm(),
            0.0,
            epsilon = 1e-3
        );
        let diff = aggregate.summed_products.to_matrix() - direct.summed_products.to_matrix();
        assert_relative_eq!(diff.norm(), 0.0, epsilon = 1e-2);
    }

    #[test]
    fn sub_region_aggregate_counts_expected_points() {
        let config = test_config();
        let mut octree = Octree::new(&config);
        // Two clusters well apart.
        for i in 0..10 {
            let offset = i as f32 * 0.004;
            insert_measured(&mut octree, Vector3::new(1.0 + offset, 1.0, 1.0), i).unwrap();
            insert_measured(&mut octree, Vector3::new(-2.0, -2.0 + offset, -2.0), 10 + i).unwrap();
        }

        let around_first = Aabb::cube_around(Vector3::new(1.0, 1.0, 1.0), 0.3);
        let stats = octree.query_aggregate(&around_first, 0.0);
        assert_eq!(stats.count, 10);
        let centroid = stats.centroid().unwrap();
        assert_relative_eq!(centroid.y, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn region_query_reports_aggregate_leaves() {
        let config = test_config();
        let mut octree = Octree::new(&config);
        // A single point leaves a chain of cells; querying a deeper depth
        // than the chain reaches must still report the terminal leaf.
        let p = Vector3::new(0.5, 0.5, 0.5);
        let terminal = octree
            .insert(&p, None, PointOrigin::Measured, Some(0), 0.4)
            .unwrap();
        octree.rebuild_sampling();

        let deep = octree.occupied_depth() + 3;
        let mut out = Vec::new();
        octree.query_region(&Aabb::cube_around(p, 0.05), deep, &mut out);
        assert_eq!(out, vec![terminal]);
    }

    #[test]
    fn nearest_node_prefers_containing_cell() {
        let config = test_config();
        let mut octree = Octree::new(&config);
        let a = Vector3::new(1.0, 1.0, 1.0);
        let b = Vector3::new(-1.0, -1.0, -1.0);
        insert_measured(&mut octree, a, 0).unwrap();
        insert_measured(&mut octree, b, 1).unwrap();
        octree.rebuild_sampling();

        let depth = octree.occupied_depth();
        let hit = octree.nearest_node(&a, depth).unwrap();
        assert!(octree.node(hit).bounds.contains(&a));

        // A position in empty space resolves to the closest occupied cell.
        let probe = Vector3::new(1.3, 1.3, 1.3);
        let near = octree.nearest_node(&probe, depth).unwrap();
        let d_a = (octree.node(near).representative() - a).norm();
        let d_b = (octree.node(near).representative() - b).norm();
        assert!(d_a < d_b);
    }

    #[test]
    fn coarser_target_extent_stops_shallow() {
        let config = test_config();
        let mut octree = Octree::new(&config);
        let p = Vector3::new(0.7, 0.7, 0.7);
        let fine = octree
            .insert(&p, None, PointOrigin::Measured, Some(0), 0.05)
            .unwrap();
        let fine_depth = octree.node(fine).depth;

        let mut coarse_tree = Octree::new(&config);
        let coarse = coarse_tree
            .insert(&p, None, PointOrigin::Measured, Some(0), 0.8)
            .unwrap();
        let coarse_depth = coarse_tree.node(coarse).depth;

        assert!(coarse_depth < fine_depth);
        assert!(coarse_tree.node(coarse).bounds.extent() <= 0.8 + 1e-6);
    }

    #[test]
    fn reset_clears_state_and_reuses_arena() {
        let config = test_config();
        let mut octree = Octree::new(&config);
        for (i, p) in random_cloud(64, 3).iter().enumerate() {
            let _ = insert_measured(&mut octree, *p, i as u32);
        }
        octree.rebuild_sampling();
        assert!(octree.node_count() > 0);

        octree.reset();
        assert!(octree.is_empty());
        assert_eq!(octree.point_count(), 0);
        assert_eq!(octree.occupied_depth(), 0);
        assert!(octree.sampling().nodes(0).is_empty());

        // Fully reusable after reset.
        insert_measured(&mut octree, Vector3::new(0.1, 0.1, 0.1), 0).unwrap();
        assert_eq!(octree.point_count(), 1);
    }

    #[test]
    fn histogram_attachment_reuses_slots() {
        let config = test_config();
        let mut octree = Octree::new(&config);
        let id = insert_measured(&mut octree, Vector3::new(0.2, 0.2, 0.2), 0).unwrap();

        let h = octree.attach_histogram(id);
        octree
            .histogram_mut(h)
            .insert(&Vector3::new(0.0, 0.0, 1.0), 2.0);
        assert!(octree.histogram(h).total_weight() > 0.0);

        // Re-attaching clears the same slot.
        let h2 = octree.attach_histogram(id);
        assert_eq!(h, h2);
        assert_eq!(octree.histogram(h2).total_weight(), 0.0);
    }
}
