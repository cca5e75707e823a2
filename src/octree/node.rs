//! Octree nodes and their aggregated point statistics.
//!
//! Every node on an insertion path accumulates the point's statistics, so
//! a node at any depth aggregates all points beneath it. Statistics are
//! kept in summed form (position, pairwise products, color, count); means
//! and covariances are derived on demand. This is what lets coarse nodes
//! answer normal and saliency queries without touching raw points again.

use nalgebra::{Matrix3, Vector3};

use crate::core::{Color, CubeBounds};
use crate::octree::arena::{HistogramId, NodeId};

/// Classification of an inserted point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PointOrigin {
    /// A real sensor measurement.
    #[default]
    Measured,
    /// A synthetic support point added around cloud borders.
    Artificial,
    /// A measurement classified as background by the caller.
    Background,
}

/// Outcome of normal estimation for a node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NormalStatus {
    /// Normal estimation has not run for this node.
    #[default]
    Unknown,
    /// The node carries a usable oriented normal.
    Stable,
    /// Estimation was attempted and failed (too few points, degenerate
    /// or non-finite covariance).
    Unstable,
}

/// Per-node state of maxima extraction.
///
/// `Artificial` and `Background` classify nodes whose points were tagged
/// at insertion; the remaining variants are the extraction workflow:
/// `NotCalculated` before thresholding, then `NotPossible`, `Possible`,
/// and finally `Found` for surviving maxima.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MaximumStatus {
    /// No extraction decision yet.
    #[default]
    NotCalculated,
    /// Rejected by threshold, cornerness, or suppression.
    NotPossible,
    /// Passed the gates, awaiting suppression.
    Possible,
    /// Accepted as a feature.
    Found,
    /// Node holds only artificial border points.
    Artificial,
    /// Node holds only background-tagged points.
    Background,
}

impl MaximumStatus {
    /// Whether the node is classified rather than part of the workflow.
    #[inline]
    pub fn is_synthetic(self) -> bool {
        matches!(self, MaximumStatus::Artificial | MaximumStatus::Background)
    }
}

impl PointOrigin {
    /// Initial maximum status for a cell created by this point.
    #[inline]
    pub(crate) fn initial_status(self) -> MaximumStatus {
        match self {
            PointOrigin::Measured => MaximumStatus::NotCalculated,
            PointOrigin::Artificial => MaximumStatus::Artificial,
            PointOrigin::Background => MaximumStatus::Background,
        }
    }
}

/// Summed pairwise coordinate products of the aggregated points.
///
/// Stores the six unique entries of the symmetric 3×3 sum `Σ p·pᵀ`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SummedProducts {
    /// `Σ x·x`
    pub xx: f32,
    /// `Σ x·y`
    pub xy: f32,
    /// `Σ x·z`
    pub xz: f32,
    /// `Σ y·y`
    pub yy: f32,
    /// `Σ y·z`
    pub yz: f32,
    /// `Σ z·z`
    pub zz: f32,
}

impl SummedProducts {
    /// Accumulate one point.
    #[inline]
    pub fn add(&mut self, p: &Vector3<f32>) {
        self.xx += p.x * p.x;
        self.xy += p.x * p.y;
        self.xz += p.x * p.z;
        self.yy += p.y * p.y;
        self.yz += p.y * p.z;
        self.zz += p.z * p.z;
    }

    /// Component-wise sum with another accumulator.
    #[inline]
    pub fn merge(&mut self, other: &SummedProducts) {
        self.xx += other.xx;
        self.xy += other.xy;
        self.xz += other.xz;
        self.yy += other.yy;
        self.yz += other.yz;
        self.zz += other.zz;
    }

    /// Expand to the full symmetric matrix.
    #[inline]
    pub fn to_matrix(&self) -> Matrix3<f32> {
        Matrix3::new(
            self.xx, self.xy, self.xz, //
            self.xy, self.yy, self.yz, //
            self.xz, self.yz, self.zz,
        )
    }
}

/// Aggregated statistics of all points below a node.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct NodeStats {
    /// Sum of point positions.
    pub summed_position: Vector3<f32>,
    /// Sum of pairwise coordinate products.
    pub summed_products: SummedProducts,
    /// Sum of point colors (zero for colorless input).
    pub summed_color: Vector3<f32>,
    /// Number of aggregated points.
    pub count: u32,
    /// Input index of the first measured point in this cell.
    pub first_index: Option<u32>,
}

impl NodeStats {
    /// Accumulate one point. `index` is `None` for synthetic points.
    pub fn add_point(&mut self, position: &Vector3<f32>, color: Option<Color>, index: Option<u32>) {
        self.summed_position += position;
        self.summed_products.add(position);
        if let Some(c) = color {
            self.summed_color += c.to_vector();
        }
        self.count += 1;
        if self.first_index.is_none() {
            self.first_index = index;
        }
    }

    /// Merge another cell's statistics into this accumulator.
    pub fn merge(&mut self, other: &NodeStats) {
        self.summed_position += other.summed_position;
        self.summed_products.merge(&other.summed_products);
        self.summed_color += other.summed_color;
        self.count += other.count;
        if self.first_index.is_none() {
            self.first_index = other.first_index;
        }
    }

    /// Mean position, or `None` when no points were aggregated.
    #[inline]
    pub fn centroid(&self) -> Option<Vector3<f32>> {
        if self.count == 0 {
            None
        } else {
            Some(self.summed_position / self.count as f32)
        }
    }

    /// Mean color of the aggregated points (zero when empty or colorless).
    #[inline]
    pub fn mean_color(&self) -> Color {
        match self.count {
            0 => Color::default(),
            n => Color::from_vector(self.summed_color / n as f32),
        }
    }

    /// Sample covariance `Σ p·pᵀ / n − μ·μᵀ`, or `None` when empty.
    pub fn covariance(&self) -> Option<Matrix3<f32>> {
        let mean = self.centroid()?;
        let n = self.count as f32;
        Some(self.summed_products.to_matrix() / n - mean * mean.transpose())
    }
}

/// One octree cell.
#[derive(Clone, Debug)]
pub struct OctreeNode {
    /// Cell bounds.
    pub bounds: CubeBounds,
    /// Depth below the root (root is 0).
    pub depth: u32,
    /// Aggregated statistics of all points beneath this cell.
    pub stats: NodeStats,
    /// Estimated surface normal (zero until estimation runs).
    pub normal: Vector3<f32>,
    /// State of normal estimation.
    pub normal_status: NormalStatus,
    /// Saliency entropy (0 until the saliency pass runs).
    pub entropy: f32,
    /// Maxima-extraction state / point classification.
    pub status: MaximumStatus,
    /// Handle of this node's normal histogram, once allocated.
    pub histogram: Option<HistogramId>,
    /// Parent cell, `None` for the root.
    pub parent: Option<NodeId>,
    pub(crate) children: [Option<NodeId>; 8],
}

impl OctreeNode {
    /// Create an empty cell.
    pub fn new(bounds: CubeBounds, depth: u32, parent: Option<NodeId>) -> Self {
        Self {
            bounds,
            depth,
            stats: NodeStats::default(),
            normal: Vector3::zeros(),
            normal_status: NormalStatus::Unknown,
            entropy: 0.0,
            status: MaximumStatus::NotCalculated,
            histogram: None,
            parent,
            children: [None; 8],
        }
    }

    /// Whether the cell has no children.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }

    /// Child id for an octant, if that octant was ever populated.
    #[inline]
    pub fn child(&self, octant: usize) -> Option<NodeId> {
        self.children[octant]
    }

    /// Iterate over the populated children in octant order.
    #[inline]
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.iter().flatten().copied()
    }

    /// Representative position: the centroid when the cell has points,
    /// the cell center otherwise.
    #[inline]
    pub fn representative(&self) -> Vector3<f32> {
        self.stats.centroid().unwrap_or(self.bounds.center)
    }

    /// Fold an inserted point's classification into the cell status.
    ///
    /// A measured point always makes the cell a measured cell; synthetic
    /// classifications only apply while the cell is fresh or already
    /// synthetic-only.
    pub(crate) fn merge_origin(&mut self, origin: PointOrigin, was_empty: bool) {
        if origin == PointOrigin::Measured {
            if self.status.is_synthetic() || was_empty {
                self.status = MaximumStatus::NotCalculated;
            }
        } else if was_empty {
            self.status = origin.initial_status();
        }
        // A synthetic point never demotes a cell that saw measured data.
    }
}
