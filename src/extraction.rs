//! Interest point extraction from the scored sampling pyramid.
//!
//! Extraction runs in two stages over the nodes at the detection depth,
//! always in sampling map order so results are reproducible:
//!
//! 1. *Candidate selection* keeps nodes whose entropy reaches the
//!    configured minimum and, when the cornerness filter is enabled,
//!    whose neighborhood is not edge- or plane-shaped.
//! 2. *Non-maximum suppression* by sequential relaxation: a candidate is
//!    demoted when an already confirmed maximum sits within the feature
//!    influence radius, or when a still-possible neighbor there has
//!    strictly greater entropy. Equal entropies do not demote, so of two
//!    tied neighbors the one visited first wins.

use nalgebra::{Matrix3, Vector3};

use crate::config::DetectorConfig;
use crate::core::Aabb;
use crate::octree::{MaximumStatus, NodeId, Octree};

/// Shape measure of a scored neighborhood: the eigenvalue ratio
/// `lambda_min / lambda_max` of the entropy-weighted covariance of the
/// neighbor representatives.
///
/// Isotropic (corner-like) arrangements score near 1, edges and planes
/// near 0. Degenerate neighborhoods with no positive entropy weight, or
/// whose ratio is not finite, score positive infinity so the filter
/// cannot reject what it cannot measure.
pub fn cornerness(octree: &Octree, neighbors: &[NodeId]) -> f32 {
    let mut weight_sum = 0.0_f32;
    let mut position_sum: Vector3<f32> = Vector3::zeros();
    let mut product_sum: Matrix3<f32> = Matrix3::zeros();
    for &id in neighbors {
        let node = octree.node(id);
        let weight = node.entropy;
        if !(weight > 0.0) {
            continue;
        }
        let position = node.representative();
        weight_sum += weight;
        position_sum += position * weight;
        product_sum += (position * position.transpose()) * weight;
    }
    if !(weight_sum > 0.0) {
        return f32::INFINITY;
    }
    let mean = position_sum / weight_sum;
    let covariance = product_sum / weight_sum - mean * mean.transpose();

    let eigen = covariance.symmetric_eigen();
    let mut smallest = eigen.eigenvalues[0];
    let mut largest = eigen.eigenvalues[0];
    for i in 1..3 {
        smallest = smallest.min(eigen.eigenvalues[i]);
        largest = largest.max(eigen.eigenvalues[i]);
    }
    let ratio = smallest / largest;
    if ratio.is_finite() { ratio } else { f32::INFINITY }
}

/// Two-stage maxima extractor with reusable scratch buffers.
#[derive(Default)]
pub struct MaximaExtractor {
    neighbors: Vec<NodeId>,
    candidates: Vec<NodeId>,
    found: Vec<NodeId>,
}

impl MaximaExtractor {
    /// Create an extractor with empty scratch buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage 1: mark each sampled node `Possible` or `NotPossible`.
    ///
    /// Border and background padding never becomes a candidate (background
    /// only while `ignore_background` is set). The cornerness filter runs
    /// only when a positive minimum is configured. Returns the number of
    /// candidates.
    pub fn select_candidates(&mut self, octree: &mut Octree, config: &DetectorConfig) -> usize {
        self.candidates.clear();
        let ids: Vec<NodeId> = octree.sampling().nodes(config.sampling_depth).to_vec();
        for id in ids {
            let node = octree.node(id);
            match node.status {
                MaximumStatus::Artificial => continue,
                MaximumStatus::Background if config.ignore_background => continue,
                _ => {}
            }
            if node.stats.count == 0 || node.entropy < config.minimum_entropy {
                octree.node_mut(id).status = MaximumStatus::NotPossible;
                continue;
            }

            let mut status = MaximumStatus::Possible;
            if config.minimum_cornerness > 0.0 {
                let region = Aabb::cube_around(node.representative(), config.histogram_radius);
                octree.query_region(&region, config.sampling_depth, &mut self.neighbors);
                if cornerness(octree, &self.neighbors) < config.minimum_cornerness {
                    status = MaximumStatus::NotPossible;
                }
            }

            octree.node_mut(id).status = status;
            if status == MaximumStatus::Possible {
                self.candidates.push(id);
            }
        }
        self.candidates.len()
    }

    /// Stage 2: resolve candidates to `Found` or `NotPossible` by
    /// sequential relaxation. Returns the number of maxima found.
    pub fn suppress(&mut self, octree: &mut Octree, config: &DetectorConfig) -> usize {
        self.found.clear();
        for i in 0..self.candidates.len() {
            let id = self.candidates[i];
            let node = octree.node(id);
            let entropy = node.entropy;
            let region = Aabb::cube_around(node.representative(), config.feature_influence_radius);
            octree.query_region(&region, config.sampling_depth, &mut self.neighbors);

            let mut suppressed = false;
            for &neighbor_id in &self.neighbors {
                if neighbor_id == id {
                    continue;
                }
                let neighbor = octree.node(neighbor_id);
                match neighbor.status {
                    MaximumStatus::Found => {
                        suppressed = true;
                    }
                    MaximumStatus::Possible if neighbor.entropy > entropy => {
                        suppressed = true;
                    }
                    _ => continue,
                }
                break;
            }

            let status = if suppressed {
                MaximumStatus::NotPossible
            } else {
                MaximumStatus::Found
            };
            octree.node_mut(id).status = status;
            if status == MaximumStatus::Found {
                self.found.push(id);
            }
        }
        self.found.len()
    }

    /// Candidates selected by the last stage-1 pass, in sampling order.
    #[inline]
    pub fn candidates(&self) -> &[NodeId] {
        &self.candidates
    }

    /// Maxima confirmed by the last stage-2 pass, in sampling order.
    #[inline]
    pub fn found(&self) -> &[NodeId] {
        &self.found
    }
}
