//! Entropy saliency over sampled octree nodes.
//!
//! Every sampled node at the detection depth is scored with the Shannon
//! entropy of surface normal directions gathered from its neighborhood.
//! Flat regions have aligned normals and score near zero; corners and
//! cluttered geometry spread the directions over the sphere and score
//! high. The three scoring modes share the neighbor gathering step and
//! differ in what they histogram: raw normal directions, cross products
//! against a reference normal, or cross products of all normal pairs.

use nalgebra::Vector3;

use crate::config::{DetectorConfig, EntropyMode};
use crate::core::Aabb;
use crate::normals::estimate_normal;
use crate::octree::{NodeId, NormalStatus, Octree};
use crate::saliency::DirectionHistogram;

/// Computes per-node saliency from neighborhood normal directions.
///
/// Keeps reusable scratch buffers so repeated frames do not reallocate.
pub struct SaliencyField {
    scratch: DirectionHistogram,
    neighbors: Vec<NodeId>,
    stable_normals: Vec<Vector3<f32>>,
}

impl SaliencyField {
    /// Create a field with scratch buffers sized for `config`.
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            scratch: DirectionHistogram::new(config.histogram_bins),
            neighbors: Vec::new(),
            stable_normals: Vec::new(),
        }
    }

    /// Score every sampled node at the detection depth.
    ///
    /// `viewpoint` orients the reference normal of the cross-product
    /// mode; the other two modes ignore it. Synthetic nodes keep their
    /// default zero entropy and are not counted. Returns the number of
    /// nodes scored.
    pub fn compute(
        &mut self,
        octree: &mut Octree,
        viewpoint: &Vector3<f32>,
        config: &DetectorConfig,
    ) -> usize {
        let ids: Vec<NodeId> = octree.sampling().nodes(config.sampling_depth).to_vec();
        let mut scored = 0;
        for id in ids {
            let node = octree.node(id);
            if node.stats.count == 0 || node.status.is_synthetic() {
                continue;
            }
            let representative = node.representative();
            let region = Aabb::cube_around(representative, config.histogram_radius);
            octree.query_region(&region, config.normal_sampling_depth, &mut self.neighbors);

            let entropy = match config.entropy_mode {
                EntropyMode::MergedHistograms => {
                    self.scratch.reset();
                    for &neighbor in &self.neighbors {
                        let neighbor = octree.node(neighbor);
                        if neighbor.normal_status != NormalStatus::Stable {
                            continue;
                        }
                        if let Some(histogram) = neighbor.histogram {
                            self.scratch.merge(octree.histogram(histogram));
                        }
                    }
                    self.scratch.entropy()
                }
                EntropyMode::CrossProductsToReference => {
                    self.collect_stable_normals(octree);
                    match reference_normal(octree, &region, &representative, viewpoint) {
                        Some(reference) => {
                            self.scratch.reset();
                            for normal in &self.stable_normals {
                                self.scratch.insert_cross_product(
                                    &reference,
                                    normal,
                                    config.cross_product_weight,
                                );
                            }
                            self.scratch.entropy()
                        }
                        None => 0.0,
                    }
                }
                EntropyMode::PairwiseCrossProducts => {
                    self.collect_stable_normals(octree);
                    self.scratch.reset();
                    for i in 0..self.stable_normals.len() {
                        for j in (i + 1)..self.stable_normals.len() {
                            self.scratch.insert_cross_product(
                                &self.stable_normals[i],
                                &self.stable_normals[j],
                                config.cross_product_weight,
                            );
                        }
                    }
                    self.scratch.entropy()
                }
            };

            octree.node_mut(id).entropy = entropy;
            scored += 1;
        }
        scored
    }

    fn collect_stable_normals(&mut self, octree: &Octree) {
        self.stable_normals.clear();
        for &id in &self.neighbors {
            let node = octree.node(id);
            if node.normal_status == NormalStatus::Stable {
                self.stable_normals.push(node.normal);
            }
        }
    }
}

/// Reference for cross-product scoring: a fresh covariance normal from
/// the merged statistics of the whole neighborhood, oriented toward the
/// viewpoint. An unstable estimate leaves the node unscored.
fn reference_normal(
    octree: &Octree,
    region: &Aabb,
    position: &Vector3<f32>,
    viewpoint: &Vector3<f32>,
) -> Option<Vector3<f32>> {
    let stats = octree.query_aggregate(region, 0.0);
    let (normal, status) = estimate_normal(&stats, position, viewpoint);
    (status == NormalStatus::Stable).then_some(normal)
}
