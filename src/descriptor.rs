//! Feature descriptor assembly.
//!
//! A confirmed maximum only carries a node id and an entropy score; the
//! descriptor stage turns it into a full [`Feature`]: an oriented
//! normal and mean color from the aggregated support statistics, and a
//! merged direction histogram plus the cornerness of the sampled
//! neighborhood at the normal sampling depth.

use nalgebra::Vector3;

use crate::config::DetectorConfig;
use crate::core::Aabb;
use crate::extraction::cornerness;
use crate::features::Feature;
use crate::normals::estimate_normal;
use crate::octree::{NodeId, NormalStatus, Octree};
use crate::saliency::DirectionHistogram;

/// Builds feature records around detected or externally given positions.
#[derive(Default)]
pub struct DescriptorBuilder {
    neighbors: Vec<NodeId>,
}

impl DescriptorBuilder {
    /// Create a builder with an empty scratch buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble a feature at `position`.
    ///
    /// `entropy` and `point_index` are carried through unchanged so a
    /// refined position keeps the score and provenance of the node it
    /// was detected at.
    pub fn build_at(
        &mut self,
        octree: &Octree,
        config: &DetectorConfig,
        viewpoint: &Vector3<f32>,
        position: Vector3<f32>,
        entropy: f32,
        point_index: Option<u32>,
    ) -> Feature {
        let support = Aabb::cube_around(position, config.histogram_radius);
        let stats = octree.query_aggregate(&support, 0.0);
        let (normal, _) = estimate_normal(&stats, &position, viewpoint);

        octree.query_region(&support, config.normal_sampling_depth, &mut self.neighbors);
        let corner = cornerness(octree, &self.neighbors);

        let mut descriptor = DirectionHistogram::new(config.histogram_bins);
        for &id in &self.neighbors {
            let node = octree.node(id);
            if node.normal_status != NormalStatus::Stable {
                continue;
            }
            if let Some(histogram) = node.histogram {
                descriptor.merge(octree.histogram(histogram));
            }
        }

        Feature {
            position,
            radius: config.histogram_radius,
            entropy,
            cornerness: corner,
            normal,
            color: stats.mean_color(),
            point_index,
            descriptor,
        }
    }

    /// Assemble a feature at a confirmed maximum node.
    pub fn build_for_node(
        &mut self,
        octree: &Octree,
        config: &DetectorConfig,
        viewpoint: &Vector3<f32>,
        id: NodeId,
    ) -> Feature {
        let node = octree.node(id);
        let position = node.representative();
        let entropy = node.entropy;
        let point_index = node.stats.first_index;
        self.build_at(octree, config, viewpoint, position, entropy, point_index)
    }
}
