//! Mean shift refinement of feature positions.
//!
//! A found maximum inherits its position from an octree cell
//! representative, so it is quantized to the sampling grid. Refinement
//! shifts the position through a few mean shift rounds in entropy space:
//! neighbors whose entropy sits close to the neighborhood mean carry the
//! largest Gaussian kernel weight, and the position moves to the
//! weighted centroid of their representatives. Every round has abort
//! guards so a degenerate neighborhood leaves the position untouched.

use nalgebra::Vector3;

use crate::config::DetectorConfig;
use crate::core::Aabb;
use crate::octree::{MaximumStatus, NodeId, Octree};

/// Smallest entropy spread the kernel can divide by.
const MIN_SIGMA: f32 = 1e-6;

/// Mean shift refiner with a reusable neighbor buffer.
#[derive(Default)]
pub struct LocalizationRefiner {
    neighbors: Vec<NodeId>,
}

impl LocalizationRefiner {
    /// Create a refiner with an empty scratch buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Refine `position` through `config.mean_shift_rounds` rounds.
    ///
    /// Only features detected at the histogram radius scale are refined;
    /// any other `radius` passes through unchanged. A round aborts, and
    /// the position stays where it is, when the neighborhood is empty,
    /// its entropy spread vanishes, or the shift result is not finite.
    pub fn refine(
        &mut self,
        octree: &Octree,
        config: &DetectorConfig,
        position: Vector3<f32>,
        radius: f32,
    ) -> Vector3<f32> {
        if radius != config.histogram_radius {
            return position;
        }
        let mut current = position;
        for _ in 0..config.mean_shift_rounds {
            match self.shift_once(octree, config, current) {
                Some(next) => current = next,
                None => break,
            }
        }
        current
    }

    /// One mean shift round; `None` when the round aborts.
    fn shift_once(
        &mut self,
        octree: &Octree,
        config: &DetectorConfig,
        position: Vector3<f32>,
    ) -> Option<Vector3<f32>> {
        let region = Aabb::cube_around(position, config.histogram_radius);
        octree.query_region(&region, config.sampling_depth, &mut self.neighbors);
        self.neighbors
            .retain(|&id| octree.node(id).status != MaximumStatus::Artificial);
        if self.neighbors.is_empty() {
            return None;
        }

        let count = self.neighbors.len() as f32;
        let mut entropy_sum = 0.0_f32;
        let mut entropy_squared_sum = 0.0_f32;
        for &id in &self.neighbors {
            let entropy = octree.node(id).entropy;
            entropy_sum += entropy;
            entropy_squared_sum += entropy * entropy;
        }
        let mean = entropy_sum / count;
        let variance = (entropy_squared_sum / count - mean * mean).max(0.0);
        let sigma = variance.sqrt();
        if sigma < MIN_SIGMA {
            return None;
        }

        let mut weight_sum = 0.0_f32;
        let mut shifted: Vector3<f32> = Vector3::zeros();
        for &id in &self.neighbors {
            let node = octree.node(id);
            let deviation = (mean - node.entropy) / sigma;
            let weight = (-0.5 * deviation * deviation).exp();
            weight_sum += weight;
            shifted += node.representative() * weight;
        }
        if !(weight_sum > 0.0) {
            return None;
        }
        let shifted = shifted / weight_sum;
        if !shifted.iter().all(|c| c.is_finite()) {
            return None;
        }
        Some(shifted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octree::PointOrigin;
    use approx::assert_relative_eq;

    fn test_config() -> DetectorConfig {
        DetectorConfig::default()
            .with_root_extent(6.4)
            .with_min_cell_extent(0.05)
            .with_sampling_rate(0.2)
            .with_normal_sampling_rate(0.1)
            .with_histogram_size(0.8)
            .with_node_capacity(1 << 16)
    }

    /// One point per entry, each in its own cell, with a fixed entropy.
    fn scored_octree(config: &DetectorConfig, points: &[(f32, f32)]) -> Octree {
        let mut octree = Octree::new(config);
        for &(x, _) in points {
            let _ = octree.insert(
                &Vector3::new(x, 0.0, 0.0),
                None,
                PointOrigin::Measured,
                None,
                config.min_cell_extent,
            );
        }
        octree.rebuild_sampling();
        for &(x, entropy) in points {
            let id = octree
                .nearest_node(&Vector3::new(x, 0.0, 0.0), config.sampling_depth)
                .expect("point was inserted");
            octree.node_mut(id).entropy = entropy;
        }
        octree
    }

    #[test]
    fn symmetric_neighborhood_does_not_move() {
        let config = test_config();
        let octree = scored_octree(&config, &[(-0.3, 0.9), (-0.1, 0.3), (0.1, 0.3), (0.3, 0.9)]);
        let mut refiner = LocalizationRefiner::new();
        let refined = refiner.refine(&octree, &config, Vector3::zeros(), config.histogram_radius);
        assert_relative_eq!(refined.x, 0.0, epsilon = 1e-4);
        assert_relative_eq!(refined.y, 0.0, epsilon = 1e-4);
        assert_relative_eq!(refined.z, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn shifts_toward_near_mean_entropy_nodes() {
        let config = test_config();
        let octree = scored_octree(&config, &[(-0.3, 0.9), (0.1, 0.5), (0.3, 0.55)]);
        let mut refiner = LocalizationRefiner::new();
        let refined = refiner.refine(&octree, &config, Vector3::zeros(), config.histogram_radius);
        // The two right-hand nodes sit closest to the mean entropy and
        // dominate the kernel.
        assert!(refined.x > 0.05 && refined.x < 0.2, "x {}", refined.x);
        assert_relative_eq!(refined.y, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn empty_neighborhood_keeps_the_position() {
        let config = test_config();
        let octree = scored_octree(&config, &[(0.1, 0.9)]);
        let mut refiner = LocalizationRefiner::new();
        let origin = Vector3::new(10.0, 10.0, 10.0);
        let refined = refiner.refine(&octree, &config, origin, config.histogram_radius);
        assert_eq!(refined, origin);
    }

    #[test]
    fn flat_entropy_keeps_the_position() {
        let config = test_config();
        // 0.5 is exact in binary, so the variance is exactly zero.
        let octree = scored_octree(&config, &[(-0.1, 0.5), (0.1, 0.5), (0.3, 0.5)]);
        let mut refiner = LocalizationRefiner::new();
        let start = Vector3::new(0.05, 0.0, 0.0);
        let refined = refiner.refine(&octree, &config, start, config.histogram_radius);
        assert_eq!(refined, start);
    }

    #[test]
    fn foreign_scale_passes_through() {
        let config = test_config();
        let octree = scored_octree(&config, &[(-0.1, 0.3), (0.1, 0.9)]);
        let mut refiner = LocalizationRefiner::new();
        let start = Vector3::zeros();
        let refined = refiner.refine(&octree, &config, start, config.histogram_radius * 0.5);
        assert_eq!(refined, start);
    }

    #[test]
    fn artificial_nodes_do_not_pull() {
        let config = test_config();
        let mut octree = scored_octree(&config, &[(-0.1, 0.9), (0.1, 0.5), (0.3, 0.55)]);
        let padded = octree
            .nearest_node(&Vector3::new(-0.1, 0.0, 0.0), config.sampling_depth)
            .expect("node exists");
        octree.node_mut(padded).status = MaximumStatus::Artificial;

        let mut refiner = LocalizationRefiner::new();
        let refined = refiner.refine(&octree, &config, Vector3::zeros(), config.histogram_radius);
        // Only the two real nodes remain; their kernel weights tie, so
        // the shift lands on their midpoint.
        assert_relative_eq!(refined.x, 0.2, epsilon = 1e-3);
    }
}
