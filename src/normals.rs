//! Surface normal estimation over sampled octree nodes.
//!
//! A node's normal is the eigenvector of the smallest eigenvalue of the
//! local position covariance. The support statistics come either from
//! the node itself (when the configured support extent is below the
//! average cell extent at the normal sampling depth) or from an
//! aggregate query around the node's representative position. Normals
//! are oriented toward the sensor viewpoint; when the view direction is
//! nearly tangential the sign is resolved against a fixed sequence of
//! far-away probe points so the choice stays deterministic.

use nalgebra::{SymmetricEigen, Vector3};

use crate::config::DetectorConfig;
use crate::core::Aabb;
use crate::octree::{NodeStats, NormalStatus, Octree};

/// Minimum number of support points for a covariance normal.
pub const MIN_POINTS_FOR_NORMAL: u32 = 5;

/// Below this |dot| the view direction cannot resolve the normal sign.
const ORIENTATION_EPS: f32 = 0.1;

/// Distance of the orientation probe points from the origin.
const PROBE_OFFSET: f32 = 1000.0;

/// Axis combinations probed, in order, when the viewpoint is tangential.
const PROBE_DIRECTIONS: [[f32; 3]; 7] = [
    [1.0, 1.0, 1.0],
    [0.0, 1.0, 0.0],
    [1.0, 0.0, 0.0],
    [0.0, 0.0, 1.0],
    [1.0, 1.0, 0.0],
    [0.0, 1.0, 1.0],
    [1.0, 0.0, 1.0],
];

/// Flip `normal` so it points from `position` toward the viewpoint.
///
/// Falls back to the probe sequence when the view direction is nearly
/// perpendicular to the normal; if every probe is tangential too, the
/// sign of the last decisive dot product stands.
pub fn orient_toward(normal: &mut Vector3<f32>, position: &Vector3<f32>, viewpoint: &Vector3<f32>) {
    let mut dot = normal.dot(&(viewpoint - position));
    if dot.abs() < ORIENTATION_EPS {
        for probe in PROBE_DIRECTIONS {
            let far = Vector3::new(probe[0], probe[1], probe[2]) * PROBE_OFFSET;
            let d = normal.dot(&(far - position));
            if d.abs() >= ORIENTATION_EPS {
                dot = d;
                break;
            }
        }
    }
    if dot < 0.0 {
        *normal = -*normal;
    }
}

/// Estimate an oriented normal from aggregated support statistics.
///
/// Returns a zero vector with [`NormalStatus::Unstable`] when the
/// support is too small, or the covariance or its eigen-decomposition
/// degenerates.
pub fn estimate_normal(
    stats: &NodeStats,
    position: &Vector3<f32>,
    viewpoint: &Vector3<f32>,
) -> (Vector3<f32>, NormalStatus) {
    if stats.count < MIN_POINTS_FOR_NORMAL {
        return (Vector3::zeros(), NormalStatus::Unstable);
    }
    let Some(covariance) = stats.covariance() else {
        return (Vector3::zeros(), NormalStatus::Unstable);
    };
    if !covariance.iter().all(|c| c.is_finite()) {
        return (Vector3::zeros(), NormalStatus::Unstable);
    }

    let eigen = SymmetricEigen::new(covariance);
    let mut smallest = 0;
    for i in 1..3 {
        if eigen.eigenvalues[i] < eigen.eigenvalues[smallest] {
            smallest = i;
        }
    }
    let mut normal: Vector3<f32> = eigen.eigenvectors.column(smallest).into_owned();
    let length = normal.norm();
    if !length.is_finite() || length <= f32::EPSILON {
        return (Vector3::zeros(), NormalStatus::Unstable);
    }
    normal /= length;

    orient_toward(&mut normal, position, viewpoint);
    (normal, NormalStatus::Stable)
}

/// Estimate normals for every sampled node at the normal sampling depth.
///
/// Nodes with too few support points are left untouched; failed
/// estimates are marked unstable. Each stable node gets its normal
/// direction inserted into a pooled histogram, weighted by the support
/// point count that produced the estimate. Returns the number of
/// stable normals.
pub fn compute_normals(
    octree: &mut Octree,
    viewpoint: &Vector3<f32>,
    config: &DetectorConfig,
) -> usize {
    let depth = config.normal_sampling_depth;
    let ids: Vec<_> = octree.sampling().nodes(depth).to_vec();
    let average_extent = octree.sampling().average_extent(depth);
    // A support volume smaller than the cells themselves is answered by
    // the node's own aggregate; otherwise gather the true support.
    let use_node_stats = config.normal_scale < average_extent;

    let mut stable = 0;
    for id in ids {
        let representative = octree.node(id).representative();
        let stats = if use_node_stats {
            octree.node(id).stats
        } else {
            let region = Aabb::cube_around(representative, config.normal_scale_radius);
            octree.query_aggregate(&region, 0.0)
        };
        if stats.count < MIN_POINTS_FOR_NORMAL {
            continue;
        }

        let (normal, status) = estimate_normal(&stats, &representative, viewpoint);
        {
            let node = octree.node_mut(id);
            node.normal = normal;
            node.normal_status = status;
        }
        if status == NormalStatus::Stable {
            stable += 1;
            let weight = stats.count as f32;
            let histogram = octree.attach_histogram(id);
            octree.histogram_mut(histogram).insert(&normal, weight);
        }
    }
    stable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octree::PointOrigin;
    use approx::assert_relative_eq;

    fn plane_stats(z: f32) -> NodeStats {
        let mut stats = NodeStats::default();
        for i in 0..7 {
            for j in 0..7 {
                let p = Vector3::new(i as f32 * 0.01, j as f32 * 0.01, z);
                stats.add_point(&p, None, None);
            }
        }
        stats
    }

    #[test]
    fn flat_plane_normal_faces_viewpoint() {
        let stats = plane_stats(0.5);
        let position = Vector3::new(0.03, 0.03, 0.5);

        let above = Vector3::new(0.0, 0.0, 3.0);
        let (normal, status) = estimate_normal(&stats, &position, &above);
        assert_eq!(status, NormalStatus::Stable);
        assert_relative_eq!(normal.z, 1.0, epsilon = 1e-4);
        assert!(normal.x.abs() < 1e-3 && normal.y.abs() < 1e-3);

        let below = Vector3::new(0.0, 0.0, -3.0);
        let (normal, status) = estimate_normal(&stats, &position, &below);
        assert_eq!(status, NormalStatus::Stable);
        assert_relative_eq!(normal.z, -1.0, epsilon = 1e-4);
    }

    #[test]
    fn too_few_points_is_unstable() {
        let mut stats = NodeStats::default();
        stats.add_point(&Vector3::new(0.0, 0.0, 0.0), None, None);
        stats.add_point(&Vector3::new(0.1, 0.0, 0.0), None, None);
        let (normal, status) = estimate_normal(&stats, &Vector3::zeros(), &Vector3::z());
        assert_eq!(status, NormalStatus::Unstable);
        assert_eq!(normal, Vector3::zeros());
    }

    #[test]
    fn collinear_points_give_perpendicular_normal() {
        let mut stats = NodeStats::default();
        for i in 0..10 {
            stats.add_point(&Vector3::new(i as f32 * 0.01, 0.0, 0.0), None, None);
        }
        let (normal, status) = estimate_normal(&stats, &Vector3::zeros(), &Vector3::z());
        assert_eq!(status, NormalStatus::Stable);
        // The direction within the perpendicular plane is arbitrary, but
        // it must be perpendicular to the line and unit length.
        assert!(normal.x.abs() < 1e-3);
        assert_relative_eq!(normal.norm(), 1.0, epsilon = 1e-5);
    }

    #[test]
    fn tangential_viewpoint_resolves_through_probes() {
        // Vertical plane x = 0, viewed from along the plane: the view
        // direction is perpendicular to the normal.
        let mut stats = NodeStats::default();
        for i in 0..7 {
            for j in 0..7 {
                stats.add_point(
                    &Vector3::new(0.0, i as f32 * 0.01, j as f32 * 0.01),
                    None,
                    None,
                );
            }
        }
        let position = Vector3::new(0.0, 0.03, 0.03);
        let viewpoint = Vector3::new(0.0, 0.03, 5.0);

        let (normal, status) = estimate_normal(&stats, &position, &viewpoint);
        assert_eq!(status, NormalStatus::Stable);
        // The first probe (far positive corner) fixes the sign to +x,
        // whichever sign the eigenvector came out with.
        assert_relative_eq!(normal.x, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn pass_marks_plane_nodes_stable() {
        let config = DetectorConfig::default()
            .with_root_extent(6.4)
            .with_min_cell_extent(0.05)
            .with_sampling_rate(0.2)
            .with_normal_sampling_rate(0.1)
            .with_node_capacity(1 << 16);
        let mut octree = Octree::new(&config);

        let viewpoint = Vector3::new(0.0, 0.0, 2.0);
        let mut index = 0;
        let mut x = -0.3_f32;
        while x <= 0.3 {
            let mut y = -0.3_f32;
            while y <= 0.3 {
                let _ = octree.insert(
                    &Vector3::new(x, y, 0.0),
                    None,
                    PointOrigin::Measured,
                    Some(index),
                    config.min_cell_extent,
                );
                index += 1;
                y += 0.02;
            }
            x += 0.02;
        }
        octree.rebuild_sampling();

        let stable = compute_normals(&mut octree, &viewpoint, &config);
        assert!(stable > 0);

        for &id in octree.sampling().nodes(config.normal_sampling_depth) {
            let node = octree.node(id);
            if node.normal_status == NormalStatus::Stable {
                assert_relative_eq!(node.normal.z, 1.0, epsilon = 1e-3);
                // Stable nodes fed their direction into a pooled histogram.
                let h = node.histogram.expect("stable node keeps a histogram");
                assert!(octree.histogram(h).total_weight() > 0.0);
            }
        }
        assert!(octree.histogram_count() > 0);
    }
}
