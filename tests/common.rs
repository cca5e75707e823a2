//! Shared scene builders for detector integration tests.
//!
//! Scenes are sampled on regular grids so surface normals come out on
//! exact coordinate axes and the expected entropy levels are easy to
//! reason about: one plane scores near zero, a two-plane edge near
//! `ln 2`, a three-plane corner near `ln 3`.

#![allow(dead_code)]

use bindu_keypoints::DetectorConfig;
use bindu_keypoints::core::PointCloud3D;
use nalgebra::Vector3;

/// Configuration tuned for the small synthetic scenes below.
///
/// Feature sampling runs at depth 5 (0.1 m cells), normals at depth 6
/// (0.05 m cells) from 0.075 m radius supports. The influence radius
/// spans a whole corner cluster, so suppression keeps one maximum per
/// corner.
pub fn detection_config() -> DetectorConfig {
    DetectorConfig::default()
        .with_root_extent(3.2)
        .with_min_cell_extent(0.025)
        .with_sampling_rate(0.1)
        .with_normal_sampling_rate(0.05)
        .with_normal_scale(0.15)
        .with_histogram_size(0.3)
        .with_minimum_entropy(0.6)
        .with_influence_radius(0.5)
        .with_node_capacity(1 << 16)
}

/// Append a planar grid patch: `surface(u, v)` maps grid coordinates in
/// `[0, extent]` to points.
pub fn add_surface<F>(cloud: &mut PointCloud3D, extent: f32, spacing: f32, surface: F)
where
    F: Fn(f32, f32) -> Vector3<f32>,
{
    let steps = (extent / spacing).round() as usize;
    for i in 0..=steps {
        for j in 0..=steps {
            cloud.push(surface(i as f32 * spacing, j as f32 * spacing));
        }
    }
}

/// Append three orthogonal plane patches meeting at `apex`.
pub fn add_corner(cloud: &mut PointCloud3D, apex: Vector3<f32>, extent: f32, spacing: f32) {
    add_surface(cloud, extent, spacing, |u, v| {
        apex + Vector3::new(u, v, 0.0)
    });
    add_surface(cloud, extent, spacing, |u, v| {
        apex + Vector3::new(0.0, u, v)
    });
    add_surface(cloud, extent, spacing, |u, v| {
        apex + Vector3::new(u, 0.0, v)
    });
}

/// A single flat plane at `z = 0`.
pub fn plane_cloud(extent: f32, spacing: f32) -> PointCloud3D {
    let mut cloud = PointCloud3D::new();
    add_surface(&mut cloud, extent, spacing, |u, v| Vector3::new(u, v, 0.0));
    cloud
}

/// Three orthogonal planes meeting at the origin.
pub fn corner_cloud(extent: f32, spacing: f32) -> PointCloud3D {
    let mut cloud = PointCloud3D::new();
    add_corner(&mut cloud, Vector3::zeros(), extent, spacing);
    cloud
}

/// Two planes meeting along the y axis.
pub fn edge_cloud(extent: f32, spacing: f32) -> PointCloud3D {
    let mut cloud = PointCloud3D::new();
    add_surface(&mut cloud, extent, spacing, |u, v| Vector3::new(u, v, 0.0));
    add_surface(&mut cloud, extent, spacing, |u, v| Vector3::new(0.0, v, u));
    cloud
}
