//! Axis-aligned bounds for octree cells and spatial queries.
//!
//! Octree cells are cubes described by a center and a half extent. Query
//! regions are general axis-aligned boxes. All containment checks use
//! half-open intervals `[min, max)` so that a point on a shared face
//! belongs to exactly one cell.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Cubic cell bounds: center plus half extent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CubeBounds {
    /// Cell center.
    pub center: Vector3<f32>,
    /// Half the edge length.
    pub half_extent: f32,
}

impl CubeBounds {
    /// Create a cube from its center and half extent.
    #[inline]
    pub fn new(center: Vector3<f32>, half_extent: f32) -> Self {
        Self { center, half_extent }
    }

    /// Edge length of the cube.
    #[inline]
    pub fn extent(&self) -> f32 {
        2.0 * self.half_extent
    }

    /// Minimum corner.
    #[inline]
    pub fn min(&self) -> Vector3<f32> {
        self.center.add_scalar(-self.half_extent)
    }

    /// Maximum corner.
    #[inline]
    pub fn max(&self) -> Vector3<f32> {
        self.center.add_scalar(self.half_extent)
    }

    /// Whether a point lies inside the cube (half-open on the max faces).
    #[inline]
    pub fn contains(&self, point: &Vector3<f32>) -> bool {
        let min = self.min();
        let max = self.max();
        point.x >= min.x
            && point.x < max.x
            && point.y >= min.y
            && point.y < max.y
            && point.z >= min.z
            && point.z < max.z
    }

    /// Octant index of a point relative to the center.
    ///
    /// Bit 0 is set for `x >= center.x`, bit 1 for y, bit 2 for z. The
    /// point does not need to lie inside the cube.
    #[inline]
    pub fn octant_of(&self, point: &Vector3<f32>) -> usize {
        let mut octant = 0;
        if point.x >= self.center.x {
            octant |= 1;
        }
        if point.y >= self.center.y {
            octant |= 2;
        }
        if point.z >= self.center.z {
            octant |= 4;
        }
        octant
    }

    /// Bounds of the child cube for an octant index (0..8).
    #[inline]
    pub fn child(&self, octant: usize) -> CubeBounds {
        let q = self.half_extent * 0.5;
        let dx = if octant & 1 != 0 { q } else { -q };
        let dy = if octant & 2 != 0 { q } else { -q };
        let dz = if octant & 4 != 0 { q } else { -q };
        CubeBounds::new(self.center + Vector3::new(dx, dy, dz), q)
    }
}

/// Axis-aligned box used for spatial queries.
///
/// # Example
/// ```
/// use bindu_keypoints::core::Aabb;
/// use nalgebra::Vector3;
///
/// let region = Aabb::cube_around(Vector3::new(1.0, 2.0, 3.0), 0.5);
/// assert!(region.contains(&Vector3::new(1.2, 2.0, 2.8)));
/// assert!(!region.contains(&Vector3::new(2.0, 2.0, 3.0)));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner.
    pub min: Vector3<f32>,
    /// Maximum corner.
    pub max: Vector3<f32>,
}

impl Aabb {
    /// Create a box from explicit corners.
    #[inline]
    pub fn new(min: Vector3<f32>, max: Vector3<f32>) -> Self {
        Self { min, max }
    }

    /// Create the cube of the given half extent around a center point.
    #[inline]
    pub fn cube_around(center: Vector3<f32>, half_extent: f32) -> Self {
        Self {
            min: center.add_scalar(-half_extent),
            max: center.add_scalar(half_extent),
        }
    }

    /// Whether a point lies inside the box (half-open on the max faces).
    #[inline]
    pub fn contains(&self, point: &Vector3<f32>) -> bool {
        point.x >= self.min.x
            && point.x < self.max.x
            && point.y >= self.min.y
            && point.y < self.max.y
            && point.z >= self.min.z
            && point.z < self.max.z
    }

    /// Whether the box overlaps a cubic cell.
    #[inline]
    pub fn intersects_cube(&self, cube: &CubeBounds) -> bool {
        let cube_min = cube.min();
        let cube_max = cube.max();
        self.min.x < cube_max.x
            && self.max.x > cube_min.x
            && self.min.y < cube_max.y
            && self.max.y > cube_min.y
            && self.min.z < cube_max.z
            && self.max.z > cube_min.z
    }

    /// Whether a cubic cell lies entirely inside the box.
    #[inline]
    pub fn contains_cube(&self, cube: &CubeBounds) -> bool {
        let cube_min = cube.min();
        let cube_max = cube.max();
        cube_min.x >= self.min.x
            && cube_max.x <= self.max.x
            && cube_min.y >= self.min.y
            && cube_max.y <= self.max.y
            && cube_min.z >= self.min.z
            && cube_max.z <= self.max.z
    }
}
