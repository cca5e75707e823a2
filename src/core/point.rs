//! Input point containers and the point-source capability trait.
//!
//! The detector does not require a concrete point type. Anything exposing
//! XYZ coordinates (and optionally RGB color) through [`PointSource`] can
//! be consumed directly. [`PointCloud3D`] is the crate's own container,
//! stored as structure-of-arrays for cache-friendly sequential insertion.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// RGB color with components in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Color {
    /// Red component.
    pub r: f32,
    /// Green component.
    pub g: f32,
    /// Blue component.
    pub b: f32,
}

impl Color {
    /// Create a color from components in `[0, 1]`.
    #[inline]
    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    /// Unpack a `0x00RRGGBB` integer into component form.
    ///
    /// # Example
    /// ```
    /// use bindu_keypoints::core::Color;
    ///
    /// let c = Color::from_packed(0x00FF8000);
    /// assert!((c.r - 1.0).abs() < 1e-6);
    /// assert!((c.g - 128.0 / 255.0).abs() < 1e-6);
    /// assert_eq!(c.b, 0.0);
    /// ```
    #[inline]
    pub fn from_packed(rgb: u32) -> Self {
        Self {
            r: ((rgb >> 16) & 0xFF) as f32 / 255.0,
            g: ((rgb >> 8) & 0xFF) as f32 / 255.0,
            b: (rgb & 0xFF) as f32 / 255.0,
        }
    }

    /// Component vector, convenient for accumulation.
    #[inline]
    pub fn to_vector(self) -> Vector3<f32> {
        Vector3::new(self.r, self.g, self.b)
    }

    /// Build a color back from an accumulated component vector.
    #[inline]
    pub fn from_vector(v: Vector3<f32>) -> Self {
        Self { r: v.x, g: v.y, b: v.z }
    }
}

/// Capability trait for point cloud inputs.
///
/// Implement this for external containers to feed them to the detector
/// without conversion. Colors are optional; the default returns `None`.
pub trait PointSource {
    /// Number of points.
    fn len(&self) -> usize;

    /// Whether the source holds no points.
    #[inline]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of the point at `index`.
    fn position(&self, index: usize) -> Vector3<f32>;

    /// Color of the point at `index`, if the source carries color.
    #[inline]
    fn color(&self, index: usize) -> Option<Color> {
        let _ = index;
        None
    }
}

/// Unorganized 3D point cloud in structure-of-arrays layout.
///
/// `colors` is either empty (colorless cloud) or holds one entry per
/// point; [`PointCloud3D::validate`] checks the layout.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PointCloud3D {
    /// X coordinates in meters.
    pub xs: Vec<f32>,
    /// Y coordinates in meters.
    pub ys: Vec<f32>,
    /// Z coordinates in meters.
    pub zs: Vec<f32>,
    /// Per-point colors; empty when the cloud is colorless.
    pub colors: Vec<Color>,
}

impl PointCloud3D {
    /// Create an empty cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cloud with reserved capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            xs: Vec::with_capacity(capacity),
            ys: Vec::with_capacity(capacity),
            zs: Vec::with_capacity(capacity),
            colors: Vec::new(),
        }
    }

    /// Append a colorless point.
    #[inline]
    pub fn push(&mut self, position: Vector3<f32>) {
        self.xs.push(position.x);
        self.ys.push(position.y);
        self.zs.push(position.z);
    }

    /// Append a colored point.
    #[inline]
    pub fn push_colored(&mut self, position: Vector3<f32>, color: Color) {
        self.push(position);
        self.colors.push(color);
    }

    /// Whether the cloud carries per-point color.
    #[inline]
    pub fn has_colors(&self) -> bool {
        !self.colors.is_empty()
    }

    /// Check structural consistency of the arrays.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.ys.len() != self.xs.len() || self.zs.len() != self.xs.len() {
            return Err("coordinate arrays must have equal length");
        }
        if !self.colors.is_empty() && self.colors.len() != self.xs.len() {
            return Err("colors must be empty or one per point");
        }
        Ok(())
    }
}

impl PointSource for PointCloud3D {
    #[inline]
    fn len(&self) -> usize {
        self.xs.len()
    }

    #[inline]
    fn position(&self, index: usize) -> Vector3<f32> {
        Vector3::new(self.xs[index], self.ys[index], self.zs[index])
    }

    #[inline]
    fn color(&self, index: usize) -> Option<Color> {
        self.colors.get(index).copied()
    }
}
