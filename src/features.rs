//! Detected feature records.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::core::Color;
use crate::saliency::DirectionHistogram;

/// An interest point with its local surface description.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Feature {
    /// Position in cloud coordinates, possibly mean shift refined.
    pub position: Vector3<f32>,
    /// Support radius the descriptor was built over.
    pub radius: f32,
    /// Entropy saliency at the detection node; 0 for features built for
    /// externally chosen points.
    pub entropy: f32,
    /// Eigenvalue ratio of the scored neighborhood; infinite when the
    /// neighborhood was too degenerate to measure.
    pub cornerness: f32,
    /// Oriented surface normal; zero when the support was unstable.
    pub normal: Vector3<f32>,
    /// Mean support color; zero when the input carried no color.
    pub color: Color,
    /// Index of an input point inside the feature's cell, when known.
    pub point_index: Option<u32>,
    /// Histogram of support normal directions.
    pub descriptor: DirectionHistogram,
}

impl Feature {
    /// Squared distance from the feature to a position.
    #[inline]
    pub fn distance_squared(&self, position: &Vector3<f32>) -> f32 {
        (self.position - position).norm_squared()
    }
}

/// Compact `(position, strength)` view of a feature.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterestPoint {
    /// Position in cloud coordinates.
    pub position: Vector3<f32>,
    /// Detection strength: the entropy at the detection node.
    pub strength: f32,
}

impl From<&Feature> for InterestPoint {
    fn from(feature: &Feature) -> Self {
        Self { position: feature.position, strength: feature.entropy }
    }
}
