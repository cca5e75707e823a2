//! Direction histograms over the unit sphere.
//!
//! Directions are discretized on an elevation × azimuth grid and carry
//! accumulated weights. The Shannon entropy of the normalized bin weights
//! is the saliency measure: a single dominant direction scores near zero,
//! spread-out direction sets score high. Cross products of normal pairs
//! are inserted through the same grid after folding antipodal directions
//! together, since `a × b` and `b × a` describe the same undirected axis.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::config::CrossProductWeight;

/// Cross products shorter than this carry no usable direction.
pub const DEGENERATE_CROSS_EPS: f32 = 1e-6;

/// Weighted histogram of directions on the unit sphere.
///
/// # Example
/// ```
/// use bindu_keypoints::saliency::DirectionHistogram;
/// use nalgebra::Vector3;
///
/// let mut h = DirectionHistogram::new(8);
/// h.insert(&Vector3::new(0.0, 0.0, 1.0), 4.0);
/// // One occupied bin: zero entropy.
/// assert_eq!(h.entropy(), 0.0);
///
/// h.insert(&Vector3::new(1.0, 0.0, 0.0), 4.0);
/// // Two equally weighted bins: ln 2.
/// assert!((h.entropy() - 2.0_f32.ln()).abs() < 1e-6);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DirectionHistogram {
    bins: Vec<f32>,
    rows: usize,
    cols: usize,
    total_weight: f32,
}

impl DirectionHistogram {
    /// Create a histogram with `rows` elevation rows and `2 * rows`
    /// azimuth columns.
    pub fn new(rows: usize) -> Self {
        let rows = rows.max(2);
        let cols = rows * 2;
        Self {
            bins: vec![0.0; rows * cols],
            rows,
            cols,
            total_weight: 0.0,
        }
    }

    /// Clear all accumulated weight, keeping the bin layout.
    pub fn reset(&mut self) {
        self.bins.fill(0.0);
        self.total_weight = 0.0;
    }

    /// Number of bins on the sphere.
    #[inline]
    pub fn bin_count(&self) -> usize {
        self.bins.len()
    }

    /// Elevation rows.
    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Accumulated weight over all bins.
    #[inline]
    pub fn total_weight(&self) -> f32 {
        self.total_weight
    }

    /// Raw bin weights, row-major by elevation.
    #[inline]
    pub fn bins(&self) -> &[f32] {
        &self.bins
    }

    /// Bin index for a direction. The direction need not be unit length;
    /// zero-length input maps to the polar bin of row 0.
    #[inline]
    fn bin_index(&self, direction: &Vector3<f32>) -> usize {
        let len = direction.norm();
        let z = if len > 0.0 {
            (direction.z / len).clamp(-1.0, 1.0)
        } else {
            1.0
        };
        let elevation = z.acos(); // [0, pi]
        let row = ((elevation / std::f32::consts::PI) * self.rows as f32) as usize;
        let row = row.min(self.rows - 1);

        let azimuth = direction.y.atan2(direction.x); // (-pi, pi]
        let col = (((azimuth + std::f32::consts::PI) / (2.0 * std::f32::consts::PI))
            * self.cols as f32) as usize;
        let col = col.min(self.cols - 1);

        row * self.cols + col
    }

    /// Accumulate a direction with a weight.
    ///
    /// Non-finite directions and non-positive weights are ignored.
    pub fn insert(&mut self, direction: &Vector3<f32>, weight: f32) {
        if !(weight > 0.0) || !direction.iter().all(|c| c.is_finite()) {
            return;
        }
        let index = self.bin_index(direction);
        self.bins[index] += weight;
        self.total_weight += weight;
    }

    /// Accumulate the cross product of two normals.
    ///
    /// Near-parallel pairs are skipped: their cross product is too short
    /// to define a direction. The surviving direction is folded into a
    /// canonical hemisphere so that the pair order does not matter.
    pub fn insert_cross_product(
        &mut self,
        a: &Vector3<f32>,
        b: &Vector3<f32>,
        weighting: CrossProductWeight,
    ) {
        let cross = a.cross(b);
        let magnitude = cross.norm();
        if magnitude < DEGENERATE_CROSS_EPS || !magnitude.is_finite() {
            return;
        }
        let mut direction = cross / magnitude;
        if direction.z < 0.0
            || (direction.z == 0.0
                && (direction.y < 0.0 || (direction.y == 0.0 && direction.x < 0.0)))
        {
            direction = -direction;
        }
        let weight = match weighting {
            CrossProductWeight::Unit => 1.0,
            CrossProductWeight::Magnitude => magnitude,
            CrossProductWeight::MagnitudeSquared => magnitude * magnitude,
        };
        self.insert(&direction, weight);
    }

    /// Add another histogram's weights bin-by-bin.
    ///
    /// Both histograms must share the same bin layout.
    pub fn merge(&mut self, other: &DirectionHistogram) {
        debug_assert_eq!(self.bins.len(), other.bins.len());
        for (bin, w) in self.bins.iter_mut().zip(other.bins.iter()) {
            *bin += *w;
        }
        self.total_weight += other.total_weight;
    }

    /// Shannon entropy of the normalized bin weights (natural log).
    ///
    /// Returns 0 for an empty histogram.
    pub fn entropy(&self) -> f32 {
        if !(self.total_weight > 0.0) {
            return 0.0;
        }
        let mut entropy = 0.0;
        for &w in &self.bins {
            if w > 0.0 {
                let p = w / self.total_weight;
                entropy -= p * p.ln();
            }
        }
        entropy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn empty_histogram_has_zero_entropy() {
        let h = DirectionHistogram::new(8);
        assert_eq!(h.entropy(), 0.0);
        assert_eq!(h.total_weight(), 0.0);
        assert_eq!(h.bin_count(), 8 * 16);
    }

    #[test]
    fn entropy_grows_with_direction_spread() {
        let mut h = DirectionHistogram::new(8);
        h.insert(&Vector3::new(0.0, 0.0, 1.0), 1.0);
        let one = h.entropy();

        h.insert(&Vector3::new(1.0, 0.0, 0.0), 1.0);
        let two = h.entropy();

        h.insert(&Vector3::new(0.0, 1.0, 0.0), 1.0);
        let three = h.entropy();

        assert_eq!(one, 0.0);
        assert_relative_eq!(two, 2.0_f32.ln(), epsilon = 1e-6);
        assert_relative_eq!(three, 3.0_f32.ln(), epsilon = 1e-6);
        assert!(one < two && two < three);
    }

    #[test]
    fn repeated_direction_stays_at_zero_entropy() {
        let mut h = DirectionHistogram::new(8);
        for _ in 0..100 {
            h.insert(&Vector3::new(0.577, 0.577, 0.577), 2.0);
        }
        assert_eq!(h.entropy(), 0.0);
        assert_relative_eq!(h.total_weight(), 200.0, epsilon = 1e-3);
    }

    #[test]
    fn unnormalized_directions_share_a_bin() {
        let mut h = DirectionHistogram::new(8);
        h.insert(&Vector3::new(0.0, 0.0, 1.0), 1.0);
        h.insert(&Vector3::new(0.0, 0.0, 10.0), 1.0);
        assert_eq!(h.entropy(), 0.0);
    }

    #[test]
    fn ignores_degenerate_input() {
        let mut h = DirectionHistogram::new(8);
        h.insert(&Vector3::new(f32::NAN, 0.0, 0.0), 1.0);
        h.insert(&Vector3::new(0.0, 0.0, 1.0), 0.0);
        h.insert(&Vector3::new(0.0, 0.0, 1.0), -2.0);
        assert_eq!(h.total_weight(), 0.0);
    }

    #[test]
    fn cross_product_order_does_not_matter() {
        let a = Vector3::new(1.0, 0.0, 0.0);
        let b = Vector3::new(0.0, 1.0, 0.0);

        let mut forward = DirectionHistogram::new(8);
        forward.insert_cross_product(&a, &b, CrossProductWeight::Magnitude);
        let mut reverse = DirectionHistogram::new(8);
        reverse.insert_cross_product(&b, &a, CrossProductWeight::Magnitude);

        assert_eq!(forward.bins(), reverse.bins());
        assert_relative_eq!(forward.total_weight(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn parallel_normals_contribute_nothing() {
        let a = Vector3::new(0.0, 0.0, 1.0);
        let mut h = DirectionHistogram::new(8);
        h.insert_cross_product(&a, &a, CrossProductWeight::Unit);
        h.insert_cross_product(&a, &-a, CrossProductWeight::Unit);
        assert_eq!(h.total_weight(), 0.0);
    }

    #[test]
    fn magnitude_weighting_tracks_pair_angle() {
        let a = Vector3::new(1.0, 0.0, 0.0);
        let b = Vector3::new(0.5_f32.sqrt(), 0.5_f32.sqrt(), 0.0); // 45 degrees

        let mut h = DirectionHistogram::new(8);
        h.insert_cross_product(&a, &b, CrossProductWeight::Magnitude);
        assert_relative_eq!(h.total_weight(), 0.5_f32.sqrt(), epsilon = 1e-6);

        let mut h2 = DirectionHistogram::new(8);
        h2.insert_cross_product(&a, &b, CrossProductWeight::MagnitudeSquared);
        assert_relative_eq!(h2.total_weight(), 0.5, epsilon = 1e-6);
    }

    #[test]
    fn merge_accumulates_bins() {
        let mut a = DirectionHistogram::new(8);
        a.insert(&Vector3::new(0.0, 0.0, 1.0), 2.0);
        let mut b = DirectionHistogram::new(8);
        b.insert(&Vector3::new(1.0, 0.0, 0.0), 3.0);

        a.merge(&b);
        assert_relative_eq!(a.total_weight(), 5.0, epsilon = 1e-6);
        let expected = -(0.4_f32 * 0.4_f32.ln() + 0.6 * 0.6_f32.ln());
        assert_relative_eq!(a.entropy(), expected, epsilon = 1e-6);
    }

    #[test]
    fn reset_clears_weight_but_keeps_layout() {
        let mut h = DirectionHistogram::new(4);
        h.insert(&Vector3::new(0.0, 1.0, 0.0), 1.0);
        h.reset();
        assert_eq!(h.total_weight(), 0.0);
        assert_eq!(h.bin_count(), 4 * 8);
        assert_eq!(h.entropy(), 0.0);
    }
}
