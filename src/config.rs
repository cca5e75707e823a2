//! Detector configuration.
//!
//! The configuration is immutable during a detection run; the pipeline
//! stages receive it by reference. Metric rates (in meters) are the
//! primary knobs, and the octree depths that realize them are derived
//! fields kept consistent by the `with_*` builders. All fields are public
//! for serialization, so [`DetectorConfig::validate`] is the authority on
//! whether a hand-assembled configuration is usable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How per-node saliency entropy is computed from neighborhood normals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntropyMode {
    /// Merge the neighborhood's normal histograms and take their entropy.
    #[default]
    MergedHistograms,
    /// Histogram of cross products between a reference normal (at the
    /// neighborhood center) and each neighbor normal.
    CrossProductsToReference,
    /// Histogram of cross products over all unordered neighbor pairs.
    PairwiseCrossProducts,
}

/// Weighting policy for cross-product samples inserted into a histogram.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossProductWeight {
    /// Every sample counts 1.
    Unit,
    /// Weight by `|a × b|`, the sine of the pair angle.
    #[default]
    Magnitude,
    /// Weight by `|a × b|²`.
    MagnitudeSquared,
}

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A length, rate, or radius that must be strictly positive was not.
    #[error("{name} must be positive, got {value}")]
    NonPositive {
        /// Offending field.
        name: &'static str,
        /// Rejected value.
        value: f32,
    },
    /// A threshold or factor that must not be negative was negative.
    #[error("{name} must not be negative, got {value}")]
    Negative {
        /// Offending field.
        name: &'static str,
        /// Rejected value.
        value: f32,
    },
    /// The minimum cell extent does not fit under the root cube.
    #[error("minimum cell extent {min_cell} m must be smaller than the root extent {root} m")]
    CellLargerThanRoot {
        /// Configured minimum cell extent.
        min_cell: f32,
        /// Configured root extent.
        root: f32,
    },
    /// A sampling rate resolves to a depth the octree cannot reach.
    #[error("{name} of {rate} m resolves to depth {depth}, beyond the octree maximum {max_depth}")]
    DepthOutOfRange {
        /// Offending rate field.
        name: &'static str,
        /// Rejected rate in meters.
        rate: f32,
        /// Depth the rate resolves to.
        depth: u32,
        /// Deepest level the extents allow.
        max_depth: u32,
    },
    /// The direction histogram is too coarse to discretize the sphere.
    #[error("direction histogram needs at least 2 elevation rows, got {0}")]
    TooFewHistogramBins(usize),
    /// The node arena would not be able to hold a single node.
    #[error("node capacity must be nonzero")]
    ZeroNodeCapacity,
}

/// Tuning parameters for [`KeypointDetector`](crate::KeypointDetector).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Edge length of the root cube, centered on the origin (m).
    pub root_extent: f32,
    /// Smallest octree cell edge; bounds the subdivision depth (m).
    pub min_cell_extent: f32,
    /// Coarsen cells with distance from the viewpoint.
    pub limit_resolution: bool,
    /// Target cell extent per squared meter of viewpoint distance when
    /// resolution limiting is on (m / m²).
    pub accuracy_factor: f32,
    /// Target cell edge at which features are sampled (m).
    pub sampling_rate: f32,
    /// Octree depth realizing `sampling_rate`; derived.
    pub sampling_depth: u32,
    /// Target cell edge at which normals are estimated (m).
    pub normal_sampling_rate: f32,
    /// Octree depth realizing `normal_sampling_rate`; derived.
    pub normal_sampling_depth: u32,
    /// Edge of the support volume for a single normal estimate (m).
    pub normal_scale: f32,
    /// Half of `normal_scale`; derived (m).
    pub normal_scale_radius: f32,
    /// Edge of the support volume for entropy and descriptors (m).
    pub histogram_size: f32,
    /// Half of `histogram_size`; derived (m).
    pub histogram_radius: f32,
    /// Elevation rows of the direction histogram (azimuth uses twice as
    /// many columns).
    pub histogram_bins: usize,
    /// Saliency threshold; nodes below it never become features.
    pub minimum_entropy: f32,
    /// Cornerness threshold; `0` disables the cornerness gate.
    pub minimum_cornerness: f32,
    /// Suppression radius between competing feature candidates (m).
    pub feature_influence_radius: f32,
    /// Saliency entropy mode.
    pub entropy_mode: EntropyMode,
    /// Weighting of cross-product histogram samples.
    pub cross_product_weight: CrossProductWeight,
    /// Refine feature positions with mean shift after extraction.
    pub improved_localization: bool,
    /// Mean-shift rounds per feature when localization is on.
    pub mean_shift_rounds: usize,
    /// Exclude background-classified nodes from feature extraction.
    pub ignore_background: bool,
    /// Ask the border augmenter for artificial support points.
    pub add_border_points: bool,
    /// Maximum number of octree nodes the arena may allocate.
    pub node_capacity: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            root_extent: 51.2,             // m, covers indoor sensor range
            min_cell_extent: 0.0125,       // m, depth 12 under the default root
            limit_resolution: true,
            accuracy_factor: 0.005,        // 2 cm cells at 2 m distance
            sampling_rate: 0.04,           // m
            sampling_depth: 10,
            normal_sampling_rate: 0.02,    // m
            normal_sampling_depth: 11,
            normal_scale: 0.06,            // m
            normal_scale_radius: 0.03,     // m
            histogram_size: 0.24,          // m
            histogram_radius: 0.12,        // m
            histogram_bins: 8,             // 8 x 16 sphere bins
            minimum_entropy: 0.6,
            minimum_cornerness: 0.0,       // gate off
            feature_influence_radius: 0.12, // m
            entropy_mode: EntropyMode::default(),
            cross_product_weight: CrossProductWeight::default(),
            improved_localization: false,
            mean_shift_rounds: 3,
            ignore_background: true,
            add_border_points: false,
            node_capacity: 1 << 18,
        }
    }
}

impl DetectorConfig {
    /// Octree depth whose cell edge is closest to a metric rate.
    ///
    /// # Example
    /// ```
    /// use bindu_keypoints::DetectorConfig;
    ///
    /// // 51.2 m root, 0.05 m cells: 51.2 / 2^10 = 0.05
    /// assert_eq!(DetectorConfig::depth_for_rate(51.2, 0.05), 10);
    /// ```
    #[inline]
    pub fn depth_for_rate(root_extent: f32, rate: f32) -> u32 {
        if root_extent <= 0.0 || rate <= 0.0 {
            return 0;
        }
        (root_extent / rate).log2().round().max(0.0) as u32
    }

    /// Deepest level the root and minimum cell extents allow.
    #[inline]
    pub fn max_depth(&self) -> u32 {
        if self.root_extent <= 0.0 || self.min_cell_extent <= 0.0 {
            return 0;
        }
        (self.root_extent / self.min_cell_extent).log2().ceil().max(0.0) as u32
    }

    /// Set the root cube extent and re-derive the sampling depths.
    pub fn with_root_extent(mut self, extent: f32) -> Self {
        self.root_extent = extent;
        self.sampling_depth = Self::depth_for_rate(extent, self.sampling_rate);
        self.normal_sampling_depth = Self::depth_for_rate(extent, self.normal_sampling_rate);
        self
    }

    /// Set the minimum cell extent.
    pub fn with_min_cell_extent(mut self, extent: f32) -> Self {
        self.min_cell_extent = extent;
        self
    }

    /// Set the feature sampling rate and its derived depth.
    pub fn with_sampling_rate(mut self, rate: f32) -> Self {
        self.sampling_rate = rate;
        self.sampling_depth = Self::depth_for_rate(self.root_extent, rate);
        self
    }

    /// Set the normal sampling rate and its derived depth.
    pub fn with_normal_sampling_rate(mut self, rate: f32) -> Self {
        self.normal_sampling_rate = rate;
        self.normal_sampling_depth = Self::depth_for_rate(self.root_extent, rate);
        self
    }

    /// Set the normal support extent and its derived radius.
    pub fn with_normal_scale(mut self, scale: f32) -> Self {
        self.normal_scale = scale;
        self.normal_scale_radius = scale * 0.5;
        self
    }

    /// Set the entropy/descriptor support extent and its derived radius.
    pub fn with_histogram_size(mut self, size: f32) -> Self {
        self.histogram_size = size;
        self.histogram_radius = size * 0.5;
        self
    }

    /// Set the saliency threshold.
    pub fn with_minimum_entropy(mut self, entropy: f32) -> Self {
        self.minimum_entropy = entropy;
        self
    }

    /// Set the cornerness threshold (`0` disables the gate).
    pub fn with_minimum_cornerness(mut self, cornerness: f32) -> Self {
        self.minimum_cornerness = cornerness;
        self
    }

    /// Set the suppression radius between feature candidates.
    pub fn with_influence_radius(mut self, radius: f32) -> Self {
        self.feature_influence_radius = radius;
        self
    }

    /// Set the saliency entropy mode.
    pub fn with_entropy_mode(mut self, mode: EntropyMode) -> Self {
        self.entropy_mode = mode;
        self
    }

    /// Enable or disable mean-shift localization refinement.
    pub fn with_improved_localization(mut self, enabled: bool) -> Self {
        self.improved_localization = enabled;
        self
    }

    /// Set the node arena capacity.
    pub fn with_node_capacity(mut self, capacity: usize) -> Self {
        self.node_capacity = capacity;
        self
    }

    /// Check that the configuration can drive a detection run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("root_extent", self.root_extent),
            ("min_cell_extent", self.min_cell_extent),
            ("sampling_rate", self.sampling_rate),
            ("normal_sampling_rate", self.normal_sampling_rate),
            ("normal_scale", self.normal_scale),
            ("normal_scale_radius", self.normal_scale_radius),
            ("histogram_size", self.histogram_size),
            ("histogram_radius", self.histogram_radius),
            ("feature_influence_radius", self.feature_influence_radius),
        ];
        for (name, value) in positive {
            if !(value > 0.0) {
                return Err(ConfigError::NonPositive { name, value });
            }
        }
        let non_negative = [
            ("accuracy_factor", self.accuracy_factor),
            ("minimum_entropy", self.minimum_entropy),
            ("minimum_cornerness", self.minimum_cornerness),
        ];
        for (name, value) in non_negative {
            if !(value >= 0.0) {
                return Err(ConfigError::Negative { name, value });
            }
        }
        if self.min_cell_extent >= self.root_extent {
            return Err(ConfigError::CellLargerThanRoot {
                min_cell: self.min_cell_extent,
                root: self.root_extent,
            });
        }
        let max_depth = self.max_depth();
        if self.sampling_depth > max_depth {
            return Err(ConfigError::DepthOutOfRange {
                name: "sampling_rate",
                rate: self.sampling_rate,
                depth: self.sampling_depth,
                max_depth,
            });
        }
        if self.normal_sampling_depth > max_depth {
            return Err(ConfigError::DepthOutOfRange {
                name: "normal_sampling_rate",
                rate: self.normal_sampling_rate,
                depth: self.normal_sampling_depth,
                max_depth,
            });
        }
        if self.histogram_bins < 2 {
            return Err(ConfigError::TooFewHistogramBins(self.histogram_bins));
        }
        if self.node_capacity == 0 {
            return Err(ConfigError::ZeroNodeCapacity);
        }
        Ok(())
    }
}
