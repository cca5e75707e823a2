//! Keypoint detection pipeline.
//!
//! [`KeypointDetector`] owns the octree index, the scratch state of
//! every stage, and the detected features. One `compute` call runs the
//! full pipeline over an input cloud:
//!
//! ```text
//! insert points -> sampling maps -> normals -> saliency
//!     -> candidates -> non-maximum suppression
//!     -> (optional) mean shift -> descriptors
//! ```
//!
//! The detector is reusable across clouds; `reset` happens implicitly at
//! the start of every `compute` and arena allocations are kept warm.

use std::time::Instant;

use log::{debug, info};
use nalgebra::Vector3;

use crate::config::{ConfigError, DetectorConfig};
use crate::core::PointSource;
use crate::descriptor::DescriptorBuilder;
use crate::extraction::MaximaExtractor;
use crate::features::{Feature, InterestPoint};
use crate::localization::LocalizationRefiner;
use crate::normals::compute_normals;
use crate::octree::{Octree, PointOrigin};
use crate::saliency::SaliencyField;

/// Collaborator that contributes artificial padding points during the
/// build phase.
///
/// Surface borders bias normals and entropy outward; a collaborator that
/// knows where the borders are (a range image pipeline, a sensor
/// frustum model) can pad them. Padding points are inserted with
/// artificial origin, so they support descriptors and suppression but
/// never become features themselves.
pub trait BorderAugmenter {
    /// Positions to insert with artificial origin.
    fn border_points(&mut self) -> Vec<Vector3<f32>>;
}

/// Sparse 3D interest point detector over unorganized point clouds.
pub struct KeypointDetector {
    config: DetectorConfig,
    viewpoint: Vector3<f32>,
    octree: Octree,
    saliency: SaliencyField,
    extractor: MaximaExtractor,
    refiner: LocalizationRefiner,
    builder: DescriptorBuilder,
    features: Vec<Feature>,
}

impl KeypointDetector {
    /// Create a detector, validating the configuration up front.
    pub fn new(config: DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            viewpoint: Vector3::zeros(),
            octree: Octree::new(&config),
            saliency: SaliencyField::new(&config),
            extractor: MaximaExtractor::new(),
            refiner: LocalizationRefiner::new(),
            builder: DescriptorBuilder::new(),
            features: Vec::new(),
            config,
        })
    }

    /// Sensor position the input was observed from. Defaults to the
    /// origin; set it before `compute` so normals face the right way.
    pub fn set_viewpoint(&mut self, viewpoint: Vector3<f32>) {
        self.viewpoint = viewpoint;
    }

    /// Current sensor viewpoint.
    #[inline]
    pub fn viewpoint(&self) -> Vector3<f32> {
        self.viewpoint
    }

    /// Active configuration.
    #[inline]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Run the full pipeline over `cloud` and return the features.
    pub fn compute<S: PointSource + ?Sized>(&mut self, cloud: &S) -> &[Feature] {
        self.compute_inner(cloud, None)
    }

    /// Like [`KeypointDetector::compute`], with a border augmenter that
    /// may pad the cloud with artificial points. The augmenter only runs
    /// when `add_border_points` is set.
    pub fn compute_with_border<S: PointSource + ?Sized>(
        &mut self,
        cloud: &S,
        augmenter: &mut dyn BorderAugmenter,
    ) -> &[Feature] {
        self.compute_inner(cloud, Some(augmenter))
    }

    fn compute_inner<S: PointSource + ?Sized>(
        &mut self,
        cloud: &S,
        mut augmenter: Option<&mut dyn BorderAugmenter>,
    ) -> &[Feature] {
        let started = Instant::now();
        self.octree.reset();
        self.features.clear();

        let mut skipped = 0usize;
        for index in 0..cloud.len() {
            let position = cloud.position(index);
            let target = self.target_extent(&position);
            let inserted = self.octree.insert(
                &position,
                cloud.color(index),
                PointOrigin::Measured,
                Some(index as u32),
                target,
            );
            if inserted.is_none() {
                skipped += 1;
            }
        }
        if self.config.add_border_points
            && let Some(augmenter) = augmenter.as_deref_mut()
        {
            for position in augmenter.border_points() {
                let target = self.target_extent(&position);
                let _ = self.octree.insert(&position, None, PointOrigin::Artificial, None, target);
            }
        }
        self.octree.rebuild_sampling();
        debug!(
            "octree built: {} nodes from {} points ({} skipped)",
            self.octree.node_count(),
            cloud.len(),
            skipped
        );

        let stable = compute_normals(&mut self.octree, &self.viewpoint, &self.config);
        debug!("normals: {stable} stable");

        let scored = self.saliency.compute(&mut self.octree, &self.viewpoint, &self.config);
        debug!("saliency: {scored} nodes scored");

        let candidates = self.extractor.select_candidates(&mut self.octree, &self.config);
        let found = self.extractor.suppress(&mut self.octree, &self.config);
        debug!("extraction: {candidates} candidates, {found} maxima");

        for i in 0..self.extractor.found().len() {
            let id = self.extractor.found()[i];
            let mut feature =
                self.builder.build_for_node(&self.octree, &self.config, &self.viewpoint, id);
            if self.config.improved_localization {
                let refined = self.refiner.refine(
                    &self.octree,
                    &self.config,
                    feature.position,
                    feature.radius,
                );
                if refined != feature.position {
                    feature = self.builder.build_at(
                        &self.octree,
                        &self.config,
                        &self.viewpoint,
                        refined,
                        feature.entropy,
                        feature.point_index,
                    );
                }
            }
            self.features.push(feature);
        }

        info!(
            "detected {} features from {} points in {:.1?}",
            self.features.len(),
            cloud.len(),
            started.elapsed()
        );
        &self.features
    }

    /// Features from the last `compute` call, in extraction order.
    #[inline]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Compact `(position, strength)` view of the current features.
    pub fn interest_points(&self) -> Vec<InterestPoint> {
        self.features.iter().map(InterestPoint::from).collect()
    }

    /// The feature closest to `position`, if any were detected.
    pub fn nearest_feature(&self, position: &Vector3<f32>) -> Option<&Feature> {
        self.features
            .iter()
            .min_by(|a, b| a.distance_squared(position).total_cmp(&b.distance_squared(position)))
    }

    /// Build a descriptor-only feature for one input point of the last
    /// computed cloud. The feature carries no entropy score. Returns
    /// `None` for an out-of-range index or a non-finite position.
    pub fn feature_for_point<S: PointSource + ?Sized>(
        &mut self,
        cloud: &S,
        index: usize,
    ) -> Option<Feature> {
        if index >= cloud.len() {
            return None;
        }
        let position = cloud.position(index);
        if !position.iter().all(|c| c.is_finite()) {
            return None;
        }
        Some(self.builder.build_at(
            &self.octree,
            &self.config,
            &self.viewpoint,
            position,
            0.0,
            Some(index as u32),
        ))
    }

    /// Read access to the spatial index of the last computed cloud.
    #[inline]
    pub fn octree(&self) -> &Octree {
        &self.octree
    }

    /// Clear the index and the feature set, keeping allocations.
    pub fn reset(&mut self) {
        self.octree.reset();
        self.features.clear();
    }

    /// Reallocate the node arena (and its histogram pool) for
    /// `node_capacity` nodes. Implies a reset.
    pub fn resize(&mut self, node_capacity: usize) {
        self.config.node_capacity = node_capacity;
        self.octree.resize(node_capacity, self.config.histogram_bins);
        self.features.clear();
    }

    fn target_extent(&self, position: &Vector3<f32>) -> f32 {
        if self.config.limit_resolution {
            let distance_squared = (position - self.viewpoint).norm_squared();
            (self.config.accuracy_factor * distance_squared).max(self.config.min_cell_extent)
        } else {
            self.config.min_cell_extent
        }
    }
}
