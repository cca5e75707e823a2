//! Sparse 3D interest point detection on unorganized point clouds.
//!
//! The detector builds an adaptive octree over the input, estimates
//! surface normals from local covariance, scores every sampled region
//! with the Shannon entropy of its normal directions, and extracts
//! stable entropy maxima as features:
//!
//! ```text
//! points -> octree -> sampling maps -> normals -> entropy
//!        -> threshold + cornerness -> suppression -> features
//! ```
//!
//! Flat surfaces have aligned normals and score near zero; geometric
//! corners and cluttered structure spread the directions over the
//! sphere and score high. Every stage is deterministic: the same cloud,
//! viewpoint, and configuration reproduce the same features.
//!
//! # Example
//!
//! ```
//! use bindu_keypoints::core::PointCloud3D;
//! use bindu_keypoints::{DetectorConfig, KeypointDetector};
//! use nalgebra::Vector3;
//!
//! let config = DetectorConfig::default()
//!     .with_root_extent(3.2)
//!     .with_min_cell_extent(0.025)
//!     .with_sampling_rate(0.1)
//!     .with_normal_sampling_rate(0.05);
//! let mut detector = KeypointDetector::new(config)?;
//! detector.set_viewpoint(Vector3::new(0.0, 0.0, 1.0));
//!
//! let mut cloud = PointCloud3D::new();
//! for i in 0..20 {
//!     for j in 0..20 {
//!         cloud.push(Vector3::new(i as f32 * 0.02, j as f32 * 0.02, 0.0));
//!     }
//! }
//!
//! // A flat plane has no corners.
//! let features = detector.compute(&cloud);
//! assert!(features.is_empty());
//! # Ok::<(), bindu_keypoints::ConfigError>(())
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod core;
pub mod descriptor;
pub mod detector;
pub mod extraction;
pub mod features;
pub mod localization;
pub mod normals;
pub mod octree;
pub mod saliency;

pub use crate::config::{ConfigError, CrossProductWeight, DetectorConfig, EntropyMode};
pub use crate::core::{Color, PointCloud3D, PointSource};
pub use crate::detector::{BorderAugmenter, KeypointDetector};
pub use crate::features::{Feature, InterestPoint};
