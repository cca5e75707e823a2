//! Core geometric types shared across the pipeline.

pub mod bounds;
pub mod point;

pub use bounds::{Aabb, CubeBounds};
pub use point::{Color, PointCloud3D, PointSource};
