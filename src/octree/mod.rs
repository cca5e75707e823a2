//! Spatial index: arena-backed octree with aggregate statistics and
//! per-depth sampling maps.

pub mod arena;
pub mod index;
pub mod node;
pub mod sampling;

pub use arena::{HistogramId, HistogramPool, NodeArena, NodeId};
pub use index::Octree;
pub use node::{MaximumStatus, NodeStats, NormalStatus, OctreeNode, PointOrigin, SummedProducts};
pub use sampling::SamplingMap;
