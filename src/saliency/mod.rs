//! Saliency scoring: direction histograms and entropy computation.

mod entropy;
mod histogram;

pub use entropy::SaliencyField;
pub use histogram::{DEGENERATE_CROSS_EPS, DirectionHistogram};
