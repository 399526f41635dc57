//! Waste metrics derived from the per-path write history of an image.

mod analyzer;
mod duplicate_writes;

pub use analyzer::{EfficiencyAnalyzer, ImageMetrics, Inefficiency};
pub use duplicate_writes::DuplicateWriteAnalyzer;
