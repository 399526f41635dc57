use crate::comparer::{Comparer, ComparerError};

/// A path written by more than one layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inefficiency {
    pub path: String,
    pub cumulative_size: u64,
    pub layers: Vec<usize>,
}

/// Snapshot the CI rules are evaluated against.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageMetrics {
    pub size_bytes: u64,
    /// Bytes added by every layer except the base layer.
    pub user_size_bytes: u64,
    pub wasted_bytes: u64,
    pub wasted_user_percent: f64,
    pub efficiency: f64,
    /// Sorted by ascending cumulative size.
    pub inefficiencies: Vec<Inefficiency>,
}

impl Default for ImageMetrics {
    fn default() -> Self {
        ImageMetrics {
            size_bytes: 0,
            user_size_bytes: 0,
            wasted_bytes: 0,
            wasted_user_percent: 0.0,
            efficiency: 1.0,
            inefficiencies: Vec::new(),
        }
    }
}

pub trait EfficiencyAnalyzer {
    fn analyze(&self, comparer: &Comparer) -> Result<ImageMetrics, ComparerError>;
}
