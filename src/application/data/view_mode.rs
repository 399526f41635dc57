use clap::ValueEnum;

use crate::comparer::DiffMode;

/// How the explorer colors the composite tree of a layer.
#[derive(Debug, Clone, Copy, ValueEnum, Default, PartialEq, Eq)]
pub enum ViewMode {
    /// Changes made by the selected layer only
    #[default]
    Layer,
    /// Changes made by every layer up to the selected one
    Aggregated,
}

impl From<ViewMode> for DiffMode {
    fn from(mode: ViewMode) -> Self {
        match mode {
            ViewMode::Layer => DiffMode::Layer,
            ViewMode::Aggregated => DiffMode::Aggregated,
        }
    }
}
