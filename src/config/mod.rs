mod analysis_config;
mod byte_size;

pub use analysis_config::{
    AnalysisConfig, AnalysisConfigError, CONFIG_FILE_NAME, HIGHEST_USER_WASTED_PERCENT,
    HIGHEST_WASTED_BYTES, LOWEST_EFFICIENCY, RuleThresholds, default_config_path,
};
pub use byte_size::{ByteSize, ByteSizeError};
