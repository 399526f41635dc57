use std::path::PathBuf;

use supports_color::Stream;

use crate::cli::Cli;
use crate::comparer::DiffMode;
use crate::config::RuleThresholds;

/// CI thresholds given on the command line, applied over the config file.
#[derive(Debug, Clone, Default)]
pub struct ThresholdOverrides {
    pub lowest_efficiency: Option<String>,
    pub highest_wasted_bytes: Option<String>,
    pub highest_user_wasted_percent: Option<String>,
}

impl ThresholdOverrides {
    pub fn apply(&self, rules: &mut RuleThresholds) {
        if let Some(value) = &self.lowest_efficiency {
            rules.lowest_efficiency = value.clone();
        }
        if let Some(value) = &self.highest_wasted_bytes {
            rules.highest_wasted_bytes = value.clone();
        }
        if let Some(value) = &self.highest_user_wasted_percent {
            rules.highest_user_wasted_percent = value.clone();
        }
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub manifest: PathBuf,
    pub config: Option<PathBuf>,
    pub ci: bool,
    pub ignore_errors: bool,
    pub layer: Option<usize>,
    pub mode: DiffMode,
    pub attributes: bool,
    pub colorize: bool,
    pub overrides: ThresholdOverrides,
}

impl RuntimeConfig {
    /// Directory the default analysis config is looked up in.
    pub fn manifest_dir(&self) -> PathBuf {
        self.manifest
            .parent()
            .map(PathBuf::from)
            .unwrap_or_default()
    }
}

impl From<Cli> for RuntimeConfig {
    fn from(cli: Cli) -> Self {
        Self {
            manifest: cli.manifest,
            config: cli.config,
            ci: cli.ci,
            ignore_errors: cli.ignore_errors,
            layer: cli.layer,
            mode: cli.mode.into(),
            attributes: cli.attributes,
            colorize: supports_color::on(Stream::Stdout).is_some(),
            overrides: ThresholdOverrides {
                lowest_efficiency: cli.lowest_efficiency,
                highest_wasted_bytes: cli.highest_wasted_bytes,
                highest_user_wasted_percent: cli.highest_user_wasted_percent,
            },
        }
    }
}
