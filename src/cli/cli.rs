use std::path::PathBuf;

use clap::Parser;

use crate::application::data::{LogLevel, ViewMode};

/// Explore the layers of a container image and measure wasted space.
#[derive(Parser, Debug, Clone)]
#[command(version, about)]
pub struct Cli {
    /// YAML manifest describing the image layers
    pub manifest: PathBuf,
    #[clap(long, short, default_value = "warn", value_enum)]
    pub log_level: LogLevel,

    /// Analysis config file, defaults to .layerlens.yaml next to the manifest
    #[clap(long, short)]
    pub config: Option<PathBuf>,

    /// Evaluate the CI rules instead of printing the layer tree
    #[clap(long)]
    pub ci: bool,

    /// Continue despite structural errors in the image
    #[clap(long)]
    pub ignore_errors: bool,

    /// Layer to show, defaults to the last one
    #[clap(long)]
    pub layer: Option<usize>,

    #[clap(long, default_value = "layer", value_enum)]
    pub mode: ViewMode,

    /// Show kind and size columns in the tree
    #[clap(long)]
    pub attributes: bool,

    #[clap(long)]
    pub lowest_efficiency: Option<String>,
    #[clap(long)]
    pub highest_wasted_bytes: Option<String>,
    #[clap(long)]
    pub highest_user_wasted_percent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_for_a_bare_manifest() {
        let cli = Cli::try_parse_from(["layerlens", "image.yaml"]).unwrap();
        assert_eq!(cli.manifest, PathBuf::from("image.yaml"));
        assert!(matches!(cli.log_level, LogLevel::Warn));
        assert_eq!(cli.mode, ViewMode::Layer);
        assert!(!cli.ci && !cli.ignore_errors && !cli.attributes);
        assert!(cli.config.is_none() && cli.layer.is_none());
    }

    #[test]
    fn every_flag_is_accepted() {
        let cli = Cli::try_parse_from([
            "layerlens",
            "image.yaml",
            "--log-level",
            "silent",
            "--config",
            "ci.yaml",
            "--ci",
            "--ignore-errors",
            "--layer",
            "2",
            "--mode",
            "aggregated",
            "--attributes",
            "--lowest-efficiency",
            "0.8",
            "--highest-wasted-bytes",
            "disabled",
            "--highest-user-wasted-percent",
            "0.2",
        ])
        .unwrap();
        assert!(matches!(cli.log_level, LogLevel::Silent));
        assert_eq!(cli.config, Some(PathBuf::from("ci.yaml")));
        assert!(cli.ci && cli.ignore_errors && cli.attributes);
        assert_eq!(cli.layer, Some(2));
        assert_eq!(cli.mode, ViewMode::Aggregated);
        assert_eq!(cli.lowest_efficiency.as_deref(), Some("0.8"));
        assert_eq!(cli.highest_wasted_bytes.as_deref(), Some("disabled"));
        assert_eq!(cli.highest_user_wasted_percent.as_deref(), Some("0.2"));
    }

    #[test]
    fn manifest_is_required() {
        assert!(Cli::try_parse_from(["layerlens"]).is_err());
    }
}
