use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::string::FromUtf8Error;

use compio::fs;
use hashlink::LinkedHashMap;
use saphyr::{LoadableYamlNode, Scalar, Yaml};
use snafu::prelude::*;
use tracing::{debug, warn};

use crate::filesystem::MissingTargetPolicy;

pub const CONFIG_FILE_NAME: &str = ".layerlens.yaml";

pub const LOWEST_EFFICIENCY: &str = "lowestEfficiency";
pub const HIGHEST_WASTED_BYTES: &str = "highestWastedBytes";
pub const HIGHEST_USER_WASTED_PERCENT: &str = "highestUserWastedPercent";

/// Raw CI thresholds, kept as text until the rules parse them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleThresholds {
    pub lowest_efficiency: String,
    pub highest_wasted_bytes: String,
    pub highest_user_wasted_percent: String,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        RuleThresholds {
            lowest_efficiency: "0.9".to_string(),
            highest_wasted_bytes: "disabled".to_string(),
            highest_user_wasted_percent: "0.1".to_string(),
        }
    }
}

impl RuleThresholds {
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            (LOWEST_EFFICIENCY, self.lowest_efficiency.as_str()),
            (HIGHEST_WASTED_BYTES, self.highest_wasted_bytes.as_str()),
            (
                HIGHEST_USER_WASTED_PERCENT,
                self.highest_user_wasted_percent.as_str(),
            ),
        ]
        .into_iter()
    }

    fn slot(&mut self, key: &str) -> Option<&mut String> {
        match key {
            LOWEST_EFFICIENCY => Some(&mut self.lowest_efficiency),
            HIGHEST_WASTED_BYTES => Some(&mut self.highest_wasted_bytes),
            HIGHEST_USER_WASTED_PERCENT => Some(&mut self.highest_user_wasted_percent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisConfig {
    pub rules: RuleThresholds,
    pub ignore_errors: bool,
    pub missing_target: MissingTargetPolicy,
}

impl AnalysisConfig {
    /// Reads `explicit` when given, otherwise the default file next to the manifest.
    ///
    /// Only a missing default file falls back to defaults.
    pub async fn read(
        explicit: Option<&Path>,
        manifest_dir: &Path,
    ) -> Result<Self, AnalysisConfigError> {
        if let Some(path) = explicit {
            return Self::from_path(path).await;
        }

        let path = default_config_path(manifest_dir);
        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(AnalysisConfig::default());
        }
        Self::from_path(&path).await
    }

    pub async fn from_path(path: &Path) -> Result<Self, AnalysisConfigError> {
        debug!("Reading config file: {}", path.display());
        let bytes = fs::read(path).await.context(ReadSnafu {
            file_path: path.display().to_string(),
        })?;
        let contents = String::from_utf8(bytes).context(EncodingSnafu {
            file_path: path.display().to_string(),
        })?;
        contents.as_str().try_into()
    }

    fn apply_rules(
        &mut self,
        rules: &LinkedHashMap<Yaml, Yaml>,
    ) -> Result<(), AnalysisConfigError> {
        for (key, value) in rules {
            let Some(key) = key.as_str() else {
                warn!("Skipping non-string rule key: {:?}", key);
                continue;
            };
            let Some(slot) = self.rules.slot(key) else {
                warn!("Skipping unknown rule '{}'", key);
                continue;
            };
            if value.is_null() {
                continue;
            }
            *slot = scalar_text(value).context(InvalidValueSnafu {
                key: format!("rules.{key}"),
            })?;
        }
        Ok(())
    }

    fn apply_analysis(
        &mut self,
        analysis: &LinkedHashMap<Yaml, Yaml>,
    ) -> Result<(), AnalysisConfigError> {
        if let Some(value) = analysis.get(&key("ignoreErrors")) {
            self.ignore_errors = value.as_bool().context(InvalidValueSnafu {
                key: "analysis.ignoreErrors",
            })?;
        }
        if let Some(value) = analysis.get(&key("missingWhiteoutTarget")) {
            let text = value.as_str().context(InvalidValueSnafu {
                key: "analysis.missingWhiteoutTarget",
            })?;
            self.missing_target =
                MissingTargetPolicy::parse(text).context(UnknownPolicySnafu { value: text })?;
        }
        Ok(())
    }
}

impl TryFrom<&str> for AnalysisConfig {
    type Error = AnalysisConfigError;

    fn try_from(contents: &str) -> Result<Self, Self::Error> {
        let documents = Yaml::load_from_str(contents).context(ParseSnafu)?;
        let mut config = AnalysisConfig::default();
        let Some(document) = documents.first() else {
            return Ok(config);
        };

        let top_level = document
            .as_mapping()
            .ok_or(AnalysisConfigError::TopLevelNotMap)?;

        if let Some(rules) = section(top_level, "rules")? {
            config.apply_rules(rules)?;
        }
        if let Some(analysis) = section(top_level, "analysis")? {
            config.apply_analysis(analysis)?;
        }
        Ok(config)
    }
}

pub fn default_config_path(manifest_dir: &Path) -> PathBuf {
    manifest_dir.join(CONFIG_FILE_NAME)
}

fn key(name: &'static str) -> Yaml<'static> {
    Yaml::Value(Scalar::String(Cow::Borrowed(name)))
}

fn section<'a, 'input>(
    top_level: &'a LinkedHashMap<Yaml<'input>, Yaml<'input>>,
    name: &'static str,
) -> Result<Option<&'a LinkedHashMap<Yaml<'input>, Yaml<'input>>>, AnalysisConfigError> {
    match top_level.get(&key(name)) {
        None => Ok(None),
        Some(value) if value.is_null() => Ok(None),
        Some(value) => value
            .as_mapping()
            .map(Some)
            .context(SectionNotMapSnafu { section: name }),
    }
}

/// Thresholds may be written as numbers or strings.
fn scalar_text(value: &Yaml) -> Option<String> {
    match value {
        Yaml::Value(Scalar::String(text)) => Some(text.to_string()),
        Yaml::Value(Scalar::Integer(number)) => Some(number.to_string()),
        Yaml::Value(Scalar::FloatingPoint(number)) => Some(number.0.to_string()),
        Yaml::Value(Scalar::Boolean(flag)) => Some(flag.to_string()),
        _ => None,
    }
}

#[derive(Debug, Snafu)]
pub enum AnalysisConfigError {
    #[snafu(display("Failed to read the config file: {}", file_path))]
    ReadError {
        file_path: String,
        source: std::io::Error,
    },
    #[snafu(display("Config file {} is not valid UTF-8", file_path))]
    EncodingError {
        file_path: String,
        source: FromUtf8Error,
    },
    #[snafu(display("Failed to parse the config file"))]
    ParseError { source: saphyr::ScanError },
    #[snafu(display("Top level of config should be a map"))]
    TopLevelNotMap,
    #[snafu(display("Section '{}' should be a map", section))]
    SectionNotMap { section: String },
    #[snafu(display("Invalid value for '{}'", key))]
    InvalidValue { key: String },
    #[snafu(display("Unknown missing whiteout target policy '{}'", value))]
    UnknownPolicy { value: String },
}
