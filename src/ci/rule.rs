use std::fmt::Debug;
use std::num::ParseFloatError;

use derive_more::Display;
use snafu::Snafu;

use crate::analysis::ImageMetrics;
use crate::config::ByteSizeError;

const DISABLED_SENTINELS: [&str; 3] = ["disabled", "off", "none"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum RuleStatus {
    #[display("PASS")]
    Passed,
    #[display("FAIL")]
    Failed,
    #[display("SKIP")]
    Disabled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleResult {
    pub key: &'static str,
    pub status: RuleStatus,
    /// Empty for passing rules.
    pub message: String,
}

/// A named CI check over an image's metrics.
pub trait Rule: Debug + Send + Sync {
    fn key(&self) -> &'static str;

    /// The threshold as it was configured.
    fn configuration(&self) -> String;

    fn evaluate(&self, metrics: &ImageMetrics) -> RuleResult;
}

/// True for `disabled`, `off` and `none`, ignoring case and surrounding space.
pub fn is_disabled(threshold: &str) -> bool {
    let threshold = threshold.trim();
    DISABLED_SENTINELS
        .iter()
        .any(|sentinel| threshold.eq_ignore_ascii_case(sentinel))
}

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum RuleError {
    #[snafu(display("Rule '{key}': '{value}' is not a number"))]
    InvalidNumberError {
        key: &'static str,
        value: String,
        source: ParseFloatError,
    },
    #[snafu(display("Rule '{key}': '{value}' is not a byte size"))]
    InvalidByteSizeError {
        key: &'static str,
        value: String,
        source: ByteSizeError,
    },
    #[snafu(display("Rule '{key}': {value} is outside of [0, 1]"))]
    OutOfRangeError { key: &'static str, value: f64 },
}

/// Every invalid threshold found while building the rule set.
#[derive(Debug, Snafu)]
#[snafu(display("{} CI rule thresholds are invalid: {}", errors.len(), summarize(errors)))]
pub struct RuleConfigError {
    pub errors: Vec<RuleError>,
}

fn summarize(errors: &[RuleError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
