use snafu::ResultExt;

use crate::analysis::ImageMetrics;
use crate::ci::rule::{
    InvalidByteSizeSnafu, InvalidNumberSnafu, Rule, RuleConfigError, RuleError, RuleResult,
    RuleStatus, is_disabled,
};
use crate::config::{
    ByteSize, HIGHEST_USER_WASTED_PERCENT, HIGHEST_WASTED_BYTES, LOWEST_EFFICIENCY,
    RuleThresholds,
};

/// Stands in for a rule whose threshold is a disabled sentinel.
#[derive(Debug, Clone)]
pub struct DisabledRule {
    key: &'static str,
    configuration: String,
}

impl Rule for DisabledRule {
    fn key(&self) -> &'static str {
        self.key
    }

    fn configuration(&self) -> String {
        self.configuration.clone()
    }

    fn evaluate(&self, _metrics: &ImageMetrics) -> RuleResult {
        RuleResult {
            key: self.key,
            status: RuleStatus::Disabled,
            message: "rule disabled".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LowestEfficiencyRule {
    threshold: f64,
}

impl Rule for LowestEfficiencyRule {
    fn key(&self) -> &'static str {
        LOWEST_EFFICIENCY
    }

    fn configuration(&self) -> String {
        self.threshold.to_string()
    }

    fn evaluate(&self, metrics: &ImageMetrics) -> RuleResult {
        if metrics.efficiency < self.threshold {
            return failed(
                self.key(),
                format!(
                    "image efficiency is too low (efficiency={} < threshold={})",
                    metrics.efficiency, self.threshold
                ),
            );
        }
        passed(self.key())
    }
}

#[derive(Debug, Clone)]
pub struct HighestWastedBytesRule {
    threshold: ByteSize,
}

impl Rule for HighestWastedBytesRule {
    fn key(&self) -> &'static str {
        HIGHEST_WASTED_BYTES
    }

    fn configuration(&self) -> String {
        self.threshold.to_string()
    }

    fn evaluate(&self, metrics: &ImageMetrics) -> RuleResult {
        if metrics.wasted_bytes > self.threshold.as_u64() {
            return failed(
                self.key(),
                format!(
                    "too many bytes wasted (wasted-bytes={} > threshold={})",
                    metrics.wasted_bytes,
                    self.threshold.as_u64()
                ),
            );
        }
        passed(self.key())
    }
}

#[derive(Debug, Clone)]
pub struct HighestUserWastedPercentRule {
    threshold: f64,
}

impl Rule for HighestUserWastedPercentRule {
    fn key(&self) -> &'static str {
        HIGHEST_USER_WASTED_PERCENT
    }

    fn configuration(&self) -> String {
        self.threshold.to_string()
    }

    fn evaluate(&self, metrics: &ImageMetrics) -> RuleResult {
        if metrics.wasted_user_percent > self.threshold {
            return failed(
                self.key(),
                format!(
                    "too many bytes wasted, relative to the user bytes added \
                     (%-user-wasted-bytes={} > threshold={})",
                    metrics.wasted_user_percent, self.threshold
                ),
            );
        }
        passed(self.key())
    }
}

/// Parses every threshold, collecting all errors before giving up.
pub fn build_rules(thresholds: &RuleThresholds) -> Result<Vec<Box<dyn Rule>>, RuleConfigError> {
    let mut rules: Vec<Box<dyn Rule>> = Vec::new();
    let mut errors = Vec::new();

    for (key, value) in thresholds.iter() {
        if is_disabled(value) {
            rules.push(Box::new(DisabledRule {
                key,
                configuration: value.trim().to_string(),
            }));
            continue;
        }
        match build_rule(key, value) {
            Ok(rule) => rules.push(rule),
            Err(error) => errors.push(error),
        }
    }

    if errors.is_empty() {
        Ok(rules)
    } else {
        Err(RuleConfigError { errors })
    }
}

fn build_rule(key: &'static str, value: &str) -> Result<Box<dyn Rule>, RuleError> {
    let rule: Box<dyn Rule> = match key {
        HIGHEST_WASTED_BYTES => {
            let threshold = ByteSize::parse(value).context(InvalidByteSizeSnafu { key, value })?;
            Box::new(HighestWastedBytesRule { threshold })
        }
        LOWEST_EFFICIENCY => Box::new(LowestEfficiencyRule {
            threshold: parse_ratio(key, value)?,
        }),
        _ => Box::new(HighestUserWastedPercentRule {
            threshold: parse_ratio(key, value)?,
        }),
    };
    Ok(rule)
}

fn parse_ratio(key: &'static str, value: &str) -> Result<f64, RuleError> {
    let ratio: f64 = value
        .trim()
        .parse()
        .context(InvalidNumberSnafu { key, value })?;
    if !(0.0..=1.0).contains(&ratio) {
        return Err(RuleError::OutOfRangeError { key, value: ratio });
    }
    Ok(ratio)
}

fn passed(key: &'static str) -> RuleResult {
    RuleResult {
        key,
        status: RuleStatus::Passed,
        message: String::new(),
    }
}

fn failed(key: &'static str, message: String) -> RuleResult {
    RuleResult {
        key,
        status: RuleStatus::Failed,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn metrics() -> ImageMetrics {
        ImageMetrics {
            size_bytes: 1000,
            user_size_bytes: 400,
            wasted_bytes: 200,
            wasted_user_percent: 0.5,
            efficiency: 0.8,
            inefficiencies: Vec::new(),
        }
    }

    fn thresholds(efficiency: &str, wasted: &str, user: &str) -> RuleThresholds {
        RuleThresholds {
            lowest_efficiency: efficiency.to_string(),
            highest_wasted_bytes: wasted.to_string(),
            highest_user_wasted_percent: user.to_string(),
        }
    }

    fn statuses(rules: &[Box<dyn Rule>], metrics: &ImageMetrics) -> Vec<(&'static str, RuleStatus)> {
        rules
            .iter()
            .map(|rule| {
                let result = rule.evaluate(metrics);
                (result.key, result.status)
            })
            .collect()
    }

    #[rstest]
    fn thresholds_decide_pass_and_fail(metrics: ImageMetrics) {
        let rules = build_rules(&thresholds("0.9", "100", "0.6")).unwrap();
        assert_eq!(
            statuses(&rules, &metrics),
            [
                (LOWEST_EFFICIENCY, RuleStatus::Failed),
                (HIGHEST_WASTED_BYTES, RuleStatus::Failed),
                (HIGHEST_USER_WASTED_PERCENT, RuleStatus::Passed),
            ]
        );

        let rules = build_rules(&thresholds("0.8", "1kB", "0.4")).unwrap();
        assert_eq!(
            statuses(&rules, &metrics),
            [
                (LOWEST_EFFICIENCY, RuleStatus::Passed),
                (HIGHEST_WASTED_BYTES, RuleStatus::Passed),
                (HIGHEST_USER_WASTED_PERCENT, RuleStatus::Failed),
            ]
        );
    }

    #[rstest]
    #[case(0.0)]
    #[case(1.0)]
    fn disabled_sentinel_ignores_metrics(#[case] efficiency: f64) {
        let metrics = ImageMetrics {
            efficiency,
            wasted_bytes: u64::MAX,
            wasted_user_percent: 100.0,
            ..ImageMetrics::default()
        };
        let rules = build_rules(&thresholds("disabled", "Off", " none ")).unwrap();
        for rule in &rules {
            let result = rule.evaluate(&metrics);
            assert_eq!(result.status, RuleStatus::Disabled);
            assert_eq!(result.message, "rule disabled");
        }
    }

    #[test]
    fn failure_message_names_both_values() {
        let rules = build_rules(&thresholds("0.9", "disabled", "disabled")).unwrap();
        let metrics = ImageMetrics {
            efficiency: 0.5,
            ..ImageMetrics::default()
        };
        let result = rules[0].evaluate(&metrics);
        assert_eq!(
            result.message,
            "image efficiency is too low (efficiency=0.5 < threshold=0.9)"
        );
    }

    #[test]
    fn invalid_thresholds_are_reported_together() {
        let error = build_rules(&thresholds("high", "lots", "1.5")).unwrap_err();
        assert_eq!(error.errors.len(), 3);
        assert!(matches!(error.errors[0], RuleError::InvalidNumberError { key: LOWEST_EFFICIENCY, .. }));
        assert!(matches!(error.errors[1], RuleError::InvalidByteSizeError { key: HIGHEST_WASTED_BYTES, .. }));
        assert!(matches!(
            error.errors[2],
            RuleError::OutOfRangeError { key: HIGHEST_USER_WASTED_PERCENT, .. }
        ));
    }

    #[test]
    fn configuration_echoes_threshold() {
        let rules = build_rules(&thresholds("0.75", "20MB", "off")).unwrap();
        let configured: Vec<String> = rules.iter().map(|rule| rule.configuration()).collect();
        assert_eq!(configured, ["0.75", "20 MB", "off"]);
    }
}
