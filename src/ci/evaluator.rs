use std::fmt::Write as _;

use colored::Colorize;
use tracing::debug;

use crate::analysis::ImageMetrics;
use crate::ci::rule::{Rule, RuleConfigError, RuleResult, RuleStatus};
use crate::ci::rules::build_rules;
use crate::config::RuleThresholds;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug)]
pub struct Evaluator {
    rules: Vec<Box<dyn Rule>>,
}

impl Evaluator {
    pub fn new(rules: Vec<Box<dyn Rule>>) -> Self {
        Evaluator { rules }
    }

    pub fn from_thresholds(thresholds: &RuleThresholds) -> Result<Self, RuleConfigError> {
        Ok(Evaluator::new(build_rules(thresholds)?))
    }

    pub fn evaluate(&self, metrics: &ImageMetrics) -> Evaluation {
        let mut results: Vec<RuleResult> = self
            .rules
            .iter()
            .map(|rule| {
                let result = rule.evaluate(metrics);
                debug!(
                    "Rule '{}' ({}): {}",
                    rule.key(),
                    rule.configuration(),
                    result.status
                );
                result
            })
            .collect();
        results.sort_by_key(|result| result.key);

        let mut tally = Tally {
            total: results.len(),
            ..Tally::default()
        };
        for result in &results {
            match result.status {
                RuleStatus::Passed => tally.passed += 1,
                RuleStatus::Failed => tally.failed += 1,
                RuleStatus::Disabled => tally.skipped += 1,
            }
        }
        Evaluation { results, tally }
    }
}

/// Outcome of one evaluation, results sorted by rule key.
#[derive(Debug, Clone)]
pub struct Evaluation {
    results: Vec<RuleResult>,
    tally: Tally,
}

impl Evaluation {
    pub fn passed(&self) -> bool {
        self.tally.failed == 0
    }

    pub fn results(&self) -> &[RuleResult] {
        &self.results
    }

    pub fn tally(&self) -> Tally {
        self.tally
    }

    pub fn report(&self, colorize: bool) -> String {
        let mut out = String::new();
        for result in &self.results {
            let status = result.status.to_string();
            let status = match (colorize, result.status) {
                (false, _) | (true, RuleStatus::Passed) => status,
                (true, RuleStatus::Failed) => status.red().bold().reversed().to_string(),
                (true, RuleStatus::Disabled) => status.blue().to_string(),
            };
            if result.message.is_empty() {
                let _ = writeln!(out, "  {status}: {}", result.key);
            } else {
                let _ = writeln!(out, "  {status}: {}: {}", result.key, result.message);
            }
        }

        let summary = format!(
            "Result:{} [Total:{}] [Passed:{}] [Failed:{}] [Skipped:{}]",
            if self.passed() { "PASS" } else { "FAIL" },
            self.tally.total,
            self.tally.passed,
            self.tally.failed,
            self.tally.skipped
        );
        let summary = match (colorize, self.passed()) {
            (false, _) => summary,
            (true, true) => summary.green().to_string(),
            (true, false) => summary.red().to_string(),
        };
        out.push_str(&summary);
        out.push('\n');
        out
    }
}
