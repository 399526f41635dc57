//! Pass/fail policy over image metrics.

mod evaluator;
mod rule;
mod rules;

pub use evaluator::{Evaluation, Evaluator, Tally};
pub use rule::{Rule, RuleConfigError, RuleError, RuleResult, RuleStatus, is_disabled};
pub use rules::{
    DisabledRule, HighestUserWastedPercentRule, HighestWastedBytesRule, LowestEfficiencyRule,
    build_rules,
};
