//! Rule evaluation: pure, deterministic, order-preserving.

use std::cell::OnceCell;

use super::rule::Rule;
use super::set::RuleSet;
use crate::domain::{Finding, RawConfig};

/// Rules whose best-practice marker is absent from `text`, in rule order.
pub fn missing_practices<'a>(text: &'a str, rules: &'a RuleSet) -> impl Iterator<Item = &'a Rule> {
    let folded = OnceCell::new();
    rules
        .rules()
        .iter()
        .filter(move |rule| !rule.marker_present(text, &folded))
}

/// Evaluate a fetched configuration against `rules`.
///
/// One finding per rule whose marker is absent, ordered as the rules are
/// configured. Absence of a marker is a finding, never an error.
pub fn evaluate(config: &RawConfig, rules: &RuleSet) -> Vec<Finding> {
    missing_practices(&config.text, rules)
        .map(|rule| Finding {
            hostname: config.hostname.clone(),
            rule_id: rule.id().to_string(),
            recommendation: rule.recommendation().to_string(),
        })
        .collect()
}
