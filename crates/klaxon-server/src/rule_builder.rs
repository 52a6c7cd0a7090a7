//! Rule document -> engine rule conversion.

use std::collections::HashSet;
use std::time::Duration;

use tracing::warn;

use klaxon_common::types::Severity;
use klaxon_engine::rule::{AlertCondition, AlertRule};
use klaxon_source::{ConditionSpec, RuleSpec};

/// Converts one spec, skipping conditions with unknown severity levels.
pub fn build_rule(spec: RuleSpec) -> AlertRule {
    let mut conditions = Vec::with_capacity(spec.conditions.len());
    for condition in spec.conditions {
        let id = condition.id.clone();
        let level = condition.level;
        match build_condition(condition) {
            Some(c) => conditions.push(c),
            None => {
                warn!(
                    rule_id = %spec.id,
                    condition_id = %id,
                    level,
                    "skipping condition with unknown severity level"
                );
            }
        }
    }
    AlertRule::new(
        spec.id,
        spec.topics,
        spec.table,
        spec.field,
        spec.category,
        spec.machine,
        conditions,
        Duration::from_secs(spec.throttle_secs),
    )
}

fn build_condition(spec: ConditionSpec) -> Option<AlertCondition> {
    let level = Severity::try_from(spec.level).ok()?;
    Some(AlertCondition {
        id: spec.id,
        device: spec.device,
        operator: spec.operator,
        threshold: spec.threshold,
        message_template: spec.message_template,
        level,
    })
}

/// Converts a full document. Duplicate rule ids keep the first occurrence.
pub fn build_rules(specs: Vec<RuleSpec>) -> Vec<AlertRule> {
    let mut seen = HashSet::new();
    let mut rules = Vec::with_capacity(specs.len());
    for spec in specs {
        if !seen.insert(spec.id.clone()) {
            warn!(rule_id = %spec.id, "duplicate rule id in document, skipping");
            continue;
        }
        rules.push(build_rule(spec));
    }
    rules
}
