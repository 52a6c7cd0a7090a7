//! Alert rule and condition entities.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

use klaxon_common::types::{AlertNotice, Severity};

use crate::expr;

/// A single predicate with an attached severity and message template.
#[derive(Debug, Clone)]
pub struct AlertCondition {
    pub id: String,
    pub device: String,
    /// One of the six comparators, or a compound `AND`/`OR` expression
    /// whose atoms are three-token comparisons.
    pub operator: String,
    pub threshold: i64,
    pub message_template: String,
    pub level: Severity,
}

/// An alert rule: the topics it depends on and the conditions evaluated
/// whenever any of them receives a fresh reading.
///
/// The rule is only evaluable when the value cache holds a fresh, valid
/// entry for every topic in `topics`. The per-condition `last_fired` map is
/// the rule's own short-term debounce, distinct from (and lock-disjoint
/// with) the manager's global limiter.
#[derive(Debug)]
pub struct AlertRule {
    pub id: String,
    pub topics: Vec<String>,
    pub table: String,
    pub field: String,
    pub category: String,
    pub machine: String,
    pub conditions: Vec<AlertCondition>,
    /// Minimum spacing between two triggers of the same condition.
    pub cooldown: Duration,
    last_fired: Mutex<HashMap<String, Instant>>,
}

impl AlertRule {
    /// Creates a rule. A zero cooldown is bootstrapped from the rule's
    /// maximum condition severity: 30s critical, 60s error, 300s warning.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        topics: Vec<String>,
        table: String,
        field: String,
        category: String,
        machine: String,
        conditions: Vec<AlertCondition>,
        cooldown: Duration,
    ) -> Self {
        let cooldown = if cooldown.is_zero() {
            default_cooldown(max_severity(&conditions))
        } else {
            cooldown
        };
        Self {
            id,
            topics,
            table,
            field,
            category,
            machine,
            conditions,
            cooldown,
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    pub fn max_severity(&self) -> Severity {
        max_severity(&self.conditions)
    }

    /// Runs one condition against coerced snapshot values.
    ///
    /// Returns the serialised alert notice when the predicate holds and the
    /// condition's debounce window has elapsed.
    pub fn evaluate(
        &self,
        condition: &AlertCondition,
        values: &HashMap<String, f64>,
        now: Instant,
    ) -> Option<String> {
        if !expr::evaluate(condition, values) {
            return None;
        }
        if !self.debounce(&condition.id, now) {
            return None;
        }
        let current = values.get(&condition.device).copied().unwrap_or_default();
        Some(self.render_notice(condition, current))
    }

    /// Per-condition debounce: at most one trigger per cooldown period.
    /// Allowing a trigger stamps the condition in the same lock hold.
    fn debounce(&self, condition_id: &str, now: Instant) -> bool {
        let mut last_fired = self.last_fired.lock().unwrap_or_else(|e| e.into_inner());
        match last_fired.get(condition_id) {
            Some(last) if now.duration_since(*last) < self.cooldown => false,
            _ => {
                last_fired.insert(condition_id.to_string(), now);
                true
            }
        }
    }

    fn render_notice(&self, condition: &AlertCondition, current: f64) -> String {
        let notice = AlertNotice {
            device: condition.device.clone(),
            current: current.round(),
            threshold: (condition.threshold as f64).round(),
            message: condition.message_template.clone(),
            severity: condition.level.to_string(),
        };
        match serde_json::to_string(&notice) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, device = %condition.device, "failed to serialise alert notice");
                "{}".to_string()
            }
        }
    }
}

fn max_severity(conditions: &[AlertCondition]) -> Severity {
    conditions
        .iter()
        .map(|c| c.level)
        .max()
        .unwrap_or(Severity::Warning)
}

fn default_cooldown(severity: Severity) -> Duration {
    match severity {
        Severity::Critical => Duration::from_secs(30),
        Severity::Error => Duration::from_secs(60),
        Severity::Warning => Duration::from_secs(300),
    }
}
