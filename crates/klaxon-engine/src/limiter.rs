//! Severity-aware alert rate limiting with exponential backoff.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use klaxon_common::types::Severity;

/// Cooldown tuning for the limiter.
#[derive(Debug, Clone, Copy)]
pub struct LimiterConfig {
    pub warning_cooldown: Duration,
    pub error_cooldown: Duration,
    pub critical_cooldown: Duration,
    /// Upper bound on the backoff multiplier.
    pub backoff_cap: u32,
    /// Quiet period, in multiples of the base cooldown, after which the
    /// trigger count resets.
    pub reset_factor: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            warning_cooldown: Duration::from_secs(300),
            error_cooldown: Duration::from_secs(60),
            critical_cooldown: Duration::from_secs(30),
            backoff_cap: 8,
            reset_factor: 4,
        }
    }
}

impl LimiterConfig {
    pub fn base_cooldown(&self, severity: Severity) -> Duration {
        match severity {
            Severity::Warning => self.warning_cooldown,
            Severity::Error => self.error_cooldown,
            Severity::Critical => self.critical_cooldown,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TriggerRecord {
    last: Instant,
    count: u32,
}

/// Per-(rule, severity) trigger bookkeeping.
///
/// `should_trigger` is a pure read; callers that go on to emit an alert
/// must follow up with `mark_triggered`. Both take the caller's `now` so
/// the decision and the bookkeeping agree on one instant. State lives
/// behind a dedicated mutex that is never held across I/O.
pub struct AlertLimiter {
    config: LimiterConfig,
    state: Mutex<HashMap<String, TriggerRecord>>,
}

impl AlertLimiter {
    pub fn new(config: LimiterConfig) -> Self {
        Self {
            config,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Whether an alert for `key` may fire at `now`.
    pub fn should_trigger(&self, key: &str, severity: Severity, now: Instant) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match state.get(key) {
            None => true,
            Some(record) => {
                now.duration_since(record.last) > self.cooldown(severity, record.count)
            }
        }
    }

    /// Records a trigger for `key`.
    ///
    /// A quiet period longer than `reset_factor x base` resets the trigger
    /// count before it is incremented, so isolated storms do not leave the
    /// key in permanent backoff.
    pub fn mark_triggered(&self, key: &str, severity: Severity, now: Instant) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let reset_after = self.config.base_cooldown(severity) * self.config.reset_factor;
        let record = state.entry(key.to_string()).or_insert(TriggerRecord {
            last: now,
            count: 0,
        });
        if now.duration_since(record.last) > reset_after {
            record.count = 0;
        }
        record.count += 1;
        record.last = now;
    }

    /// Effective cooldown: `clamp(base, base * 2^count, cap * base)`.
    fn cooldown(&self, severity: Severity, count: u32) -> Duration {
        let base = self.config.base_cooldown(severity);
        let factor = 1u32
            .checked_shl(count)
            .map_or(self.config.backoff_cap, |f| f.min(self.config.backoff_cap));
        base * factor.max(1)
    }
}
