//! Rule manager: message ingress, per-rule worker fabric, hot swap.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use klaxon_common::topic::device_address;

use crate::cache::{ValueCache, ValuePolicy};
use crate::limiter::{AlertLimiter, LimiterConfig};
use crate::rule::AlertRule;
use crate::{expr, AlertSink};

/// Engine-wide tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub cache_ttl: Duration,
    pub value_policy: ValuePolicy,
    pub limiter: LimiterConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
            value_policy: ValuePolicy::default(),
            limiter: LimiterConfig::default(),
        }
    }
}

/// State shared between the manager and every worker task.
struct Core {
    cache: ValueCache,
    limiter: AlertLimiter,
    sink: Arc<dyn AlertSink>,
}

/// The active rule set and its worker fabric.
///
/// Replaced wholesale by [`RuleManager::update_rules`]; the cancellation
/// token is the scope every worker of this generation watches.
struct ActiveRules {
    rules: Vec<Arc<AlertRule>>,
    signals: HashMap<String, mpsc::Sender<()>>,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl ActiveRules {
    fn empty() -> Self {
        Self {
            rules: Vec::new(),
            signals: HashMap::new(),
            cancel: CancellationToken::new(),
            workers: Vec::new(),
        }
    }
}

/// Couples broker ingress to rule evaluation.
///
/// Owns the value cache, the alert limiter and one worker task per active
/// rule. Lock order is manager -> cache -> limiter -> rule; no lock is held
/// across a sink call.
pub struct RuleManager {
    core: Arc<Core>,
    active: tokio::sync::Mutex<ActiveRules>,
}

impl RuleManager {
    pub fn new(config: EngineConfig, sink: Arc<dyn AlertSink>) -> Self {
        Self {
            core: Arc::new(Core {
                cache: ValueCache::new(config.cache_ttl, config.value_policy),
                limiter: AlertLimiter::new(config.limiter),
                sink,
            }),
            active: tokio::sync::Mutex::new(ActiveRules::empty()),
        }
    }

    /// Ingress path for one broker message.
    ///
    /// Decodes the payload, updates the cache and wakes every rule that
    /// depends on the topic. Malformed or unusable messages are discarded;
    /// nothing on this path aborts the process.
    pub async fn handle_message(&self, topic: &str, payload: &[u8]) {
        let message: HashMap<String, Value> = match serde_json::from_slice(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(topic, error = %e, "failed to parse payload");
                return;
            }
        };

        let Some(address) = message.get("address").and_then(Value::as_str) else {
            warn!(topic, payload = ?message, "payload missing 'address' field");
            return;
        };
        let Some(value) = message.get("value") else {
            warn!(topic, payload = ?message, "payload missing 'value' field");
            return;
        };

        if !self.core.cache.policy().is_usable(value) {
            return;
        }

        if device_address(topic) != address {
            warn!(topic, address, "topic-address mismatch");
            return;
        }

        let active = self.active.lock().await;
        self.core.cache.put(topic, address, value.clone(), Instant::now());

        for rule in &active.rules {
            if !rule.topics.iter().any(|t| t == topic) {
                continue;
            }
            match active.signals.get(&rule.id) {
                // A full channel means an evaluation is already pending and
                // will observe this write.
                Some(signal) => {
                    let _ = signal.try_send(());
                }
                None => warn!(rule_id = %rule.id, "rule signal channel missing"),
            }
        }
    }

    /// Replaces the active rule set.
    ///
    /// Stop-the-world: the current scope is cancelled and every worker is
    /// joined, so in-flight evaluations finish before the new workers
    /// start. Per-condition debounce state of the old set is discarded.
    pub async fn update_rules(&self, rules: Vec<AlertRule>) {
        let mut active = self.active.lock().await;

        active.cancel.cancel();
        for worker in active.workers.drain(..) {
            if let Err(e) = worker.await {
                warn!(error = %e, "rule worker ended abnormally");
            }
        }

        let cancel = CancellationToken::new();
        let mut installed: Vec<Arc<AlertRule>> = Vec::with_capacity(rules.len());
        let mut signals = HashMap::with_capacity(rules.len());
        let mut workers = Vec::with_capacity(rules.len());

        for rule in rules {
            if signals.contains_key(&rule.id) {
                warn!(rule_id = %rule.id, "duplicate rule id, skipping");
                continue;
            }
            let rule = Arc::new(rule);
            let (signal_tx, signal_rx) = mpsc::channel(1);
            signals.insert(rule.id.clone(), signal_tx);
            workers.push(spawn_worker(
                Arc::clone(&self.core),
                Arc::clone(&rule),
                signal_rx,
                cancel.child_token(),
            ));
            installed.push(rule);
        }

        info!(count = installed.len(), "rule set installed");
        *active = ActiveRules {
            rules: installed,
            signals,
            cancel,
            workers,
        };
    }

    /// Cancels every worker and waits for in-flight evaluations.
    pub async fn shutdown(&self) {
        let mut active = self.active.lock().await;
        active.cancel.cancel();
        for worker in active.workers.drain(..) {
            let _ = worker.await;
        }
        active.rules.clear();
        active.signals.clear();
        info!("rule manager stopped");
    }
}

/// One task per rule: idle until signalled, evaluate once per signal, exit
/// on cancellation.
fn spawn_worker(
    core: Arc<Core>,
    rule: Arc<AlertRule>,
    mut signal: mpsc::Receiver<()>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(rule_id = %rule.id, "rule worker stopping");
                    break;
                }
                received = signal.recv() => match received {
                    Some(()) => core.evaluate_rule(&rule).await,
                    None => break,
                },
            }
        }
    })
}

impl Core {
    /// One evaluation tick for one rule.
    ///
    /// Skips silently when the snapshot is incomplete; skips with a warning
    /// when a snapshot value cannot be coerced.
    async fn evaluate_rule(&self, rule: &AlertRule) {
        let now = Instant::now();
        let Some(raw) = self.cache.snapshot(&rule.topics, now) else {
            return;
        };

        let values = match expr::coerce_snapshot(&raw) {
            Ok(values) => values,
            Err(e) => {
                warn!(rule_id = %rule.id, error = %e, "skipping evaluation");
                return;
            }
        };

        for condition in &rule.conditions {
            let Some(message) = rule.evaluate(condition, &values, now) else {
                continue;
            };

            let alert_key = format!("{}_{}", rule.id, condition.level.level());
            if !self.limiter.should_trigger(&alert_key, condition.level, now) {
                debug!(
                    rule_id = %rule.id,
                    condition_id = %condition.id,
                    "alert suppressed (cooldown)"
                );
                continue;
            }

            info!(severity = %condition.level, message = %message, "alert triggered");
            if let Err(e) = self
                .sink
                .insert_alert(
                    &rule.table,
                    &condition.device,
                    &message,
                    &rule.category,
                    &rule.machine,
                )
                .await
            {
                error!(rule_id = %rule.id, error = %e, "failed to insert alert");
            }
            // A failed insert still counts as a trigger.
            self.limiter.mark_triggered(&alert_key, condition.level, now);
        }
    }
}
