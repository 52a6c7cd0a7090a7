//! Last-known-value cache keyed by `(topic, device address)`.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use serde_json::Value;

use klaxon_common::topic::device_address;

/// Validity filter applied to payload values on ingress and again at read
/// time.
///
/// The default rejects numeric zero and its string forms, matching sensors
/// that report zero as a "no reading" sentinel. Hosts monitoring quantities
/// where zero is meaningful can disable `reject_zero`; null and the empty
/// string are always unusable.
#[derive(Debug, Clone, Copy)]
pub struct ValuePolicy {
    pub reject_zero: bool,
}

impl Default for ValuePolicy {
    fn default() -> Self {
        Self { reject_zero: true }
    }
}

impl ValuePolicy {
    /// Whether a payload value is usable for rule evaluation.
    pub fn is_usable(&self, value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::Number(n) => {
                !self.reject_zero || n.as_f64().map(|f| f != 0.0).unwrap_or(true)
            }
            Value::String(s) => {
                if s.is_empty() {
                    return false;
                }
                !self.reject_zero || (s != "0" && s != "0.0")
            }
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    topic: String,
    address: String,
}

/// A cached observation. The timestamp is the observation time, not the
/// insertion time into any downstream structure.
#[derive(Debug, Clone)]
pub struct CachedValue {
    pub value: Value,
    pub observed_at: Instant,
}

/// In-memory map of the most recent reading per `(topic, device address)`.
///
/// Entries are overwritten in place and never evicted; staleness is decided
/// at read time by comparing the observation age against the TTL. Reads
/// take the shared lock, the ingress upsert takes the exclusive lock.
pub struct ValueCache {
    ttl: Duration,
    policy: ValuePolicy,
    entries: RwLock<HashMap<CacheKey, CachedValue>>,
}

impl ValueCache {
    pub fn new(ttl: Duration, policy: ValuePolicy) -> Self {
        Self {
            ttl,
            policy,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn policy(&self) -> ValuePolicy {
        self.policy
    }

    /// Records an observation, replacing any previous entry for the key.
    pub fn put(&self, topic: &str, address: &str, value: Value, now: Instant) {
        let key = CacheKey {
            topic: topic.to_string(),
            address: address.to_string(),
        };
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key,
            CachedValue {
                value,
                observed_at: now,
            },
        );
    }

    /// Returns the stored entry and whether it is fresh and valid.
    pub fn get(&self, topic: &str, address: &str, now: Instant) -> Option<(CachedValue, bool)> {
        let key = CacheKey {
            topic: topic.to_string(),
            address: address.to_string(),
        };
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries.get(&key).map(|cached| {
            let usable = self.is_fresh(cached, now);
            (cached.clone(), usable)
        })
    }

    /// Samples every `(topic, final-segment)` pair under a single
    /// shared-lock acquisition.
    ///
    /// All-or-nothing: returns `None` unless a fresh, valid entry exists
    /// for every topic.
    pub fn snapshot(&self, topics: &[String], now: Instant) -> Option<HashMap<String, Value>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut snapshot = HashMap::with_capacity(topics.len());
        for topic in topics {
            let address = device_address(topic);
            let key = CacheKey {
                topic: topic.clone(),
                address: address.to_string(),
            };
            let cached = entries.get(&key)?;
            if !self.is_fresh(cached, now) {
                return None;
            }
            snapshot.insert(address.to_string(), cached.value.clone());
        }
        Some(snapshot)
    }

    fn is_fresh(&self, cached: &CachedValue, now: Instant) -> bool {
        now.duration_since(cached.observed_at) <= self.ttl && self.policy.is_usable(&cached.value)
    }
}
