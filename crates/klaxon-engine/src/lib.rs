//! Streaming alert evaluation engine.
//!
//! Sensor readings arrive as broker messages, land in a per-device
//! last-known-value cache, and wake one worker task per alert rule. Each
//! worker samples an atomic snapshot of the values its rule depends on,
//! runs the rule's conditions through the expression evaluator, and pushes
//! accepted alerts through an [`AlertSink`], subject to per-(rule, severity)
//! backoff in the [`limiter::AlertLimiter`].

pub mod cache;
pub mod expr;
pub mod limiter;
pub mod manager;
pub mod rule;

#[cfg(test)]
mod tests;

use anyhow::Result;
use async_trait::async_trait;

/// Durable destination for accepted alerts.
///
/// The engine calls this once per alert that passes both the rule's own
/// debounce and the global limiter. A failed insert is logged by the caller
/// and never retried; the limiter has already recorded the trigger.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn insert_alert(
        &self,
        table: &str,
        device: &str,
        message: &str,
        category: &str,
        machine: &str,
    ) -> Result<()>;
}
