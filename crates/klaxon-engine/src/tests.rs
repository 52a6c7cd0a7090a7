use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use klaxon_common::types::Severity;

use crate::manager::{EngineConfig, RuleManager};
use crate::rule::{AlertCondition, AlertRule};
use crate::AlertSink;

#[derive(Debug, Clone, PartialEq)]
struct InsertedAlert {
    table: String,
    device: String,
    message: String,
    category: String,
    machine: String,
}

#[derive(Default)]
struct MemorySink {
    inserts: Mutex<Vec<InsertedAlert>>,
}

impl MemorySink {
    fn inserts(&self) -> Vec<InsertedAlert> {
        self.inserts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSink for MemorySink {
    async fn insert_alert(
        &self,
        table: &str,
        device: &str,
        message: &str,
        category: &str,
        machine: &str,
    ) -> Result<()> {
        self.inserts.lock().unwrap().push(InsertedAlert {
            table: table.into(),
            device: device.into(),
            message: message.into(),
            category: category.into(),
            machine: machine.into(),
        });
        Ok(())
    }
}

fn condition(id: &str, device: &str, operator: &str, threshold: i64, level: Severity) -> AlertCondition {
    AlertCondition {
        id: id.into(),
        device: device.into(),
        operator: operator.into(),
        threshold,
        message_template: "reading out of range".into(),
        level,
    }
}

fn rule(id: &str, topics: &[&str], conditions: Vec<AlertCondition>) -> AlertRule {
    rule_with_cooldown(id, topics, conditions, Duration::ZERO)
}

fn rule_with_cooldown(
    id: &str,
    topics: &[&str],
    conditions: Vec<AlertCondition>,
    cooldown: Duration,
) -> AlertRule {
    AlertRule::new(
        id.to_string(),
        topics.iter().map(|t| t.to_string()).collect(),
        "alerts".to_string(),
        "value".to_string(),
        "sensors".to_string(),
        "press-01".to_string(),
        conditions,
        cooldown,
    )
}

fn payload(address: &str, value: serde_json::Value) -> Vec<u8> {
    json!({ "address": address, "value": value })
        .to_string()
        .into_bytes()
}

async fn wait_for_inserts(sink: &MemorySink, expected: usize) -> Vec<InsertedAlert> {
    for _ in 0..400 {
        let inserts = sink.inserts();
        if inserts.len() >= expected {
            return inserts;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    sink.inserts()
}

/// Lets pending worker evaluations drain before asserting on absence.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(60)).await;
}

#[tokio::test]
async fn simple_trigger_inserts_one_alert() {
    let sink = Arc::new(MemorySink::default());
    let manager = RuleManager::new(EngineConfig::default(), sink.clone());
    manager
        .update_rules(vec![rule(
            "r1",
            &["s/d1"],
            vec![condition("c1", "d1", ">", 10, Severity::Warning)],
        )])
        .await;

    manager.handle_message("s/d1", &payload("d1", json!(15))).await;

    let inserts = wait_for_inserts(&sink, 1).await;
    assert_eq!(inserts.len(), 1);
    assert_eq!(inserts[0].table, "alerts");
    assert_eq!(inserts[0].device, "d1");
    assert_eq!(inserts[0].category, "sensors");
    assert_eq!(inserts[0].machine, "press-01");

    let notice: serde_json::Value = serde_json::from_str(&inserts[0].message).unwrap();
    assert_eq!(notice["current"], 15.0);
    assert_eq!(notice["threshold"], 10.0);
    assert_eq!(notice["severity"], "WARNING");
}

#[tokio::test]
async fn compound_and_rule_fires_once_all_topics_are_seen() {
    let sink = Arc::new(MemorySink::default());
    let manager = RuleManager::new(EngineConfig::default(), sink.clone());
    manager
        .update_rules(vec![rule(
            "r1",
            &["n/D800", "n/D392", "n/D166"],
            vec![condition(
                "c1",
                "D800",
                "D800 < 900 AND D392 == D166 AND D166 != 0",
                0,
                Severity::Error,
            )],
        )])
        .await;

    manager.handle_message("n/D800", &payload("D800", json!(850))).await;
    settle().await;
    assert!(sink.inserts().is_empty());

    manager.handle_message("n/D392", &payload("D392", json!(5))).await;
    manager.handle_message("n/D166", &payload("D166", json!(5))).await;
    assert_eq!(wait_for_inserts(&sink, 1).await.len(), 1);

    // A zero reading is unusable: it neither updates the cache nor wakes
    // the rule, so no further alert appears.
    manager.handle_message("n/D166", &payload("D166", json!(0))).await;
    settle().await;
    assert_eq!(sink.inserts().len(), 1);
}

#[tokio::test]
async fn stale_snapshot_produces_no_alert() {
    let sink = Arc::new(MemorySink::default());
    let config = EngineConfig {
        cache_ttl: Duration::from_millis(200),
        ..EngineConfig::default()
    };
    let manager = RuleManager::new(config, sink.clone());
    manager
        .update_rules(vec![rule(
            "r1",
            &["s/d1", "s/d2"],
            vec![condition("c1", "d1", ">", 10, Severity::Warning)],
        )])
        .await;

    // Only d1 observed: snapshot incomplete, nothing fires.
    manager.handle_message("s/d1", &payload("d1", json!(15))).await;
    settle().await;
    assert!(sink.inserts().is_empty());

    // By the time d2 arrives, d1 has gone stale.
    tokio::time::sleep(Duration::from_millis(300)).await;
    manager.handle_message("s/d2", &payload("d2", json!(5))).await;
    settle().await;
    assert!(sink.inserts().is_empty());

    // Refreshing d1 completes the snapshot.
    manager.handle_message("s/d1", &payload("d1", json!(15))).await;
    assert_eq!(wait_for_inserts(&sink, 1).await.len(), 1);
}

#[tokio::test]
async fn repeat_trigger_is_suppressed_by_the_limiter() {
    let sink = Arc::new(MemorySink::default());
    let manager = RuleManager::new(EngineConfig::default(), sink.clone());
    // A 1ms rule cooldown so only the global limiter is in play.
    manager
        .update_rules(vec![rule_with_cooldown(
            "r1",
            &["s/d1"],
            vec![condition("c1", "d1", ">", 10, Severity::Warning)],
            Duration::from_millis(1),
        )])
        .await;

    manager.handle_message("s/d1", &payload("d1", json!(15))).await;
    assert_eq!(wait_for_inserts(&sink, 1).await.len(), 1);

    tokio::time::sleep(Duration::from_millis(20)).await;
    manager.handle_message("s/d1", &payload("d1", json!(16))).await;
    settle().await;
    assert_eq!(sink.inserts().len(), 1);
}

#[tokio::test]
async fn hot_swap_replaces_the_worker_set() {
    let sink = Arc::new(MemorySink::default());
    let manager = RuleManager::new(EngineConfig::default(), sink.clone());
    manager
        .update_rules(vec![rule(
            "a",
            &["m/d1"],
            vec![condition("c1", "d1", ">", 10, Severity::Warning)],
        )])
        .await;

    manager.handle_message("m/d1", &payload("d1", json!(15))).await;
    assert_eq!(wait_for_inserts(&sink, 1).await.len(), 1);

    manager
        .update_rules(vec![rule(
            "b",
            &["m/d2"],
            vec![condition("c1", "d2", ">", 10, Severity::Error)],
        )])
        .await;

    // The old topic no longer wakes anyone.
    manager.handle_message("m/d1", &payload("d1", json!(20))).await;
    settle().await;
    assert_eq!(sink.inserts().len(), 1);

    manager.handle_message("m/d2", &payload("d2", json!(15))).await;
    let inserts = wait_for_inserts(&sink, 2).await;
    assert_eq!(inserts.len(), 2);
    assert_eq!(inserts[1].device, "d2");
}

#[tokio::test]
async fn topic_address_mismatch_is_discarded() {
    let sink = Arc::new(MemorySink::default());
    let manager = RuleManager::new(EngineConfig::default(), sink.clone());
    manager
        .update_rules(vec![rule(
            "r1",
            &["s/d1"],
            vec![condition("c1", "d1", ">", 10, Severity::Warning)],
        )])
        .await;

    manager.handle_message("s/d1", &payload("d2", json!(15))).await;
    settle().await;
    assert!(sink.inserts().is_empty());

    // The mismatched message must not have primed the cache either: a
    // proper delivery is what finally fires.
    manager.handle_message("s/d1", &payload("d1", json!(15))).await;
    assert_eq!(wait_for_inserts(&sink, 1).await.len(), 1);
}

#[tokio::test]
async fn malformed_payloads_are_discarded() {
    let sink = Arc::new(MemorySink::default());
    let manager = RuleManager::new(EngineConfig::default(), sink.clone());
    manager
        .update_rules(vec![rule(
            "r1",
            &["s/d1"],
            vec![condition("c1", "d1", ">", 10, Severity::Warning)],
        )])
        .await;

    manager.handle_message("s/d1", b"not json").await;
    manager.handle_message("s/d1", &json!({ "value": 15 }).to_string().into_bytes()).await;
    manager.handle_message("s/d1", &json!({ "address": "d1" }).to_string().into_bytes()).await;
    settle().await;
    assert!(sink.inserts().is_empty());

    manager.handle_message("s/d1", &payload("d1", json!(15))).await;
    assert_eq!(wait_for_inserts(&sink, 1).await.len(), 1);
}

#[tokio::test]
async fn empty_rule_set_caches_but_never_fires() {
    let sink = Arc::new(MemorySink::default());
    let manager = RuleManager::new(EngineConfig::default(), sink.clone());
    manager.update_rules(vec![]).await;

    manager.handle_message("s/d1", &payload("d1", json!(15))).await;
    settle().await;
    assert!(sink.inserts().is_empty());

    // A later swap picks up the cached reading on the next delivery.
    manager
        .update_rules(vec![rule(
            "r1",
            &["s/d1"],
            vec![condition("c1", "d1", ">", 10, Severity::Warning)],
        )])
        .await;
    manager.handle_message("s/d1", &payload("d1", json!(15))).await;
    assert_eq!(wait_for_inserts(&sink, 1).await.len(), 1);
}

#[tokio::test]
async fn duplicate_rule_ids_keep_the_first_occurrence() {
    let sink = Arc::new(MemorySink::default());
    let manager = RuleManager::new(EngineConfig::default(), sink.clone());
    manager
        .update_rules(vec![
            rule("r1", &["s/d1"], vec![condition("c1", "d1", ">", 10, Severity::Warning)]),
            rule("r1", &["s/d2"], vec![condition("c1", "d2", ">", 10, Severity::Warning)]),
        ])
        .await;

    manager.handle_message("s/d2", &payload("d2", json!(15))).await;
    settle().await;
    assert!(sink.inserts().is_empty());

    manager.handle_message("s/d1", &payload("d1", json!(15))).await;
    assert_eq!(wait_for_inserts(&sink, 1).await.len(), 1);
}

#[tokio::test]
async fn shutdown_stops_all_workers() {
    let sink = Arc::new(MemorySink::default());
    let manager = RuleManager::new(EngineConfig::default(), sink.clone());
    manager
        .update_rules(vec![rule(
            "r1",
            &["s/d1"],
            vec![condition("c1", "d1", ">", 10, Severity::Warning)],
        )])
        .await;

    manager.shutdown().await;

    manager.handle_message("s/d1", &payload("d1", json!(15))).await;
    settle().await;
    assert!(sink.inserts().is_empty());
}
