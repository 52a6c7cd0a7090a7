//! Serde schema for the rule document.

use serde::Deserialize;

/// One rule as delivered by the rule source. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleSpec {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub topics: Vec<String>,
    pub table: String,
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub machine: String,
    #[serde(default)]
    pub conditions: Vec<ConditionSpec>,
    /// Optional per-rule cooldown override in seconds; zero derives the
    /// cooldown from the rule's maximum severity.
    #[serde(default)]
    pub throttle_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConditionSpec {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub device: String,
    pub operator: String,
    pub threshold: i64,
    pub message_template: String,
    pub level: u8,
}

/// Ids appear upstream as both integers and strings; both are accepted and
/// integers are stringified.
fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Number(i64),
        Text(String),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Number(n) => n.to_string(),
        Id::Text(s) => s,
    })
}
