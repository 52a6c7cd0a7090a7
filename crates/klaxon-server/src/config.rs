use std::time::Duration;

use serde::Deserialize;

use klaxon_engine::cache::ValuePolicy;
use klaxon_engine::limiter::LimiterConfig;
use klaxon_engine::manager::EngineConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_rules_path")]
    pub rules_path: String,

    #[serde(default)]
    pub engine: EngineSection,
    pub sink: SinkSection,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_warning_cooldown_secs")]
    pub warning_cooldown_secs: u64,
    #[serde(default = "default_error_cooldown_secs")]
    pub error_cooldown_secs: u64,
    #[serde(default = "default_critical_cooldown_secs")]
    pub critical_cooldown_secs: u64,
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap: u32,
    #[serde(default = "default_reset_factor")]
    pub reset_factor: u32,
    #[serde(default = "default_reject_zero_values")]
    pub reject_zero_values: bool,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            warning_cooldown_secs: default_warning_cooldown_secs(),
            error_cooldown_secs: default_error_cooldown_secs(),
            critical_cooldown_secs: default_critical_cooldown_secs(),
            backoff_cap: default_backoff_cap(),
            reset_factor: default_reset_factor(),
            reject_zero_values: default_reject_zero_values(),
        }
    }
}

impl EngineSection {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
            value_policy: ValuePolicy {
                reject_zero: self.reject_zero_values,
            },
            limiter: LimiterConfig {
                warning_cooldown: Duration::from_secs(self.warning_cooldown_secs),
                error_cooldown: Duration::from_secs(self.error_cooldown_secs),
                critical_cooldown: Duration::from_secs(self.critical_cooldown_secs),
                backoff_cap: self.backoff_cap,
                reset_factor: self.reset_factor,
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkSection {
    pub base_url: String,
    pub api_key: String,
    #[serde(default = "default_sink_schema")]
    pub schema: String,
    #[serde(default = "default_sink_timeout_secs")]
    pub timeout_secs: u64,
}

impl ServerConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

fn default_http_port() -> u16 {
    8080
}

fn default_rules_path() -> String {
    "config/rules.json".to_string()
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_warning_cooldown_secs() -> u64 {
    300
}

fn default_error_cooldown_secs() -> u64 {
    60
}

fn default_critical_cooldown_secs() -> u64 {
    30
}

fn default_backoff_cap() -> u32 {
    8
}

fn default_reset_factor() -> u32 {
    4
}

fn default_reject_zero_values() -> bool {
    true
}

fn default_sink_schema() -> String {
    "public".to_string()
}

fn default_sink_timeout_secs() -> u64 {
    10
}
