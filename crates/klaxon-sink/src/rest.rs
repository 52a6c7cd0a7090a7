//! PostgREST-style alert inserter.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::json;

use klaxon_engine::AlertSink;

use crate::error::SinkError;

/// Connection settings for the REST sink.
#[derive(Debug, Clone)]
pub struct RestSinkConfig {
    /// Base URL of the store, without the `/rest/v1` suffix.
    pub base_url: String,
    /// Service role key, sent both as `apikey` and as the bearer token.
    pub api_key: String,
    /// Target schema for the `Content-Profile` / `Accept-Profile` headers.
    pub schema: String,
    pub timeout: Duration,
}

/// Writes accepted alerts into a PostgREST table.
///
/// One pooled client, one request per alert, no retries: a failed insert is
/// the engine's to log, and the limiter has already recorded the trigger.
pub struct RestSink {
    client: reqwest::Client,
    config: RestSinkConfig,
}

impl RestSink {
    pub fn new(config: RestSinkConfig) -> Result<Self, SinkError> {
        if config.base_url.is_empty() {
            return Err(SinkError::InvalidConfig("base_url is empty".to_string()));
        }
        if config.api_key.is_empty() {
            return Err(SinkError::InvalidConfig("api_key is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(100)
            .build()?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, table: &str) -> String {
        format!(
            "{}/rest/v1/{}",
            self.config.base_url.trim_end_matches('/'),
            table
        )
    }

    fn request_body(device: &str, message: &str, category: &str, machine: &str) -> serde_json::Value {
        json!({
            "device_id": device,
            "message": message,
            "category": category,
            "machine": machine,
        })
    }
}

#[async_trait]
impl AlertSink for RestSink {
    async fn insert_alert(
        &self,
        table: &str,
        device: &str,
        message: &str,
        category: &str,
        machine: &str,
    ) -> Result<()> {
        let body = Self::request_body(device, message, category, machine);
        let response = self
            .client
            .post(self.endpoint(table))
            .header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
            .header("Prefer", "return=minimal")
            .header("Content-Profile", &self.config.schema)
            .header("Accept-Profile", &self.config.schema)
            .json(&body)
            .send()
            .await
            .map_err(SinkError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::Api {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(())
    }
}
