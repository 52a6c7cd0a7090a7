use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use klaxon_engine::manager::RuleManager;
use klaxon_server::app;
use klaxon_server::config::ServerConfig;
use klaxon_server::rule_builder;
use klaxon_server::state::AppState;
use klaxon_sink::{RestSink, RestSinkConfig};
use klaxon_source::{FileRuleSource, RuleSource};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("klaxon=info".parse()?))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .get(1)
        .map(|s| s.as_str())
        .unwrap_or("config/server.toml");
    let config = ServerConfig::load(config_path)?;

    tracing::info!(
        http_port = config.http_port,
        rules_path = %config.rules_path,
        "klaxon-server starting"
    );

    let sink = Arc::new(RestSink::new(RestSinkConfig {
        base_url: config.sink.base_url.clone(),
        api_key: config.sink.api_key.clone(),
        schema: config.sink.schema.clone(),
        timeout: Duration::from_secs(config.sink.timeout_secs),
    })?);

    let manager = Arc::new(RuleManager::new(config.engine.engine_config(), sink));

    // The initial load is the only fatal rule-source path; reload failures
    // later keep the previous set.
    let mut source = FileRuleSource::new(config.rules_path.clone());
    let initial = source.list_rules()?;
    tracing::info!(count = initial.len(), "initial rule set loaded");
    manager.update_rules(rule_builder::build_rules(initial)).await;

    let (reload_tx, mut reload_rx) = tokio::sync::mpsc::channel(4);
    source.watch(Box::new(move |specs| {
        let _ = reload_tx.blocking_send(specs);
    }))?;

    let reload_manager = Arc::clone(&manager);
    let reload_handle = tokio::spawn(async move {
        while let Some(specs) = reload_rx.recv().await {
            let rules = rule_builder::build_rules(specs);
            reload_manager.update_rules(rules).await;
        }
    });

    let state = AppState {
        manager: Arc::clone(&manager),
    };
    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let listener = tokio::net::TcpListener::bind(http_addr).await?;
    tracing::info!(http = %http_addr, "server started");

    let server = axum::serve(listener, app::build_http_app(state));
    tokio::select! {
        result = server.with_graceful_shutdown(async { signal::ctrl_c().await.ok(); }) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server error");
            }
        }
        _ = signal::ctrl_c() => {
            tracing::info!("shutting down gracefully");
        }
    }

    reload_handle.abort();
    manager.shutdown().await;
    tracing::info!("server stopped");

    Ok(())
}
