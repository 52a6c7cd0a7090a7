//! HTTP ingress surface.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

pub fn build_http_app(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/v1/ingest/{*topic}", post(ingest))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Broker callback surface: the wildcard path is the topic, the body the
/// payload. Malformed messages are logged and dropped inside the engine,
/// so the response is always 202.
async fn ingest(
    State(state): State<AppState>,
    Path(topic): Path<String>,
    body: Bytes,
) -> StatusCode {
    state.manager.handle_message(&topic, &body).await;
    StatusCode::ACCEPTED
}
