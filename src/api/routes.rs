//! Router construction, grounded on the teacher's `web/routes.rs` layout
//! (`Router::new().route(...).with_state(...)`), retargeted at the four
//! endpoints this gateway exposes.

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use crate::config::Configuration;
use crate::ollama::OllamaDispatcher;

use super::handlers::{count_tokens, health, list_models, messages};

/// Process-wide state shared read-only across request handlers (§5): the
/// configuration snapshot and the pooled Ollama HTTP client.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Configuration>,
    pub dispatcher: Arc<OllamaDispatcher>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/models", get(list_models))
        .route("/v1/messages/count_tokens", post(count_tokens))
        .route("/v1/messages", post(messages))
        .with_state(state)
}
