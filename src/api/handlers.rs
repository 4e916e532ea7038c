//! The four endpoint handlers (§6.1): health, model listing, token
//! approximation, and the core `/v1/messages` pipeline (non-streaming and
//! streaming).

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::convert::Infallible;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use crate::adapters::{adapt_response, build_ollama_request, should_think};
use crate::error::AppError;
use crate::healing::HealingAction;
use crate::history::{heal_history, rewrite_parallel_to_sequential};
use crate::model_resolution::apply_thinking_policy;
use crate::schema::build_index;
use crate::streaming::{NdjsonLineBuffer, SseTransformer};
use crate::tokens::approximate_input_tokens;
use crate::types::{new_message_id, Request};

use super::routes::AppState;

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({"status": "ok", "ollama": state.config.ollama_base_url}))
}

pub async fn list_models(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let names = state.dispatcher.list_models().await?;
    let created = unix_now();
    let data: Vec<_> = names
        .into_iter()
        .map(|id| {
            json!({
                "id": id,
                "object": "model",
                "created": created,
                "owned_by": "ollama",
            })
        })
        .collect();
    Ok(Json(json!({"object": "list", "data": data})))
}

pub async fn count_tokens(body: Bytes) -> Result<impl IntoResponse, AppError> {
    let request: Request = parse_request_body(&body)?;
    let input_tokens = approximate_input_tokens(&request);
    Ok(Json(json!({"input_tokens": input_tokens})))
}

/// The core pipeline (§2): adapt, heal history, rewrite parallel tool calls,
/// dispatch to Ollama, then adapt the response back (or stream it).
pub async fn messages(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, AppError> {
    let request_id = Uuid::new_v4();
    let mut request: Request = parse_request_body(&body)?;
    let client_model = request.model.clone();
    let resolved_model = state.config.resolve_model(&client_model);

    log::debug!(
        "event=request.start request_id={} client_model={} resolved_model={} stream={}",
        request_id,
        client_model,
        resolved_model,
        request.is_streaming()
    );

    apply_thinking_policy(&mut request, &resolved_model, &state.config)?;

    let schema_index = build_index(request.tools.as_deref().unwrap_or(&[]));
    let healed_history = heal_history(request.messages.clone(), &schema_index);
    request.messages = if state.config.sequential_tool_calls {
        rewrite_parallel_to_sequential(healed_history)
    } else {
        healed_history
    };

    let think = should_think(&request, &resolved_model);
    let ollama_request = build_ollama_request(&request, &resolved_model, think);

    if request.is_streaming() {
        stream_messages(state, ollama_request, client_model, schema_index, request_id).await
    } else {
        let chunk = state.dispatcher.chat(&ollama_request).await?;
        let (response, actions) = adapt_response(&chunk, &client_model, &schema_index);
        log_healing_actions(request_id, &actions);
        log::debug!("event=request.complete request_id={}", request_id);
        Ok(Json(response).into_response())
    }
}

async fn stream_messages(
    state: AppState,
    ollama_request: crate::ollama::OllamaChatRequest,
    client_model: String,
    schema_index: crate::schema::ToolSchemaIndex,
    request_id: Uuid,
) -> Result<Response, AppError> {
    use futures_util::StreamExt;

    let mut upstream = state.dispatcher.chat_stream(&ollama_request).await?;
    let message_id = new_message_id();

    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(32);

    tokio::spawn(async move {
        let mut buffer = NdjsonLineBuffer::new();
        let mut transformer = SseTransformer::new(message_id, client_model);

        while let Some(next) = upstream.next().await {
            let bytes = match next {
                Ok(bytes) => bytes,
                Err(e) => {
                    log::error!("event=stream.upstream_error request_id={} error={}", request_id, e);
                    break;
                }
            };
            for chunk in buffer.push(&bytes) {
                let (events, actions) = transformer.process(&chunk, &schema_index);
                log_healing_actions(request_id, &actions);
                for event in events {
                    if tx.send(Ok(Bytes::from(event.to_wire()))).await.is_err() {
                        log::warn!("event=stream.client_disconnected request_id={}", request_id);
                        return;
                    }
                }
            }
        }
        log::debug!("event=request.complete request_id={}", request_id);
    });

    let stream = ReceiverStream::new(rx);
    let body = Body::from_stream(stream);

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header("X-Accel-Buffering", "no")
        .body(body)
        .expect("static header values are always valid"))
}

fn log_healing_actions(request_id: Uuid, actions: &[HealingAction]) {
    for action in actions {
        log::debug!("event=tool.healed request_id={} action={:?}", request_id, action);
    }
}

fn parse_request_body(body: &[u8]) -> Result<Request, AppError> {
    serde_json::from_slice(body).map_err(|e| AppError::Validation(e.to_string()))
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
