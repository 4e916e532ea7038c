//! Ollama wire types and the dispatcher that talks to the upstream server
//! (§3.1, §4.6). Evolved from the teacher's `ollama.rs`: same reqwest-direct
//! approach to streaming (no high-level client abstraction), same
//! transport-error classification style, retargeted at Ollama's native
//! `/api/chat` and `/api/tags` endpoints instead of a multi-provider client.

use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaFunctionCall {
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaToolCall {
    pub function: OllamaFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OllamaMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OllamaToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct OllamaOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

impl OllamaOptions {
    pub fn is_empty(&self) -> bool {
        self.num_predict.is_none()
            && self.temperature.is_none()
            && self.top_p.is_none()
            && self.top_k.is_none()
            && self.stop.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaFunctionDefinition {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub parameters: Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaToolDefinition {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub function: OllamaFunctionDefinition,
}

impl OllamaToolDefinition {
    pub fn function(name: String, description: Option<String>, parameters: Value) -> Self {
        OllamaToolDefinition {
            kind: "function",
            function: OllamaFunctionDefinition {
                name,
                description,
                parameters,
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OllamaChatRequest {
    pub model: String,
    pub messages: Vec<OllamaMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<OllamaOptions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OllamaToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub think: Option<bool>,
}

/// Shape of both the single non-streaming response body and each line of a
/// streamed NDJSON response (§3.1).
#[derive(Debug, Clone, Deserialize)]
pub struct OllamaResponseChunk {
    #[serde(default)]
    pub model: String,
    pub message: OllamaMessage,
    pub done: bool,
    #[serde(default)]
    pub done_reason: Option<String>,
    #[serde(default)]
    pub eval_count: Option<u32>,
    #[serde(default)]
    pub prompt_eval_count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaModelInfo {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OllamaTagsResponse {
    #[serde(default)]
    pub models: Vec<OllamaModelInfo>,
}

/// Thin wrapper over a process-wide `reqwest::Client` performing the three
/// Ollama operations the gateway needs (§4.6).
pub struct OllamaDispatcher {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OllamaDispatcher {
    pub fn new(client: reqwest::Client, base_url: String, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub async fn chat(&self, request: &OllamaChatRequest) -> Result<OllamaResponseChunk, AppError> {
        let url = format!("{}/api/chat", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(request)
            .send()
            .await
            .map_err(classify_transport_error)?;
        let response = check_status(response).await?;
        response
            .json::<OllamaResponseChunk>()
            .await
            .map_err(|e| AppError::Internal(format!("invalid ollama response body: {e}")))
    }

    /// Opens a streaming chat call. The overall timeout applies only until
    /// response headers arrive; once the stream is open, long generations
    /// are not cut off by it (§4.6, §5).
    pub async fn chat_stream(
        &self,
        request: &OllamaChatRequest,
    ) -> Result<impl Stream<Item = reqwest::Result<Bytes>>, AppError> {
        let url = format!("{}/api/chat", self.base_url);
        let send = self.client.post(&url).json(request).send();
        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| AppError::UpstreamConnection("timed out waiting for ollama headers".to_string()))?
            .map_err(classify_transport_error)?;
        let response = check_status(response).await?;
        Ok(response.bytes_stream())
    }

    pub async fn list_models(&self) -> Result<Vec<String>, AppError> {
        let url = format!("{}/api/tags", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(classify_transport_error)?;
        let response = check_status(response).await?;
        let tags: OllamaTagsResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("invalid ollama tags response: {e}")))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

fn classify_transport_error(e: reqwest::Error) -> AppError {
    if e.is_connect() || e.is_timeout() {
        AppError::UpstreamConnection(e.to_string())
    } else {
        AppError::Upstream {
            status: StatusCode::BAD_GATEWAY,
            message: e.to_string(),
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let message = response.text().await.unwrap_or_default();
    Err(AppError::Upstream { status, message })
}
