//! The Anthropic Messages API data model: the shape clients send us and the
//! shape we send back. Every field here mirrors what `messages.create` in the
//! real Anthropic API accepts/returns, scoped to what this gateway forwards.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single piece of message content. Tagged on `type` to match the wire
/// format; `ToolResult.content` may itself be plain text or a nested list of
/// blocks, so it stays untyped JSON and is projected to text where needed
/// (see `crate::adapters`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Map<String, Value>,
    },
    ToolResult {
        tool_use_id: String,
        /// Either a bare string or a list of content blocks, per the Anthropic
        /// wire format. Kept as raw JSON and projected to text on demand.
        content: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: Map<String, Value>) -> Self {
        ContentBlock::ToolUse {
            id: id.into(),
            name: name.into(),
            input,
        }
    }

    /// Project this block down to its textual contribution, used when
    /// flattening a system prompt or building an Ollama `content` string.
    /// `tool_result` content recurses through nested blocks; `tool_use`
    /// serializes its `input` as compact JSON.
    pub fn as_text_projection(&self) -> String {
        match self {
            ContentBlock::Text { text } => text.clone(),
            ContentBlock::Thinking { thinking } => thinking.clone(),
            ContentBlock::ToolUse { input, .. } => {
                serde_json::to_string(input).unwrap_or_default()
            }
            ContentBlock::ToolResult { content, .. } => project_tool_result_content(content),
        }
    }
}

/// `tool_result.content` is either a bare string or a list of content blocks.
pub fn project_tool_result_content(content: &Value) -> String {
    match content {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .filter_map(|item| serde_json::from_value::<ContentBlock>(item.clone()).ok())
            .map(|block| block.as_text_projection())
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// A message's content can be a bare string (shorthand for one text block) or
/// an explicit list of content blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    pub fn into_blocks(self) -> Vec<ContentBlock> {
        match self {
            MessageContent::Text(text) => vec![ContentBlock::Text { text }],
            MessageContent::Blocks(blocks) => blocks,
        }
    }

    pub fn as_blocks(&self) -> Vec<ContentBlock> {
        match self {
            MessageContent::Text(text) => vec![ContentBlock::Text { text: text.clone() }],
            MessageContent::Blocks(blocks) => blocks.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThinkingConfig {
    #[serde(rename = "type")]
    pub thinking_type: ThinkingType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingType {
    Enabled,
    Adaptive,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub system: Option<MessageContent>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub top_p: Option<f32>,
    #[serde(default)]
    pub top_k: Option<u32>,
    #[serde(default)]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default)]
    pub stream: Option<bool>,
    #[serde(default)]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(default)]
    pub tool_choice: Option<Value>,
    #[serde(default)]
    pub thinking: Option<ThinkingConfig>,
}

impl Request {
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

#[derive(Debug, Clone, Serialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub id: String,
    #[serde(rename = "type")]
    pub response_type: &'static str,
    pub role: &'static str,
    pub content: Vec<ContentBlock>,
    pub model: String,
    pub stop_reason: Option<StopReason>,
    pub stop_sequence: Option<String>,
    pub usage: Usage,
}

impl Response {
    /// §3.2: `content` must have at least one block; an empty `Text{""}` is
    /// appended when nothing was produced.
    pub fn ensure_nonempty_content(&mut self) {
        if self.content.is_empty() {
            self.content.push(ContentBlock::text(""));
        }
    }
}

/// Generates a fresh `toolu_` identifier: 16 lowercase hex characters from a
/// cryptographic random source (see DESIGN.md for the id-strategy choice).
pub fn new_tool_use_id() -> String {
    format!("toolu_{}", random_hex16())
}

/// Generates a fresh `msg_` identifier with the same shape.
pub fn new_message_id() -> String {
    format!("msg_{}", random_hex16())
}

fn random_hex16() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 8];
    rand::rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
