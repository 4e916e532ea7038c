//! SSE Transformer (§4.4): a stateful machine that turns Ollama NDJSON
//! chunks into the Anthropic Messages SSE event sequence, plus the NDJSON
//! line buffer the byte stream is read through.
//!
//! The state object owns exactly `is_first`, `block_state`, and
//! `block_index`, scoped to one request — no sharing, no locking (§4.4, §9).

use serde_json::{json, Value};

use crate::adapters::derive_stop_reason;
use crate::healing::{heal_tool_call, HealingAction};
use crate::ollama::OllamaResponseChunk;
use crate::schema::ToolSchemaIndex;
use crate::types::new_tool_use_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockState {
    None,
    Thinking,
    Text,
    ToolUse,
}

/// One SSE event, formatted to the exact wire shape: `event: <name>\n` then
/// `data: <compact JSON>\n` then a blank line (§6.4).
pub struct SseEvent {
    pub name: &'static str,
    pub data: Value,
}

impl SseEvent {
    pub fn to_wire(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.name, self.data)
    }
}

pub struct SseTransformer {
    is_first: bool,
    block_state: BlockState,
    block_index: u32,
    message_id: String,
    requested_model: String,
    any_tool_use: bool,
}

impl SseTransformer {
    pub fn new(message_id: String, requested_model: String) -> Self {
        Self {
            is_first: true,
            block_state: BlockState::None,
            block_index: 0,
            message_id,
            requested_model,
            any_tool_use: false,
        }
    }

    /// Processes one Ollama chunk, returning the SSE events it produces and
    /// the tool-call healing actions taken (for the caller to log). Healed
    /// tool_use ids are assigned here, consistent with the non-streaming
    /// adapter.
    pub fn process(
        &mut self,
        chunk: &OllamaResponseChunk,
        schema_index: &ToolSchemaIndex,
    ) -> (Vec<SseEvent>, Vec<HealingAction>) {
        let mut events = Vec::new();
        let mut actions = Vec::new();

        let has_thinking = chunk
            .message
            .thinking
            .as_deref()
            .map(|t| !t.is_empty())
            .unwrap_or(false);
        let has_tool_calls = chunk
            .message
            .tool_calls
            .as_ref()
            .map(|calls| !calls.is_empty())
            .unwrap_or(false);
        let has_text = !chunk.message.content.is_empty();

        let was_first = self.is_first;
        if was_first {
            self.is_first = false;
            events.push(self.message_start_event());
        }

        let mut tool_calls_already_handled = false;

        if was_first {
            if has_thinking {
                events.push(self.open_block_event(BlockState::Thinking));
                events.push(ping_event());
            } else if has_tool_calls {
                self.emit_tool_calls(chunk, schema_index, &mut events, &mut actions);
                events.push(ping_event());
                tool_calls_already_handled = true;
                if chunk.done {
                    self.finish(chunk, &mut events);
                    return (events, actions);
                }
            } else {
                events.push(self.open_block_event(BlockState::Text));
                events.push(ping_event());
            }
        }

        if !tool_calls_already_handled {
            if has_tool_calls {
                self.close_current_block(&mut events);
                self.emit_tool_calls(chunk, schema_index, &mut events, &mut actions);
            } else {
                if self.block_state == BlockState::Thinking && has_text && !has_thinking {
                    self.close_current_block(&mut events);
                    events.push(self.open_block_event(BlockState::Text));
                }
                if self.block_state == BlockState::Thinking && has_thinking {
                    if let Some(thinking) = &chunk.message.thinking {
                        if !thinking.is_empty() {
                            events.push(self.delta_event(json!({
                                "type": "thinking_delta",
                                "thinking": thinking,
                            })));
                        }
                    }
                } else if self.block_state == BlockState::Text && has_text {
                    events.push(self.delta_event(json!({
                        "type": "text_delta",
                        "text": chunk.message.content,
                    })));
                }
            }
        }

        if chunk.done {
            self.finish(chunk, &mut events);
        }

        (events, actions)
    }

    fn message_start_event(&self) -> SseEvent {
        SseEvent {
            name: "message_start",
            data: json!({
                "type": "message_start",
                "message": {
                    "id": self.message_id,
                    "type": "message",
                    "role": "assistant",
                    "content": [],
                    "model": self.requested_model,
                    "stop_reason": Value::Null,
                    "stop_sequence": Value::Null,
                    "usage": {"input_tokens": 0, "output_tokens": 1},
                }
            }),
        }
    }

    fn open_block_event(&mut self, state: BlockState) -> SseEvent {
        self.block_state = state;
        let content_block = match state {
            BlockState::Thinking => json!({"type": "thinking", "thinking": ""}),
            BlockState::Text => json!({"type": "text", "text": ""}),
            BlockState::ToolUse | BlockState::None => unreachable!("opened via explicit call site"),
        };
        SseEvent {
            name: "content_block_start",
            data: json!({
                "type": "content_block_start",
                "index": self.block_index,
                "content_block": content_block,
            }),
        }
    }

    fn delta_event(&self, delta: Value) -> SseEvent {
        SseEvent {
            name: "content_block_delta",
            data: json!({
                "type": "content_block_delta",
                "index": self.block_index,
                "delta": delta,
            }),
        }
    }

    fn close_current_block(&mut self, events: &mut Vec<SseEvent>) {
        if self.block_state == BlockState::None {
            return;
        }
        events.push(SseEvent {
            name: "content_block_stop",
            data: json!({"type": "content_block_stop", "index": self.block_index}),
        });
        self.block_index += 1;
        self.block_state = BlockState::None;
    }

    /// Emits one `content_block_start`/`content_block_delta`/
    /// `content_block_stop` triple per tool call, healing arguments through
    /// all three Tool Healer phases as each surfaces (§4.4, §4.2).
    fn emit_tool_calls(
        &mut self,
        chunk: &OllamaResponseChunk,
        schema_index: &ToolSchemaIndex,
        events: &mut Vec<SseEvent>,
        actions: &mut Vec<HealingAction>,
    ) {
        let Some(tool_calls) = &chunk.message.tool_calls else {
            return;
        };
        for call in tool_calls {
            let name = &call.function.name;
            let schema = schema_index.get(name);
            let (healed, call_actions) = heal_tool_call(name, &call.function.arguments, schema);
            actions.extend(call_actions);
            self.any_tool_use = true;

            let id = new_tool_use_id();
            self.block_state = BlockState::ToolUse;
            events.push(SseEvent {
                name: "content_block_start",
                data: json!({
                    "type": "content_block_start",
                    "index": self.block_index,
                    "content_block": {"type": "tool_use", "id": id, "name": name, "input": {}},
                }),
            });
            events.push(SseEvent {
                name: "content_block_delta",
                data: json!({
                    "type": "content_block_delta",
                    "index": self.block_index,
                    "delta": {
                        "type": "input_json_delta",
                        "partial_json": serde_json::to_string(&healed).unwrap_or_default(),
                    },
                }),
            });
            events.push(SseEvent {
                name: "content_block_stop",
                data: json!({"type": "content_block_stop", "index": self.block_index}),
            });
            self.block_index += 1;
        }
        self.block_state = BlockState::None;
    }

    fn finish(&mut self, chunk: &OllamaResponseChunk, events: &mut Vec<SseEvent>) {
        self.close_current_block(events);
        let stop_reason = derive_stop_reason(chunk.done_reason.as_deref(), self.any_tool_use);
        events.push(SseEvent {
            name: "message_delta",
            data: json!({
                "type": "message_delta",
                "delta": {
                    "stop_reason": stop_reason,
                    "stop_sequence": Value::Null,
                },
                "usage": {"output_tokens": chunk.eval_count.unwrap_or(0)},
            }),
        });
        events.push(SseEvent {
            name: "message_stop",
            data: json!({"type": "message_stop"}),
        });
    }
}

fn ping_event() -> SseEvent {
    SseEvent {
        name: "ping",
        data: json!({"type": "ping"}),
    }
}

/// Buffers a byte stream into complete NDJSON lines (§4.4 Buffering): splits
/// on newline, parses each complete line as an `OllamaResponseChunk`
/// (discarding blank or unparseable lines), and retains the trailing partial
/// line for the next push.
#[derive(Default)]
pub struct NdjsonLineBuffer {
    pending: String,
}

impl NdjsonLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds newly-read bytes in, returning every complete chunk parsed out
    /// of them. A trailing partial line is kept verbatim for the next call.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<OllamaResponseChunk> {
        self.pending.push_str(&String::from_utf8_lossy(bytes));

        let mut chunks = Vec::new();
        loop {
            let Some(newline_pos) = self.pending.find('\n') else {
                break;
            };
            let line = self.pending[..newline_pos].to_string();
            self.pending.drain(..=newline_pos);
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Ok(chunk) = serde_json::from_str::<OllamaResponseChunk>(trimmed) {
                chunks.push(chunk);
            }
        }
        chunks
    }
}
