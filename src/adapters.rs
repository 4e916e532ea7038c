//! Request Adapter and non-streaming Response Adapter (§4.5): translation
//! between the Anthropic Messages shape and the Ollama chat shape.

use serde_json::Value;

use crate::healing::{heal_tool_call, HealingAction};
use crate::model_resolution::is_thinking_capable;
use crate::ollama::{
    OllamaChatRequest, OllamaFunctionCall, OllamaMessage, OllamaOptions, OllamaResponseChunk,
    OllamaToolCall, OllamaToolDefinition,
};
use crate::schema::ToolSchemaIndex;
use crate::types::{
    new_message_id, new_tool_use_id, ContentBlock, Message, MessageContent, Request, Response,
    Role, StopReason, Usage,
};

/// Builds the outbound Ollama request from a (already healed/rewritten)
/// Anthropic request, given the already-resolved model name and whether
/// `thinking` survived the Thinking Policy.
pub fn build_ollama_request(
    request: &Request,
    resolved_model: &str,
    think: bool,
) -> OllamaChatRequest {
    let mut messages = Vec::new();

    if let Some(system) = &request.system {
        let flattened = flatten_system(system);
        if !flattened.is_empty() {
            messages.push(OllamaMessage {
                role: "system".to_string(),
                content: flattened,
                ..Default::default()
            });
        }
    }

    for message in &request.messages {
        messages.extend(translate_message(message));
    }

    let options = build_options(request);
    let tools = request.tools.as_ref().map(|tools| {
        tools
            .iter()
            .map(|tool| {
                OllamaToolDefinition::function(
                    tool.name.clone(),
                    tool.description.clone(),
                    tool.input_schema.clone(),
                )
            })
            .collect()
    });

    OllamaChatRequest {
        model: resolved_model.to_string(),
        messages,
        stream: request.is_streaming(),
        options: options.filter(|o: &OllamaOptions| !o.is_empty()),
        tools,
        think: if think { Some(true) } else { None },
    }
}

fn flatten_system(system: &MessageContent) -> String {
    system
        .as_blocks()
        .iter()
        .map(|block| block.as_text_projection())
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_options(request: &Request) -> Option<OllamaOptions> {
    Some(OllamaOptions {
        num_predict: request.max_tokens,
        temperature: request.temperature,
        top_p: request.top_p,
        top_k: request.top_k,
        stop: request.stop_sequences.clone(),
    })
}

/// Translates one Anthropic message into zero or more Ollama messages.
/// A `user` message carrying tool_result blocks yields one `tool` message
/// per result; everything else collapses to a single message.
fn translate_message(message: &Message) -> Vec<OllamaMessage> {
    let blocks = message.content.as_blocks();

    if message.role == Role::User {
        let tool_results: Vec<&ContentBlock> = blocks
            .iter()
            .filter(|b| matches!(b, ContentBlock::ToolResult { .. }))
            .collect();
        if !tool_results.is_empty() {
            return tool_results
                .into_iter()
                .map(|block| OllamaMessage {
                    role: "tool".to_string(),
                    content: block.as_text_projection(),
                    ..Default::default()
                })
                .collect();
        }
    }

    if message.role == Role::Assistant {
        let tool_calls: Vec<OllamaToolCall> = blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse { name, input, .. } => Some(OllamaToolCall {
                    function: OllamaFunctionCall {
                        name: name.clone(),
                        arguments: Value::Object(input.clone()),
                    },
                }),
                _ => None,
            })
            .collect();
        if !tool_calls.is_empty() {
            let content = blocks
                .iter()
                .filter(|b| !matches!(b, ContentBlock::ToolUse { .. }))
                .map(|b| b.as_text_projection())
                .collect::<Vec<_>>()
                .join("\n");
            return vec![OllamaMessage {
                role: "assistant".to_string(),
                content,
                tool_calls: Some(tool_calls),
                ..Default::default()
            }];
        }
    }

    let content = blocks
        .iter()
        .map(|b| b.as_text_projection())
        .collect::<Vec<_>>()
        .join("\n");
    vec![OllamaMessage {
        role: role_str(message.role).to_string(),
        content,
        ..Default::default()
    }]
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

/// Healed tool calls plus the actions taken, for logging by the caller.
pub struct HealedToolCalls {
    pub blocks: Vec<ContentBlock>,
    pub actions: Vec<HealingAction>,
}

fn heal_tool_calls(tool_calls: &[OllamaToolCall], schema_index: &ToolSchemaIndex) -> HealedToolCalls {
    let mut blocks = Vec::new();
    let mut actions = Vec::new();
    for call in tool_calls {
        let name = &call.function.name;
        let schema = schema_index.get(name);
        let (healed, call_actions) = heal_tool_call(name, &call.function.arguments, schema);
        actions.extend(call_actions);
        blocks.push(ContentBlock::tool_use(new_tool_use_id(), name.clone(), healed));
    }
    HealedToolCalls { blocks, actions }
}

/// Maps Ollama's `done_reason` to an Anthropic `stop_reason`, then applies
/// the tool_use override (§4.1, §4.5): any tool_use block forces `end_turn`.
/// Shared with the streaming transformer so both paths agree.
pub fn derive_stop_reason(done_reason: Option<&str>, has_tool_use: bool) -> StopReason {
    if has_tool_use {
        return StopReason::EndTurn;
    }
    match done_reason {
        Some("length") => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    }
}

/// Translates a non-streaming Ollama response into an Anthropic `Response`
/// (§4.5). `client_model` is the model string the client sent us, which is
/// always what's echoed back regardless of what was actually dispatched.
pub fn adapt_response(
    chunk: &OllamaResponseChunk,
    client_model: &str,
    schema_index: &ToolSchemaIndex,
) -> (Response, Vec<HealingAction>) {
    let mut content = Vec::new();
    let mut actions = Vec::new();

    if let Some(thinking) = &chunk.message.thinking {
        if !thinking.is_empty() {
            content.push(ContentBlock::Thinking {
                thinking: thinking.clone(),
            });
        }
    }

    let has_tool_use = chunk
        .message
        .tool_calls
        .as_ref()
        .map(|calls| !calls.is_empty())
        .unwrap_or(false);

    if let Some(tool_calls) = &chunk.message.tool_calls {
        let healed = heal_tool_calls(tool_calls, schema_index);
        content.extend(healed.blocks);
        actions.extend(healed.actions);
    }

    if !chunk.message.content.is_empty() {
        content.push(ContentBlock::text(chunk.message.content.clone()));
    }

    let mut response = Response {
        id: new_message_id(),
        response_type: "message",
        role: "assistant",
        content,
        model: client_model.to_string(),
        stop_reason: Some(derive_stop_reason(chunk.done_reason.as_deref(), has_tool_use)),
        stop_sequence: None,
        usage: Usage {
            input_tokens: chunk.prompt_eval_count.unwrap_or(0),
            output_tokens: chunk.eval_count.unwrap_or(0),
        },
    };
    response.ensure_nonempty_content();

    (response, actions)
}

/// Whether `think: true` should be sent to Ollama: the request still carries
/// `thinking` after policy filtering and the resolved model supports it.
pub fn should_think(request: &Request, resolved_model: &str) -> bool {
    request.thinking.is_some() && is_thinking_capable(resolved_model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ollama::OllamaMessage as WireMessage;
    use crate::types::{Message, ThinkingConfig, ThinkingType};
    use serde_json::json;

    fn base_request() -> Request {
        Request {
            model: "claude-3-5-sonnet-20241022".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: MessageContent::Text("Hello".to_string()),
            }],
            system: None,
            max_tokens: Some(100),
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            stream: Some(false),
            tools: None,
            tool_choice: None,
            thinking: None,
        }
    }

    #[test]
    fn plain_completion_round_trips_model_name() {
        let request = base_request();
        let ollama_request = build_ollama_request(&request, "llama3.1", false);
        assert_eq!(ollama_request.model, "llama3.1");
        assert_eq!(ollama_request.messages[0].content, "Hello");
        assert_eq!(ollama_request.options.unwrap().num_predict, Some(100));
    }

    #[test]
    fn system_list_flattens_through_projections() {
        let mut request = base_request();
        request.system = Some(MessageContent::Blocks(vec![
            ContentBlock::text("be terse"),
            ContentBlock::Thinking {
                thinking: "plan first".to_string(),
            },
        ]));
        let ollama_request = build_ollama_request(&request, "llama3.1", false);
        assert_eq!(ollama_request.messages[0].role, "system");
        assert_eq!(ollama_request.messages[0].content, "be terse\nplan first");
    }

    #[test]
    fn tool_result_message_becomes_one_tool_message_per_result() {
        let mut request = base_request();
        request.messages.push(Message {
            role: Role::User,
            content: MessageContent::Blocks(vec![
                ContentBlock::ToolResult {
                    tool_use_id: "toolu_aaaaaaaaaaaaaaaa".to_string(),
                    content: json!("result a"),
                    is_error: None,
                },
                ContentBlock::ToolResult {
                    tool_use_id: "toolu_bbbbbbbbbbbbbbbb".to_string(),
                    content: json!("result b"),
                    is_error: None,
                },
            ]),
        });
        let ollama_request = build_ollama_request(&request, "llama3.1", false);
        let tool_messages: Vec<&WireMessage> = ollama_request
            .messages
            .iter()
            .filter(|m| m.role == "tool")
            .collect();
        assert_eq!(tool_messages.len(), 2);
    }

    #[test]
    fn thinking_survives_only_when_capable_and_requested() {
        let mut request = base_request();
        request.thinking = Some(ThinkingConfig {
            thinking_type: ThinkingType::Enabled,
            budget_tokens: Some(1000),
            effort: None,
        });
        assert!(should_think(&request, "qwen3:32b"));
        assert!(!should_think(&request, "llama3.1"));
    }

    #[test]
    fn plain_completion_end_to_end() {
        let chunk = OllamaResponseChunk {
            model: "llama3.1".to_string(),
            message: WireMessage {
                role: "assistant".to_string(),
                content: "Hello from Ollama!".to_string(),
                tool_calls: None,
                thinking: None,
            },
            done: true,
            done_reason: Some("stop".to_string()),
            eval_count: Some(8),
            prompt_eval_count: Some(15),
        };
        let index = ToolSchemaIndex::new();
        let (response, actions) =
            adapt_response(&chunk, "claude-3-5-sonnet-20241022", &index);
        assert!(actions.is_empty());
        assert_eq!(response.model, "claude-3-5-sonnet-20241022");
        assert_eq!(response.usage.input_tokens, 15);
        assert_eq!(response.usage.output_tokens, 8);
        assert!(matches!(response.stop_reason, Some(StopReason::EndTurn)));
        match &response.content[0] {
            ContentBlock::Text { text } => assert_eq!(text, "Hello from Ollama!"),
            other => panic!("expected text block, got {:?}", other),
        }
    }

    #[test]
    fn tool_call_healing_runs_through_adapter() {
        let tools = vec![crate::types::ToolDefinition {
            name: "Read".to_string(),
            description: None,
            input_schema: json!({"properties": {"file_path": {"type": "string"}}}),
        }];
        let index = crate::schema::build_index(&tools);
        let chunk = OllamaResponseChunk {
            model: "llama3.1".to_string(),
            message: WireMessage {
                role: "assistant".to_string(),
                content: String::new(),
                tool_calls: Some(vec![OllamaToolCall {
                    function: OllamaFunctionCall {
                        name: "Read".to_string(),
                        arguments: json!(r#"{"file":"/tmp/a"}"#),
                    },
                }]),
                thinking: None,
            },
            done: true,
            done_reason: Some("stop".to_string()),
            eval_count: Some(4),
            prompt_eval_count: Some(10),
        };
        let (response, _) = adapt_response(&chunk, "claude-3-5-sonnet-20241022", &index);
        match &response.content[0] {
            ContentBlock::ToolUse { id, name, input } => {
                assert!(id.starts_with("toolu_"));
                assert_eq!(name, "Read");
                assert_eq!(input.get("file_path").unwrap(), "/tmp/a");
            }
            other => panic!("expected tool_use block, got {:?}", other),
        }
        assert!(matches!(response.stop_reason, Some(StopReason::EndTurn)));
    }
}
