//! History Healer and Parallel-to-Sequential Rewriter (§4.3): sanitizes
//! prior turns before they're forwarded to Ollama so a local model isn't
//! steered off track by its own earlier tool-call mistakes.

use crate::healing::heal_existing_input;
use crate::schema::ToolSchemaIndex;
use crate::types::{ContentBlock, Message, MessageContent, Role};

/// Substrings that, together, mark a `tool_result` error as a
/// parameter-validation failure rather than a genuine tool-execution error.
const VALIDATION_MARKER: &str = "InputValidationError";
const VALIDATION_DETAILS: &[&str] = &["required parameter", "unexpected parameter", "type is expected as"];

/// Error text pattern used by siblings of a failing parallel tool call to
/// report that they never ran because another call in the same round failed
/// validation. Not specified verbatim upstream (§9 Open Question); this is
/// the resolution recorded in DESIGN.md.
const SIBLING_PROPAGATION_MARKERS: &[&str] =
    &["sibling tool call", "blocked by a previous tool call error"];

fn is_validation_error(text: &str) -> bool {
    text.contains(VALIDATION_MARKER) && VALIDATION_DETAILS.iter().any(|d| text.contains(d))
}

fn is_sibling_propagation_error(text: &str) -> bool {
    SIBLING_PROPAGATION_MARKERS.iter().any(|m| text.contains(m))
}

fn tool_use_blocks(content: &[ContentBlock]) -> Vec<(&String, &String)> {
    content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, .. } => Some((id, name)),
            _ => None,
        })
        .collect()
}

/// Runs Phases 2-3 of the Tool Healer over every `ToolUse` block in history
/// so later turns see canonical input, using each block's own tool name to
/// look up its schema (unknown tools pass through untouched).
fn heal_tool_use_inputs(messages: &mut [Message], schema_index: &ToolSchemaIndex) {
    for message in messages.iter_mut() {
        let blocks = message.content.as_blocks();
        let mut changed = false;
        let healed: Vec<ContentBlock> = blocks
            .into_iter()
            .map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    let schema = schema_index.get(&name);
                    let (healed_input, actions) = heal_existing_input(&name, input, schema);
                    if !actions.is_empty() {
                        changed = true;
                    }
                    ContentBlock::ToolUse {
                        id,
                        name,
                        input: healed_input,
                    }
                }
                other => other,
            })
            .collect();
        if changed {
            message.content = MessageContent::Blocks(healed);
        }
    }
}

/// Drops failed tool-use/tool-result rounds from `messages` (§4.3 step 2-3).
fn strip_failed_rounds(messages: Vec<Message>) -> Vec<Message> {
    let mut out = Vec::with_capacity(messages.len());
    let mut iter = messages.into_iter().peekable();

    while let Some(message) = iter.next() {
        if message.role != Role::Assistant {
            out.push(message);
            continue;
        }
        let blocks = message.content.as_blocks();
        let tool_use_ids: Vec<String> = tool_use_blocks(&blocks)
            .iter()
            .map(|(id, _)| (*id).clone())
            .collect();
        if tool_use_ids.is_empty() {
            out.push(message);
            continue;
        }

        let user_blocks_preview = iter
            .peek()
            .filter(|next| next.role == Role::User)
            .map(|next| next.content.as_blocks());

        let drop_ids: Vec<String> = match &user_blocks_preview {
            Some(user_blocks) if round_is_failed(user_blocks, &tool_use_ids) => {
                failing_and_sibling_ids(user_blocks, &tool_use_ids)
            }
            _ => Vec::new(),
        };

        if drop_ids.is_empty() {
            out.push(message);
            continue;
        }

        let kept_assistant_blocks: Vec<ContentBlock> = blocks
            .into_iter()
            .filter(|b| !matches!(b, ContentBlock::ToolUse { id, .. } if drop_ids.contains(id)))
            .collect();
        if !kept_assistant_blocks.is_empty() {
            out.push(Message {
                role: Role::Assistant,
                content: MessageContent::Blocks(kept_assistant_blocks),
            });
        }

        let user_message = iter.next().expect("peeked Some above");
        let kept_user_blocks: Vec<ContentBlock> = user_message
            .content
            .as_blocks()
            .into_iter()
            .filter(|b| match b {
                ContentBlock::ToolResult { tool_use_id, .. } => !drop_ids.contains(tool_use_id),
                _ => true,
            })
            .collect();
        if !kept_user_blocks.is_empty() {
            out.push(Message {
                role: Role::User,
                content: MessageContent::Blocks(kept_user_blocks),
            });
        }
    }

    out
}

/// Among `tool_use_ids`, returns those whose matching `ToolResult` is either
/// the triggering validation failure or a sibling-propagated error.
fn failing_and_sibling_ids(user_blocks: &[ContentBlock], tool_use_ids: &[String]) -> Vec<String> {
    user_blocks
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error: Some(true),
            } if tool_use_ids.contains(tool_use_id) => {
                let text = crate::types::project_tool_result_content(content);
                if is_validation_error(&text) || is_sibling_propagation_error(&text) {
                    Some(tool_use_id.clone())
                } else {
                    None
                }
            }
            _ => None,
        })
        .collect()
}

fn round_is_failed(user_blocks: &[ContentBlock], tool_use_ids: &[String]) -> bool {
    user_blocks.iter().any(|block| match block {
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error: Some(true),
        } if tool_use_ids.contains(tool_use_id) => {
            is_validation_error(&crate::types::project_tool_result_content(content))
        }
        _ => false,
    })
}

/// Top-level entry point: heals every ToolUse input in history, then strips
/// failed rounds.
pub fn heal_history(mut messages: Vec<Message>, schema_index: &ToolSchemaIndex) -> Vec<Message> {
    heal_tool_use_inputs(&mut messages, schema_index);
    strip_failed_rounds(messages)
}

/// Expands assistant messages holding N>=2 `ToolUse` blocks (matched by an
/// immediately following user message of `ToolResult`s) into N sequential
/// (assistant, user) pairs (§4.3). Idempotent: messages already in
/// single-tool-per-pair form pass through unchanged.
pub fn rewrite_parallel_to_sequential(messages: Vec<Message>) -> Vec<Message> {
    let mut out = Vec::with_capacity(messages.len());
    let mut iter = messages.into_iter().peekable();

    while let Some(message) = iter.next() {
        if message.role != Role::Assistant {
            out.push(message);
            continue;
        }
        let blocks = message.content.as_blocks();
        let tool_use_ids: Vec<String> = tool_use_blocks(&blocks)
            .iter()
            .map(|(id, _)| (*id).clone())
            .collect();

        if tool_use_ids.len() < 2 {
            out.push(message);
            continue;
        }

        let Some(next) = iter.peek() else {
            out.push(message);
            continue;
        };
        if next.role != Role::User {
            out.push(message);
            continue;
        }
        let user_blocks = next.content.as_blocks();
        let matching: std::collections::HashMap<String, ContentBlock> = user_blocks
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult { tool_use_id, .. } if tool_use_ids.contains(tool_use_id) => {
                    Some((tool_use_id.clone(), b.clone()))
                }
                _ => None,
            })
            .collect();
        if matching.is_empty() {
            out.push(message);
            continue;
        }

        let user_message = iter.next().expect("peeked Some above");
        let _ = user_message;

        let non_tool_blocks: Vec<ContentBlock> = blocks
            .iter()
            .filter(|b| !matches!(b, ContentBlock::ToolUse { .. }))
            .cloned()
            .collect();

        let mut first = true;
        for (id, _name) in tool_use_blocks(&blocks) {
            let tool_use_block = blocks
                .iter()
                .find(|b| matches!(b, ContentBlock::ToolUse { id: bid, .. } if bid == id))
                .cloned()
                .expect("id came from blocks");

            let mut assistant_blocks = if first {
                non_tool_blocks.clone()
            } else {
                Vec::new()
            };
            assistant_blocks.push(tool_use_block);
            out.push(Message {
                role: Role::Assistant,
                content: MessageContent::Blocks(assistant_blocks),
            });

            if let Some(result) = matching.get(id) {
                out.push(Message {
                    role: Role::User,
                    content: MessageContent::Blocks(vec![result.clone()]),
                });
            }

            first = false;
        }

        let leftover: Vec<ContentBlock> = user_blocks
            .into_iter()
            .filter(|b| match b {
                ContentBlock::ToolResult { tool_use_id, .. } => !matching.contains_key(tool_use_id),
                _ => true,
            })
            .collect();
        if !leftover.is_empty() {
            out.push(Message {
                role: Role::User,
                content: MessageContent::Blocks(leftover),
            });
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool_use(id: &str, name: &str) -> ContentBlock {
        ContentBlock::ToolUse {
            id: id.to_string(),
            name: name.to_string(),
            input: json!({}).as_object().unwrap().clone(),
        }
    }

    fn tool_result(id: &str, text: &str, is_error: bool) -> ContentBlock {
        ContentBlock::ToolResult {
            tool_use_id: id.to_string(),
            content: json!(text),
            is_error: Some(is_error),
        }
    }

    #[test]
    fn strips_failed_round_with_validation_error() {
        let messages = vec![
            Message {
                role: Role::Assistant,
                content: MessageContent::Blocks(vec![tool_use("toolu_1", "Read")]),
            },
            Message {
                role: Role::User,
                content: MessageContent::Blocks(vec![tool_result(
                    "toolu_1",
                    "InputValidationError: unexpected parameter 'file'",
                    true,
                )]),
            },
        ];
        let index = ToolSchemaIndex::new();
        let healed = heal_history(messages, &index);
        assert!(healed.is_empty());
    }

    #[test]
    fn preserves_non_tool_text_on_assistant_message_in_failed_round() {
        let messages = vec![
            Message {
                role: Role::Assistant,
                content: MessageContent::Blocks(vec![
                    ContentBlock::text("let me try that"),
                    tool_use("toolu_1", "Read"),
                ]),
            },
            Message {
                role: Role::User,
                content: MessageContent::Blocks(vec![tool_result(
                    "toolu_1",
                    "InputValidationError: required parameter 'file' missing",
                    true,
                )]),
            },
        ];
        let index = ToolSchemaIndex::new();
        let healed = heal_history(messages, &index);
        assert_eq!(healed.len(), 1);
        assert_eq!(healed[0].role, Role::Assistant);
    }

    #[test]
    fn leaves_successful_round_untouched() {
        let messages = vec![
            Message {
                role: Role::Assistant,
                content: MessageContent::Blocks(vec![tool_use("toolu_1", "Read")]),
            },
            Message {
                role: Role::User,
                content: MessageContent::Blocks(vec![tool_result("toolu_1", "file contents", false)]),
            },
        ];
        let index = ToolSchemaIndex::new();
        let healed = heal_history(messages, &index);
        assert_eq!(healed.len(), 2);
    }

    #[test]
    fn rewriter_expands_two_parallel_calls_into_sequential_pairs() {
        let messages = vec![
            Message {
                role: Role::Assistant,
                content: MessageContent::Blocks(vec![
                    tool_use("toolu_1", "Read"),
                    tool_use("toolu_2", "Glob"),
                ]),
            },
            Message {
                role: Role::User,
                content: MessageContent::Blocks(vec![
                    tool_result("toolu_1", "contents a", false),
                    tool_result("toolu_2", "contents b", false),
                ]),
            },
        ];
        let rewritten = rewrite_parallel_to_sequential(messages);
        assert_eq!(rewritten.len(), 4);
        assert_eq!(rewritten[0].role, Role::Assistant);
        assert_eq!(rewritten[1].role, Role::User);
        assert_eq!(rewritten[2].role, Role::Assistant);
        assert_eq!(rewritten[3].role, Role::User);
    }

    #[test]
    fn rewriter_is_idempotent() {
        let messages = vec![
            Message {
                role: Role::Assistant,
                content: MessageContent::Blocks(vec![
                    tool_use("toolu_1", "Read"),
                    tool_use("toolu_2", "Glob"),
                ]),
            },
            Message {
                role: Role::User,
                content: MessageContent::Blocks(vec![
                    tool_result("toolu_1", "contents a", false),
                    tool_result("toolu_2", "contents b", false),
                ]),
            },
        ];
        let once = rewrite_parallel_to_sequential(messages);
        let twice = rewrite_parallel_to_sequential(once.clone());
        assert_eq!(format!("{:?}", once), format!("{:?}", twice));
    }

    #[test]
    fn rewriter_passes_through_single_tool_use_messages() {
        let messages = vec![
            Message {
                role: Role::Assistant,
                content: MessageContent::Blocks(vec![tool_use("toolu_1", "Read")]),
            },
            Message {
                role: Role::User,
                content: MessageContent::Blocks(vec![tool_result("toolu_1", "contents a", false)]),
            },
        ];
        let rewritten = rewrite_parallel_to_sequential(messages.clone());
        assert_eq!(rewritten.len(), messages.len());
    }
}
