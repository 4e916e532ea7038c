//! Token Approximator (§4.7): a pure, local estimate of input tokens for the
//! `count_tokens` endpoint. No upstream call — Non-goals explicitly scope out
//! accurate tokenization.

use crate::types::{project_tool_result_content, ContentBlock, MessageContent, Request};

/// Counts one word as `1` token if it's four characters or shorter, else
/// `ceil(len / 4)`.
fn word_tokens(word: &str) -> u32 {
    let len = word.chars().count();
    if len <= 4 {
        1
    } else {
        ((len + 3) / 4) as u32
    }
}

fn count_text(text: &str) -> u32 {
    text.split_whitespace().map(word_tokens).sum()
}

fn block_text(block: &ContentBlock) -> String {
    match block {
        ContentBlock::Text { text } => text.clone(),
        ContentBlock::Thinking { thinking } => thinking.clone(),
        ContentBlock::ToolUse { input, .. } => serde_json::to_string(input).unwrap_or_default(),
        ContentBlock::ToolResult { content, .. } => project_tool_result_content(content),
    }
}

/// Approximates `input_tokens` over every textual surface of the request:
/// the flattened system prompt plus every message's textual projection,
/// including JSON-serialized tool_use inputs.
pub fn approximate_input_tokens(request: &Request) -> u32 {
    let mut total = 0;

    if let Some(system) = &request.system {
        for block in system.as_blocks() {
            total += count_text(&block_text(&block));
        }
    }

    for message in &request.messages {
        let blocks = match &message.content {
            MessageContent::Text(text) => vec![ContentBlock::text(text.clone())],
            MessageContent::Blocks(blocks) => blocks.clone(),
        };
        for block in blocks {
            total += count_text(&block_text(&block));
        }
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, Role};

    fn request_with_text(text: &str) -> Request {
        Request {
            model: "claude-3-5-sonnet-20241022".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: MessageContent::Text(text.to_string()),
            }],
            system: None,
            max_tokens: None,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            stream: None,
            tools: None,
            tool_choice: None,
            thinking: None,
        }
    }

    #[test]
    fn empty_input_is_zero() {
        let request = request_with_text("");
        assert_eq!(approximate_input_tokens(&request), 0);
    }

    #[test]
    fn four_character_word_is_one_token() {
        let request = request_with_text("abcd");
        assert_eq!(approximate_input_tokens(&request), 1);
    }

    #[test]
    fn nine_character_word_is_three_tokens() {
        let request = request_with_text("abcdefghi");
        assert_eq!(approximate_input_tokens(&request), 3);
    }

    #[test]
    fn counts_across_multiple_words() {
        let request = request_with_text("abcd abcdefghi");
        assert_eq!(approximate_input_tokens(&request), 4);
    }

    #[test]
    fn system_prompt_text_is_counted() {
        let mut request = request_with_text("hi");
        request.system = Some(MessageContent::Text("abcdefghi".to_string()));
        assert_eq!(approximate_input_tokens(&request), 3 + 1);
    }
}
