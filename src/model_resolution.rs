//! Model name resolution and the Thinking Policy (§4.1).

use crate::config::Configuration;
use crate::error::AppError;
use crate::types::Request;

/// Case-insensitive prefixes of models known to support `think`.
const THINKING_CAPABLE_PREFIXES: &[&str] =
    &["qwen3", "deepseek-r1", "magistral", "nemotron", "glm4", "qwq"];

pub fn is_thinking_capable(resolved_model: &str) -> bool {
    let lower = resolved_model.to_lowercase();
    THINKING_CAPABLE_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}

/// Applies the Thinking Policy in place: strips `request.thinking` (or
/// rejects the request in strict mode) when the resolved model can't think.
/// Returns `true` if a field was stripped, so the caller can log the single
/// required warning record.
pub fn apply_thinking_policy(
    request: &mut Request,
    resolved_model: &str,
    config: &Configuration,
) -> Result<bool, AppError> {
    if request.thinking.is_none() {
        return Ok(false);
    }
    if is_thinking_capable(resolved_model) {
        return Ok(false);
    }
    if config.strict_thinking {
        return Err(AppError::ThinkingNotSupported);
    }
    request.thinking = None;
    log::warn!(
        "event=thinking.stripped model={} reason=not_thinking_capable",
        resolved_model
    );
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Message, MessageContent, Role, ThinkingConfig, ThinkingType};

    fn base_request() -> Request {
        Request {
            model: "claude-3-5-sonnet-20241022".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: MessageContent::Text("hi".to_string()),
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
            thinking: Some(ThinkingConfig {
                thinking_type: ThinkingType::Enabled,
                budget_tokens: Some(5000),
                effort: None,
            }),
        }
    }

    #[test]
    fn resolve_model_claude_prefix_uses_default() {
        let config = Configuration::default();
        assert_eq!(
            config.resolve_model("claude-3-opus"),
            config.default_model
        );
    }

    #[test]
    fn thinking_capable_prefix_is_case_insensitive() {
        assert!(is_thinking_capable("QWEN3:32b"));
        assert!(is_thinking_capable("deepseek-r1:7b"));
        assert!(!is_thinking_capable("llama3.1:8b"));
    }

    #[test]
    fn strip_silently_when_not_strict() {
        let mut config = Configuration::default();
        config.strict_thinking = false;
        let mut request = base_request();
        let stripped = apply_thinking_policy(&mut request, "llama3.1", &config).unwrap();
        assert!(stripped);
        assert!(request.thinking.is_none());
    }

    #[test]
    fn reject_in_strict_mode() {
        let mut config = Configuration::default();
        config.strict_thinking = true;
        let mut request = base_request();
        let result = apply_thinking_policy(&mut request, "llama3.1", &config);
        assert!(matches!(result, Err(AppError::ThinkingNotSupported)));
    }

    #[test]
    fn pass_through_untouched_when_capable() {
        let mut config = Configuration::default();
        config.strict_thinking = true;
        let mut request = base_request();
        let stripped = apply_thinking_policy(&mut request, "qwen3:32b", &config).unwrap();
        assert!(!stripped);
        assert!(request.thinking.is_some());
    }
}
