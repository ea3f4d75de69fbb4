use super::{AnthropicContentBlock, AnthropicResponse};
use crate::error::TranscodeError;
use crate::protocol::canonical::{CanonicalChunk, CanonicalUsage};
use crate::protocol::{arguments_json, ResponseParts};
use crate::util::next_chunk_id;

/// Decode an Anthropic Messages API response body into one canonical chunk.
///
/// # Errors
///
/// Returns [`TranscodeError::Translation`] when the body is not a Messages response.
pub fn decode_anthropic_response(body: &[u8], model: &str) -> Result<CanonicalChunk, TranscodeError> {
    let response: AnthropicResponse = serde_json::from_slice(body)
        .map_err(|e| TranscodeError::Translation(format!("invalid Anthropic response: {e}")))?;

    let mut parts = ResponseParts::default();
    for block in &response.content {
        match block {
            AnthropicContentBlock::Text { text } => parts.push_text(text),
            AnthropicContentBlock::Thinking { thinking } => parts.push_reasoning(thinking),
            AnthropicContentBlock::ToolUse { id, name, input } => {
                parts.push_tool_call(id.clone(), name.clone(), arguments_json(input));
            }
            AnthropicContentBlock::Other => {}
        }
    }

    let usage = CanonicalUsage::from_counts(
        response.usage.input_tokens.unwrap_or(0),
        response.usage.output_tokens.unwrap_or(0),
    );
    let id = if response.id.is_empty() {
        next_chunk_id()
    } else {
        response.id
    };
    let model = if response.model.is_empty() {
        model.to_string()
    } else {
        response.model
    };
    Ok(parts.into_chunk(id, model, response.stop_reason.as_deref(), usage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_thinking_and_tools() {
        let body = serde_json::json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "model": "claude-sonnet-4-5",
            "content": [
                {"type": "thinking", "thinking": "let me see", "signature": "sig"},
                {"type": "text", "text": "first"},
                {"type": "text", "text": "second"},
                {"type": "tool_use", "id": "toolu_1", "name": "get_weather", "input": {"city": "Seoul"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 30}
        });
        let chunk = decode_anthropic_response(body.to_string().as_bytes(), "fallback").unwrap();
        assert_eq!(chunk.id, "msg_1");
        assert_eq!(chunk.model, "claude-sonnet-4-5");
        assert_eq!(chunk.delta.content.as_deref(), Some("first\nsecond"));
        assert_eq!(chunk.delta.reasoning_content.as_deref(), Some("let me see"));
        let calls = chunk.delta.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.arguments.as_deref(), Some("{\"city\":\"Seoul\"}"));
        assert_eq!(chunk.finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(chunk.usage.unwrap().total_tokens, 42);
    }

    #[test]
    fn test_missing_usage_defaults_to_zero() {
        let body = br#"{"content":[{"type":"text","text":"ok"}],"stop_reason":"end_turn"}"#;
        let chunk = decode_anthropic_response(body, "claude-x").unwrap();
        assert_eq!(chunk.model, "claude-x");
        assert_eq!(chunk.usage.unwrap().total_tokens, 0);
        assert_eq!(chunk.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn test_invalid_body_is_translation_error() {
        let err = decode_anthropic_response(b"<html>", "m").unwrap_err();
        assert!(matches!(err, TranscodeError::Translation(_)));
    }
}
