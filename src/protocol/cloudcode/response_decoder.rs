use super::parse_cloudcode_response;
use crate::error::TranscodeError;
use crate::protocol::canonical::{CanonicalChunk, CanonicalUsage};
use crate::protocol::mapping::cloudcode_finish_to_stop_reason;
use crate::protocol::{arguments_json, ResponseParts};
use crate::util::{next_call_id, next_chunk_id};

/// Decode a Cloud Code `generateContent` body (wrapped or bare) into one canonical chunk.
///
/// Only the first candidate is used.
///
/// # Errors
///
/// Returns [`TranscodeError::Translation`] when the body is not a generateContent response.
pub fn decode_cloudcode_response(body: &[u8], model: &str) -> Result<CanonicalChunk, TranscodeError> {
    let response = parse_cloudcode_response(body)
        .map_err(|e| TranscodeError::Translation(format!("invalid Cloud Code response: {e}")))?;

    let mut parts = ResponseParts::default();
    let mut finish_reason = None;
    if let Some(candidate) = response.candidates.into_iter().next() {
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(call) = part.function_call {
                let id = call.id.filter(|id| !id.is_empty()).unwrap_or_else(next_call_id);
                parts.push_tool_call(id, call.name, arguments_json(&call.args));
            } else if let Some(text) = part.text.as_deref() {
                if part.is_thought() {
                    parts.push_reasoning(text);
                } else {
                    parts.push_text(text);
                }
            }
        }
        finish_reason = candidate.finish_reason;
    }

    let stop_reason = finish_reason
        .as_deref()
        .map(|reason| cloudcode_finish_to_stop_reason(reason, parts.has_tool_calls()));
    let usage = response.usage_metadata.unwrap_or_default();
    let usage = CanonicalUsage::from_counts(
        usage.prompt_token_count.unwrap_or(0),
        usage.completion_tokens(),
    );
    let id = response
        .response_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(next_chunk_id);
    let model = response
        .model_version
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| model.to_string());
    Ok(parts.into_chunk(id, model, stop_reason.as_deref(), usage))
}
