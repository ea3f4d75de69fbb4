use super::{ResponsesContentPart, ResponsesObject, ResponsesOutputItem, ResponsesSummaryPart};
use crate::error::TranscodeError;
use crate::protocol::canonical::{CanonicalChunk, CanonicalUsage};
use crate::protocol::mapping::responses_status_to_stop_reason;
use crate::protocol::ResponseParts;
use crate::util::{next_call_id, next_chunk_id};

/// Decode a completed Responses API object into one canonical chunk.
///
/// # Errors
///
/// Returns [`TranscodeError::Translation`] when the body is not a response object.
pub fn decode_responses_response(body: &[u8], model: &str) -> Result<CanonicalChunk, TranscodeError> {
    let response: ResponsesObject = serde_json::from_slice(body)
        .map_err(|e| TranscodeError::Translation(format!("invalid Responses body: {e}")))?;

    let mut parts = ResponseParts::default();
    for item in &response.output {
        match item {
            ResponsesOutputItem::Message { content } => {
                for part in content {
                    match part {
                        ResponsesContentPart::OutputText { text } => parts.push_text(text),
                        ResponsesContentPart::Refusal { refusal } => parts.push_text(refusal),
                        ResponsesContentPart::Other => {}
                    }
                }
            }
            ResponsesOutputItem::Reasoning { summary } => {
                for part in summary {
                    if let ResponsesSummaryPart::SummaryText { text } = part {
                        parts.push_reasoning(text);
                    }
                }
            }
            ResponsesOutputItem::FunctionCall {
                call_id,
                name,
                arguments,
            } => {
                let id = if call_id.is_empty() {
                    next_call_id()
                } else {
                    call_id.clone()
                };
                let arguments = if arguments.is_empty() {
                    "{}".to_string()
                } else {
                    arguments.clone()
                };
                parts.push_tool_call(id, name.clone(), arguments);
            }
            ResponsesOutputItem::Other => {}
        }
    }

    let stop_reason = response.status.as_deref().map(|status| {
        responses_status_to_stop_reason(
            Some(status),
            response.incomplete_reason(),
            parts.has_tool_calls(),
        )
    });
    let usage = response.usage.unwrap_or_default();
    let usage = CanonicalUsage::from_counts(
        usage.input_tokens.unwrap_or(0),
        usage.output_tokens.unwrap_or(0),
    );
    let id = response
        .id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(next_chunk_id);
    let model = response
        .model
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| model.to_string());
    Ok(parts.into_chunk(id, model, stop_reason.as_deref(), usage))
}
