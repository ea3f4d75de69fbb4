use super::{AnthropicContentBlock, AnthropicDelta, AnthropicStreamEvent};
use crate::stream::state::{BlockKind, DeltaKind, UpstreamEvent};

/// Parse one Anthropic SSE `data:` payload.
///
/// The event type is taken from the payload's `type` field; the `event:` line
/// carries the same name and is not needed.
///
/// # Errors
///
/// Returns the JSON error for malformed payloads.
pub fn parse_anthropic_event(data: &str) -> Result<AnthropicStreamEvent, serde_json::Error> {
    serde_json::from_str(data)
}

/// Normalize an Anthropic stream event into upstream-agnostic events.
pub fn anthropic_event_into(event: AnthropicStreamEvent, out: &mut Vec<UpstreamEvent>) {
    match event {
        AnthropicStreamEvent::MessageStart { message } => {
            out.push(UpstreamEvent::StreamStart {
                id: message.id,
                model: message.model,
                input_tokens: message.usage.input_tokens,
            });
        }
        AnthropicStreamEvent::ContentBlockStart {
            index,
            content_block,
        } => match content_block {
            AnthropicContentBlock::Text { text } => {
                out.push(UpstreamEvent::BlockStart {
                    index,
                    kind: BlockKind::Text,
                });
                if !text.is_empty() {
                    out.push(UpstreamEvent::BlockDelta {
                        index,
                        delta: DeltaKind::Text(text),
                    });
                }
            }
            AnthropicContentBlock::Thinking { thinking } => {
                out.push(UpstreamEvent::BlockStart {
                    index,
                    kind: BlockKind::Thinking,
                });
                if !thinking.is_empty() {
                    out.push(UpstreamEvent::BlockDelta {
                        index,
                        delta: DeltaKind::Thinking(thinking),
                    });
                }
            }
            AnthropicContentBlock::ToolUse { id, name, .. } => {
                out.push(UpstreamEvent::BlockStart {
                    index,
                    kind: BlockKind::ToolUse { id, name },
                });
            }
            AnthropicContentBlock::Other => {
                out.push(UpstreamEvent::BlockStart {
                    index,
                    kind: BlockKind::Other,
                });
            }
        },
        AnthropicStreamEvent::ContentBlockDelta { index, delta } => {
            let delta = match delta {
                AnthropicDelta::TextDelta { text } => DeltaKind::Text(text),
                AnthropicDelta::ThinkingDelta { thinking } => DeltaKind::Thinking(thinking),
                AnthropicDelta::InputJsonDelta { partial_json } => DeltaKind::ToolInput(partial_json),
                AnthropicDelta::SignatureDelta {} => DeltaKind::Signature,
                AnthropicDelta::Other => DeltaKind::Other,
            };
            out.push(UpstreamEvent::BlockDelta { index, delta });
        }
        AnthropicStreamEvent::ContentBlockStop { index } => {
            out.push(UpstreamEvent::BlockStop { index });
        }
        AnthropicStreamEvent::MessageDelta { delta, usage } => {
            out.push(UpstreamEvent::MessageDelta {
                stop_reason: delta.stop_reason,
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
            });
        }
        AnthropicStreamEvent::MessageStop {} => out.push(UpstreamEvent::MessageStop),
        AnthropicStreamEvent::Ping {} => out.push(UpstreamEvent::Ping),
        AnthropicStreamEvent::Error { error } => {
            let message = if error.type_.is_empty() {
                error.message
            } else {
                format!("{}: {}", error.type_, error.message)
            };
            out.push(UpstreamEvent::Error { message });
        }
        AnthropicStreamEvent::Unknown => {
            tracing::trace!("ignoring unknown Anthropic stream event");
        }
    }
}
