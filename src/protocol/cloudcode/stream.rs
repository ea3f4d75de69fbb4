use super::{parse_cloudcode_response, CloudCodeResponse};
use crate::protocol::arguments_json;
use crate::protocol::mapping::cloudcode_finish_to_stop_reason;
use crate::stream::state::{BlockKind, DeltaKind, StreamState, UpstreamEvent};
use crate::util::next_call_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenPart {
    Text,
    Thought,
}

/// Synthesizes block-level events from Cloud Code's whole-response chunks.
///
/// Each chunk carries complete parts; a block opens when the part kind changes
/// and every `functionCall` becomes one complete tool-use block.
#[derive(Debug, Default)]
pub struct CloudCodeStreamAdapter {
    open: Option<OpenPart>,
}

impl CloudCodeStreamAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one `data:` payload.
    ///
    /// # Errors
    ///
    /// Returns the JSON error for malformed payloads.
    pub fn translate(
        &mut self,
        data: &str,
        state: &StreamState,
        out: &mut Vec<UpstreamEvent>,
    ) -> Result<(), serde_json::Error> {
        let chunk = parse_cloudcode_response(data.as_bytes())?;
        self.chunk_into(chunk, state, out);
        Ok(())
    }

    fn chunk_into(&mut self, chunk: CloudCodeResponse, state: &StreamState, out: &mut Vec<UpstreamEvent>) {
        let usage = chunk.usage_metadata;
        if !state.started {
            out.push(UpstreamEvent::StreamStart {
                id: chunk.response_id,
                model: chunk.model_version,
                input_tokens: usage.and_then(|u| u.prompt_token_count),
            });
        }

        let mut new_tool_calls = 0usize;
        let Some(candidate) = chunk.candidates.into_iter().next() else {
            if let Some(usage) = usage {
                out.push(UpstreamEvent::MessageDelta {
                    stop_reason: None,
                    input_tokens: usage.prompt_token_count,
                    output_tokens: Some(usage.completion_tokens()),
                });
            }
            return;
        };

        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(call) = part.function_call {
                self.close(out);
                let id = call.id.filter(|id| !id.is_empty()).unwrap_or_else(next_call_id);
                out.push(UpstreamEvent::BlockStart {
                    index: None,
                    kind: BlockKind::ToolUse {
                        id,
                        name: call.name,
                    },
                });
                out.push(UpstreamEvent::BlockDelta {
                    index: None,
                    delta: DeltaKind::ToolInput(arguments_json(&call.args)),
                });
                out.push(UpstreamEvent::BlockStop { index: None });
                new_tool_calls += 1;
                continue;
            }
            let is_thought = part.is_thought();
            let Some(text) = part.text else {
                tracing::debug!("ignoring Cloud Code part without text or functionCall");
                continue;
            };
            if text.is_empty() {
                // signature-only parts
                continue;
            }
            let (kind, block, delta) = if is_thought {
                (OpenPart::Thought, BlockKind::Thinking, DeltaKind::Thinking(text))
            } else {
                (OpenPart::Text, BlockKind::Text, DeltaKind::Text(text))
            };
            if self.open != Some(kind) {
                self.close(out);
                out.push(UpstreamEvent::BlockStart { index: None, kind: block });
                self.open = Some(kind);
            }
            out.push(UpstreamEvent::BlockDelta { index: None, delta });
        }

        match candidate.finish_reason {
            Some(reason) => {
                self.close(out);
                let has_tool_calls = !state.tool_calls.is_empty() || new_tool_calls > 0;
                out.push(UpstreamEvent::MessageDelta {
                    stop_reason: Some(cloudcode_finish_to_stop_reason(&reason, has_tool_calls)),
                    input_tokens: usage.and_then(|u| u.prompt_token_count),
                    output_tokens: usage.map(|u| u.completion_tokens()),
                });
                out.push(UpstreamEvent::MessageStop);
            }
            None => {
                if let Some(usage) = usage {
                    out.push(UpstreamEvent::MessageDelta {
                        stop_reason: None,
                        input_tokens: usage.prompt_token_count,
                        output_tokens: Some(usage.completion_tokens()),
                    });
                }
            }
        }
    }

    fn close(&mut self, out: &mut Vec<UpstreamEvent>) {
        if self.open.take().is_some() {
            out.push(UpstreamEvent::BlockStop { index: None });
        }
    }
}
