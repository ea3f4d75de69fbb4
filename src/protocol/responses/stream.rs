use super::{ResponsesObject, ResponsesOutputItem, ResponsesStreamEvent};
use crate::protocol::mapping::responses_status_to_stop_reason;
use crate::stream::state::{BlockKind, DeltaKind, StreamState, UpstreamEvent};

/// Maps Responses API stream events onto block-level events.
///
/// Tracks whether the open function call received argument deltas, so that
/// arguments delivered only on `output_item.done` are not lost.
#[derive(Debug, Default)]
pub struct ResponsesStreamAdapter {
    open_call_streamed: Option<bool>,
}

impl ResponsesStreamAdapter {
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
        let event: ResponsesStreamEvent = serde_json::from_str(data)?;
        self.event_into(event, state, out);
        Ok(())
    }

    fn event_into(&mut self, event: ResponsesStreamEvent, state: &StreamState, out: &mut Vec<UpstreamEvent>) {
        match event {
            ResponsesStreamEvent::ResponseCreated { response } => {
                out.push(UpstreamEvent::StreamStart {
                    id: response.id,
                    model: response.model,
                    input_tokens: response.usage.and_then(|u| u.input_tokens),
                });
            }
            ResponsesStreamEvent::OutputItemAdded { output_index, item } => {
                let kind = match item {
                    ResponsesOutputItem::FunctionCall { call_id, name, .. } => {
                        self.open_call_streamed = Some(false);
                        BlockKind::ToolUse { id: call_id, name }
                    }
                    ResponsesOutputItem::Message { .. } => BlockKind::Text,
                    ResponsesOutputItem::Reasoning { .. } => BlockKind::Thinking,
                    ResponsesOutputItem::Other => BlockKind::Other,
                };
                out.push(UpstreamEvent::BlockStart {
                    index: output_index,
                    kind,
                });
            }
            ResponsesStreamEvent::OutputTextDelta {
                output_index,
                delta,
            } => out.push(UpstreamEvent::BlockDelta {
                index: output_index,
                delta: DeltaKind::Text(delta),
            }),
            ResponsesStreamEvent::ReasoningDelta {
                output_index,
                delta,
            } => out.push(UpstreamEvent::BlockDelta {
                index: output_index,
                delta: DeltaKind::Thinking(delta),
            }),
            ResponsesStreamEvent::FunctionCallArgumentsDelta {
                output_index,
                delta,
            } => {
                if self.open_call_streamed.is_some() {
                    self.open_call_streamed = Some(true);
                }
                out.push(UpstreamEvent::BlockDelta {
                    index: output_index,
                    delta: DeltaKind::ToolInput(delta),
                });
            }
            ResponsesStreamEvent::OutputItemDone { output_index, item } => {
                if let ResponsesOutputItem::FunctionCall { arguments, .. } = item {
                    if self.open_call_streamed.take() == Some(false) && !arguments.is_empty() {
                        out.push(UpstreamEvent::BlockDelta {
                            index: output_index,
                            delta: DeltaKind::ToolInput(arguments),
                        });
                    }
                }
                out.push(UpstreamEvent::BlockStop {
                    index: output_index,
                });
            }
            ResponsesStreamEvent::ResponseCompleted { response }
            | ResponsesStreamEvent::ResponseIncomplete { response } => {
                terminal_into(&response, state, out);
            }
            ResponsesStreamEvent::ResponseFailed { response } => {
                if let Some(error) = &response.error {
                    out.push(UpstreamEvent::Error {
                        message: error.message.clone(),
                    });
                }
                terminal_into(&response, state, out);
            }
            ResponsesStreamEvent::Error { code, message } => {
                let message = match code {
                    Some(code) => format!("{code}: {message}"),
                    None => message,
                };
                out.push(UpstreamEvent::Error { message });
            }
            ResponsesStreamEvent::Unknown => {
                tracing::trace!("ignoring unhandled Responses stream event");
            }
        }
    }
}

fn terminal_into(response: &ResponsesObject, state: &StreamState, out: &mut Vec<UpstreamEvent>) {
    let has_tool_calls = !state.tool_calls.is_empty() || response.has_function_calls();
    let stop_reason = responses_status_to_stop_reason(
        response.status.as_deref(),
        response.incomplete_reason(),
        has_tool_calls,
    );
    let usage = response.usage.unwrap_or_default();
    out.push(UpstreamEvent::MessageDelta {
        stop_reason: Some(stop_reason),
        input_tokens: usage.input_tokens,
        output_tokens: usage.output_tokens,
    });
    out.push(UpstreamEvent::MessageStop);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::canonical::CanonicalChunk;
    use crate::stream::state::apply_event;

    fn run(lines: &[&str]) -> (StreamState, Vec<CanonicalChunk>) {
        let mut adapter = ResponsesStreamAdapter::new();
        let mut state = StreamState::new("gpt-5-codex");
        let mut chunks = Vec::new();
        for line in lines {
            let mut events = Vec::new();
            adapter.translate(line, &state, &mut events).expect("translate");
            for event in events {
                apply_event(&mut state, event, &mut chunks);
            }
        }
        (state, chunks)
    }

    #[test]
    fn test_text_and_reasoning_stream() {
        let (state, chunks) = run(&[
            r#"{"type":"response.created","response":{"id":"resp_1","model":"gpt-5-codex","status":"in_progress","output":[]}}"#,
            r#"{"type":"response.in_progress","response":{"id":"resp_1"}}"#,
            r#"{"type":"response.output_item.added","output_index":0,"item":{"type":"reasoning","id":"rs_1","summary":[]}}"#,
            r#"{"type":"response.reasoning_summary_text.delta","output_index":0,"summary_index":0,"delta":"plan"}"#,
            r#"{"type":"response.output_item.done","output_index":0,"item":{"type":"reasoning","id":"rs_1","summary":[]}}"#,
            r#"{"type":"response.output_item.added","output_index":1,"item":{"type":"message","id":"m1","role":"assistant","content":[]}}"#,
            r#"{"type":"response.output_text.delta","output_index":1,"content_index":0,"delta":"Hi"}"#,
            r#"{"type":"response.completed","response":{"id":"resp_1","status":"completed","output":[],"usage":{"input_tokens":9,"output_tokens":3,"total_tokens":12}}}"#,
        ]);
        assert_eq!(chunks[0].id, "resp_1");
        assert_eq!(chunks[1].delta.reasoning_content.as_deref(), Some("plan"));
        assert_eq!(chunks[2].delta.content.as_deref(), Some("Hi"));
        let last = chunks.last().unwrap();
        assert_eq!(last.finish_reason.as_deref(), Some("stop"));
        assert_eq!(last.usage.unwrap().total_tokens, 12);
        assert_eq!(state.block_index, 1);
    }

    #[test]
    fn test_function_call_stream() {
        let (state, chunks) = run(&[
            r#"{"type":"response.created","response":{"id":"resp_2"}}"#,
            r#"{"type":"response.output_item.added","output_index":0,"item":{"type":"function_call","id":"fc_1","call_id":"call_a","name":"get_weather","arguments":""}}"#,
            r#"{"type":"response.function_call_arguments.delta","output_index":0,"delta":"{\"city\":"}"#,
            r#"{"type":"response.function_call_arguments.delta","output_index":0,"delta":"\"Seoul\"}"}"#,
            r#"{"type":"response.output_item.done","output_index":0,"item":{"type":"function_call","id":"fc_1","call_id":"call_a","name":"get_weather","arguments":"{\"city\":\"Seoul\"}"}}"#,
            r#"{"type":"response.completed","response":{"status":"completed","output":[]}}"#,
        ]);
        assert_eq!(state.tool_calls[0].id, "call_a");
        assert_eq!(state.tool_calls[0].arguments, "{\"city\":\"Seoul\"}");
        assert_eq!(chunks.last().unwrap().finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn test_arguments_only_on_done() {
        let (state, _) = run(&[
            r#"{"type":"response.output_item.added","output_index":0,"item":{"type":"function_call","call_id":"c","name":"f"}}"#,
            r#"{"type":"response.output_item.done","output_index":0,"item":{"type":"function_call","call_id":"c","name":"f","arguments":"{\"a\":1}"}}"#,
        ]);
        assert_eq!(state.tool_calls[0].arguments, "{\"a\":1}");
    }

    #[test]
    fn test_incomplete_maps_to_length() {
        let (_, chunks) = run(&[
            r#"{"type":"response.output_text.delta","output_index":0,"delta":"cut"}"#,
            r#"{"type":"response.incomplete","response":{"status":"incomplete","incomplete_details":{"reason":"max_output_tokens"}}}"#,
        ]);
        assert_eq!(chunks.last().unwrap().finish_reason.as_deref(), Some("length"));
    }
}
