use serde_json::{json, Map, Value};

use super::RESPONSES_PATH;
use crate::error::TranscodeError;
use crate::protocol::canonical::{
    CanonicalMessage, CanonicalRequest, CanonicalRole, ContentBlock,
};
use crate::protocol::mapping::canonical_role_to_responses;
use crate::protocol::request::{
    apply_extra_headers, base_headers, build_endpoint_url, insert_bearer, is_search_tool,
    reasoning_effort, resolve_credential, split_system, thinking_budget, RequestConfig,
    RequestContext, TransformedRequest, UpstreamEndpoint,
};

/// Encode a canonical request into a Responses API call.
///
/// # Errors
///
/// Returns [`TranscodeError::Auth`] when no credential is available and
/// [`TranscodeError::InvalidRequest`] for header values that cannot be sent.
pub fn encode_responses_request(
    req: &CanonicalRequest,
    endpoint: &UpstreamEndpoint,
    ctx: &RequestContext,
) -> Result<TransformedRequest, TranscodeError> {
    let token = resolve_credential(endpoint, ctx)?;

    let mut headers = base_headers(req.stream);
    insert_bearer(&mut headers, token)?;
    apply_extra_headers(&mut headers, endpoint)?;

    Ok(TransformedRequest {
        body: build_responses_body(req, endpoint),
        config: RequestConfig {
            url: build_endpoint_url(&endpoint.base_url, RESPONSES_PATH),
            headers,
        },
    })
}

/// Build the Responses API body.
#[must_use]
pub fn build_responses_body(req: &CanonicalRequest, endpoint: &UpstreamEndpoint) -> Value {
    let (system, turns) = split_system(&req.messages);
    let mut body = Map::new();
    body.insert("model".into(), Value::String(req.model.clone()));
    if let Some(system) = system {
        body.insert("instructions".into(), Value::String(system));
    }

    let mut input = Vec::with_capacity(turns.len());
    for msg in turns {
        encode_input_items(msg, &mut input);
    }
    body.insert("input".into(), Value::Array(input));

    if !req.tools.is_empty() {
        let tools = req
            .tools
            .iter()
            .map(|tool| {
                if is_search_tool(tool.name()) {
                    return json!({"type": "web_search"});
                }
                let mut decl = Map::new();
                decl.insert("type".into(), Value::String("function".into()));
                decl.insert("name".into(), Value::String(tool.name().to_string()));
                if let Some(description) = &tool.function.description {
                    decl.insert("description".into(), Value::String(description.clone()));
                }
                decl.insert(
                    "parameters".into(),
                    tool.function
                        .parameters
                        .clone()
                        .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                );
                decl.insert("strict".into(), Value::Bool(false));
                Value::Object(decl)
            })
            .collect();
        body.insert("tools".into(), Value::Array(tools));
    }

    body.insert("stream".into(), Value::Bool(req.stream));
    body.insert("store".into(), Value::Bool(false));
    if let Some(t) = req.sampling.temperature {
        body.insert("temperature".into(), json!(t));
    }
    if let Some(p) = req.sampling.top_p {
        body.insert("top_p".into(), json!(p));
    }
    if let Some(max) = req.sampling.max_tokens {
        body.insert("max_output_tokens".into(), json!(max));
    }
    if thinking_budget(req, endpoint).is_some() || endpoint.reasoning_effort.is_some() {
        body.insert(
            "reasoning".into(),
            json!({"effort": reasoning_effort(req, endpoint), "summary": "auto"}),
        );
    }

    Value::Object(body)
}

fn encode_input_items(msg: &CanonicalMessage, out: &mut Vec<Value>) {
    if msg.role == CanonicalRole::Tool {
        let has_result_blocks = msg
            .content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolResult { .. }));
        if !has_result_blocks {
            out.push(json!({
                "type": "function_call_output",
                "call_id": msg.tool_call_id.clone().unwrap_or_default(),
                "output": msg.result_text(),
            }));
            return;
        }
    }

    let assistant = msg.role == CanonicalRole::Assistant;
    let text_type = if assistant { "output_text" } else { "input_text" };
    let mut parts = Vec::with_capacity(msg.content.len());
    let mut trailing = Vec::new();
    for block in &msg.content {
        match block {
            ContentBlock::Text(text) if text.is_empty() => {}
            ContentBlock::Text(text) => parts.push(json!({"type": text_type, "text": text})),
            ContentBlock::Image(image) => parts.push(json!({
                "type": "input_image",
                "image_url": image.to_url(),
            })),
            ContentBlock::ToolCall(call) => trailing.push(json!({
                "type": "function_call",
                "call_id": call.id,
                "name": call.name,
                "arguments": call.arguments,
            })),
            ContentBlock::ToolResult {
                tool_call_id,
                content,
            } => trailing.push(json!({
                "type": "function_call_output",
                "call_id": tool_call_id,
                "output": content,
            })),
            ContentBlock::Thinking { .. } => {
                tracing::debug!("dropping thinking block from Responses input");
            }
            ContentBlock::Other(value) => parts.push(value.clone()),
        }
    }

    if !parts.is_empty() {
        out.push(json!({
            "type": "message",
            "role": canonical_role_to_responses(msg.role),
            "content": parts,
        }));
    }
    out.extend(trailing);
    if assistant {
        for call in &msg.tool_calls {
            out.push(json!({
                "type": "function_call",
                "call_id": call.id,
                "name": call.name,
                "arguments": call.arguments,
            }));
        }
    }
}
