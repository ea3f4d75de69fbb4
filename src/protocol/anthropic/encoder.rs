use serde_json::{json, Map, Value};

use super::MESSAGES_PATH;
use crate::error::TranscodeError;
use crate::protocol::canonical::{
    CanonicalMessage, CanonicalRequest, CanonicalRole, ContentBlock, ImageSource,
};
use crate::protocol::mapping::canonical_role_to_anthropic;
use crate::protocol::request::{
    apply_extra_headers, base_headers, build_endpoint_url, insert_bearer, insert_header,
    is_search_tool, resolve_credential, split_system, thinking_budget, AuthScheme,
    RequestConfig, RequestContext, TransformedRequest, UpstreamEndpoint,
    DEFAULT_ANTHROPIC_VERSION,
};

/// `max_tokens` is mandatory for Anthropic; used when the request leaves it unset.
pub const DEFAULT_MAX_TOKENS: u64 = 4096;

/// Native server-side search tool type.
const WEB_SEARCH_TOOL_TYPE: &str = "web_search_20250305";

/// Encode a canonical request into an Anthropic Messages call.
///
/// # Errors
///
/// Returns [`TranscodeError::Auth`] when no credential is available and
/// [`TranscodeError::InvalidRequest`] for header values that cannot be sent.
pub fn encode_anthropic_request(
    req: &CanonicalRequest,
    endpoint: &UpstreamEndpoint,
    ctx: &RequestContext,
) -> Result<TransformedRequest, TranscodeError> {
    let credential = resolve_credential(endpoint, ctx)?;

    let mut headers = base_headers(req.stream);
    match endpoint.auth_scheme {
        AuthScheme::ApiKey => insert_header(&mut headers, "x-api-key", credential)?,
        AuthScheme::Bearer => insert_bearer(&mut headers, credential)?,
    }
    insert_header(
        &mut headers,
        "anthropic-version",
        endpoint
            .api_version
            .as_deref()
            .unwrap_or(DEFAULT_ANTHROPIC_VERSION),
    )?;
    apply_extra_headers(&mut headers, endpoint)?;

    Ok(TransformedRequest {
        body: build_anthropic_body(req, endpoint),
        config: RequestConfig {
            url: build_endpoint_url(&endpoint.base_url, MESSAGES_PATH),
            headers,
        },
    })
}

/// Build the Messages API body.
#[must_use]
pub fn build_anthropic_body(req: &CanonicalRequest, endpoint: &UpstreamEndpoint) -> Value {
    let (system, turns) = split_system(&req.messages);
    let mut body = Map::new();
    body.insert("model".into(), Value::String(req.model.clone()));

    // --- messages ---
    let mut messages: Vec<Value> = Vec::with_capacity(turns.len());
    let mut last_role: Option<&'static str> = None;
    for msg in turns {
        let role = canonical_role_to_anthropic(msg.role);
        let blocks = encode_message_blocks(msg);
        if blocks.is_empty() {
            continue;
        }
        // consecutive same-role turns (e.g. several tool results) share one message
        if last_role == Some(role) {
            if let Some(Value::Array(content)) =
                messages.last_mut().and_then(|m| m.get_mut("content"))
            {
                content.extend(blocks);
                continue;
            }
        }
        messages.push(json!({"role": role, "content": blocks}));
        last_role = Some(role);
    }
    body.insert("messages".into(), Value::Array(messages));

    if let Some(system) = system {
        body.insert("system".into(), Value::String(system));
    }

    // --- tools ---
    if !req.tools.is_empty() {
        let tools = req
            .tools
            .iter()
            .map(|tool| {
                if is_search_tool(tool.name()) {
                    json!({"type": WEB_SEARCH_TOOL_TYPE, "name": "web_search"})
                } else {
                    let mut decl = Map::new();
                    decl.insert("name".into(), Value::String(tool.name().to_string()));
                    if let Some(description) = &tool.function.description {
                        decl.insert("description".into(), Value::String(description.clone()));
                    }
                    decl.insert(
                        "input_schema".into(),
                        tool.function
                            .parameters
                            .clone()
                            .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
                    );
                    Value::Object(decl)
                }
            })
            .collect();
        body.insert("tools".into(), Value::Array(tools));
    }

    // --- sampling ---
    let budget = thinking_budget(req, endpoint);
    let mut max_tokens = req.sampling.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
    if let Some(budget) = budget {
        if max_tokens <= budget {
            max_tokens = budget.saturating_add(DEFAULT_MAX_TOKENS);
        }
        body.insert(
            "thinking".into(),
            json!({"type": "enabled", "budget_tokens": budget}),
        );
    } else {
        // extended thinking rejects custom temperature and top_k
        if let Some(t) = req.sampling.temperature {
            body.insert("temperature".into(), json!(t));
        }
        if let Some(k) = req.sampling.top_k {
            body.insert("top_k".into(), json!(k));
        }
    }
    body.insert("max_tokens".into(), json!(max_tokens));
    if let Some(p) = req.sampling.top_p {
        body.insert("top_p".into(), json!(p));
    }
    if let Some(stop) = req.sampling.stop_sequences() {
        body.insert("stop_sequences".into(), json!(stop));
    }
    body.insert("stream".into(), Value::Bool(req.stream));

    Value::Object(body)
}

fn encode_message_blocks(msg: &CanonicalMessage) -> Vec<Value> {
    let mut blocks = Vec::with_capacity(msg.content.len() + msg.tool_calls.len());

    if msg.role == CanonicalRole::Tool {
        // tool turn: the whole message is one result unless it already carries result blocks
        let has_result_blocks = msg
            .content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolResult { .. }));
        if !has_result_blocks {
            blocks.push(json!({
                "type": "tool_result",
                "tool_use_id": msg.tool_call_id.clone().unwrap_or_default(),
                "content": msg.result_text(),
            }));
            return blocks;
        }
    }

    for block in &msg.content {
        if let Some(encoded) = encode_block(block) {
            blocks.push(encoded);
        }
    }
    if msg.role == CanonicalRole::Assistant {
        for call in &msg.tool_calls {
            blocks.push(json!({
                "type": "tool_use",
                "id": call.id,
                "name": call.name,
                "input": call.parsed_arguments(),
            }));
        }
    }
    blocks
}

fn encode_block(block: &ContentBlock) -> Option<Value> {
    Some(match block {
        ContentBlock::Text(text) if text.is_empty() => return None,
        ContentBlock::Text(text) => json!({"type": "text", "text": text}),
        ContentBlock::Image(ImageSource::Url(url)) => json!({
            "type": "image",
            "source": {"type": "url", "url": url},
        }),
        ContentBlock::Image(ImageSource::Inline { mime_type, data }) => json!({
            "type": "image",
            "source": {"type": "base64", "media_type": mime_type, "data": data},
        }),
        ContentBlock::ToolCall(call) => json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.name,
            "input": call.parsed_arguments(),
        }),
        ContentBlock::ToolResult {
            tool_call_id,
            content,
        } => json!({
            "type": "tool_result",
            "tool_use_id": tool_call_id,
            "content": content,
        }),
        ContentBlock::Thinking {
            thinking,
            signature,
        } => {
            let mut obj = json!({"type": "thinking", "thinking": thinking});
            if let Some(signature) = signature {
                obj["signature"] = Value::String(signature.clone());
            }
            obj
        }
        ContentBlock::Other(value) => value.clone(),
    })
}
