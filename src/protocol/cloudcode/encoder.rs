use rustc_hash::FxHashMap;
use serde_json::{json, Map, Value};

use super::CLOUDCODE_PATH;
use crate::error::TranscodeError;
use crate::protocol::canonical::{
    CanonicalMessage, CanonicalRequest, CanonicalRole, CanonicalTool, ContentBlock, ImageSource,
};
use crate::protocol::mapping::canonical_role_to_cloudcode;
use crate::protocol::request::{
    apply_extra_headers, base_headers, build_endpoint_url, insert_bearer, is_search_tool,
    resolve_credential, split_system, thinking_budget, RequestConfig, RequestContext,
    TransformedRequest, UpstreamEndpoint,
};
use crate::protocol::schema::{adapt_tool_schema, AdaptedSchema};

/// Encode a canonical request into a Cloud Code `v1internal` call.
///
/// # Errors
///
/// Returns [`TranscodeError::Auth`] when no token is available and
/// [`TranscodeError::SchemaConflict`] when a tool schema cannot be converted.
pub fn encode_cloudcode_request(
    req: &CanonicalRequest,
    endpoint: &UpstreamEndpoint,
    ctx: &RequestContext,
) -> Result<TransformedRequest, TranscodeError> {
    let token = resolve_credential(endpoint, ctx)?;
    let body = build_cloudcode_body(req, endpoint)?;

    let mut headers = base_headers(req.stream);
    insert_bearer(&mut headers, token)?;
    apply_extra_headers(&mut headers, endpoint)?;

    Ok(TransformedRequest {
        body,
        config: RequestConfig {
            url: cloudcode_url(&endpoint.base_url, req.stream),
            headers,
        },
    })
}

/// `{base}/v1internal:streamGenerateContent?alt=sse` or `...:generateContent`.
#[must_use]
pub fn cloudcode_url(base_url: &str, stream: bool) -> String {
    let base = build_endpoint_url(base_url, CLOUDCODE_PATH);
    if stream {
        format!("{base}:streamGenerateContent?alt=sse")
    } else {
        format!("{base}:generateContent")
    }
}

/// Build the `{model, project, request}` envelope.
///
/// # Errors
///
/// Returns [`TranscodeError::SchemaConflict`] from the schema adapter.
pub fn build_cloudcode_body(
    req: &CanonicalRequest,
    endpoint: &UpstreamEndpoint,
) -> Result<Value, TranscodeError> {
    let (system, turns) = split_system(&req.messages);
    let mut inner = Map::new();

    // --- contents ---
    let mut call_names: FxHashMap<&str, &str> = FxHashMap::default();
    for msg in &req.messages {
        for call in &msg.tool_calls {
            call_names.insert(call.id.as_str(), call.name.as_str());
        }
        for block in &msg.content {
            if let ContentBlock::ToolCall(call) = block {
                call_names.insert(call.id.as_str(), call.name.as_str());
            }
        }
    }

    let mut contents: Vec<Value> = Vec::with_capacity(turns.len());
    let mut last_role: Option<&'static str> = None;
    for msg in turns {
        let role = canonical_role_to_cloudcode(msg.role);
        let parts = encode_parts(msg, &call_names);
        if parts.is_empty() {
            continue;
        }
        if last_role == Some(role) {
            if let Some(Value::Array(existing)) =
                contents.last_mut().and_then(|c| c.get_mut("parts"))
            {
                existing.extend(parts);
                continue;
            }
        }
        contents.push(json!({"role": role, "parts": parts}));
        last_role = Some(role);
    }
    inner.insert("contents".into(), Value::Array(contents));

    if let Some(system) = system {
        inner.insert(
            "systemInstruction".into(),
            json!({"role": "user", "parts": [{"text": system}]}),
        );
    }

    // --- tools ---
    if !req.tools.is_empty() {
        let mut declarations = Vec::with_capacity(req.tools.len());
        let mut search = false;
        for tool in &req.tools {
            if is_search_tool(tool.name()) {
                search = true;
            } else {
                declarations.push(encode_declaration(tool)?);
            }
        }
        let mut tools = Vec::with_capacity(2);
        if !declarations.is_empty() {
            tools.push(json!({"functionDeclarations": declarations}));
        }
        if search {
            tools.push(json!({"googleSearch": {}}));
        }
        inner.insert("tools".into(), Value::Array(tools));
    }

    // --- generation config ---
    let mut generation = Map::new();
    if let Some(t) = req.sampling.temperature {
        generation.insert("temperature".into(), json!(t));
    }
    if let Some(p) = req.sampling.top_p {
        generation.insert("topP".into(), json!(p));
    }
    if let Some(k) = req.sampling.top_k {
        generation.insert("topK".into(), json!(k));
    }
    if let Some(max) = req.sampling.max_tokens {
        generation.insert("maxOutputTokens".into(), json!(max));
    }
    if let Some(stop) = req.sampling.stop_sequences() {
        generation.insert("stopSequences".into(), json!(stop));
    }
    if let Some(budget) = thinking_budget(req, endpoint) {
        generation.insert(
            "thinkingConfig".into(),
            json!({"thinkingBudget": budget, "includeThoughts": true}),
        );
    }
    if !generation.is_empty() {
        inner.insert("generationConfig".into(), Value::Object(generation));
    }

    let mut envelope = Map::new();
    envelope.insert("model".into(), Value::String(req.model.clone()));
    if let Some(project) = endpoint.project.as_deref().filter(|p| !p.is_empty()) {
        envelope.insert("project".into(), Value::String(project.to_string()));
    }
    envelope.insert("request".into(), Value::Object(inner));
    Ok(Value::Object(envelope))
}

fn encode_declaration(tool: &CanonicalTool) -> Result<Value, TranscodeError> {
    let mut decl = Map::new();
    decl.insert("name".into(), Value::String(tool.name().to_string()));
    if let Some(description) = &tool.function.description {
        decl.insert("description".into(), Value::String(description.clone()));
    }
    if let Some(parameters) = &tool.function.parameters {
        match adapt_tool_schema(parameters)? {
            AdaptedSchema::Converted(schema) => decl.insert("parameters".into(), schema),
            AdaptedSchema::Raw(schema) => decl.insert("parametersJsonSchema".into(), schema),
        };
    }
    if let Some(response) = &tool.function.response {
        match adapt_tool_schema(response)? {
            AdaptedSchema::Converted(schema) => decl.insert("response".into(), schema),
            AdaptedSchema::Raw(schema) => decl.insert("responseJsonSchema".into(), schema),
        };
    }
    Ok(Value::Object(decl))
}

fn encode_parts(msg: &CanonicalMessage, call_names: &FxHashMap<&str, &str>) -> Vec<Value> {
    let mut parts = Vec::with_capacity(msg.content.len() + msg.tool_calls.len());

    if msg.role == CanonicalRole::Tool {
        let has_result_blocks = msg
            .content
            .iter()
            .any(|b| matches!(b, ContentBlock::ToolResult { .. }));
        if !has_result_blocks {
            let call_id = msg.tool_call_id.as_deref().unwrap_or_default();
            parts.push(function_response(call_id, msg.name.as_deref(), &msg.result_text(), call_names));
            return parts;
        }
    }

    for block in &msg.content {
        match block {
            ContentBlock::Text(text) if text.is_empty() => {}
            ContentBlock::Text(text) => parts.push(json!({"text": text})),
            ContentBlock::Image(ImageSource::Inline { mime_type, data }) => {
                parts.push(json!({"inlineData": {"mimeType": mime_type, "data": data}}));
            }
            ContentBlock::Image(ImageSource::Url(url)) => {
                parts.push(json!({"fileData": {"mimeType": guess_image_mime(url), "fileUri": url}}));
            }
            ContentBlock::ToolCall(call) => {
                parts.push(json!({"functionCall": {"name": call.name, "args": call.parsed_arguments()}}));
            }
            ContentBlock::ToolResult {
                tool_call_id,
                content,
            } => parts.push(function_response(tool_call_id, msg.name.as_deref(), content, call_names)),
            ContentBlock::Thinking {
                thinking,
                signature,
            } => {
                let mut part = json!({"text": thinking, "thought": true});
                if let Some(signature) = signature {
                    part["thoughtSignature"] = Value::String(signature.clone());
                }
                parts.push(part);
            }
            ContentBlock::Other(value) => parts.push(value.clone()),
        }
    }
    if msg.role == CanonicalRole::Assistant {
        for call in &msg.tool_calls {
            parts.push(json!({"functionCall": {"name": call.name, "args": call.parsed_arguments()}}));
        }
    }
    parts
}

fn function_response(
    call_id: &str,
    message_name: Option<&str>,
    content: &str,
    call_names: &FxHashMap<&str, &str>,
) -> Value {
    let name = call_names
        .get(call_id)
        .copied()
        .or(message_name)
        .unwrap_or(call_id);
    let response = match serde_json::from_str::<Value>(content) {
        Ok(value @ Value::Object(_)) => value,
        _ => json!({"result": content}),
    };
    json!({"functionResponse": {"name": name, "response": response}})
}

fn guess_image_mime(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url).to_ascii_lowercase();
    if path.ends_with(".png") {
        "image/png"
    } else if path.ends_with(".gif") {
        "image/gif"
    } else if path.ends_with(".webp") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::canonical::ProviderKind;

    fn endpoint() -> UpstreamEndpoint {
        let mut ep = UpstreamEndpoint::new(ProviderKind::CloudCode, "https://cloudcode-pa.googleapis.com");
        ep.project = Some("proj-1".into());
        ep
    }

    fn request(value: Value) -> CanonicalRequest {
        serde_json::from_value(value).expect("request")
    }

    #[test]
    fn test_envelope_and_contents() {
        let req = request(json!({
            "model": "gemini-2.5-pro",
            "temperature": 0.5,
            "max_tokens": 256,
            "messages": [
                {"role": "system", "content": "sys a"},
                {"role": "system", "content": "sys b"},
                {"role": "user", "content": [
                    {"type": "text", "text": "see"},
                    {"type": "image_url", "image_url": {"url": "data:image/png;base64,AAA"}}
                ]},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "c1", "type": "function", "function": {"name": "lookup", "arguments": "{\"q\":\"x\"}"}}
                ]},
                {"role": "tool", "tool_call_id": "c1", "content": "found"}
            ]
        }));
        let body = build_cloudcode_body(&req, &endpoint()).unwrap();
        assert_eq!(body["model"], "gemini-2.5-pro");
        assert_eq!(body["project"], "proj-1");
        let inner = &body["request"];
        assert_eq!(inner["systemInstruction"]["parts"][0]["text"], "sys a\n\nsys b");
        let contents = inner["contents"].as_array().unwrap();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["parts"][1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["functionCall"]["args"], json!({"q": "x"}));
        assert_eq!(
            contents[2]["parts"][0]["functionResponse"],
            json!({"name": "lookup", "response": {"result": "found"}})
        );
        assert_eq!(inner["generationConfig"]["temperature"], 0.5);
        assert_eq!(inner["generationConfig"]["maxOutputTokens"], 256);
    }

    #[test]
    fn test_tools_schema_and_search() {
        let req = request(json!({
            "model": "gemini-2.5-pro",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [
                {"type": "function", "function": {"name": "google_search", "parameters": {"type": "object"}}},
                {"type": "function", "function": {"name": "f", "parameters": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {"a": {"type": ["string", "null"]}}
                }}},
                {"type": "function", "function": {"name": "g", "parameters": {
                    "$schema": "https://json-schema.org/draft/2020-12/schema",
                    "type": "object"
                }, "response": {
                    "$schema": "https://json-schema.org/draft/2020-12/schema",
                    "type": ["string", "null"]
                }}},
                {"type": "function", "function": {"name": "h", "response": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {"ok": {"type": "boolean"}}
                }}}
            ]
        }));
        let body = build_cloudcode_body(&req, &endpoint()).unwrap();
        let tools = body["request"]["tools"].as_array().unwrap();
        let decls = tools[0]["functionDeclarations"].as_array().unwrap();
        assert_eq!(decls.len(), 3);
        assert_eq!(
            decls[0]["parameters"],
            json!({"type": "OBJECT", "properties": {"a": {"type": "STRING", "nullable": true}}})
        );
        assert!(decls[1].get("parameters").is_none());
        assert_eq!(decls[1]["parametersJsonSchema"]["type"], "object");
        assert!(decls[1].get("response").is_none());
        assert_eq!(decls[1]["responseJsonSchema"]["type"], json!(["string", "null"]));
        assert!(decls[2].get("parameters").is_none());
        assert!(decls[2].get("responseJsonSchema").is_none());
        assert_eq!(
            decls[2]["response"],
            json!({"type": "OBJECT", "properties": {"ok": {"type": "BOOLEAN"}}})
        );
        assert_eq!(tools[1], json!({"googleSearch": {}}));
    }

    #[test]
    fn test_schema_conflict_fails_request() {
        let req = request(json!({
            "model": "gemini-2.5-pro",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{"type": "function", "function": {"name": "f", "parameters": {
                "type": "object", "anyOf": [{"type": "object"}]
            }}}]
        }));
        let mut ep = endpoint();
        ep.api_key = Some("tok".into());
        let err = encode_cloudcode_request(&req, &ep, &RequestContext::default()).unwrap_err();
        assert!(matches!(err, TranscodeError::SchemaConflict(_)));
    }

    #[test]
    fn test_url_auth_and_thinking() {
        let req = request(json!({
            "model": "gemini-2.5-flash-thinking",
            "stream": true,
            "reasoning": {"budget_tokens": 2048},
            "messages": [{"role": "user", "content": "hi"}]
        }));
        let out = encode_cloudcode_request(&req, &endpoint(), &RequestContext::with_token("ya29"))
            .unwrap();
        assert_eq!(
            out.config.url,
            "https://cloudcode-pa.googleapis.com/v1internal:streamGenerateContent?alt=sse"
        );
        assert_eq!(out.config.headers["authorization"], "Bearer ya29");
        assert_eq!(
            out.body["request"]["generationConfig"]["thinkingConfig"],
            json!({"thinkingBudget": 2048, "includeThoughts": true})
        );
        assert_eq!(
            cloudcode_url("https://proxy.local/v1internal/", false),
            "https://proxy.local/v1internal:generateContent"
        );
    }
}
