pub mod anthropic;
pub mod canonical;
pub mod cloudcode;
pub mod mapping;
pub mod request;
pub mod responses;
pub mod schema;

use canonical::{
    CanonicalChunk, CanonicalRequest, CanonicalUsage, ChunkDelta, FunctionDelta, ProviderKind,
    ToolCallDelta,
};
use request::{RequestContext, TransformedRequest, UpstreamEndpoint};

use crate::error::TranscodeError;
use crate::util::unix_now_secs;

/// Translate a canonical request for the endpoint's upstream protocol.
///
/// # Errors
///
/// Returns [`TranscodeError::Auth`] when no credential is available and
/// [`TranscodeError::SchemaConflict`] for tool schemas Cloud Code cannot express.
/// Both are raised before anything is sent.
pub fn transform_request(
    req: &CanonicalRequest,
    endpoint: &UpstreamEndpoint,
    ctx: &RequestContext,
) -> Result<TransformedRequest, TranscodeError> {
    match endpoint.kind {
        ProviderKind::Anthropic => anthropic::encoder::encode_anthropic_request(req, endpoint, ctx),
        ProviderKind::CloudCode => cloudcode::encoder::encode_cloudcode_request(req, endpoint, ctx),
        ProviderKind::Responses => responses::encoder::encode_responses_request(req, endpoint, ctx),
    }
}

/// Decode a complete (non-streaming) upstream response body into one canonical chunk.
///
/// `model` is the requested model, used when the upstream does not echo one.
///
/// # Errors
///
/// Returns [`TranscodeError::Translation`] when the body is not valid JSON for
/// the upstream's response shape.
pub fn decode_response(
    kind: ProviderKind,
    body: &[u8],
    model: &str,
) -> Result<Vec<CanonicalChunk>, TranscodeError> {
    let chunk = match kind {
        ProviderKind::Anthropic => anthropic::response_decoder::decode_anthropic_response(body, model)?,
        ProviderKind::CloudCode => cloudcode::response_decoder::decode_cloudcode_response(body, model)?,
        ProviderKind::Responses => responses::response_decoder::decode_responses_response(body, model)?,
    };
    Ok(vec![chunk])
}

/// Collected content of one non-streaming response.
#[derive(Debug, Default)]
pub(crate) struct ResponseParts {
    texts: Vec<String>,
    reasoning: Vec<String>,
    tool_calls: Vec<ToolCallDelta>,
}

impl ResponseParts {
    pub(crate) fn push_text(&mut self, text: &str) {
        self.texts.push(text.to_string());
    }

    pub(crate) fn push_reasoning(&mut self, text: &str) {
        self.reasoning.push(text.to_string());
    }

    pub(crate) fn push_tool_call(&mut self, id: String, name: String, arguments: String) {
        let index = u32::try_from(self.tool_calls.len()).unwrap_or(u32::MAX);
        self.tool_calls.push(ToolCallDelta {
            index,
            id: Some(id),
            kind: Some("function".to_string()),
            function: FunctionDelta {
                name: Some(name),
                arguments: Some(arguments),
            },
        });
    }

    pub(crate) fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Assemble the single chunk. `stop_reason` is in the Anthropic vocabulary.
    pub(crate) fn into_chunk(
        self,
        id: String,
        model: String,
        stop_reason: Option<&str>,
        usage: CanonicalUsage,
    ) -> CanonicalChunk {
        let content = if self.texts.is_empty() && !self.tool_calls.is_empty() {
            None
        } else {
            Some(self.texts.join("\n"))
        };
        let reasoning_content = (!self.reasoning.is_empty()).then(|| self.reasoning.join("\n"));
        let tool_calls = (!self.tool_calls.is_empty()).then_some(self.tool_calls);
        CanonicalChunk {
            id,
            model,
            created: unix_now_secs(),
            delta: ChunkDelta {
                role: Some("assistant".to_string()),
                content,
                reasoning_content,
                tool_calls,
            },
            finish_reason: mapping::map_finish_reason(stop_reason),
            usage: Some(usage),
        }
    }
}

/// Parse a JSON argument value into the canonical argument string.
pub(crate) fn arguments_json(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "{}".to_string(),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
