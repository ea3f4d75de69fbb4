use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::util::{is_remote_url, split_data_uri};

/// The kind of upstream protocol an endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    #[serde(alias = "cloud-code", alias = "gemini-cli")]
    CloudCode,
    #[serde(alias = "codex", alias = "openai-responses")]
    Responses,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::CloudCode => "cloudcode",
            ProviderKind::Responses => "responses",
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.trim().to_ascii_lowercase()))
            .map_err(|_| format!("unknown provider '{s}'"))
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum CanonicalRole {
    System,
    User,
    Assistant,
    Tool,
}

impl CanonicalRole {
    /// Parse a wire role. `developer` is a system turn, `function` a tool result,
    /// and anything unrecognized is treated as a user turn.
    #[must_use]
    pub fn from_wire(s: &str) -> Self {
        match s {
            "system" | "developer" => CanonicalRole::System,
            "assistant" | "model" => CanonicalRole::Assistant,
            "tool" | "function" => CanonicalRole::Tool,
            _ => CanonicalRole::User,
        }
    }
}

impl From<String> for CanonicalRole {
    fn from(value: String) -> Self {
        CanonicalRole::from_wire(&value)
    }
}

/// Image payload of a content block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Remote `http(s)` reference.
    Url(String),
    /// Inline base64 payload split out of a data URI.
    Inline { mime_type: String, data: String },
}

impl ImageSource {
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        match split_data_uri(url) {
            Some((mime_type, data)) => ImageSource::Inline {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            },
            None => ImageSource::Url(url.to_string()),
        }
    }

    /// Rebuild the URL form (`https://...` or `data:...;base64,...`).
    #[must_use]
    pub fn to_url(&self) -> String {
        match self {
            ImageSource::Url(url) => url.clone(),
            ImageSource::Inline { mime_type, data } => format!("data:{mime_type};base64,{data}"),
        }
    }
}

/// A single tool invocation carried by an assistant message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ToolCallWire", into = "ToolCallWire")]
pub struct CanonicalToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded argument object.
    pub arguments: String,
}

#[derive(Clone, Serialize, Deserialize)]
struct ToolCallWire {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_type")]
    kind: String,
    function: FunctionCallWire,
}

#[derive(Clone, Serialize, Deserialize)]
struct FunctionCallWire {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

fn function_type() -> String {
    "function".to_string()
}

impl From<ToolCallWire> for CanonicalToolCall {
    fn from(wire: ToolCallWire) -> Self {
        CanonicalToolCall {
            id: wire.id,
            name: wire.function.name,
            arguments: arguments_to_string(wire.function.arguments),
        }
    }
}

impl From<CanonicalToolCall> for ToolCallWire {
    fn from(call: CanonicalToolCall) -> Self {
        ToolCallWire {
            id: call.id,
            kind: function_type(),
            function: FunctionCallWire {
                name: call.name,
                arguments: serde_json::Value::String(call.arguments),
            },
        }
    }
}

fn arguments_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}

impl CanonicalToolCall {
    /// Parse the argument string into structured input.
    ///
    /// Empty or malformed argument text degrades to an empty object.
    #[must_use]
    pub fn parsed_arguments(&self) -> serde_json::Value {
        if self.arguments.trim().is_empty() {
            return serde_json::Value::Object(serde_json::Map::new());
        }
        match serde_json::from_str(&self.arguments) {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(
                    tool = %self.name,
                    "tool call arguments are not valid JSON, sending empty input: {err}"
                );
                serde_json::Value::Object(serde_json::Map::new())
            }
        }
    }
}

/// One block of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum ContentBlock {
    Text(String),
    Image(ImageSource),
    ToolCall(CanonicalToolCall),
    ToolResult {
        tool_call_id: String,
        content: String,
    },
    Thinking {
        thinking: String,
        signature: Option<String>,
    },
    /// Unrecognized block, forwarded verbatim.
    Other(serde_json::Value),
}

impl From<serde_json::Value> for ContentBlock {
    fn from(value: serde_json::Value) -> Self {
        let kind = value.get("type").and_then(serde_json::Value::as_str);
        match kind {
            Some("text") => match value.get("text").and_then(serde_json::Value::as_str) {
                Some(text) => ContentBlock::Text(text.to_string()),
                None => ContentBlock::Other(value),
            },
            Some("image_url") => {
                let url = match value.get("image_url") {
                    Some(serde_json::Value::String(url)) => Some(url.as_str()),
                    Some(obj) => obj.get("url").and_then(serde_json::Value::as_str),
                    None => None,
                };
                match url.map(ImageSource::from_url) {
                    Some(source) if is_mappable_image(&source) => ContentBlock::Image(source),
                    _ => ContentBlock::Other(value),
                }
            }
            Some("thinking") => {
                match value.get("thinking").and_then(serde_json::Value::as_str) {
                    Some(thinking) => ContentBlock::Thinking {
                        thinking: thinking.to_string(),
                        signature: value
                            .get("signature")
                            .and_then(serde_json::Value::as_str)
                            .map(ToString::to_string),
                    },
                    None => ContentBlock::Other(value),
                }
            }
            Some("tool_call") => {
                let id = value.get("id").and_then(serde_json::Value::as_str);
                let name = value.get("name").and_then(serde_json::Value::as_str);
                match (id, name) {
                    (Some(id), Some(name)) => ContentBlock::ToolCall(CanonicalToolCall {
                        id: id.to_string(),
                        name: name.to_string(),
                        arguments: arguments_to_string(
                            value
                                .get("arguments")
                                .cloned()
                                .unwrap_or(serde_json::Value::Null),
                        ),
                    }),
                    _ => ContentBlock::Other(value),
                }
            }
            Some("tool_result") => {
                match value.get("tool_call_id").and_then(serde_json::Value::as_str) {
                    Some(id) => ContentBlock::ToolResult {
                        tool_call_id: id.to_string(),
                        content: value_to_text(value.get("content")),
                    },
                    None => ContentBlock::Other(value),
                }
            }
            _ => ContentBlock::Other(value),
        }
    }
}

impl From<ContentBlock> for serde_json::Value {
    fn from(block: ContentBlock) -> Self {
        match block {
            ContentBlock::Text(text) => serde_json::json!({"type": "text", "text": text}),
            ContentBlock::Image(source) => serde_json::json!({
                "type": "image_url",
                "image_url": {"url": source.to_url()},
            }),
            ContentBlock::ToolCall(call) => serde_json::json!({
                "type": "tool_call",
                "id": call.id,
                "name": call.name,
                "arguments": call.arguments,
            }),
            ContentBlock::ToolResult {
                tool_call_id,
                content,
            } => serde_json::json!({
                "type": "tool_result",
                "tool_call_id": tool_call_id,
                "content": content,
            }),
            ContentBlock::Thinking {
                thinking,
                signature,
            } => {
                let mut obj = serde_json::json!({"type": "thinking", "thinking": thinking});
                if let Some(signature) = signature {
                    obj["signature"] = serde_json::Value::String(signature);
                }
                obj
            }
            ContentBlock::Other(value) => value,
        }
    }
}

/// Flatten tool-result content (string, list of text parts, or any JSON) to text.
pub(crate) fn value_to_text(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Array(items)) => {
            let texts: Vec<&str> = items
                .iter()
                .filter_map(|item| item.get("text").and_then(serde_json::Value::as_str))
                .collect();
            if texts.len() == items.len() {
                texts.join("")
            } else {
                serde_json::Value::Array(items.clone()).to_string()
            }
        }
        Some(other) => other.to_string(),
    }
}

fn deserialize_content<'de, D>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(serde_json::Value::String(text)) => vec![ContentBlock::Text(text)],
        Some(serde_json::Value::Array(items)) => {
            items.into_iter().map(ContentBlock::from).collect()
        }
        Some(other) => vec![ContentBlock::from(other)],
    })
}

/// A single message in the canonical conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalMessage {
    pub role: CanonicalRole,
    #[serde(default, deserialize_with = "deserialize_content")]
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<CanonicalToolCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl CanonicalMessage {
    #[must_use]
    pub fn text(role: CanonicalRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock::Text(text.into())],
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    /// Text blocks of this message, in order.
    pub fn text_blocks(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::Text(text) => Some(text.as_str()),
            _ => None,
        })
    }

    /// Flattened text of a tool-result message.
    #[must_use]
    pub fn result_text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            match block {
                ContentBlock::Text(text) => out.push_str(text),
                ContentBlock::ToolResult { content, .. } => out.push_str(content),
                _ => {}
            }
        }
        out
    }
}

/// A tool's function declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalFunction {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
}

/// A tool specification in the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalTool {
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,
    pub function: CanonicalFunction,
}

impl CanonicalTool {
    #[must_use]
    pub fn function(
        name: impl Into<String>,
        description: Option<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            kind: function_type(),
            function: CanonicalFunction {
                name: name.into(),
                description,
                parameters: Some(parameters),
                response: None,
            },
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// `stop` accepts a single sequence or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopSequences {
    One(String),
    Many(Vec<String>),
}

impl StopSequences {
    #[must_use]
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            StopSequences::One(s) => vec![s.clone()],
            StopSequences::Many(v) => v.clone(),
        }
    }
}

/// Sampling parameters passed through to the upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<StopSequences>,
    #[serde(
        default,
        alias = "max_completion_tokens",
        skip_serializing_if = "Option::is_none"
    )]
    pub max_tokens: Option<u64>,
}

impl SamplingParams {
    #[must_use]
    pub fn stop_sequences(&self) -> Option<Vec<String>> {
        self.stop
            .as_ref()
            .map(StopSequences::to_vec)
            .filter(|v| !v.is_empty())
    }
}

/// Request-level thinking/reasoning override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReasoningOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effort: Option<String>,
}

/// The provider-agnostic chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRequest {
    pub model: String,
    pub messages: Vec<CanonicalMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<CanonicalTool>,
    #[serde(flatten)]
    pub sampling: SamplingParams,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, alias = "thinking", skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<ReasoningOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

impl CanonicalRequest {
    #[must_use]
    pub fn new(model: impl Into<String>, messages: Vec<CanonicalMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools: Vec::new(),
            sampling: SamplingParams::default(),
            stream: false,
            reasoning: None,
            reasoning_effort: None,
        }
    }
}

/// Cumulative token usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl CanonicalUsage {
    #[must_use]
    pub fn from_counts(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Function part of a streamed tool-call delta.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// A tool call fragment inside a chunk delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub function: FunctionDelta,
}

/// Incremental message content carried by one chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

impl ChunkDelta {
    #[must_use]
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            reasoning_content: Some(text.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn tool_call(call: ToolCallDelta) -> Self {
        Self {
            tool_calls: Some(vec![call]),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.role.is_none()
            && self.content.is_none()
            && self.reasoning_content.is_none()
            && self.tool_calls.is_none()
    }
}

pub const CHUNK_OBJECT: &str = "chat.completion.chunk";

/// One canonical `chat.completion.chunk`.
///
/// Holds exactly one choice; the wire form wraps it in `choices[0]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalChunk {
    pub id: String,
    pub model: String,
    pub created: u64,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
    pub usage: Option<CanonicalUsage>,
}

#[derive(Serialize)]
struct ChunkWire<'a> {
    id: &'a str,
    object: &'static str,
    created: u64,
    model: &'a str,
    choices: [ChoiceWire<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<&'a CanonicalUsage>,
}

#[derive(Serialize)]
struct ChoiceWire<'a> {
    index: u32,
    delta: &'a ChunkDelta,
    finish_reason: Option<&'a str>,
}

impl Serialize for CanonicalChunk {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        ChunkWire {
            id: &self.id,
            object: CHUNK_OBJECT,
            created: self.created,
            model: &self.model,
            choices: [ChoiceWire {
                index: 0,
                delta: &self.delta,
                finish_reason: self.finish_reason.as_deref(),
            }],
            usage: self.usage.as_ref(),
        }
        .serialize(serializer)
    }
}

impl CanonicalChunk {
    /// Encode as one SSE record: `data: <json>\n\n`.
    ///
    /// # Errors
    ///
    /// Returns an error when the chunk cannot be serialized.
    pub fn to_sse_frame(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        let mut out = String::with_capacity(8 + json.len());
        out.push_str("data: ");
        out.push_str(&json);
        out.push_str("\n\n");
        Ok(out)
    }
}

/// Inline payloads and `http(s)` references map to image blocks; any other
/// scheme is forwarded as an unknown block.
fn is_mappable_image(source: &ImageSource) -> bool {
    match source {
        ImageSource::Url(url) => is_remote_url(url),
        ImageSource::Inline { .. } => true,
    }
}
