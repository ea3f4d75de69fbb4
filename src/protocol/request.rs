//! Rules shared by every request transcoder: endpoint resolution, auth precedence,
//! system-prompt extraction and thinking detection.

use http::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

use super::canonical::{CanonicalMessage, CanonicalRequest, CanonicalRole, ProviderKind};
use crate::error::TranscodeError;

/// Default thinking budget when none is configured or requested.
pub const DEFAULT_THINKING_BUDGET: u64 = 16_384;

/// Default Anthropic API version header.
pub const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";

/// Model-id substrings that switch thinking on.
const THINKING_MARKERS: [&str; 3] = ["thinking", "reasoner", "-think"];

/// Tool names that map to an upstream's native search capability.
const SEARCH_TOOL_NAMES: [&str; 3] = ["web_search", "google_search", "browser_search"];

/// How the credential is presented to the upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthScheme {
    /// Provider-native API key header (`x-api-key` for Anthropic).
    #[default]
    ApiKey,
    /// `Authorization: Bearer <token>`.
    Bearer,
}

/// Everything a request transcoder needs to know about one upstream.
///
/// Built once from configuration; environment-sourced keys are resolved at that
/// point and carried here.
#[derive(Debug, Clone)]
pub struct UpstreamEndpoint {
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_key: Option<String>,
    pub env_api_key: Option<String>,
    pub api_version: Option<String>,
    pub auth_scheme: AuthScheme,
    pub project: Option<String>,
    pub thinking_budget: Option<u64>,
    pub reasoning_effort: Option<String>,
    pub extra_headers: Vec<(String, String)>,
}

impl UpstreamEndpoint {
    #[must_use]
    pub fn new(kind: ProviderKind, base_url: impl Into<String>) -> Self {
        Self {
            kind,
            base_url: base_url.into(),
            api_key: None,
            env_api_key: None,
            api_version: None,
            auth_scheme: AuthScheme::default(),
            project: None,
            thinking_budget: None,
            reasoning_effort: None,
            extra_headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

/// Request-scoped inputs that do not come from configuration.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Token that takes precedence over any configured key (e.g. a fresh OAuth token).
    pub auth_override: Option<String>,
}

impl RequestContext {
    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            auth_override: Some(token.into()),
        }
    }
}

/// URL and headers for the outgoing call.
#[derive(Debug, Clone)]
pub struct RequestConfig {
    pub url: String,
    pub headers: HeaderMap,
}

/// Output of a request transcoder: `{body, config: {url, headers}}`.
#[derive(Debug, Clone)]
pub struct TransformedRequest {
    pub body: serde_json::Value,
    pub config: RequestConfig,
}

impl TransformedRequest {
    /// JSON rendering of the transform, with headers as a string map.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut headers = serde_json::Map::new();
        for (name, value) in &self.config.headers {
            if let Ok(value) = value.to_str() {
                headers.insert(
                    name.as_str().to_string(),
                    serde_json::Value::String(value.to_string()),
                );
            }
        }
        serde_json::json!({
            "body": self.body,
            "config": {"url": self.config.url, "headers": headers},
        })
    }
}

/// Pick the credential: request override, then configured key, then environment.
///
/// # Errors
///
/// Returns [`TranscodeError::Auth`] when no source yields a non-empty value.
pub fn resolve_credential<'a>(
    endpoint: &'a UpstreamEndpoint,
    ctx: &'a RequestContext,
) -> Result<&'a str, TranscodeError> {
    [
        ctx.auth_override.as_deref(),
        endpoint.api_key.as_deref(),
        endpoint.env_api_key.as_deref(),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .find(|key| !key.is_empty())
    .ok_or_else(|| {
        TranscodeError::Auth(format!(
            "no credential available for {} upstream {}",
            endpoint.kind, endpoint.base_url
        ))
    })
}

/// Append `canonical_path` to `base_url` unless it already ends with it.
#[must_use]
pub fn build_endpoint_url(base_url: &str, canonical_path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with(canonical_path) {
        base.to_string()
    } else {
        format!("{base}{canonical_path}")
    }
}

/// Insert a header, rejecting values that are not valid HTTP header text.
///
/// # Errors
///
/// Returns [`TranscodeError::InvalidRequest`] for malformed names or values.
pub fn insert_header(
    headers: &mut HeaderMap,
    name: &str,
    value: &str,
) -> Result<(), TranscodeError> {
    let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| TranscodeError::InvalidRequest(format!("invalid header name '{name}': {e}")))?;
    let value = HeaderValue::from_str(value)
        .map_err(|e| TranscodeError::InvalidRequest(format!("invalid value for header '{name}': {e}")))?;
    headers.insert(name, value);
    Ok(())
}

/// Headers every upstream receives: JSON content type, plus SSE accept when streaming.
#[must_use]
pub fn base_headers(stream: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if stream {
        headers.insert(
            http::header::ACCEPT,
            HeaderValue::from_static("text/event-stream"),
        );
    }
    headers
}

/// Apply configured extra headers last so they can override defaults.
///
/// # Errors
///
/// Propagates [`insert_header`] failures.
pub fn apply_extra_headers(
    headers: &mut HeaderMap,
    endpoint: &UpstreamEndpoint,
) -> Result<(), TranscodeError> {
    for (name, value) in &endpoint.extra_headers {
        insert_header(headers, name, value)?;
    }
    Ok(())
}

/// Insert `Authorization: Bearer <token>`.
///
/// # Errors
///
/// Propagates [`insert_header`] failures.
pub fn insert_bearer(headers: &mut HeaderMap, token: &str) -> Result<(), TranscodeError> {
    insert_header(headers, "authorization", &format!("Bearer {token}"))
}

/// Split system turns off the conversation.
///
/// Returns the blank-line joined system text (if any) and the remaining messages.
#[must_use]
pub fn split_system(messages: &[CanonicalMessage]) -> (Option<String>, Vec<&CanonicalMessage>) {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut rest = Vec::with_capacity(messages.len());
    for msg in messages {
        if msg.role == CanonicalRole::System {
            system_parts.extend(msg.text_blocks().filter(|t| !t.is_empty()));
        } else {
            rest.push(msg);
        }
    }
    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
    (system, rest)
}

/// Whether a tool name is reserved for native search.
#[must_use]
pub fn is_search_tool(name: &str) -> bool {
    SEARCH_TOOL_NAMES.contains(&name)
}

/// Whether the model identifier names a thinking variant.
#[must_use]
pub fn model_wants_thinking(model: &str) -> bool {
    let lower = model.to_ascii_lowercase();
    THINKING_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Resolve the thinking budget, or `None` when thinking is off for this request.
///
/// An explicit `enabled: false` wins. Otherwise thinking is on when the model id
/// carries a marker or the request asks for it; the budget comes from the request,
/// then the upstream config, then [`DEFAULT_THINKING_BUDGET`].
#[must_use]
pub fn thinking_budget(req: &CanonicalRequest, endpoint: &UpstreamEndpoint) -> Option<u64> {
    let reasoning = req.reasoning.as_ref();
    if reasoning.and_then(|r| r.enabled) == Some(false) {
        return None;
    }
    let requested = reasoning.is_some_and(|r| {
        r.enabled == Some(true) || r.budget_tokens.is_some() || r.effort.is_some()
    }) || req.reasoning_effort.is_some();
    if !requested && !model_wants_thinking(&req.model) {
        return None;
    }
    Some(
        reasoning
            .and_then(|r| r.budget_tokens)
            .or(endpoint.thinking_budget)
            .unwrap_or(DEFAULT_THINKING_BUDGET),
    )
}

/// Reasoning effort for effort-based upstreams: request, then config, then `medium`.
#[must_use]
pub fn reasoning_effort<'a>(req: &'a CanonicalRequest, endpoint: &'a UpstreamEndpoint) -> &'a str {
    req.reasoning
        .as_ref()
        .and_then(|r| r.effort.as_deref())
        .or(req.reasoning_effort.as_deref())
        .or(endpoint.reasoning_effort.as_deref())
        .unwrap_or("medium")
}
